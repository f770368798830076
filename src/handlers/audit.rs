//! 审计日志的 HTTP 处理器
//!
//! 查询、轨迹、汇总需要 `audit:read`，导出需要 `audit:export`，
//! 校验需要 `audit:verify`。导出与校验本身不写审计日志。

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    audit::to_csv,
    auth::{AuthContext, Permission},
    error::AppError,
    handlers::page_params,
    middleware::AppState,
    models::{
        audit::{AuditFilters, EntityType},
        pagination::{PageQuery, Pagination},
    },
};

/// 查询审计日志（最新在前）
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    filters: Result<Query<AuditFilters>, QueryRejection>,
    page: Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    auth_context.require(Permission::AuditRead)?;
    let Query(filters) = filters?;
    let (page, limit, offset) = page_params(&state, page?.0);

    let (logs, total) = state.audit_service.list(&filters, limit, offset).await?;

    Ok(Json(json!({
        "logs": logs,
        "pagination": Pagination::new(page, limit, total)
    })))
}

pub async fn get_audit_log(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    auth_context.require(Permission::AuditRead)?;
    let log = state.audit_service.get(id).await?;
    Ok(Json(log))
}

/// 校验单条日志的哈希
pub async fn verify_audit_log(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    auth_context.require(Permission::AuditVerify)?;
    let verification = state.audit_service.verify(id).await?;
    Ok(Json(verification))
}

/// 沿链校验全部日志
pub async fn verify_chain(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    auth_context.require(Permission::AuditVerify)?;
    let report = state.audit_service.verify_chain().await?;
    Ok(Json(report))
}

/// 某个实体的审计轨迹（最早在前）
pub async fn audit_trail(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    path: Result<Path<(String, Uuid)>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path((entity_type, entity_id)) = path?;
    auth_context.require(Permission::AuditRead)?;
    let entity_type: EntityType = entity_type.parse().map_err(AppError::BadRequest)?;

    let trail = state.audit_service.trail(entity_type, entity_id).await?;

    Ok(Json(json!({
        "entityType": entity_type,
        "entityId": entity_id,
        "count": trail.len(),
        "trail": trail
    })))
}

/// 按时间范围汇总
pub async fn audit_summary(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    filters: Result<Query<AuditFilters>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    auth_context.require(Permission::AuditRead)?;
    let Query(filters) = filters?;
    let summary = state.audit_service.summary(&filters).await?;
    Ok(Json(summary))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

/// 导出审计日志：`format=json`（默认）或 `format=csv`
pub async fn export_audit_logs(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    export: Result<Query<ExportQuery>, QueryRejection>,
    filters: Result<Query<AuditFilters>, QueryRejection>,
) -> Result<Response, AppError> {
    auth_context.require(Permission::AuditExport)?;
    let Query(export) = export?;
    let Query(filters) = filters?;

    let format = export
        .format
        .as_deref()
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "json".to_string());
    if format != "json" && format != "csv" {
        return Err(AppError::field("format", "must be json or csv"));
    }

    let logs = state
        .audit_service
        .export(&filters, state.config.audit.export_max_rows)
        .await?;

    tracing::info!(
        user_id = %auth_context.user_id,
        format = %format,
        rows = logs.len(),
        "Audit logs exported"
    );

    if format == "csv" {
        let filename = format!(
            "attachment; filename=\"audit-logs-{}.csv\"",
            Utc::now().format("%Y%m%d-%H%M%S")
        );
        return Ok((
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (header::CONTENT_DISPOSITION, filename),
            ],
            to_csv(&logs),
        )
            .into_response());
    }

    Ok(Json(json!({
        "exportedAt": Utc::now(),
        "count": logs.len(),
        "logs": logs
    }))
    .into_response())
}
