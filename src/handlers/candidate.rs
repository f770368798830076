//! 候选人管理的 HTTP 处理器

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthContext,
    error::AppError,
    handlers::page_params,
    middleware::AppState,
    models::{
        audit::RequestInfo,
        candidate::{
            CandidateFilters, CandidateResponse, CreateCandidateRequest, RejectCandidateRequest,
            UpdateCandidateRequest,
        },
        pagination::{PageQuery, Pagination},
    },
};

/// 列出候选人
pub async fn list_candidates(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    filters: Result<Query<CandidateFilters>, QueryRejection>,
    page: Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(filters) = filters?;
    let (page, limit, offset) = page_params(&state, page?.0);

    let (candidates, total) = state
        .candidate_service
        .list(&auth_context, filters, limit, offset)
        .await?;
    let candidates: Vec<CandidateResponse> = candidates.into_iter().map(Into::into).collect();

    Ok(Json(json!({
        "candidates": candidates,
        "pagination": Pagination::new(page, limit, total)
    })))
}

/// 获取候选人详情
pub async fn get_candidate(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let candidate = state.candidate_service.get(&auth_context, id).await?;
    Ok(Json(CandidateResponse::from(candidate)))
}

/// 登记候选人
pub async fn create_candidate(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    body: Result<Json<CreateCandidateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = body?;
    let candidate = state
        .candidate_service
        .create(&auth_context, req, &info)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Candidate created",
            "candidate": CandidateResponse::from(candidate)
        })),
    ))
}

/// 更新候选人
pub async fn update_candidate(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateCandidateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let candidate = state
        .candidate_service
        .update(&auth_context, id, req, &info)
        .await?;

    Ok(Json(json!({
        "message": "Candidate updated",
        "candidate": CandidateResponse::from(candidate)
    })))
}

/// 批准候选人
pub async fn approve_candidate(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let candidate = state
        .candidate_service
        .approve(&auth_context, id, &info)
        .await?;

    Ok(Json(json!({
        "message": "Candidate approved",
        "candidate": CandidateResponse::from(candidate)
    })))
}

/// 驳回候选人（需要理由）
pub async fn reject_candidate(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<RejectCandidateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let candidate = state
        .candidate_service
        .reject(&auth_context, id, req, &info)
        .await?;

    Ok(Json(json!({
        "message": "Candidate rejected",
        "candidate": CandidateResponse::from(candidate)
    })))
}

/// 删除候选人
pub async fn delete_candidate(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    state
        .candidate_service
        .delete(&auth_context, id, &info)
        .await?;

    Ok(Json(json!({ "message": "Candidate deleted" })))
}
