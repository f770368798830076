//! 选民登记的 HTTP 处理器

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
        pagination::{PageQuery, Pagination},
        voter::{RegisterVoterRequest, SuspendVoterRequest, UpdateVoterRequest, VoterFilters},
    },
};

pub async fn list_voters(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    filters: Result<Query<VoterFilters>, QueryRejection>,
    page: Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(filters) = filters?;
    let (page, limit, offset) = page_params(&state, page?.0);

    let (voters, total) = state
        .voter_service
        .list(&auth_context, filters, limit, offset)
        .await?;

    Ok(Json(json!({
        "voters": voters,
        "pagination": Pagination::new(page, limit, total)
    })))
}

pub async fn get_voter(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let voter = state.voter_service.get(&auth_context, id).await?;
    Ok(Json(voter))
}

/// 登记选民
pub async fn register_voter(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    body: Result<Json<RegisterVoterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = body?;
    let voter = state
        .voter_service
        .register(&auth_context, req, &info)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Voter registered",
            "voter": voter
        })),
    ))
}

pub async fn update_voter(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateVoterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let voter = state
        .voter_service
        .update(&auth_context, id, req, &info)
        .await?;

    Ok(Json(json!({
        "message": "Voter updated",
        "voter": voter
    })))
}

pub async fn verify_voter(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let voter = state.voter_service.verify(&auth_context, id, &info).await?;

    Ok(Json(json!({
        "message": "Voter verified",
        "voter": voter
    })))
}

pub async fn suspend_voter(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<SuspendVoterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let voter = state
        .voter_service
        .suspend(&auth_context, id, req, &info)
        .await?;

    Ok(Json(json!({
        "message": "Voter suspended",
        "voter": voter
    })))
}

/// 记录投票
pub async fn record_vote(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let voter = state
        .voter_service
        .record_vote(&auth_context, id, &info)
        .await?;

    Ok(Json(json!({
        "message": "Vote recorded",
        "voter": voter
    })))
}

/// 选民统计（辖区内）
pub async fn voter_stats(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    filters: Result<Query<VoterFilters>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(filters) = filters?;
    let stats = state.voter_service.stats(&auth_context, filters).await?;
    Ok(Json(stats))
}

/// 公开的登记状态查询，无需认证
pub async fn voter_status(
    State(state): State<Arc<AppState>>,
    Path(national_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let status = state.voter_service.public_status(&national_id).await?;
    Ok(Json(status))
}
