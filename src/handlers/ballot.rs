//! 选票与审批工作流的 HTTP 处理器

use axum::{
    body::Bytes,
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
        ballot::{
            BallotAction, BallotFilters, CreateBallotRequest, TransitionRequest,
            UpdateBallotRequest,
        },
        pagination::{PageQuery, Pagination},
    },
};

/// 列出选票
pub async fn list_ballots(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    filters: Result<Query<BallotFilters>, QueryRejection>,
    page: Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(filters) = filters?;
    let (page, limit, offset) = page_params(&state, page?.0);

    let (ballots, total) = state
        .ballot_service
        .list(&auth_context, filters, limit, offset)
        .await?;

    Ok(Json(json!({
        "ballots": ballots,
        "pagination": Pagination::new(page, limit, total)
    })))
}

pub async fn get_ballot(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let ballot = state.ballot_service.get(&auth_context, id).await?;
    Ok(Json(ballot))
}

/// 创建选票（草稿）
pub async fn create_ballot(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    body: Result<Json<CreateBallotRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = body?;
    let ballot = state.ballot_service.create(&auth_context, req, &info).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Ballot created",
            "ballot": ballot
        })),
    ))
}

/// 编辑草稿（带版本号）
pub async fn update_ballot(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateBallotRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let ballot = state
        .ballot_service
        .update(&auth_context, id, req, &info)
        .await?;

    Ok(Json(json!({
        "message": "Ballot updated",
        "ballot": ballot
    })))
}

pub async fn delete_ballot(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    state.ballot_service.delete(&auth_context, id, &info).await?;
    Ok(Json(json!({ "message": "Ballot deleted" })))
}

/// 请求体可以为空，也可以是 `{"comment": "..."}`
fn transition_request(body: &Bytes) -> Result<TransitionRequest, AppError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(TransitionRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::bad_request(format!("Invalid request body: {}", e)))
}

async fn transition(
    state: Arc<AppState>,
    auth_context: AuthContext,
    info: RequestInfo,
    id: Uuid,
    action: BallotAction,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let req = transition_request(&body)?;
    let ballot = state
        .ballot_service
        .transition(&auth_context, id, action, req, &info)
        .await?;

    Ok(Json(json!({
        "message": format!("Ballot {} recorded", action.as_str()),
        "ballot": ballot
    })))
}

pub async fn submit_ballot(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    transition(state, auth_context, info, id, BallotAction::Submit, body).await
}

pub async fn review_ballot(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    transition(state, auth_context, info, id, BallotAction::Review, body).await
}

pub async fn legal_audit_ballot(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    transition(state, auth_context, info, id, BallotAction::LegalAudit, body).await
}

pub async fn approve_ballot(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    transition(state, auth_context, info, id, BallotAction::Approve, body).await
}

pub async fn reject_ballot(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    transition(state, auth_context, info, id, BallotAction::Reject, body).await
}

/// 锁定选票，仅允许从 approved 状态
pub async fn lock_ballot(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    transition(state, auth_context, info, id, BallotAction::Lock, body).await
}
