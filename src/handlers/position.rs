//! 职位管理的 HTTP 处理器

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
    middleware::AppState,
    models::{
        audit::RequestInfo,
        position::{CreatePositionRequest, PositionFilters, UpdatePositionRequest},
    },
};

pub async fn list_positions(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    filters: Result<Query<PositionFilters>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(filters) = filters?;
    let positions = state.position_service.list(&auth_context, &filters).await?;

    Ok(Json(json!({
        "positions": positions,
        "count": positions.len()
    })))
}

pub async fn get_position(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let position = state.position_service.get(&auth_context, id).await?;
    Ok(Json(position))
}

pub async fn create_position(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    body: Result<Json<CreatePositionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = body?;
    let position = state
        .position_service
        .create(&auth_context, req, &info)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Position created",
            "position": position
        })),
    ))
}

pub async fn update_position(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdatePositionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let position = state
        .position_service
        .update(&auth_context, id, req, &info)
        .await?;

    Ok(Json(json!({
        "message": "Position updated",
        "position": position
    })))
}

/// 删除职位；仍被引用时返回 400
pub async fn delete_position(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = path?;
    state
        .position_service
        .delete(&auth_context, id, &info)
        .await?;

    Ok(Json(json!({ "message": "Position deleted" })))
}
