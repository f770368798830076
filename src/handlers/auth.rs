//! 认证相关的 HTTP 处理器

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    auth::AuthContext,
    error::AppError,
    middleware::AppState,
    models::{
        audit::RequestInfo,
        user::{LoginRequest, RegisterUserRequest},
    },
};

/// 用户登录
pub async fn login(
    State(state): State<Arc<AppState>>,
    info: RequestInfo,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = body?;
    let response = state.auth_service.login(req, &info).await?;
    Ok(Json(response))
}

/// 创建用户（需要 users:manage）
pub async fn register(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    info: RequestInfo,
    body: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = body?;
    let user = state.auth_service.register(&auth_context, req, &info).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered",
            "user": user
        })),
    ))
}

/// 获取当前用户信息
pub async fn me(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let user = state.auth_service.me(&auth_context).await?;
    Ok(Json(user))
}
