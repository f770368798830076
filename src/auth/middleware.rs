//! JWT 认证中间件

use crate::{
    auth::{jwt::JwtService, permissions::Permission},
    error::AppError,
    models::{jurisdiction::Jurisdiction, user::UserRole},
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

/// 认证上下文（附加到请求扩展）
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub permissions: Vec<Permission>,
    pub jurisdiction: Jurisdiction,
}

impl AuthContext {
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// 缺少权限时返回 403
    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        if self.has(permission) {
            Ok(())
        } else {
            tracing::debug!(
                user_id = %self.user_id,
                permission = %permission,
                "Permission denied"
            );
            Err(AppError::Forbidden)
        }
    }

    /// 持有其中任意一个即可
    pub fn require_any(&self, permissions: &[Permission]) -> Result<(), AppError> {
        match permissions.iter().find(|p| self.has(**p)) {
            Some(_) => Ok(()),
            None => {
                tracing::debug!(user_id = %self.user_id, ?permissions, "Permission denied");
                Err(AppError::Forbidden)
            }
        }
    }

    pub fn covers(&self, target: &Jurisdiction) -> bool {
        self.jurisdiction.covers(target)
    }

    /// 目标不在调用者辖区内时返回 403
    pub fn require_scope(&self, target: &Jurisdiction) -> Result<(), AppError> {
        if self.covers(target) {
            Ok(())
        } else {
            tracing::debug!(user_id = %self.user_id, ?target, "Outside jurisdiction");
            Err(AppError::Forbidden)
        }
    }

    /// 列表查询使用的辖区过滤；全国范围不过滤
    pub fn scope(&self) -> Option<Jurisdiction> {
        if self.jurisdiction.is_national() {
            None
        } else {
            Some(self.jurisdiction.clone())
        }
    }
}

// 实现 FromRequestParts 以便在 handler 中直接提取 AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// 从 Authorization 头提取令牌
pub fn extract_token(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(AppError::Unauthorized)
}

/// JWT 认证中间件 - 必须认证
pub async fn jwt_auth_middleware(
    State(jwt_service): State<Arc<JwtService>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers())?;
    let claims = jwt_service.validate_token(&token)?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;
    let auth_context = AuthContext {
        user_id,
        username: claims.username,
        role: claims.role,
        permissions: claims.permissions,
        jurisdiction: claims.jurisdiction,
    };

    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}
