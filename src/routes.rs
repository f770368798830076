//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::{handlers, middleware::AppState};

/// 请求体上限（1 MiB）
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查、登录、选民状态查询）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/api/auth/login", post(handlers::auth::login))
        .route(
            "/api/voters/status/{national_id}",
            get(handlers::voter::voter_status),
        );

    // 需要认证的路由
    let authenticated_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/me", get(handlers::auth::me))

        // 候选人
        .route(
            "/api/candidates",
            get(handlers::candidate::list_candidates)
                .post(handlers::candidate::create_candidate)
        )
        .route(
            "/api/candidates/{id}",
            get(handlers::candidate::get_candidate)
                .put(handlers::candidate::update_candidate)
                .delete(handlers::candidate::delete_candidate)
        )
        .route("/api/candidates/{id}/approve", put(handlers::candidate::approve_candidate))
        .route("/api/candidates/{id}/reject", put(handlers::candidate::reject_candidate))

        // 选票与审批工作流
        .route(
            "/api/ballots",
            get(handlers::ballot::list_ballots)
                .post(handlers::ballot::create_ballot)
        )
        .route(
            "/api/ballots/{id}",
            get(handlers::ballot::get_ballot)
                .put(handlers::ballot::update_ballot)
                .delete(handlers::ballot::delete_ballot)
        )
        .route("/api/ballots/{id}/submit", put(handlers::ballot::submit_ballot))
        .route("/api/ballots/{id}/review", put(handlers::ballot::review_ballot))
        .route("/api/ballots/{id}/legal-audit", put(handlers::ballot::legal_audit_ballot))
        .route("/api/ballots/{id}/approve", put(handlers::ballot::approve_ballot))
        .route("/api/ballots/{id}/reject", put(handlers::ballot::reject_ballot))
        .route("/api/ballots/{id}/lock", put(handlers::ballot::lock_ballot))

        // 职位
        .route(
            "/api/positions",
            get(handlers::position::list_positions)
                .post(handlers::position::create_position)
        )
        .route(
            "/api/positions/{id}",
            get(handlers::position::get_position)
                .put(handlers::position::update_position)
                .delete(handlers::position::delete_position)
        )

        // 选民
        .route(
            "/api/voters",
            get(handlers::voter::list_voters)
                .post(handlers::voter::register_voter)
        )
        .route("/api/voters/stats", get(handlers::voter::voter_stats))
        .route(
            "/api/voters/{id}",
            get(handlers::voter::get_voter)
                .put(handlers::voter::update_voter)
        )
        .route("/api/voters/{id}/verify", put(handlers::voter::verify_voter))
        .route("/api/voters/{id}/suspend", put(handlers::voter::suspend_voter))
        .route("/api/voters/{id}/vote", put(handlers::voter::record_vote))

        // 审计日志
        .route("/api/audit", get(handlers::audit::list_audit_logs))
        .route("/api/audit/export", get(handlers::audit::export_audit_logs))
        .route("/api/audit/summary", get(handlers::audit::audit_summary))
        .route("/api/audit/verify-chain", get(handlers::audit::verify_chain))
        .route(
            "/api/audit/trail/{entity_type}/{entity_id}",
            get(handlers::audit::audit_trail),
        )
        .route("/api/audit/{id}", get(handlers::audit::get_audit_log))
        .route("/api/audit/{id}/verify", get(handlers::audit::verify_audit_log))
        .layer(axum::middleware::from_fn_with_state(
            state.jwt_service.clone(),
            crate::auth::middleware::jwt_auth_middleware,
        ));

    // 组合所有路由
    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors_layer(state.config.security.cors_allowed_origins.as_deref()))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::request_tracking_middleware,
        ))
        .with_state(state)
}

/// 跨域配置；未配置来源时允许任意来源
fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([
            header::HeaderName::from_static("x-request-id"),
            header::HeaderName::from_static("x-trace-id"),
        ]);

    match origins {
        Some(origins) if !origins.is_empty() => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(origins)
        }
        _ => layer.allow_origin(Any),
    }
}
