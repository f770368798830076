//! HTTP 中间件
//! 应用状态、请求追踪、客户端信息提取

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    auth::JwtService,
    config::AppConfig,
    error::AppError,
    models::audit::RequestInfo,
    repository::Repositories,
    services::{
        AuditService, AuthService, BallotService, CandidateService, PositionService, VoterService,
    },
};

/// 应用状态
///
/// 服务之间共享同一个 `AuditService`，保证审计追加在进程内串行。
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub repos: Repositories,
    pub jwt_service: Arc<JwtService>,
    pub auth_service: Arc<AuthService>,
    pub audit_service: Arc<AuditService>,
    pub candidate_service: Arc<CandidateService>,
    pub ballot_service: Arc<BallotService>,
    pub position_service: Arc<PositionService>,
    pub voter_service: Arc<VoterService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn build(config: AppConfig, repos: Repositories) -> Result<Self, AppError> {
        let jwt_service = Arc::new(JwtService::from_config(&config.security)?);
        let audit_service = Arc::new(AuditService::new(
            repos.audit.clone(),
            config.audit.append_max_attempts,
        ));

        let auth_service = Arc::new(AuthService::new(
            repos.users.clone(),
            jwt_service.clone(),
            config.security.clone(),
            audit_service.clone(),
        )?);
        let candidate_service = Arc::new(CandidateService::new(
            repos.candidates.clone(),
            repos.positions.clone(),
            repos.ballots.clone(),
            audit_service.clone(),
        ));
        let ballot_service = Arc::new(BallotService::new(
            repos.ballots.clone(),
            repos.candidates.clone(),
            repos.positions.clone(),
            audit_service.clone(),
        ));
        let position_service = Arc::new(PositionService::new(
            repos.positions.clone(),
            repos.candidates.clone(),
            repos.ballots.clone(),
            audit_service.clone(),
        ));
        let voter_service = Arc::new(VoterService::new(
            repos.voters.clone(),
            audit_service.clone(),
        ));

        Ok(Self {
            config,
            repos,
            jwt_service,
            auth_service,
            audit_service,
            candidate_service,
            ballot_service,
            position_service,
            voter_service,
            started_at: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

tokio::task_local! {
    static REQUEST_ID: String;
}

/// 当前请求的 request_id（在请求追踪中间件之外调用时为 `None`）
pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|id| id.clone()).ok()
}

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，附加客户端信息并记录指标
pub async fn request_tracking_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let trace_id = header_or_new(req.headers(), "x-trace-id");
    let request_id = header_or_new(req.headers(), "x-request-id");

    let method = req.method().clone();
    let uri = req.uri().to_string();

    let info = RequestInfo {
        ip: client_ip(&req, state.config.security.trust_proxy),
        user_agent: header(req.headers(), "user-agent"),
        session_id: header(req.headers(), "x-session-id"),
        request_id: Some(request_id.clone()),
    };
    req.extensions_mut().insert(info);

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let start = Instant::now();
    let mut response = REQUEST_ID
        .scope(request_id.clone(), next.run(req).instrument(span.clone()))
        .await;
    let elapsed = start.elapsed();

    let status = response.status().as_u16();
    let method_label = match method.as_str() {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "DELETE" => "DELETE",
        "PATCH" => "PATCH",
        _ => "OTHER",
    };
    let status_label = match status {
        200..=299 => "2xx",
        400 => "400",
        401 => "401",
        403 => "403",
        404 => "404",
        409 => "409",
        500..=599 => "5xx",
        _ => "other",
    };
    metrics::counter!("http_requests_total", "method" => method_label, "status" => status_label)
        .increment(1);
    metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

    span.in_scope(|| {
        tracing::info!(
            status = status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("x-trace-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// 从请求头中提取或生成 id（最长 128 字符）
fn header_or_new(headers: &HeaderMap, name: &str) -> String {
    header(headers, name)
        .filter(|s| s.len() <= 128)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// 获取客户端 IP 地址
fn client_ip(req: &Request, trust_proxy: bool) -> Option<String> {
    let headers = req.headers();

    // 如果信任代理，从 X-Forwarded-For 获取第一个地址
    if trust_proxy {
        let forwarded = header(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .filter(|ip| !ip.is_empty());
        if forwarded.is_some() {
            return forwarded;
        }
        if let Some(real_ip) = header(headers, "x-real-ip") {
            return Some(real_ip);
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

// handler 中直接提取 RequestInfo，缺失时为空
impl<S> FromRequestParts<S> for RequestInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<RequestInfo>().cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_header_or_new() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", "test-trace-123".parse().unwrap());
        assert_eq!(header_or_new(&headers, "x-trace-id"), "test-trace-123");

        let generated = header_or_new(&HeaderMap::new(), "x-trace-id");
        assert!(Uuid::parse_str(&generated).is_ok());

        headers.insert("x-request-id", "x".repeat(200).parse().unwrap());
        assert_ne!(header_or_new(&headers, "x-request-id").len(), 200);
    }

    #[test]
    fn test_client_ip_respects_trust_proxy() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req, true).as_deref(), Some("203.0.113.7"));
        assert_eq!(client_ip(&req, false), None);

        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 4321))));
        assert_eq!(client_ip(&req, false).as_deref(), Some("192.0.2.10"));
    }

    #[tokio::test]
    async fn test_request_id_is_task_local() {
        assert!(current_request_id().is_none());
        let seen = REQUEST_ID
            .scope("req-1".to_string(), async { current_request_id() })
            .await;
        assert_eq!(seen.as_deref(), Some("req-1"));
    }
}
