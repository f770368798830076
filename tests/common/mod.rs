//! 测试公共模块
//! 提供测试辅助函数和测试工具

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use election_service::{
    config::{
        AppConfig, AuditConfig, BootstrapConfig, DatabaseConfig, LoggingConfig, SecurityConfig,
        ServerConfig,
    },
    middleware::AppState,
    repository::Repositories,
    routes,
};
use http_body_util::BodyExt;
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "AdminPass123";
/// 测试中创建用户时使用的统一密码
pub const USER_PASSWORD: &str = "ClerkPass123";

/// 创建测试配置（内存存储，低开销的密码哈希）
pub fn create_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(), // 使用随机端口
            graceful_shutdown_timeout_secs: 5,
            environment: "test".to_string(),
        },
        database: DatabaseConfig {
            url: Secret::new("memory://".to_string()),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
            run_migrations: false,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            jwt_secret: Secret::new("test-secret-key-for-testing-only-min-32-chars".to_string()),
            jwt_expires_in: "1h".to_string(),
            password_min_length: 8,
            password_require_uppercase: true,
            password_require_digit: true,
            password_hash_memory_kib: 1024,
            password_hash_iterations: 1,
            trust_proxy: true,
            cors_allowed_origins: None,
        },
        audit: AuditConfig {
            export_max_rows: 1000,
            append_max_attempts: 5,
            default_page_size: 20,
            max_page_size: 100,
        },
        bootstrap: BootstrapConfig {
            admin_username: Some(ADMIN_USERNAME.to_string()),
            admin_email: Some("admin@iebc.test".to_string()),
            admin_password: Some(Secret::new(ADMIN_PASSWORD.to_string())),
        },
    }
}

/// 测试应用：路由 + 共享状态
pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
}

/// 基于内存存储创建测试应用，并创建初始管理员
pub async fn spawn_app() -> TestApp {
    spawn_app_with(create_test_config(), Repositories::in_memory()).await
}

pub async fn spawn_app_with(config: AppConfig, repos: Repositories) -> TestApp {
    let bootstrap = config.bootstrap.clone();
    let state = Arc::new(AppState::build(config, repos).expect("Failed to build app state"));
    state
        .auth_service
        .ensure_bootstrap_admin(&bootstrap)
        .await
        .expect("Failed to create bootstrap admin");

    let router = routes::create_router(state.clone());
    TestApp { state, router }
}

/// 测试响应
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).expect("response body is not UTF-8")
    }
}

impl TestApp {
    /// 发送请求；`token` 为 None 时不带认证头
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.request("GET", uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request("POST", uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.request("PUT", uri, Some(token), Some(body)).await
    }

    /// 登录并返回令牌
    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.text());
        response.json()["token"]
            .as_str()
            .expect("token missing")
            .to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    /// 由管理员创建指定角色的用户并登录
    pub async fn user_token(&self, username: &str, role: &str, jurisdiction: Value) -> String {
        let admin = self.admin_token().await;
        let response = self
            .post(
                "/api/auth/register",
                &admin,
                json!({
                    "username": username,
                    "email": format!("{}@iebc.test", username),
                    "password": USER_PASSWORD,
                    "fullName": format!("{} user", role),
                    "role": role,
                    "jurisdiction": jurisdiction
                }),
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "register failed: {}",
            response.text()
        );
        self.login(username, USER_PASSWORD).await
    }

    /// 创建一个职位并返回 ID
    pub async fn create_position(&self, token: &str, code: &str, level: &str) -> String {
        let response = self
            .post(
                "/api/positions",
                token,
                json!({
                    "title": format!("{} seat", code),
                    "code": code,
                    "level": level,
                    "maxCandidates": 5
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        response.json()["position"]["id"].as_str().unwrap().to_string()
    }

    /// 创建县级候选人并返回 ID
    pub async fn create_candidate(
        &self,
        token: &str,
        position_id: &str,
        national_id: &str,
    ) -> TestResponse {
        self.post(
            "/api/candidates",
            token,
            candidate_body(position_id, national_id),
        )
        .await
    }

    /// 创建并批准一个候选人
    pub async fn approved_candidate(
        &self,
        token: &str,
        position_id: &str,
        national_id: &str,
    ) -> String {
        let response = self.create_candidate(token, position_id, national_id).await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        let id = response.json()["candidate"]["id"].as_str().unwrap().to_string();

        let response = self
            .put(&format!("/api/candidates/{}/approve", id), token, json!({}))
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text());
        id
    }
}

pub fn county(name: &str) -> Value {
    json!({ "level": "county", "county": name })
}

pub fn national() -> Value {
    json!({ "level": "national" })
}

pub fn candidate_body(position_id: &str, national_id: &str) -> Value {
    json!({
        "firstName": "Amina",
        "lastName": "Otieno",
        "nationalId": national_id,
        "dateOfBirth": "1980-04-12",
        "party": "Unity Alliance",
        "positionId": position_id,
        "jurisdiction": county("Nairobi"),
        "phone": "0712345678"
    })
}

pub fn voter_body(national_id: &str) -> Value {
    json!({
        "nationalId": national_id,
        "firstName": "Peter",
        "lastName": "Kamau",
        "dateOfBirth": "1990-01-15",
        "county": "Nairobi",
        "constituency": "Westlands",
        "ward": "Parklands",
        "pollingStation": "Parklands Primary"
    })
}
