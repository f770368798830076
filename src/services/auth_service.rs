//! 认证服务：登录、注册、当前用户、初始管理员

use std::sync::Arc;

use chrono::Utc;
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::{
    auth::{jwt::JwtService, password::PasswordHasher, AuthContext, Permission},
    config::{BootstrapConfig, SecurityConfig},
    error::{AppError, Result},
    models::{
        audit::{AuditAction, AuditChanges, EntityType, RequestInfo},
        jurisdiction::Jurisdiction,
        user::{LoginRequest, LoginResponse, RegisterUserRequest, User, UserResponse, UserRole},
    },
    repository::UserRepository,
    services::audit_service::{AuditEvent, AuditService},
};

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    jwt: Arc<JwtService>,
    hasher: PasswordHasher,
    security: SecurityConfig,
    audit: Arc<AuditService>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        jwt: Arc<JwtService>,
        security: SecurityConfig,
        audit: Arc<AuditService>,
    ) -> Result<Self> {
        Ok(Self {
            users,
            jwt,
            hasher: PasswordHasher::from_config(&security)?,
            security,
            audit,
        })
    }

    /// 用户登录（用户名或邮箱）
    pub async fn login(&self, req: LoginRequest, info: &RequestInfo) -> Result<LoginResponse> {
        let user = match self.users.find_by_login(req.username.trim()).await? {
            Some(user) => user,
            None => {
                tracing::info!(login = %req.username, "Login failed: unknown user");
                return Err(AppError::Unauthorized);
            }
        };

        if let Err(e) = self.hasher.verify(&req.password, &user.password_hash) {
            tracing::info!(user_id = %user.id, "Login failed: wrong password");
            return Err(e);
        }

        // 凭证正确但账户被停用
        if !user.is_active {
            tracing::info!(user_id = %user.id, "Login refused: account inactive");
            return Err(AppError::Forbidden);
        }

        let token = self.jwt.generate_token(&user)?;
        let now = Utc::now();
        self.users.update_last_login(user.id, Some(now)).await?;

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::UserLogin,
                    EntityType::User,
                    Some(user.id),
                    user.id,
                    format!("User {} logged in", user.username),
                )
                .request_info(info),
                self.users.update_last_login(user.id, user.last_login),
            )
            .await?;

        tracing::info!(user_id = %user.id, username = %user.username, "User logged in");

        let mut user = user;
        user.last_login = Some(now);
        Ok(LoginResponse {
            token,
            token_type: "Bearer",
            expires_in: self.jwt.expires_in_secs(),
            user: UserResponse::from(user),
        })
    }

    /// 创建用户（需要 `users:manage`）
    pub async fn register(
        &self,
        ctx: &AuthContext,
        req: RegisterUserRequest,
        info: &RequestInfo,
    ) -> Result<UserResponse> {
        ctx.require(Permission::UsersManage)?;

        let mut report = req.validate_request();
        PasswordHasher::check_policy(&mut report, &req.password, &self.security);
        report.into_result()?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: req.username.trim().to_string(),
            email: req.email.trim().to_lowercase(),
            password_hash: self.hasher.hash(&req.password)?,
            full_name: req.full_name.trim().to_string(),
            role: req.role,
            jurisdiction: req.jurisdiction,
            permissions: req.permissions,
            is_active: true,
            last_login: None,
            created_by: Some(ctx.user_id),
            created_at: now,
            updated_at: now,
        };
        let user = self.users.insert(&user).await?;

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::UserRegister,
                    EntityType::User,
                    Some(user.id),
                    ctx.user_id,
                    format!("User {} registered with role {}", user.username, user.role.as_str()),
                )
                .changes(AuditChanges::created(&UserResponse::from(user.clone())))
                .request_info(info),
                self.users.delete(user.id),
            )
            .await?;

        tracing::info!(user_id = %user.id, role = user.role.as_str(), created_by = %ctx.user_id, "User registered");
        Ok(UserResponse::from(user))
    }

    pub async fn me(&self, ctx: &AuthContext) -> Result<UserResponse> {
        let user = self
            .users
            .find_by_id(ctx.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        Ok(UserResponse::from(user))
    }

    /// 配置了初始管理员且该用户不存在时创建
    pub async fn ensure_bootstrap_admin(&self, bootstrap: &BootstrapConfig) -> Result<Option<User>> {
        let (Some(username), Some(password)) = (&bootstrap.admin_username, &bootstrap.admin_password)
        else {
            return Ok(None);
        };

        if self.users.find_by_login(username).await?.is_some() {
            tracing::debug!(username = %username, "Bootstrap admin already present");
            return Ok(None);
        }

        let email = bootstrap
            .admin_email
            .clone()
            .unwrap_or_else(|| format!("{}@localhost", username));
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: username.clone(),
            email,
            password_hash: self.hasher.hash(password.expose_secret())?,
            full_name: "System Administrator".to_string(),
            role: UserRole::SystemAdmin,
            jurisdiction: Jurisdiction::national(),
            permissions: Vec::new(),
            is_active: true,
            last_login: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        };
        let user = self.users.insert(&user).await?;

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::UserRegister,
                    EntityType::User,
                    Some(user.id),
                    user.id,
                    format!("Bootstrap administrator {} created", user.username),
                )
                .changes(AuditChanges::created(&UserResponse::from(user.clone()))),
                self.users.delete(user.id),
            )
            .await?;

        tracing::warn!(user_id = %user.id, username = %user.username, "Bootstrap administrator created");
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{AuditRepository, MemoryStore};
    use crate::services::test_support::{context, security, AlwaysConflicting};
    use secrecy::Secret;

    fn service(store: Arc<MemoryStore>) -> AuthService {
        let audit = Arc::new(AuditService::new(store.clone(), 3));
        let jwt = Arc::new(JwtService::from_config(&security()).unwrap());
        AuthService::new(store, jwt, security(), audit).unwrap()
    }

    fn bootstrap() -> BootstrapConfig {
        BootstrapConfig {
            admin_username: Some("admin".to_string()),
            admin_email: None,
            admin_password: Some(Secret::new("Admin12345".to_string())),
        }
    }

    fn register_request(username: &str, password: &str) -> RegisterUserRequest {
        serde_json::from_value(serde_json::json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": password,
            "fullName": "Nakuru Admin",
            "role": "regional_admin",
            "jurisdiction": {"level": "county", "county": "Nakuru"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_then_login() {
        let store = Arc::new(MemoryStore::new());
        let auth = service(store.clone());

        assert!(auth.ensure_bootstrap_admin(&bootstrap()).await.unwrap().is_some());
        assert!(auth.ensure_bootstrap_admin(&bootstrap()).await.unwrap().is_none());

        let login = LoginRequest {
            username: "ADMIN".to_string(),
            password: "Admin12345".to_string(),
        };
        let response = auth.login(login, &RequestInfo::default()).await.unwrap();
        assert_eq!(response.user.role, UserRole::SystemAdmin);
        assert!(response.user.last_login.is_some());
        assert_eq!(response.expires_in, 3600);

        // 初始化 + 登录各一条
        let chain = store.chain().await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].action, AuditAction::UserLogin);
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let store = Arc::new(MemoryStore::new());
        let auth = service(store);
        auth.ensure_bootstrap_admin(&bootstrap()).await.unwrap();

        let login = LoginRequest {
            username: "admin".to_string(),
            password: "Wrong12345".to_string(),
        };
        let result = auth.login(login, &RequestInfo::default()).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_register_enforces_policy_and_permission() {
        let store = Arc::new(MemoryStore::new());
        let auth = service(store);
        let admin = context(UserRole::SystemAdmin, Jurisdiction::national());
        let observer = context(UserRole::Observer, Jurisdiction::national());

        let result = auth
            .register(&observer, register_request("nakuru", "Strong123"), &RequestInfo::default())
            .await;
        assert!(matches!(result, Err(AppError::Forbidden)));

        let result = auth
            .register(&admin, register_request("nakuru", "weak"), &RequestInfo::default())
            .await;
        match result {
            Err(AppError::Validation(errors)) => {
                assert!(errors.iter().all(|e| e.field == "password"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let created = auth
            .register(&admin, register_request("nakuru", "Strong123"), &RequestInfo::default())
            .await
            .unwrap();
        assert_eq!(created.jurisdiction, Jurisdiction::county("Nakuru"));

        let duplicate = auth
            .register(&admin, register_request("NAKURU", "Strong123"), &RequestInfo::default())
            .await;
        assert!(matches!(duplicate, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_failed_audit_removes_registered_user() {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(AuditService::new(Arc::new(AlwaysConflicting::new(store.clone())), 2));
        let jwt = Arc::new(JwtService::from_config(&security()).unwrap());
        let auth = AuthService::new(store.clone(), jwt, security(), audit).unwrap();
        let admin = context(UserRole::SystemAdmin, Jurisdiction::national());

        let result = auth
            .register(&admin, register_request("kisumu", "Strong123"), &RequestInfo::default())
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(store.find_by_login("kisumu").await.unwrap().is_none());

        let bootstrap = auth.ensure_bootstrap_admin(&bootstrap()).await;
        assert!(matches!(bootstrap, Err(AppError::Conflict(_))));
        assert_eq!(UserRepository::count(store.as_ref()).await.unwrap(), 0);
    }
}
