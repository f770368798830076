//! Business logic services layer
//!
//! 服务接收显式的 `AuthContext` 与 `RequestInfo`，负责权限、辖区、
//! 业务规则校验，并在每次写操作后追加审计日志。

pub mod audit_service;
pub mod auth_service;
pub mod ballot_service;
pub mod candidate_service;
pub mod position_service;
pub mod voter_service;

pub use audit_service::{AuditEvent, AuditService};
pub use auth_service::AuthService;
pub use ballot_service::BallotService;
pub use candidate_service::CandidateService;
pub use position_service::PositionService;
pub use voter_service::VoterService;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use secrecy::Secret;
    use uuid::Uuid;

    use crate::auth::AuthContext;
    use crate::config::SecurityConfig;
    use crate::error::Result;
    use crate::models::{
        audit::{AuditFilters, AuditLog, AuditSummary, EntityType, NewAuditEntry},
        jurisdiction::Jurisdiction,
        user::UserRole,
    };
    use crate::repository::{AppendOutcome, AuditRepository, MemoryStore};

    pub fn security() -> SecurityConfig {
        SecurityConfig {
            jwt_secret: Secret::new("unit-test-secret-with-at-least-32-chars".to_string()),
            jwt_expires_in: "1h".to_string(),
            password_min_length: 8,
            password_require_uppercase: true,
            password_require_digit: true,
            password_hash_memory_kib: 1024,
            password_hash_iterations: 1,
            trust_proxy: false,
            cors_allowed_origins: None,
        }
    }

    /// 以角色默认权限构造的调用者
    pub fn context(role: UserRole, jurisdiction: Jurisdiction) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            username: role.as_str().to_string(),
            role,
            permissions: role.default_permissions().to_vec(),
            jurisdiction,
        }
    }

    /// 审计链头总是被“别人”抢先推进，追加永远失败；读操作走内存存储
    pub struct AlwaysConflicting(Arc<MemoryStore>);

    impl AlwaysConflicting {
        pub fn new(store: Arc<MemoryStore>) -> Self {
            Self(store)
        }
    }

    #[async_trait]
    impl AuditRepository for AlwaysConflicting {
        async fn head(&self) -> Result<Option<AuditLog>> {
            self.0.head().await
        }
        async fn append(&self, _: &NewAuditEntry, _: Option<Uuid>) -> Result<AppendOutcome> {
            Ok(AppendOutcome::Conflict)
        }
        async fn find_by_id(&self, id: Uuid) -> Result<Option<AuditLog>> {
            AuditRepository::find_by_id(self.0.as_ref(), id).await
        }
        async fn query(&self, f: &AuditFilters, l: i64, o: i64) -> Result<Vec<AuditLog>> {
            self.0.query(f, l, o).await
        }
        async fn count(&self, f: &AuditFilters) -> Result<i64> {
            AuditRepository::count(self.0.as_ref(), f).await
        }
        async fn trail(&self, t: EntityType, id: Uuid) -> Result<Vec<AuditLog>> {
            self.0.trail(t, id).await
        }
        async fn chain(&self) -> Result<Vec<AuditLog>> {
            self.0.chain().await
        }
        async fn mark_tampered(&self, ids: &[Uuid]) -> Result<u64> {
            self.0.mark_tampered(ids).await
        }
        async fn summarize(&self, f: &AuditFilters) -> Result<AuditSummary> {
            self.0.summarize(f).await
        }
    }
}
