//! 数据访问层
//!
//! 每个聚合一个 trait，两套实现：PostgreSQL（sqlx）与内存存储。
//! `database.url = memory://` 时使用内存存储（演示与测试）。

pub mod audit_repo;
pub mod ballot_repo;
pub mod candidate_repo;
pub mod memory;
pub mod position_repo;
pub mod user_repo;
pub mod voter_repo;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::{self, HealthStatus};
use crate::error::Result;
use crate::models::{
    audit::{AuditFilters, AuditLog, AuditSummary, EntityType, NewAuditEntry},
    ballot::{Ballot, BallotFilters},
    candidate::{Candidate, CandidateFilters},
    jurisdiction::{Jurisdiction, JurisdictionLevel},
    position::{Position, PositionFilters},
    user::User,
    voter::{Voter, VoterFilters, VoterStats},
};

pub use audit_repo::PgAuditRepository;
pub use ballot_repo::PgBallotRepository;
pub use candidate_repo::PgCandidateRepository;
pub use memory::MemoryStore;
pub use position_repo::PgPositionRepository;
pub use user_repo::PgUserRepository;
pub use voter_repo::PgVoterRepository;

#[async_trait]
pub trait CandidateRepository: Send + Sync {
    /// 身份证号重复时返回 400
    async fn insert(&self, candidate: &Candidate) -> Result<Candidate>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Candidate>>;
    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<Candidate>>;
    async fn list(&self, filters: &CandidateFilters, limit: i64, offset: i64)
        -> Result<Vec<Candidate>>;
    async fn count(&self, filters: &CandidateFilters) -> Result<i64>;
    async fn update(&self, candidate: &Candidate) -> Result<Option<Candidate>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    async fn count_by_position(&self, position_id: Uuid) -> Result<i64>;
}

#[async_trait]
pub trait BallotRepository: Send + Sync {
    async fn insert(&self, ballot: &Ballot) -> Result<Ballot>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Ballot>>;
    async fn list(&self, filters: &BallotFilters, limit: i64, offset: i64) -> Result<Vec<Ballot>>;
    async fn count(&self, filters: &BallotFilters) -> Result<i64>;
    /// 仅当存储中的版本等于 `expected_version` 时写入，写入后版本加一；
    /// 版本不匹配或记录不存在时返回 `None`
    async fn update(&self, ballot: &Ballot, expected_version: i32) -> Result<Option<Ballot>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    async fn references_candidate(&self, candidate_id: Uuid) -> Result<bool>;
    async fn count_by_position(&self, position_id: Uuid) -> Result<i64>;
}

#[async_trait]
pub trait PositionRepository: Send + Sync {
    /// 职位代码重复时返回 400
    async fn insert(&self, position: &Position) -> Result<Position>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Position>>;
    async fn find_by_code(&self, code: &str) -> Result<Option<Position>>;
    async fn list(&self, filters: &PositionFilters) -> Result<Vec<Position>>;
    async fn update(&self, position: &Position) -> Result<Option<Position>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 用户名或邮箱重复时返回 400
    async fn insert(&self, user: &User) -> Result<User>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    /// 按用户名或邮箱查找（不区分大小写）
    async fn find_by_login(&self, login: &str) -> Result<Option<User>>;
    async fn update_last_login(&self, id: Uuid, at: Option<DateTime<Utc>>) -> Result<()>;
    async fn count(&self) -> Result<i64>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait VoterRepository: Send + Sync {
    /// 身份证号或登记号重复时返回 400
    async fn insert(&self, voter: &Voter) -> Result<Voter>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Voter>>;
    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<Voter>>;
    async fn list(&self, filters: &VoterFilters, limit: i64, offset: i64) -> Result<Vec<Voter>>;
    async fn count(&self, filters: &VoterFilters) -> Result<i64>;
    async fn update(&self, voter: &Voter) -> Result<Option<Voter>>;
    /// 仅当选民已核验且尚未投票时记录投票；条件不满足或记录不存在时返回 `None`
    async fn mark_voted(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Voter>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    async fn stats(&self, filters: &VoterFilters) -> Result<VoterStats>;
}

/// 条件追加的结果
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Appended(AuditLog),
    /// 链头已被其他写入者推进
    Conflict,
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// 当前链头：按 (timestamp, sequence) 最新的一条
    async fn head(&self) -> Result<Option<AuditLog>>;
    /// 仅当链头仍是 `expected_head` 时插入
    async fn append(&self, entry: &NewAuditEntry, expected_head: Option<Uuid>)
        -> Result<AppendOutcome>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<AuditLog>>;
    /// 最新在前
    async fn query(&self, filters: &AuditFilters, limit: i64, offset: i64)
        -> Result<Vec<AuditLog>>;
    async fn count(&self, filters: &AuditFilters) -> Result<i64>;
    /// 某个实体的审计轨迹，最早在前
    async fn trail(&self, entity_type: EntityType, entity_id: Uuid) -> Result<Vec<AuditLog>>;
    /// 整条链，最早在前
    async fn chain(&self) -> Result<Vec<AuditLog>>;
    /// 标记篡改，返回新标记的条数
    async fn mark_tampered(&self, ids: &[Uuid]) -> Result<u64>;
    async fn summarize(&self, filters: &AuditFilters) -> Result<AuditSummary>;
}

#[derive(Clone)]
pub enum Backend {
    Postgres(PgPool),
    Memory,
}

/// 所有仓储的集合，注入到 `AppState`
#[derive(Clone)]
pub struct Repositories {
    pub candidates: Arc<dyn CandidateRepository>,
    pub ballots: Arc<dyn BallotRepository>,
    pub positions: Arc<dyn PositionRepository>,
    pub users: Arc<dyn UserRepository>,
    pub voters: Arc<dyn VoterRepository>,
    pub audit: Arc<dyn AuditRepository>,
    backend: Backend,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            candidates: Arc::new(PgCandidateRepository::new(pool.clone())),
            ballots: Arc::new(PgBallotRepository::new(pool.clone())),
            positions: Arc::new(PgPositionRepository::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool.clone())),
            voters: Arc::new(PgVoterRepository::new(pool.clone())),
            audit: Arc::new(PgAuditRepository::new(pool.clone())),
            backend: Backend::Postgres(pool),
        }
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::new()))
    }

    pub fn from_store(store: Arc<MemoryStore>) -> Self {
        Self {
            candidates: store.clone(),
            ballots: store.clone(),
            positions: store.clone(),
            users: store.clone(),
            voters: store.clone(),
            audit: store,
            backend: Backend::Memory,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Postgres(_) => "postgres",
            Backend::Memory => "memory",
        }
    }

    pub fn pool(&self) -> Option<&PgPool> {
        match &self.backend {
            Backend::Postgres(pool) => Some(pool),
            Backend::Memory => None,
        }
    }

    pub async fn health_check(&self) -> HealthStatus {
        match &self.backend {
            Backend::Postgres(pool) => db::health_check(pool).await,
            Backend::Memory => HealthStatus::Healthy,
        }
    }
}

/// 追加辖区过滤条件
///
/// `level_column` 为空时表示表中记录都在 ward 一级（选民）。
pub(crate) fn push_scope(
    qb: &mut QueryBuilder<'_, Postgres>,
    scope: &Jurisdiction,
    level_column: Option<&str>,
) {
    if scope.is_national() {
        return;
    }
    if let Some(column) = level_column {
        qb.push(format!(" AND {} >= ", column)).push_bind(scope.level);
    }

    let names = [
        (JurisdictionLevel::County, "county", &scope.county),
        (JurisdictionLevel::Constituency, "constituency", &scope.constituency),
        (JurisdictionLevel::Ward, "ward", &scope.ward),
    ];
    for (level, column, value) in names {
        if scope.level >= level {
            qb.push(format!(" AND LOWER({}) = LOWER(", column))
                .push_bind(value.clone())
                .push(")");
        }
    }
}
