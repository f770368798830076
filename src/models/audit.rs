//! Audit domain models

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 审计动作，每个写操作对应一个
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_action", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    // 用户
    UserLogin,
    UserRegister,

    // 候选人
    CreateCandidate,
    UpdateCandidate,
    DeleteCandidate,
    ApproveCandidate,
    RejectCandidate,

    // 选票
    CreateBallot,
    UpdateBallot,
    DeleteBallot,
    SubmitBallot,
    ReviewBallot,
    LegalAuditBallot,
    ApproveBallot,
    RejectBallot,
    LockBallot,

    // 职位
    CreatePosition,
    UpdatePosition,
    DeletePosition,

    // 选民
    RegisterVoter,
    UpdateVoter,
    VerifyVoter,
    SuspendVoter,
    RecordVote,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserLogin => "USER_LOGIN",
            AuditAction::UserRegister => "USER_REGISTER",

            AuditAction::CreateCandidate => "CREATE_CANDIDATE",
            AuditAction::UpdateCandidate => "UPDATE_CANDIDATE",
            AuditAction::DeleteCandidate => "DELETE_CANDIDATE",
            AuditAction::ApproveCandidate => "APPROVE_CANDIDATE",
            AuditAction::RejectCandidate => "REJECT_CANDIDATE",

            AuditAction::CreateBallot => "CREATE_BALLOT",
            AuditAction::UpdateBallot => "UPDATE_BALLOT",
            AuditAction::DeleteBallot => "DELETE_BALLOT",
            AuditAction::SubmitBallot => "SUBMIT_BALLOT",
            AuditAction::ReviewBallot => "REVIEW_BALLOT",
            AuditAction::LegalAuditBallot => "LEGAL_AUDIT_BALLOT",
            AuditAction::ApproveBallot => "APPROVE_BALLOT",
            AuditAction::RejectBallot => "REJECT_BALLOT",
            AuditAction::LockBallot => "LOCK_BALLOT",

            AuditAction::CreatePosition => "CREATE_POSITION",
            AuditAction::UpdatePosition => "UPDATE_POSITION",
            AuditAction::DeletePosition => "DELETE_POSITION",

            AuditAction::RegisterVoter => "REGISTER_VOTER",
            AuditAction::UpdateVoter => "UPDATE_VOTER",
            AuditAction::VerifyVoter => "VERIFY_VOTER",
            AuditAction::SuspendVoter => "SUSPEND_VOTER",
            AuditAction::RecordVote => "RECORD_VOTE",
        }
    }

    pub fn default_category(&self) -> AuditCategory {
        use AuditAction::*;
        match self {
            UserLogin | UserRegister => AuditCategory::Authentication,
            CreateCandidate | UpdateCandidate | DeleteCandidate | ApproveCandidate
            | RejectCandidate => AuditCategory::CandidateManagement,
            CreateBallot | UpdateBallot | DeleteBallot | SubmitBallot | ReviewBallot
            | LegalAuditBallot | ApproveBallot | RejectBallot | LockBallot => {
                AuditCategory::BallotManagement
            }
            CreatePosition | UpdatePosition | DeletePosition => AuditCategory::PositionManagement,
            RegisterVoter | UpdateVoter | VerifyVoter | SuspendVoter | RecordVote => {
                AuditCategory::VoterManagement
            }
        }
    }

    pub fn default_severity(&self) -> Severity {
        use AuditAction::*;
        match self {
            UserLogin | RegisterVoter | UpdateVoter => Severity::Low,
            UserRegister | CreateCandidate | UpdateCandidate | CreateBallot | UpdateBallot
            | SubmitBallot | ReviewBallot | LegalAuditBallot | RejectBallot | CreatePosition
            | UpdatePosition | VerifyVoter | RecordVote => Severity::Medium,
            DeleteCandidate | ApproveCandidate | RejectCandidate | DeleteBallot | ApproveBallot
            | DeletePosition | SuspendVoter => Severity::High,
            LockBallot => Severity::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "entity_type")]
pub enum EntityType {
    Candidate,
    Ballot,
    Position,
    User,
    Voter,
    System,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Candidate => "Candidate",
            EntityType::Ballot => "Ballot",
            EntityType::Position => "Position",
            EntityType::User => "User",
            EntityType::Voter => "Voter",
            EntityType::System => "System",
        }
    }
}

/// 路径参数不区分大小写（`candidate` / `Candidate`）
impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            EntityType::Candidate,
            EntityType::Ballot,
            EntityType::Position,
            EntityType::User,
            EntityType::Voter,
            EntityType::System,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown entity type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_severity", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Authentication,
    CandidateManagement,
    BallotManagement,
    PositionManagement,
    VoterManagement,
    System,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Authentication => "authentication",
            AuditCategory::CandidateManagement => "candidate_management",
            AuditCategory::BallotManagement => "ballot_management",
            AuditCategory::PositionManagement => "position_management",
            AuditCategory::VoterManagement => "voter_management",
            AuditCategory::System => "system",
        }
    }
}

/// Before/after snapshot of a mutation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditChanges {
    pub before: Option<Value>,
    pub after: Option<Value>,
    #[serde(default)]
    pub fields_changed: Vec<String>,
}

impl AuditChanges {
    pub fn created<T: Serialize>(after: &T) -> Self {
        Self {
            before: None,
            after: serde_json::to_value(after).ok(),
            fields_changed: Vec::new(),
        }
    }

    pub fn deleted<T: Serialize>(before: &T) -> Self {
        Self {
            before: serde_json::to_value(before).ok(),
            after: None,
            fields_changed: Vec::new(),
        }
    }

    /// 比较两个快照的顶层字段
    pub fn diff<T: Serialize>(before: &T, after: &T) -> Self {
        let before = serde_json::to_value(before).ok();
        let after = serde_json::to_value(after).ok();

        let mut fields_changed = Vec::new();
        if let (Some(Value::Object(b)), Some(Value::Object(a))) = (&before, &after) {
            for (key, value) in a {
                if key == "updatedAt" {
                    continue;
                }
                if b.get(key) != Some(value) {
                    fields_changed.push(key.clone());
                }
            }
            for key in b.keys() {
                if !a.contains_key(key) {
                    fields_changed.push(key.clone());
                }
            }
            fields_changed.sort();
        }

        Self {
            before,
            after,
            fields_changed,
        }
    }
}

/// 发起请求的客户端信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
}

/// Entry ready to be appended; hash and link already computed
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Option<Uuid>,
    pub performed_by: Uuid,
    pub description: String,
    pub details: Value,
    pub changes: AuditChanges,
    pub request_info: RequestInfo,
    pub severity: Severity,
    pub category: AuditCategory,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
    pub previous_hash: Option<String>,
}

/// Audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: Uuid,
    /// 插入顺序，时间戳相同时用于排序
    pub sequence: i64,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Option<Uuid>,
    pub performed_by: Uuid,
    pub description: String,
    pub details: Value,
    #[sqlx(json)]
    pub changes: AuditChanges,
    #[sqlx(json)]
    pub request_info: RequestInfo,
    pub severity: Severity,
    pub category: AuditCategory,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
    pub previous_hash: Option<String>,
    pub is_tampered: bool,
}

impl AuditLog {
    pub fn from_new(entry: NewAuditEntry, sequence: i64) -> Self {
        Self {
            id: entry.id,
            sequence,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            performed_by: entry.performed_by,
            description: entry.description,
            details: entry.details,
            changes: entry.changes,
            request_info: entry.request_info,
            severity: entry.severity,
            category: entry.category,
            timestamp: entry.timestamp,
            hash: entry.hash,
            previous_hash: entry.previous_hash,
            is_tampered: false,
        }
    }
}

/// Audit log filters (`GET /api/audit`, export, summary)
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilters {
    pub action: Option<AuditAction>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
    pub performed_by: Option<Uuid>,
    pub category: Option<AuditCategory>,
    pub severity: Option<Severity>,
    #[serde(default, deserialize_with = "deserialize_start_date")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_end_date")]
    pub end_date: Option<DateTime<Utc>>,
    pub is_tampered: Option<bool>,
}

impl AuditFilters {
    pub fn matches(&self, log: &AuditLog) -> bool {
        self.action.map_or(true, |a| log.action == a)
            && self.entity_type.map_or(true, |t| log.entity_type == t)
            && self.entity_id.map_or(true, |id| log.entity_id == Some(id))
            && self.performed_by.map_or(true, |p| log.performed_by == p)
            && self.category.map_or(true, |c| log.category == c)
            && self.severity.map_or(true, |s| log.severity == s)
            && self.start_date.map_or(true, |start| log.timestamp >= start)
            && self.end_date.map_or(true, |end| log.timestamp <= end)
            && self.is_tampered.map_or(true, |t| log.is_tampered == t)
    }
}

/// 接受 RFC3339 时间或 `YYYY-MM-DD`（当天开始）
fn deserialize_start_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    parse_date_param(deserializer, NaiveTime::MIN)
}

/// 接受 RFC3339 时间或 `YYYY-MM-DD`（当天结束）
fn deserialize_end_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    parse_date_param(deserializer, end_of_day)
}

fn parse_date_param<'de, D>(
    deserializer: D,
    time_of_day: NaiveTime,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| Some(date.and_time(time_of_day).and_utc()))
        .map_err(|_| serde::de::Error::custom(format!("invalid date: {}", raw)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformerCount {
    pub performed_by: Uuid,
    pub count: i64,
}

/// 审计汇总（`GET /api/audit/summary`）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub total: i64,
    pub by_action: BTreeMap<String, i64>,
    pub by_category: BTreeMap<String, i64>,
    pub by_severity: BTreeMap<String, i64>,
    pub top_performers: Vec<PerformerCount>,
    pub tampered_count: i64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl AuditSummary {
    pub const TOP_PERFORMERS: usize = 10;

    /// 从一组日志构建汇总
    pub fn from_logs<'a>(logs: impl IntoIterator<Item = &'a AuditLog>) -> Self {
        let mut summary = Self::default();
        let mut performers: BTreeMap<Uuid, i64> = BTreeMap::new();

        for log in logs {
            summary.total += 1;
            *summary.by_action.entry(log.action.as_str().to_string()).or_default() += 1;
            *summary.by_category.entry(log.category.as_str().to_string()).or_default() += 1;
            *summary.by_severity.entry(log.severity.as_str().to_string()).or_default() += 1;
            *performers.entry(log.performed_by).or_default() += 1;
            if log.is_tampered {
                summary.tampered_count += 1;
            }
        }

        let mut top: Vec<PerformerCount> = performers
            .into_iter()
            .map(|(performed_by, count)| PerformerCount {
                performed_by,
                count,
            })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then(a.performed_by.cmp(&b.performed_by)));
        top.truncate(Self::TOP_PERFORMERS);
        summary.top_performers = top;

        summary
    }
}

/// Result of verifying one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryVerification {
    pub id: Uuid,
    pub valid: bool,
    pub hash: String,
    pub computed_hash: String,
}

/// Two entries naming the same predecessor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainFork {
    /// `None` 表示多个创世条目
    pub previous_hash: Option<String>,
    pub entries: Vec<Uuid>,
}

/// An entry whose `previousHash` is not the hash of the entry before it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenLink {
    pub id: Uuid,
    pub expected_previous_hash: Option<String>,
    pub actual_previous_hash: Option<String>,
}

/// 全链校验结果（`GET /api/audit/verify-chain`）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    pub total: usize,
    pub valid: bool,
    pub tampered: Vec<Uuid>,
    pub broken_links: Vec<BrokenLink>,
    pub forks: Vec<ChainFork>,
    /// 本次新标记为篡改的条目数
    pub newly_flagged: usize,
}
