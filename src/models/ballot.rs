//! Ballot models and the approval workflow state machine

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::permissions::Permission;
use crate::error::{AppError, FieldError};
use crate::models::jurisdiction::Jurisdiction;
use crate::validation::ValidationReport;

/// 选票审批状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "workflow_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Submitted,
    UnderReview,
    LegalAudit,
    Approved,
    Locked,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Draft => "draft",
            WorkflowStatus::Submitted => "submitted",
            WorkflowStatus::UnderReview => "under_review",
            WorkflowStatus::LegalAudit => "legal_audit",
            WorkflowStatus::Approved => "approved",
            WorkflowStatus::Locked => "locked",
        }
    }
}

/// 工作流动作，对应 `PUT /api/ballots/{id}/<action>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BallotAction {
    Submit,
    Review,
    LegalAudit,
    Approve,
    Reject,
    Lock,
}

impl BallotAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BallotAction::Submit => "submit",
            BallotAction::Review => "review",
            BallotAction::LegalAudit => "legal-audit",
            BallotAction::Approve => "approve",
            BallotAction::Reject => "reject",
            BallotAction::Lock => "lock",
        }
    }

    /// 状态转换表；`None` 表示该状态下不允许此动作
    pub fn target(&self, from: WorkflowStatus) -> Option<WorkflowStatus> {
        use WorkflowStatus::*;
        match (self, from) {
            (BallotAction::Submit, Draft) => Some(Submitted),
            (BallotAction::Review, Submitted) => Some(UnderReview),
            (BallotAction::LegalAudit, UnderReview) => Some(LegalAudit),
            (BallotAction::Approve, LegalAudit) => Some(Approved),
            (BallotAction::Reject, Submitted | UnderReview | LegalAudit) => Some(Draft),
            (BallotAction::Lock, Approved) => Some(Locked),
            _ => None,
        }
    }

    /// 持有其中任意一个权限即可执行
    pub fn required_permissions(&self) -> &'static [Permission] {
        match self {
            BallotAction::Submit => &[Permission::BallotsWrite],
            BallotAction::Review | BallotAction::LegalAudit => &[Permission::BallotsReview],
            BallotAction::Approve => &[Permission::BallotsApprove],
            BallotAction::Reject => &[Permission::BallotsReview, Permission::BallotsApprove],
            BallotAction::Lock => &[Permission::BallotsLock],
        }
    }
}

/// One step recorded in `workflow.history`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    pub action: BallotAction,
    pub from: WorkflowStatus,
    pub to: WorkflowStatus,
    pub performed_by: Uuid,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BallotWorkflow {
    #[sqlx(rename = "workflow_status")]
    pub status: WorkflowStatus,
    #[sqlx(rename = "workflow_history", json)]
    pub history: Vec<WorkflowEvent>,
}

impl Default for BallotWorkflow {
    fn default() -> Self {
        Self {
            status: WorkflowStatus::Draft,
            history: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotEntry {
    pub candidate_id: Uuid,
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub id: Uuid,
    pub title: String,
    pub position_id: Uuid,
    pub election_date: NaiveDate,
    #[sqlx(flatten)]
    pub jurisdiction: Jurisdiction,
    #[sqlx(json)]
    pub candidates: Vec<BallotEntry>,
    #[sqlx(flatten)]
    pub workflow: BallotWorkflow,
    pub is_locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<Uuid>,
    /// 乐观锁版本号，每次写入加一
    pub version: i32,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ballot {
    pub fn is_draft(&self) -> bool {
        self.workflow.status == WorkflowStatus::Draft
    }

    /// 执行一次状态转换并写入历史；非法转换不修改选票
    pub fn apply_transition(
        &mut self,
        action: BallotAction,
        actor: Uuid,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<WorkflowEvent, AppError> {
        let from = self.workflow.status;
        let to = action.target(from).ok_or_else(|| {
            AppError::bad_request(format!(
                "Cannot {} a ballot in status {}",
                action.as_str(),
                from.as_str()
            ))
        })?;

        if action == BallotAction::Submit && self.candidates.is_empty() {
            return Err(AppError::bad_request(
                "A ballot needs at least one candidate before submission",
            ));
        }

        let event = WorkflowEvent {
            action,
            from,
            to,
            performed_by: actor,
            comment,
            timestamp: now,
        };

        self.workflow.status = to;
        self.workflow.history.push(event.clone());
        if to == WorkflowStatus::Locked {
            self.is_locked = true;
            self.locked_at = Some(now);
            self.locked_by = Some(actor);
        }
        self.updated_at = now;

        Ok(event)
    }
}

/// 候选人编号必须为正且不重复，同一候选人不能出现两次
pub fn entry_errors(entries: &[BallotEntry]) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let mut seen_candidates = HashSet::new();
    let mut seen_orders = HashSet::new();

    for (index, entry) in entries.iter().enumerate() {
        if entry.order < 1 {
            errors.push(FieldError::new(
                format!("candidates[{}].order", index),
                "must be a positive number",
            ));
        } else if !seen_orders.insert(entry.order) {
            errors.push(FieldError::new(
                format!("candidates[{}].order", index),
                "duplicate ballot order",
            ));
        }
        if !seen_candidates.insert(entry.candidate_id) {
            errors.push(FieldError::new(
                format!("candidates[{}].candidateId", index),
                "candidate listed more than once",
            ));
        }
    }

    errors
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBallotRequest {
    #[validate(length(min = 3, max = 200))]
    pub title: String,
    pub position_id: Uuid,
    pub election_date: NaiveDate,
    #[validate(nested)]
    pub jurisdiction: Jurisdiction,
    #[serde(default)]
    pub candidates: Vec<BallotEntry>,
}

impl CreateBallotRequest {
    pub fn validate_request(&self) -> ValidationReport {
        let mut report = ValidationReport::from_validator(self.validate());
        report.extend(self.jurisdiction.completeness_errors("jurisdiction"));
        report.extend(entry_errors(&self.candidates));
        report
    }
}

/// Draft edit; `version` must match the stored ballot
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBallotRequest {
    pub version: i32,
    #[validate(length(min = 3, max = 200))]
    pub title: Option<String>,
    pub election_date: Option<NaiveDate>,
    pub candidates: Option<Vec<BallotEntry>>,
}

impl UpdateBallotRequest {
    pub fn validate_request(&self) -> ValidationReport {
        let mut report = ValidationReport::from_validator(self.validate());
        if let Some(entries) = &self.candidates {
            report.extend(entry_errors(entries));
        }
        report
    }

    pub fn apply(&self, ballot: &mut Ballot) {
        if let Some(title) = &self.title {
            ballot.title = title.trim().to_string();
        }
        if let Some(date) = self.election_date {
            ballot.election_date = date;
        }
        if let Some(entries) = &self.candidates {
            ballot.candidates = entries.clone();
        }
    }
}

/// 工作流动作的可选请求体
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct TransitionRequest {
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotFilters {
    pub status: Option<WorkflowStatus>,
    pub position_id: Option<Uuid>,
    pub is_locked: Option<bool>,
    #[serde(skip)]
    pub scope: Option<Jurisdiction>,
}

impl BallotFilters {
    pub fn matches(&self, ballot: &Ballot) -> bool {
        self.status.map_or(true, |s| ballot.workflow.status == s)
            && self.position_id.map_or(true, |p| ballot.position_id == p)
            && self.is_locked.map_or(true, |l| ballot.is_locked == l)
            && self
                .scope
                .as_ref()
                .map_or(true, |scope| scope.covers(&ballot.jurisdiction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [WorkflowStatus; 6] = [
        WorkflowStatus::Draft,
        WorkflowStatus::Submitted,
        WorkflowStatus::UnderReview,
        WorkflowStatus::LegalAudit,
        WorkflowStatus::Approved,
        WorkflowStatus::Locked,
    ];

    fn ballot(status: WorkflowStatus) -> Ballot {
        let now = Utc::now();
        Ballot {
            id: Uuid::new_v4(),
            title: "Governor - Nairobi".to_string(),
            position_id: Uuid::new_v4(),
            election_date: NaiveDate::from_ymd_opt(2027, 8, 10).unwrap(),
            jurisdiction: Jurisdiction::county("Nairobi"),
            candidates: vec![BallotEntry {
                candidate_id: Uuid::new_v4(),
                order: 1,
            }],
            workflow: BallotWorkflow {
                status,
                history: Vec::new(),
            },
            is_locked: false,
            locked_at: None,
            locked_by: None,
            version: 1,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_happy_path_to_locked() {
        let actor = Uuid::new_v4();
        let mut b = ballot(WorkflowStatus::Draft);
        for action in [
            BallotAction::Submit,
            BallotAction::Review,
            BallotAction::LegalAudit,
            BallotAction::Approve,
            BallotAction::Lock,
        ] {
            b.apply_transition(action, actor, None, Utc::now()).unwrap();
        }

        assert_eq!(b.workflow.status, WorkflowStatus::Locked);
        assert_eq!(b.workflow.history.len(), 5);
        assert!(b.is_locked);
        assert_eq!(b.locked_by, Some(actor));
        assert!(b.locked_at.is_some());
    }

    #[test]
    fn test_lock_only_from_approved() {
        for status in ALL_STATUSES {
            let mut b = ballot(status);
            let result = b.apply_transition(BallotAction::Lock, Uuid::new_v4(), None, Utc::now());
            if status == WorkflowStatus::Approved {
                assert!(result.is_ok());
            } else {
                assert!(matches!(result, Err(AppError::BadRequest(_))));
                assert!(!b.is_locked);
                assert_eq!(b.workflow.status, status);
                assert!(b.workflow.history.is_empty());
            }
        }
    }

    #[test]
    fn test_reject_returns_to_draft() {
        for status in [
            WorkflowStatus::Submitted,
            WorkflowStatus::UnderReview,
            WorkflowStatus::LegalAudit,
        ] {
            assert_eq!(BallotAction::Reject.target(status), Some(WorkflowStatus::Draft));
        }
        assert_eq!(BallotAction::Reject.target(WorkflowStatus::Approved), None);
        assert_eq!(BallotAction::Reject.target(WorkflowStatus::Draft), None);
    }

    #[test]
    fn test_submit_requires_candidates() {
        let mut b = ballot(WorkflowStatus::Draft);
        b.candidates.clear();
        assert!(b
            .apply_transition(BallotAction::Submit, Uuid::new_v4(), None, Utc::now())
            .is_err());
        assert!(b.is_draft());
    }

    #[test]
    fn test_entry_errors() {
        let id = Uuid::new_v4();
        let entries = vec![
            BallotEntry { candidate_id: id, order: 1 },
            BallotEntry { candidate_id: id, order: 1 },
            BallotEntry { candidate_id: Uuid::new_v4(), order: 0 },
        ];
        let fields: Vec<String> = entry_errors(&entries).into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["candidates[1].order", "candidates[1].candidateId", "candidates[2].order"]
        );
    }

    #[test]
    fn test_update_trims_title_like_create() {
        let mut b = ballot(WorkflowStatus::Draft);
        let req = UpdateBallotRequest {
            version: 1,
            title: Some("  Governor - Mombasa  ".to_string()),
            election_date: None,
            candidates: None,
        };
        req.apply(&mut b);
        assert_eq!(b.title, "Governor - Mombasa");
        assert_eq!(b.candidates.len(), 1);
    }

    #[test]
    fn test_workflow_serializes_nested() {
        let json = serde_json::to_value(ballot(WorkflowStatus::UnderReview)).unwrap();
        assert_eq!(json["workflow"]["status"], "under_review");
        assert_eq!(json["isLocked"], false);
    }
}
