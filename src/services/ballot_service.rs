//! 选票管理与审批工作流
//!
//! 草稿编辑使用乐观锁（`version`），工作流转换见 [`BallotAction::target`]。

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{AuthContext, Permission},
    error::{AppError, Result},
    models::{
        audit::{AuditAction, AuditChanges, EntityType, RequestInfo},
        ballot::{
            Ballot, BallotAction, BallotEntry, BallotFilters, BallotWorkflow, CreateBallotRequest,
            TransitionRequest, UpdateBallotRequest,
        },
        candidate::CandidateStatus,
        jurisdiction::Jurisdiction,
        position::Position,
    },
    repository::{BallotRepository, CandidateRepository, PositionRepository},
    services::audit_service::{AuditEvent, AuditService},
    validation::ValidationReport,
};

fn audit_action(action: BallotAction) -> AuditAction {
    match action {
        BallotAction::Submit => AuditAction::SubmitBallot,
        BallotAction::Review => AuditAction::ReviewBallot,
        BallotAction::LegalAudit => AuditAction::LegalAuditBallot,
        BallotAction::Approve => AuditAction::ApproveBallot,
        BallotAction::Reject => AuditAction::RejectBallot,
        BallotAction::Lock => AuditAction::LockBallot,
    }
}

fn version_conflict() -> AppError {
    AppError::Conflict("Ballot was modified by someone else, reload and retry".to_string())
}

pub struct BallotService {
    ballots: Arc<dyn BallotRepository>,
    candidates: Arc<dyn CandidateRepository>,
    positions: Arc<dyn PositionRepository>,
    audit: Arc<AuditService>,
}

impl BallotService {
    pub fn new(
        ballots: Arc<dyn BallotRepository>,
        candidates: Arc<dyn CandidateRepository>,
        positions: Arc<dyn PositionRepository>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            ballots,
            candidates,
            positions,
            audit,
        }
    }

    pub async fn list(
        &self,
        ctx: &AuthContext,
        mut filters: BallotFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Ballot>, i64)> {
        ctx.require(Permission::BallotsRead)?;
        filters.scope = ctx.scope();

        let ballots = self.ballots.list(&filters, limit, offset).await?;
        let total = self.ballots.count(&filters).await?;
        Ok((ballots, total))
    }

    pub async fn get(&self, ctx: &AuthContext, id: Uuid) -> Result<Ballot> {
        ctx.require(Permission::BallotsRead)?;
        self.find_in_scope(ctx, id).await
    }

    pub async fn create(
        &self,
        ctx: &AuthContext,
        req: CreateBallotRequest,
        info: &RequestInfo,
    ) -> Result<Ballot> {
        ctx.require(Permission::BallotsWrite)?;

        let mut report = req.validate_request();
        let position = self.position_for(&mut report, req.position_id).await?;
        if let Some(position) = &position {
            check_level(&mut report, position, &req.jurisdiction);
            self.check_entries(&mut report, position, &req.candidates).await?;
        }
        report.into_result()?;
        ctx.require_scope(&req.jurisdiction)?;

        let now = Utc::now();
        let ballot = Ballot {
            id: Uuid::new_v4(),
            title: req.title.trim().to_string(),
            position_id: req.position_id,
            election_date: req.election_date,
            jurisdiction: req.jurisdiction,
            candidates: req.candidates,
            workflow: BallotWorkflow::default(),
            is_locked: false,
            locked_at: None,
            locked_by: None,
            version: 1,
            created_by: ctx.user_id,
            created_at: now,
            updated_at: now,
        };
        let ballot = self.ballots.insert(&ballot).await?;

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::CreateBallot,
                    EntityType::Ballot,
                    Some(ballot.id),
                    ctx.user_id,
                    format!("Ballot \"{}\" created", ballot.title),
                )
                .changes(AuditChanges::created(&ballot))
                .request_info(info),
                self.ballots.delete(ballot.id),
            )
            .await?;

        tracing::info!(ballot_id = %ballot.id, position_id = %ballot.position_id, "Ballot created");
        Ok(ballot)
    }

    /// 草稿编辑；`version` 不匹配返回 409
    pub async fn update(
        &self,
        ctx: &AuthContext,
        id: Uuid,
        req: UpdateBallotRequest,
        info: &RequestInfo,
    ) -> Result<Ballot> {
        ctx.require(Permission::BallotsWrite)?;
        let before = self.find_in_scope(ctx, id).await?;

        if !before.is_draft() {
            return Err(AppError::bad_request(format!(
                "Only draft ballots can be edited (current status: {})",
                before.workflow.status.as_str()
            )));
        }
        if req.version != before.version {
            return Err(version_conflict());
        }

        let mut report = req.validate_request();
        if let Some(entries) = &req.candidates {
            if let Some(position) = self.position_for(&mut report, before.position_id).await? {
                self.check_entries(&mut report, &position, entries).await?;
            }
        }
        report.into_result()?;

        let mut ballot = before.clone();
        req.apply(&mut ballot);
        ballot.updated_at = Utc::now();

        let ballot = self
            .ballots
            .update(&ballot, req.version)
            .await?
            .ok_or_else(version_conflict)?;

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::UpdateBallot,
                    EntityType::Ballot,
                    Some(ballot.id),
                    ctx.user_id,
                    format!("Ballot \"{}\" updated", ballot.title),
                )
                .changes(AuditChanges::diff(&before, &ballot))
                .request_info(info),
                self.ballots.update(&before, ballot.version),
            )
            .await?;

        Ok(ballot)
    }

    /// 执行工作流动作；非法转换返回 400 且选票不变
    pub async fn transition(
        &self,
        ctx: &AuthContext,
        id: Uuid,
        action: BallotAction,
        req: TransitionRequest,
        info: &RequestInfo,
    ) -> Result<Ballot> {
        ctx.require_any(action.required_permissions())?;
        ValidationReport::from_validator(req.validate()).into_result()?;
        let before = self.find_in_scope(ctx, id).await?;

        // 提交时重新检查候选人：可能在编辑后被删除或状态改变
        if action == BallotAction::Submit && before.is_draft() {
            let mut report = ValidationReport::new();
            if let Some(position) = self.position_for(&mut report, before.position_id).await? {
                self.check_entries(&mut report, &position, &before.candidates).await?;
            }
            report.into_result()?;
        }

        let mut ballot = before.clone();
        let comment = req.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        let event = ballot.apply_transition(action, ctx.user_id, comment, Utc::now())?;

        let ballot = self
            .ballots
            .update(&ballot, before.version)
            .await?
            .ok_or_else(version_conflict)?;

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    audit_action(action),
                    EntityType::Ballot,
                    Some(ballot.id),
                    ctx.user_id,
                    format!(
                        "Ballot \"{}\" moved from {} to {}",
                        ballot.title,
                        event.from.as_str(),
                        event.to.as_str()
                    ),
                )
                .details(json!({
                    "action": action.as_str(),
                    "from": event.from,
                    "to": event.to,
                    "comment": event.comment,
                }))
                .changes(AuditChanges::diff(&before, &ballot))
                .request_info(info),
                self.ballots.update(&before, ballot.version),
            )
            .await?;

        tracing::info!(
            ballot_id = %ballot.id,
            action = action.as_str(),
            from = event.from.as_str(),
            to = event.to.as_str(),
            "Ballot workflow transition"
        );
        Ok(ballot)
    }

    pub async fn delete(&self, ctx: &AuthContext, id: Uuid, info: &RequestInfo) -> Result<()> {
        ctx.require(Permission::BallotsWrite)?;
        let ballot = self.find_in_scope(ctx, id).await?;

        if !ballot.is_draft() {
            return Err(AppError::bad_request("Only draft ballots can be deleted"));
        }
        if !self.ballots.delete(id).await? {
            return Err(AppError::not_found("Ballot"));
        }

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::DeleteBallot,
                    EntityType::Ballot,
                    Some(ballot.id),
                    ctx.user_id,
                    format!("Ballot \"{}\" deleted", ballot.title),
                )
                .changes(AuditChanges::deleted(&ballot))
                .request_info(info),
                self.ballots.insert(&ballot),
            )
            .await?;

        Ok(())
    }

    async fn find_in_scope(&self, ctx: &AuthContext, id: Uuid) -> Result<Ballot> {
        let ballot = self
            .ballots
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Ballot"))?;
        ctx.require_scope(&ballot.jurisdiction)?;
        Ok(ballot)
    }

    async fn position_for(
        &self,
        report: &mut ValidationReport,
        position_id: Uuid,
    ) -> Result<Option<Position>> {
        let position = self.positions.find_by_id(position_id).await?;
        if position.is_none() {
            report.push("positionId", "position does not exist");
        }
        Ok(position)
    }

    /// 候选人必须存在、已批准、且竞选本职位
    async fn check_entries(
        &self,
        report: &mut ValidationReport,
        position: &Position,
        entries: &[BallotEntry],
    ) -> Result<()> {
        if let Some(max) = position.max_candidates {
            if entries.len() > max as usize {
                report.push(
                    "candidates",
                    format!("at most {} candidates allowed for {}", max, position.code),
                );
            }
        }

        for (index, entry) in entries.iter().enumerate() {
            let field = format!("candidates[{}].candidateId", index);
            match self.candidates.find_by_id(entry.candidate_id).await? {
                None => report.push(&field, "candidate does not exist"),
                Some(c) if c.status != CandidateStatus::Approved => {
                    report.push(&field, "candidate is not approved")
                }
                Some(c) if c.position_id != position.id => {
                    report.push(&field, "candidate is not standing for this position")
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

fn check_level(report: &mut ValidationReport, position: &Position, jurisdiction: &Jurisdiction) {
    if position.level != jurisdiction.level {
        report.push(
            "jurisdiction.level",
            format!("must be {} for position {}", position.level.as_str(), position.code),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ballot::WorkflowStatus, candidate::Candidate, jurisdiction::JurisdictionLevel,
        user::UserRole,
    };
    use crate::repository::{AuditRepository, MemoryStore};
    use crate::services::test_support::{context, AlwaysConflicting};
    use chrono::NaiveDate;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: BallotService,
        position: Position,
        candidate: Candidate,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(AuditService::new(store.clone(), 3));
        let now = Utc::now();

        let position = Position {
            id: Uuid::new_v4(),
            title: "President".to_string(),
            code: "PRESIDENT".to_string(),
            level: JurisdictionLevel::National,
            description: None,
            max_candidates: Some(4),
            is_active: true,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };
        PositionRepository::insert(store.as_ref(), &position).await.unwrap();

        let candidate = Candidate {
            id: Uuid::new_v4(),
            first_name: "Baraka".to_string(),
            last_name: "Otieno".to_string(),
            national_id: "23456789".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1970, 5, 1).unwrap(),
            party: "Unity".to_string(),
            position_id: position.id,
            jurisdiction: Jurisdiction::national(),
            email: None,
            phone: None,
            manifesto: None,
            status: CandidateStatus::Approved,
            status_reason: None,
            approved_by: None,
            approved_at: None,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };
        CandidateRepository::insert(store.as_ref(), &candidate).await.unwrap();

        Fixture {
            service: BallotService::new(store.clone(), store.clone(), store.clone(), audit),
            store,
            position,
            candidate,
        }
    }

    fn create_request(position_id: Uuid, candidates: serde_json::Value) -> CreateBallotRequest {
        serde_json::from_value(json!({
            "title": "Presidential Ballot",
            "positionId": position_id,
            "electionDate": "2027-08-10",
            "jurisdiction": {"level": "national"},
            "candidates": candidates
        }))
        .unwrap()
    }

    async fn draft(f: &Fixture, ctx: &AuthContext) -> Ballot {
        f.service
            .create(
                ctx,
                create_request(f.position.id, json!([{"candidateId": f.candidate.id, "order": 1}])),
                &RequestInfo::default(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_workflow_to_locked() {
        let f = fixture().await;
        let admin = context(UserRole::SystemAdmin, Jurisdiction::national());
        let info = RequestInfo::default();
        let ballot = draft(&f, &admin).await;

        let mut current = ballot;
        for action in [
            BallotAction::Submit,
            BallotAction::Review,
            BallotAction::LegalAudit,
            BallotAction::Approve,
            BallotAction::Lock,
        ] {
            current = f
                .service
                .transition(&admin, current.id, action, TransitionRequest::default(), &info)
                .await
                .unwrap();
        }

        assert_eq!(current.workflow.status, WorkflowStatus::Locked);
        assert!(current.is_locked);
        assert_eq!(current.locked_by, Some(admin.user_id));
        assert_eq!(current.workflow.history.len(), 5);
        assert_eq!(current.version, 6);

        let chain = f.store.chain().await.unwrap();
        assert_eq!(chain.last().map(|l| l.action), Some(AuditAction::LockBallot));
    }

    #[tokio::test]
    async fn test_lock_outside_approved_is_rejected() {
        let f = fixture().await;
        let admin = context(UserRole::SystemAdmin, Jurisdiction::national());
        let info = RequestInfo::default();
        let ballot = draft(&f, &admin).await;

        let result = f
            .service
            .transition(&admin, ballot.id, BallotAction::Lock, TransitionRequest::default(), &info)
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let stored = f.service.get(&admin, ballot.id).await.unwrap();
        assert!(!stored.is_locked);
        assert_eq!(stored.workflow.status, WorkflowStatus::Draft);
        assert_eq!(stored.version, ballot.version);
    }

    #[tokio::test]
    async fn test_transition_requires_permission() {
        let f = fixture().await;
        let admin = context(UserRole::SystemAdmin, Jurisdiction::national());
        let observer = context(UserRole::Observer, Jurisdiction::national());
        let ballot = draft(&f, &admin).await;

        let result = f
            .service
            .transition(
                &observer,
                ballot.id,
                BallotAction::Submit,
                TransitionRequest::default(),
                &RequestInfo::default(),
            )
            .await;
        assert!(matches!(result, Err(AppError::Forbidden)));
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let f = fixture().await;
        let admin = context(UserRole::SystemAdmin, Jurisdiction::national());
        let info = RequestInfo::default();
        let ballot = draft(&f, &admin).await;

        let edit = |version: i32, title: &str| UpdateBallotRequest {
            version,
            title: Some(title.to_string()),
            election_date: None,
            candidates: None,
        };

        let updated = f
            .service
            .update(&admin, ballot.id, edit(ballot.version, "Presidential Ballot 2027"), &info)
            .await
            .unwrap();
        assert_eq!(updated.version, ballot.version + 1);

        let stale = f
            .service
            .update(&admin, ballot.id, edit(ballot.version, "Stale edit"), &info)
            .await;
        assert!(matches!(stale, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_unapproved_candidate_and_empty_submit() {
        let f = fixture().await;
        let admin = context(UserRole::SystemAdmin, Jurisdiction::national());
        let info = RequestInfo::default();

        let result = f
            .service
            .create(
                &admin,
                create_request(f.position.id, json!([{"candidateId": Uuid::new_v4(), "order": 1}])),
                &info,
            )
            .await;
        match result {
            Err(AppError::Validation(errors)) => {
                assert_eq!(errors[0].field, "candidates[0].candidateId")
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let empty = f
            .service
            .create(&admin, create_request(f.position.id, json!([])), &info)
            .await
            .unwrap();
        let submit = f
            .service
            .transition(&admin, empty.id, BallotAction::Submit, TransitionRequest::default(), &info)
            .await;
        assert!(matches!(submit, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_failed_audit_reverts_transition() {
        let f = fixture().await;
        let admin = context(UserRole::SystemAdmin, Jurisdiction::national());
        let info = RequestInfo::default();
        let ballot = draft(&f, &admin).await;

        let failing = BallotService::new(
            f.store.clone(),
            f.store.clone(),
            f.store.clone(),
            Arc::new(AuditService::new(Arc::new(AlwaysConflicting::new(f.store.clone())), 2)),
        );

        let result = failing
            .transition(&admin, ballot.id, BallotAction::Submit, TransitionRequest::default(), &info)
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let stored = f.service.get(&admin, ballot.id).await.unwrap();
        assert_eq!(stored.workflow.status, WorkflowStatus::Draft);
        assert!(stored.workflow.history.is_empty());

        let created = failing
            .create(
                &admin,
                create_request(f.position.id, json!([{"candidateId": f.candidate.id, "order": 1}])),
                &info,
            )
            .await;
        assert!(matches!(created, Err(AppError::Conflict(_))));
        let (_, total) = f.service.list(&admin, BallotFilters::default(), 10, 0).await.unwrap();
        assert_eq!(total, 1);

        // 撤销后仍能继续审批流程
        let submitted = f
            .service
            .transition(&admin, ballot.id, BallotAction::Submit, TransitionRequest::default(), &info)
            .await
            .unwrap();
        assert_eq!(submitted.workflow.status, WorkflowStatus::Submitted);
    }
}
