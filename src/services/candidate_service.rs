//! 候选人管理
//!
//! 规则：年满 18 岁；职位存在且启用；候选人辖区层级与职位层级一致；
//! 调用者辖区覆盖候选人辖区；身份证号唯一。

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
        candidate::{
            Candidate, CandidateFilters, CandidateStatus, CreateCandidateRequest,
            RejectCandidateRequest, UpdateCandidateRequest,
        },
        jurisdiction::Jurisdiction,
    },
    repository::{BallotRepository, CandidateRepository, PositionRepository},
    services::audit_service::{AuditEvent, AuditService},
    validation::ValidationReport,
};

pub struct CandidateService {
    candidates: Arc<dyn CandidateRepository>,
    positions: Arc<dyn PositionRepository>,
    ballots: Arc<dyn BallotRepository>,
    audit: Arc<AuditService>,
}

impl CandidateService {
    pub fn new(
        candidates: Arc<dyn CandidateRepository>,
        positions: Arc<dyn PositionRepository>,
        ballots: Arc<dyn BallotRepository>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            candidates,
            positions,
            ballots,
            audit,
        }
    }

    /// 列表自动限制在调用者辖区内
    pub async fn list(
        &self,
        ctx: &AuthContext,
        mut filters: CandidateFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Candidate>, i64)> {
        ctx.require(Permission::CandidatesRead)?;
        filters.scope = ctx.scope();

        let candidates = self.candidates.list(&filters, limit, offset).await?;
        let total = self.candidates.count(&filters).await?;
        Ok((candidates, total))
    }

    pub async fn get(&self, ctx: &AuthContext, id: Uuid) -> Result<Candidate> {
        ctx.require(Permission::CandidatesRead)?;
        self.find_in_scope(ctx, id).await
    }

    pub async fn create(
        &self,
        ctx: &AuthContext,
        req: CreateCandidateRequest,
        info: &RequestInfo,
    ) -> Result<Candidate> {
        ctx.require(Permission::CandidatesWrite)?;

        let mut report = req.validate_request(Utc::now().date_naive());
        self.check_position(&mut report, req.position_id, &req.jurisdiction)
            .await?;
        report.into_result()?;
        ctx.require_scope(&req.jurisdiction)?;

        if self
            .candidates
            .find_by_national_id(&req.national_id)
            .await?
            .is_some()
        {
            return Err(AppError::bad_request(
                "A candidate with this national ID already exists",
            ));
        }

        let now = Utc::now();
        let candidate = Candidate {
            id: Uuid::new_v4(),
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            national_id: req.national_id,
            date_of_birth: req.date_of_birth,
            party: req.party.trim().to_string(),
            position_id: req.position_id,
            jurisdiction: req.jurisdiction,
            email: req.email,
            phone: req.phone,
            manifesto: req.manifesto,
            status: CandidateStatus::Pending,
            status_reason: None,
            approved_by: None,
            approved_at: None,
            created_by: ctx.user_id,
            created_at: now,
            updated_at: now,
        };
        let candidate = self.candidates.insert(&candidate).await?;

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::CreateCandidate,
                    EntityType::Candidate,
                    Some(candidate.id),
                    ctx.user_id,
                    format!("Candidate {} registered", candidate.full_name()),
                )
                .changes(AuditChanges::created(&candidate))
                .request_info(info),
                self.candidates.delete(candidate.id),
            )
            .await?;

        tracing::info!(candidate_id = %candidate.id, position_id = %candidate.position_id, "Candidate created");
        Ok(candidate)
    }

    /// 仅 pending / rejected 状态可修改，修改后回到 pending
    pub async fn update(
        &self,
        ctx: &AuthContext,
        id: Uuid,
        req: UpdateCandidateRequest,
        info: &RequestInfo,
    ) -> Result<Candidate> {
        ctx.require(Permission::CandidatesWrite)?;
        let before = self.find_in_scope(ctx, id).await?;

        if !before.status.is_editable() {
            return Err(AppError::bad_request(format!(
                "A candidate in status {} can no longer be edited",
                before.status.as_str()
            )));
        }

        let mut report = req.validate_request(Utc::now().date_naive());
        let mut candidate = before.clone();
        req.apply(&mut candidate);
        if req.position_id.is_some() || req.jurisdiction.is_some() {
            self.check_position(&mut report, candidate.position_id, &candidate.jurisdiction)
                .await?;
        }
        report.into_result()?;
        ctx.require_scope(&candidate.jurisdiction)?;

        candidate.status = CandidateStatus::Pending;
        candidate.status_reason = None;
        candidate.updated_at = Utc::now();

        let candidate = self
            .candidates
            .update(&candidate)
            .await?
            .ok_or_else(|| AppError::not_found("Candidate"))?;

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::UpdateCandidate,
                    EntityType::Candidate,
                    Some(candidate.id),
                    ctx.user_id,
                    format!("Candidate {} updated", candidate.full_name()),
                )
                .changes(AuditChanges::diff(&before, &candidate))
                .request_info(info),
                self.candidates.update(&before),
            )
            .await?;

        Ok(candidate)
    }

    pub async fn approve(&self, ctx: &AuthContext, id: Uuid, info: &RequestInfo) -> Result<Candidate> {
        ctx.require(Permission::CandidatesApprove)?;
        let before = self.find_in_scope(ctx, id).await?;

        if before.status != CandidateStatus::Pending {
            return Err(AppError::bad_request(format!(
                "Only pending candidates can be approved (current status: {})",
                before.status.as_str()
            )));
        }

        let now = Utc::now();
        let mut candidate = before.clone();
        candidate.status = CandidateStatus::Approved;
        candidate.status_reason = None;
        candidate.approved_by = Some(ctx.user_id);
        candidate.approved_at = Some(now);
        candidate.updated_at = now;

        let candidate = self.save_status(candidate).await?;
        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::ApproveCandidate,
                    EntityType::Candidate,
                    Some(candidate.id),
                    ctx.user_id,
                    format!("Candidate {} approved", candidate.full_name()),
                )
                .changes(AuditChanges::diff(&before, &candidate))
                .request_info(info),
                self.candidates.update(&before),
            )
            .await?;

        tracing::info!(candidate_id = %candidate.id, approved_by = %ctx.user_id, "Candidate approved");
        Ok(candidate)
    }

    pub async fn reject(
        &self,
        ctx: &AuthContext,
        id: Uuid,
        req: RejectCandidateRequest,
        info: &RequestInfo,
    ) -> Result<Candidate> {
        ctx.require(Permission::CandidatesApprove)?;
        ValidationReport::from_validator(req.validate()).into_result()?;
        let before = self.find_in_scope(ctx, id).await?;

        if before.status != CandidateStatus::Pending {
            return Err(AppError::bad_request(format!(
                "Only pending candidates can be rejected (current status: {})",
                before.status.as_str()
            )));
        }

        let mut candidate = before.clone();
        candidate.status = CandidateStatus::Rejected;
        candidate.status_reason = Some(req.reason.trim().to_string());
        candidate.updated_at = Utc::now();

        let candidate = self.save_status(candidate).await?;
        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::RejectCandidate,
                    EntityType::Candidate,
                    Some(candidate.id),
                    ctx.user_id,
                    format!("Candidate {} rejected", candidate.full_name()),
                )
                .details(json!({ "reason": req.reason }))
                .changes(AuditChanges::diff(&before, &candidate))
                .request_info(info),
                self.candidates.update(&before),
            )
            .await?;

        Ok(candidate)
    }

    /// 被选票引用的候选人不能删除
    pub async fn delete(&self, ctx: &AuthContext, id: Uuid, info: &RequestInfo) -> Result<()> {
        ctx.require(Permission::CandidatesWrite)?;
        let candidate = self.find_in_scope(ctx, id).await?;

        if self.ballots.references_candidate(id).await? {
            return Err(AppError::bad_request(
                "Candidate is listed on a ballot and cannot be deleted",
            ));
        }
        if !self.candidates.delete(id).await? {
            return Err(AppError::not_found("Candidate"));
        }

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::DeleteCandidate,
                    EntityType::Candidate,
                    Some(candidate.id),
                    ctx.user_id,
                    format!("Candidate {} deleted", candidate.full_name()),
                )
                .changes(AuditChanges::deleted(&candidate))
                .request_info(info),
                self.candidates.insert(&candidate),
            )
            .await?;

        tracing::info!(candidate_id = %id, "Candidate deleted");
        Ok(())
    }

    async fn find_in_scope(&self, ctx: &AuthContext, id: Uuid) -> Result<Candidate> {
        let candidate = self
            .candidates
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Candidate"))?;
        ctx.require_scope(&candidate.jurisdiction)?;
        Ok(candidate)
    }

    async fn save_status(&self, candidate: Candidate) -> Result<Candidate> {
        self.candidates
            .update(&candidate)
            .await?
            .ok_or_else(|| AppError::not_found("Candidate"))
    }

    async fn check_position(
        &self,
        report: &mut ValidationReport,
        position_id: Uuid,
        jurisdiction: &Jurisdiction,
    ) -> Result<()> {
        match self.positions.find_by_id(position_id).await? {
            None => report.push("positionId", "position does not exist"),
            Some(position) if !position.is_active => {
                report.push("positionId", "position is not active")
            }
            Some(position) if position.level != jurisdiction.level => report.push(
                "jurisdiction.level",
                format!("must be {} for position {}", position.level.as_str(), position.code),
            ),
            Some(_) => {}
        }
        Ok(())
    }
}
