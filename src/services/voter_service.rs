//! 选民登记

use std::sync::Arc;

use chrono::{Datelike, Utc};
use rand::Rng;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{AuthContext, Permission},
    error::{AppError, Result},
    models::{
        audit::{AuditAction, AuditChanges, EntityType, RequestInfo},
        voter::{
            RegisterVoterRequest, SuspendVoterRequest, UpdateVoterRequest, Voter, VoterFilters,
            VoterStats, VoterStatus, VoterStatusResponse,
        },
    },
    repository::VoterRepository,
    services::audit_service::{AuditEvent, AuditService},
    validation::ValidationReport,
};

/// 去掉了易混淆的 0/O、1/I
const REGISTRATION_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// 登记号：`VR-<年份>-<8 位随机字符>`
pub fn generate_registration_number(year: i32) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| REGISTRATION_CHARSET[rng.gen_range(0..REGISTRATION_CHARSET.len())] as char)
        .collect();
    format!("VR-{}-{}", year, suffix)
}

pub struct VoterService {
    voters: Arc<dyn VoterRepository>,
    audit: Arc<AuditService>,
}

impl VoterService {
    pub fn new(voters: Arc<dyn VoterRepository>, audit: Arc<AuditService>) -> Self {
        Self { voters, audit }
    }

    pub async fn register(
        &self,
        ctx: &AuthContext,
        req: RegisterVoterRequest,
        info: &RequestInfo,
    ) -> Result<Voter> {
        ctx.require(Permission::VotersWrite)?;
        let now = Utc::now();
        req.validate_request(now.date_naive()).into_result()?;
        ctx.require_scope(&req.jurisdiction())?;

        if self.voters.find_by_national_id(&req.national_id).await?.is_some() {
            return Err(AppError::bad_request(
                "A voter with this national ID is already registered",
            ));
        }

        let voter = Voter {
            id: Uuid::new_v4(),
            national_id: req.national_id,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            date_of_birth: req.date_of_birth,
            phone: req.phone,
            email: req.email,
            county: req.county.trim().to_string(),
            constituency: req.constituency.trim().to_string(),
            ward: req.ward.trim().to_string(),
            polling_station: req.polling_station.trim().to_string(),
            registration_number: generate_registration_number(now.year()),
            status: VoterStatus::Registered,
            status_reason: None,
            has_voted: false,
            voted_at: None,
            verified_by: None,
            verified_at: None,
            registered_by: ctx.user_id,
            created_at: now,
            updated_at: now,
        };
        let voter = self.voters.insert(&voter).await?;

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::RegisterVoter,
                    EntityType::Voter,
                    Some(voter.id),
                    ctx.user_id,
                    format!("Voter {} registered", voter.registration_number),
                )
                .changes(AuditChanges::created(&voter))
                .request_info(info),
                self.voters.delete(voter.id),
            )
            .await?;

        tracing::info!(voter_id = %voter.id, registration_number = %voter.registration_number, "Voter registered");
        Ok(voter)
    }

    pub async fn list(
        &self,
        ctx: &AuthContext,
        mut filters: VoterFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Voter>, i64)> {
        ctx.require(Permission::VotersRead)?;
        filters.scope = ctx.scope();

        let voters = self.voters.list(&filters, limit, offset).await?;
        let total = self.voters.count(&filters).await?;
        Ok((voters, total))
    }

    pub async fn get(&self, ctx: &AuthContext, id: Uuid) -> Result<Voter> {
        ctx.require(Permission::VotersRead)?;
        self.find_in_scope(ctx, id).await
    }

    /// 仅联系方式与投票站
    pub async fn update(
        &self,
        ctx: &AuthContext,
        id: Uuid,
        req: UpdateVoterRequest,
        info: &RequestInfo,
    ) -> Result<Voter> {
        ctx.require(Permission::VotersWrite)?;
        req.validate_request().into_result()?;
        let before = self.find_in_scope(ctx, id).await?;

        let mut voter = before.clone();
        req.apply(&mut voter);
        voter.updated_at = Utc::now();

        let voter = self.save(voter).await?;
        self.record(ctx, AuditAction::UpdateVoter, &before, &voter, "updated", info)
            .await?;
        Ok(voter)
    }

    pub async fn verify(&self, ctx: &AuthContext, id: Uuid, info: &RequestInfo) -> Result<Voter> {
        ctx.require(Permission::VotersVerify)?;
        let before = self.find_in_scope(ctx, id).await?;

        if before.status == VoterStatus::Verified {
            return Err(AppError::bad_request("Voter is already verified"));
        }

        let now = Utc::now();
        let mut voter = before.clone();
        voter.status = VoterStatus::Verified;
        voter.status_reason = None;
        voter.verified_by = Some(ctx.user_id);
        voter.verified_at = Some(now);
        voter.updated_at = now;

        let voter = self.save(voter).await?;
        self.record(ctx, AuditAction::VerifyVoter, &before, &voter, "verified", info)
            .await?;
        Ok(voter)
    }

    pub async fn suspend(
        &self,
        ctx: &AuthContext,
        id: Uuid,
        req: SuspendVoterRequest,
        info: &RequestInfo,
    ) -> Result<Voter> {
        ctx.require(Permission::VotersVerify)?;
        ValidationReport::from_validator(req.validate()).into_result()?;
        let before = self.find_in_scope(ctx, id).await?;

        if before.status == VoterStatus::Suspended {
            return Err(AppError::bad_request("Voter is already suspended"));
        }

        let mut voter = before.clone();
        voter.status = VoterStatus::Suspended;
        voter.status_reason = Some(req.reason.trim().to_string());
        voter.updated_at = Utc::now();

        let voter = self.save(voter).await?;
        self.record(ctx, AuditAction::SuspendVoter, &before, &voter, "suspended", info)
            .await?;
        Ok(voter)
    }

    /// 只有已核验的选民可以投票，且只能一次
    ///
    /// 存储层条件写入：并发请求中只有一个能把 `has_voted` 置为 true。
    pub async fn record_vote(&self, ctx: &AuthContext, id: Uuid, info: &RequestInfo) -> Result<Voter> {
        ctx.require(Permission::VotersWrite)?;
        let before = self.find_in_scope(ctx, id).await?;
        check_can_vote(&before)?;

        let voter = match self.voters.mark_voted(id, Utc::now()).await? {
            Some(voter) => voter,
            None => {
                // 读取之后状态被其他请求改变
                let current = self
                    .voters
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Voter"))?;
                check_can_vote(&current)?;
                return Err(AppError::bad_request("Voter has already voted"));
            }
        };

        self.record(ctx, AuditAction::RecordVote, &before, &voter, "voted", info)
            .await?;
        tracing::info!(voter_id = %voter.id, "Vote recorded");
        Ok(voter)
    }

    pub async fn stats(&self, ctx: &AuthContext, mut filters: VoterFilters) -> Result<VoterStats> {
        ctx.require(Permission::VotersRead)?;
        filters.scope = ctx.scope();
        self.voters.stats(&filters).await
    }

    /// 公开查询，无需登录，不写审计
    pub async fn public_status(&self, national_id: &str) -> Result<VoterStatusResponse> {
        let national_id = national_id.trim();
        if !crate::validation::NATIONAL_ID_RE.is_match(national_id) {
            return Err(AppError::field("nationalId", "must be 7 or 8 digits"));
        }
        self.voters
            .find_by_national_id(national_id)
            .await?
            .map(VoterStatusResponse::from)
            .ok_or_else(|| AppError::not_found("Voter"))
    }

    async fn find_in_scope(&self, ctx: &AuthContext, id: Uuid) -> Result<Voter> {
        let voter = self
            .voters
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Voter"))?;
        ctx.require_scope(&voter.jurisdiction())?;
        Ok(voter)
    }

    async fn save(&self, voter: Voter) -> Result<Voter> {
        self.voters
            .update(&voter)
            .await?
            .ok_or_else(|| AppError::not_found("Voter"))
    }

    async fn record(
        &self,
        ctx: &AuthContext,
        action: AuditAction,
        before: &Voter,
        after: &Voter,
        verb: &str,
        info: &RequestInfo,
    ) -> Result<()> {
        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    action,
                    EntityType::Voter,
                    Some(after.id),
                    ctx.user_id,
                    format!("Voter {} {}", after.registration_number, verb),
                )
                .details(json!({ "status": after.status, "reason": after.status_reason }))
                .changes(AuditChanges::diff(before, after))
                .request_info(info),
                self.voters.update(before),
            )
            .await?;
        Ok(())
    }
}

fn check_can_vote(voter: &Voter) -> Result<()> {
    if voter.status != VoterStatus::Verified {
        return Err(AppError::bad_request(format!(
            "Only verified voters can vote (current status: {})",
            voter.status.as_str()
        )));
    }
    if voter.has_voted {
        return Err(AppError::bad_request("Voter has already voted"));
    }
    Ok(())
}
