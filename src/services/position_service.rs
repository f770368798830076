//! 职位管理

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    auth::{AuthContext, Permission},
    error::{AppError, Result},
    models::{
        audit::{AuditAction, AuditChanges, EntityType, RequestInfo},
        position::{CreatePositionRequest, Position, PositionFilters, UpdatePositionRequest},
    },
    repository::{BallotRepository, CandidateRepository, PositionRepository},
    services::audit_service::{AuditEvent, AuditService},
};

pub struct PositionService {
    positions: Arc<dyn PositionRepository>,
    candidates: Arc<dyn CandidateRepository>,
    ballots: Arc<dyn BallotRepository>,
    audit: Arc<AuditService>,
}

impl PositionService {
    pub fn new(
        positions: Arc<dyn PositionRepository>,
        candidates: Arc<dyn CandidateRepository>,
        ballots: Arc<dyn BallotRepository>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            positions,
            candidates,
            ballots,
            audit,
        }
    }

    pub async fn list(&self, ctx: &AuthContext, filters: &PositionFilters) -> Result<Vec<Position>> {
        ctx.require(Permission::PositionsRead)?;
        self.positions.list(filters).await
    }

    pub async fn get(&self, ctx: &AuthContext, id: Uuid) -> Result<Position> {
        ctx.require(Permission::PositionsRead)?;
        self.find(id).await
    }

    pub async fn create(
        &self,
        ctx: &AuthContext,
        req: CreatePositionRequest,
        info: &RequestInfo,
    ) -> Result<Position> {
        ctx.require(Permission::PositionsWrite)?;
        req.validate_request().into_result()?;

        let now = Utc::now();
        let position = Position {
            id: Uuid::new_v4(),
            title: req.title.trim().to_string(),
            code: req.code,
            level: req.level,
            description: req.description,
            max_candidates: req.max_candidates,
            is_active: true,
            created_by: ctx.user_id,
            created_at: now,
            updated_at: now,
        };
        let position = self.positions.insert(&position).await?;

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::CreatePosition,
                    EntityType::Position,
                    Some(position.id),
                    ctx.user_id,
                    format!("Position {} ({}) created", position.title, position.code),
                )
                .changes(AuditChanges::created(&position))
                .request_info(info),
                self.positions.delete(position.id),
            )
            .await?;

        tracing::info!(position_id = %position.id, code = %position.code, "Position created");
        Ok(position)
    }

    pub async fn update(
        &self,
        ctx: &AuthContext,
        id: Uuid,
        req: UpdatePositionRequest,
        info: &RequestInfo,
    ) -> Result<Position> {
        ctx.require(Permission::PositionsWrite)?;
        req.validate_request().into_result()?;

        let before = self.find(id).await?;
        let mut position = before.clone();
        req.apply(&mut position);
        position.updated_at = Utc::now();

        let position = self
            .positions
            .update(&position)
            .await?
            .ok_or_else(|| AppError::not_found("Position"))?;

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::UpdatePosition,
                    EntityType::Position,
                    Some(position.id),
                    ctx.user_id,
                    format!("Position {} updated", position.code),
                )
                .changes(AuditChanges::diff(&before, &position))
                .request_info(info),
                self.positions.update(&before),
            )
            .await?;

        Ok(position)
    }

    /// 仍被候选人或选票引用的职位不能删除
    pub async fn delete(&self, ctx: &AuthContext, id: Uuid, info: &RequestInfo) -> Result<()> {
        ctx.require(Permission::PositionsWrite)?;
        let position = self.find(id).await?;

        let candidates = self.candidates.count_by_position(id).await?;
        let ballots = self.ballots.count_by_position(id).await?;
        if candidates > 0 || ballots > 0 {
            return Err(AppError::bad_request(format!(
                "Position {} is still referenced by {} candidate(s) and {} ballot(s)",
                position.code, candidates, ballots
            )));
        }

        if !self.positions.delete(id).await? {
            return Err(AppError::not_found("Position"));
        }

        self.audit
            .record_or_rollback(
                AuditEvent::new(
                    AuditAction::DeletePosition,
                    EntityType::Position,
                    Some(position.id),
                    ctx.user_id,
                    format!("Position {} deleted", position.code),
                )
                .changes(AuditChanges::deleted(&position))
                .request_info(info),
                self.positions.insert(&position),
            )
            .await?;

        tracing::info!(position_id = %id, "Position deleted");
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Position> {
        self.positions
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Position"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{jurisdiction::Jurisdiction, user::UserRole};
    use crate::repository::{AuditRepository, MemoryStore};
    use crate::services::test_support::context;

    fn service(store: Arc<MemoryStore>) -> PositionService {
        let audit = Arc::new(AuditService::new(store.clone(), 3));
        PositionService::new(store.clone(), store.clone(), store, audit)
    }

    fn governor() -> CreatePositionRequest {
        serde_json::from_value(serde_json::json!({
            "title": "Governor",
            "code": "GOVERNOR",
            "level": "county",
            "maxCandidates": 10
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_update_delete_are_audited() {
        let store = Arc::new(MemoryStore::new());
        let positions = service(store.clone());
        let admin = context(UserRole::BomasAdmin, Jurisdiction::national());
        let info = RequestInfo::default();

        let position = positions.create(&admin, governor(), &info).await.unwrap();
        let update: UpdatePositionRequest =
            serde_json::from_value(serde_json::json!({"isActive": false})).unwrap();
        let updated = positions.update(&admin, position.id, update, &info).await.unwrap();
        assert!(!updated.is_active);
        positions.delete(&admin, position.id, &info).await.unwrap();

        let chain = store.chain().await.unwrap();
        let actions: Vec<_> = chain.iter().map(|l| l.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::CreatePosition,
                AuditAction::UpdatePosition,
                AuditAction::DeletePosition
            ]
        );
        assert_eq!(chain[1].changes.fields_changed, vec!["isActive".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_code_and_missing_permission() {
        let store = Arc::new(MemoryStore::new());
        let positions = service(store);
        let admin = context(UserRole::BomasAdmin, Jurisdiction::national());
        let observer = context(UserRole::Observer, Jurisdiction::national());
        let info = RequestInfo::default();

        assert!(matches!(
            positions.create(&observer, governor(), &info).await,
            Err(AppError::Forbidden)
        ));
        positions.create(&admin, governor(), &info).await.unwrap();
        assert!(matches!(
            positions.create(&admin, governor(), &info).await,
            Err(AppError::BadRequest(_))
        ));
    }
}
