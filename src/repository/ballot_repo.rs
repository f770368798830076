//! Ballot repository (PostgreSQL)

use async_trait::async_trait;
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::Result;
use crate::models::ballot::{Ballot, BallotFilters};
use crate::repository::{push_scope, BallotRepository};

pub struct PgBallotRepository {
    db: PgPool,
}

impl PgBallotRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &BallotFilters) {
        if let Some(status) = filters.status {
            qb.push(" AND workflow_status = ").push_bind(status);
        }
        if let Some(position_id) = filters.position_id {
            qb.push(" AND position_id = ").push_bind(position_id);
        }
        if let Some(is_locked) = filters.is_locked {
            qb.push(" AND is_locked = ").push_bind(is_locked);
        }
        if let Some(scope) = &filters.scope {
            push_scope(qb, scope, Some("jurisdiction_level"));
        }
    }
}

#[async_trait]
impl BallotRepository for PgBallotRepository {
    async fn insert(&self, b: &Ballot) -> Result<Ballot> {
        let ballot = sqlx::query_as::<_, Ballot>(
            r#"
            INSERT INTO ballots (
                id, title, position_id, election_date, jurisdiction_level, county, constituency,
                ward, candidates, workflow_status, workflow_history, is_locked, locked_at,
                locked_by, version, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING *
            "#,
        )
        .bind(b.id)
        .bind(&b.title)
        .bind(b.position_id)
        .bind(b.election_date)
        .bind(b.jurisdiction.level)
        .bind(&b.jurisdiction.county)
        .bind(&b.jurisdiction.constituency)
        .bind(&b.jurisdiction.ward)
        .bind(Json(&b.candidates))
        .bind(b.workflow.status)
        .bind(Json(&b.workflow.history))
        .bind(b.is_locked)
        .bind(b.locked_at)
        .bind(b.locked_by)
        .bind(b.version)
        .bind(b.created_by)
        .bind(b.created_at)
        .bind(b.updated_at)
        .fetch_one(&self.db)
        .await?;

        Ok(ballot)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Ballot>> {
        let ballot = sqlx::query_as::<_, Ballot>("SELECT * FROM ballots WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(ballot)
    }

    async fn list(&self, filters: &BallotFilters, limit: i64, offset: i64) -> Result<Vec<Ballot>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM ballots WHERE 1=1");
        Self::push_filters(&mut qb, filters);
        qb.push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let ballots = qb.build_query_as::<Ballot>().fetch_all(&self.db).await?;
        Ok(ballots)
    }

    async fn count(&self, filters: &BallotFilters) -> Result<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ballots WHERE 1=1");
        Self::push_filters(&mut qb, filters);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.db).await?;
        Ok(count)
    }

    async fn update(&self, b: &Ballot, expected_version: i32) -> Result<Option<Ballot>> {
        let ballot = sqlx::query_as::<_, Ballot>(
            r#"
            UPDATE ballots
            SET
                title = $3,
                election_date = $4,
                candidates = $5,
                workflow_status = $6,
                workflow_history = $7,
                is_locked = $8,
                locked_at = $9,
                locked_by = $10,
                updated_at = $11,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(b.id)
        .bind(expected_version)
        .bind(&b.title)
        .bind(b.election_date)
        .bind(Json(&b.candidates))
        .bind(b.workflow.status)
        .bind(Json(&b.workflow.history))
        .bind(b.is_locked)
        .bind(b.locked_at)
        .bind(b.locked_by)
        .bind(b.updated_at)
        .fetch_optional(&self.db)
        .await?;

        Ok(ballot)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ballots WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn references_candidate(&self, candidate_id: Uuid) -> Result<bool> {
        let referenced: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM ballots
                WHERE candidates @> jsonb_build_array(jsonb_build_object('candidateId', $1::text))
            )
            "#,
        )
        .bind(candidate_id.to_string())
        .fetch_one(&self.db)
        .await?;
        Ok(referenced)
    }

    async fn count_by_position(&self, position_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ballots WHERE position_id = $1")
            .bind(position_id)
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}
