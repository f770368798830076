//! Candidate repository (PostgreSQL)

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::candidate::{Candidate, CandidateFilters};
use crate::repository::{push_scope, CandidateRepository};

pub const DUPLICATE_NATIONAL_ID: &str = "A candidate with this national ID already exists";

pub struct PgCandidateRepository {
    db: PgPool,
}

impl PgCandidateRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &CandidateFilters) {
        if let Some(status) = filters.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(position_id) = filters.position_id {
            qb.push(" AND position_id = ").push_bind(position_id);
        }
        if let Some(party) = &filters.party {
            qb.push(" AND LOWER(party) = LOWER(").push_bind(party.clone()).push(")");
        }
        if let Some(search) = &filters.search {
            let pattern = format!("%{}%", search);
            qb.push(" AND (first_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR last_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR national_id LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(scope) = &filters.scope {
            push_scope(qb, scope, Some("jurisdiction_level"));
        }
    }
}

#[async_trait]
impl CandidateRepository for PgCandidateRepository {
    async fn insert(&self, c: &Candidate) -> Result<Candidate> {
        sqlx::query_as::<_, Candidate>(
            r#"
            INSERT INTO candidates (
                id, first_name, last_name, national_id, date_of_birth, party, position_id,
                jurisdiction_level, county, constituency, ward, email, phone, manifesto,
                status, status_reason, approved_by, approved_at, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            RETURNING *
            "#,
        )
        .bind(c.id)
        .bind(&c.first_name)
        .bind(&c.last_name)
        .bind(&c.national_id)
        .bind(c.date_of_birth)
        .bind(&c.party)
        .bind(c.position_id)
        .bind(c.jurisdiction.level)
        .bind(&c.jurisdiction.county)
        .bind(&c.jurisdiction.constituency)
        .bind(&c.jurisdiction.ward)
        .bind(&c.email)
        .bind(&c.phone)
        .bind(&c.manifesto)
        .bind(c.status)
        .bind(&c.status_reason)
        .bind(c.approved_by)
        .bind(c.approved_at)
        .bind(c.created_by)
        .bind(c.created_at)
        .bind(c.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_unique_violation(e, DUPLICATE_NATIONAL_ID))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Candidate>> {
        let candidate = sqlx::query_as::<_, Candidate>("SELECT * FROM candidates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(candidate)
    }

    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<Candidate>> {
        let candidate =
            sqlx::query_as::<_, Candidate>("SELECT * FROM candidates WHERE national_id = $1")
                .bind(national_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(candidate)
    }

    async fn list(
        &self,
        filters: &CandidateFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Candidate>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM candidates WHERE 1=1");
        Self::push_filters(&mut qb, filters);
        qb.push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let candidates = qb.build_query_as::<Candidate>().fetch_all(&self.db).await?;
        Ok(candidates)
    }

    async fn count(&self, filters: &CandidateFilters) -> Result<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM candidates WHERE 1=1");
        Self::push_filters(&mut qb, filters);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.db).await?;
        Ok(count)
    }

    async fn update(&self, c: &Candidate) -> Result<Option<Candidate>> {
        let candidate = sqlx::query_as::<_, Candidate>(
            r#"
            UPDATE candidates
            SET
                first_name = $2,
                last_name = $3,
                date_of_birth = $4,
                party = $5,
                position_id = $6,
                jurisdiction_level = $7,
                county = $8,
                constituency = $9,
                ward = $10,
                email = $11,
                phone = $12,
                manifesto = $13,
                status = $14,
                status_reason = $15,
                approved_by = $16,
                approved_at = $17,
                updated_at = $18
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(c.id)
        .bind(&c.first_name)
        .bind(&c.last_name)
        .bind(c.date_of_birth)
        .bind(&c.party)
        .bind(c.position_id)
        .bind(c.jurisdiction.level)
        .bind(&c.jurisdiction.county)
        .bind(&c.jurisdiction.constituency)
        .bind(&c.jurisdiction.ward)
        .bind(&c.email)
        .bind(&c.phone)
        .bind(&c.manifesto)
        .bind(c.status)
        .bind(&c.status_reason)
        .bind(c.approved_by)
        .bind(c.approved_at)
        .bind(c.updated_at)
        .fetch_optional(&self.db)
        .await?;

        Ok(candidate)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM candidates WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_by_position(&self, position_id: Uuid) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM candidates WHERE position_id = $1")
                .bind(position_id)
                .fetch_one(&self.db)
                .await?;
        Ok(count)
    }
}
