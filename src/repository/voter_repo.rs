//! Voter repository (PostgreSQL)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::voter::{Voter, VoterFilters, VoterStats};
use crate::repository::{push_scope, VoterRepository};

pub const DUPLICATE_VOTER: &str = "A voter with this national ID is already registered";

pub struct PgVoterRepository {
    db: PgPool,
}

impl PgVoterRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &VoterFilters) {
        if let Some(status) = filters.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(has_voted) = filters.has_voted {
            qb.push(" AND has_voted = ").push_bind(has_voted);
        }
        for (column, value) in [
            ("county", &filters.county),
            ("constituency", &filters.constituency),
            ("ward", &filters.ward),
        ] {
            if let Some(value) = value {
                qb.push(format!(" AND LOWER({}) = LOWER(", column))
                    .push_bind(value.clone())
                    .push(")");
            }
        }
        if let Some(search) = &filters.search {
            let pattern = format!("%{}%", search);
            qb.push(" AND (first_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR last_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR national_id LIKE ")
                .push_bind(pattern.clone())
                .push(" OR registration_number ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(scope) = &filters.scope {
            push_scope(qb, scope, None);
        }
    }
}

#[async_trait]
impl VoterRepository for PgVoterRepository {
    async fn insert(&self, v: &Voter) -> Result<Voter> {
        sqlx::query_as::<_, Voter>(
            r#"
            INSERT INTO voters (
                id, national_id, first_name, last_name, date_of_birth, phone, email, county,
                constituency, ward, polling_station, registration_number, status, status_reason,
                has_voted, voted_at, verified_by, verified_at, registered_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            RETURNING *
            "#,
        )
        .bind(v.id)
        .bind(&v.national_id)
        .bind(&v.first_name)
        .bind(&v.last_name)
        .bind(v.date_of_birth)
        .bind(&v.phone)
        .bind(&v.email)
        .bind(&v.county)
        .bind(&v.constituency)
        .bind(&v.ward)
        .bind(&v.polling_station)
        .bind(&v.registration_number)
        .bind(v.status)
        .bind(&v.status_reason)
        .bind(v.has_voted)
        .bind(v.voted_at)
        .bind(v.verified_by)
        .bind(v.verified_at)
        .bind(v.registered_by)
        .bind(v.created_at)
        .bind(v.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_unique_violation(e, DUPLICATE_VOTER))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Voter>> {
        let voter = sqlx::query_as::<_, Voter>("SELECT * FROM voters WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(voter)
    }

    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<Voter>> {
        let voter = sqlx::query_as::<_, Voter>("SELECT * FROM voters WHERE national_id = $1")
            .bind(national_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(voter)
    }

    async fn list(&self, filters: &VoterFilters, limit: i64, offset: i64) -> Result<Vec<Voter>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM voters WHERE 1=1");
        Self::push_filters(&mut qb, filters);
        qb.push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let voters = qb.build_query_as::<Voter>().fetch_all(&self.db).await?;
        Ok(voters)
    }

    async fn count(&self, filters: &VoterFilters) -> Result<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM voters WHERE 1=1");
        Self::push_filters(&mut qb, filters);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.db).await?;
        Ok(count)
    }

    async fn update(&self, v: &Voter) -> Result<Option<Voter>> {
        let voter = sqlx::query_as::<_, Voter>(
            r#"
            UPDATE voters
            SET
                phone = $2,
                email = $3,
                polling_station = $4,
                status = $5,
                status_reason = $6,
                has_voted = $7,
                voted_at = $8,
                verified_by = $9,
                verified_at = $10,
                updated_at = $11
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(v.id)
        .bind(&v.phone)
        .bind(&v.email)
        .bind(&v.polling_station)
        .bind(v.status)
        .bind(&v.status_reason)
        .bind(v.has_voted)
        .bind(v.voted_at)
        .bind(v.verified_by)
        .bind(v.verified_at)
        .bind(v.updated_at)
        .fetch_optional(&self.db)
        .await?;

        Ok(voter)
    }

    async fn mark_voted(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Voter>> {
        let voter = sqlx::query_as::<_, Voter>(
            r#"
            UPDATE voters
            SET has_voted = TRUE, voted_at = $2, updated_at = $2
            WHERE id = $1 AND status = 'verified' AND NOT has_voted
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.db)
        .await?;

        Ok(voter)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM voters WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self, filters: &VoterFilters) -> Result<VoterStats> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'registered'),
                COUNT(*) FILTER (WHERE status = 'verified'),
                COUNT(*) FILTER (WHERE status = 'suspended'),
                COUNT(*) FILTER (WHERE has_voted)
            FROM voters WHERE 1=1
            "#,
        );
        Self::push_filters(&mut qb, filters);

        let (registered, verified, suspended, voted): (i64, i64, i64, i64) =
            qb.build_query_as().fetch_one(&self.db).await?;

        Ok(VoterStats::new(registered, verified, suspended, voted))
    }
}
