//! Position repository (PostgreSQL)

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::position::{Position, PositionFilters};
use crate::repository::PositionRepository;

pub const DUPLICATE_POSITION_CODE: &str = "A position with this code already exists";

pub struct PgPositionRepository {
    db: PgPool,
}

impl PgPositionRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PositionRepository for PgPositionRepository {
    async fn insert(&self, p: &Position) -> Result<Position> {
        sqlx::query_as::<_, Position>(
            r#"
            INSERT INTO positions (
                id, title, code, level, description, max_candidates, is_active,
                created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(p.id)
        .bind(&p.title)
        .bind(&p.code)
        .bind(p.level)
        .bind(&p.description)
        .bind(p.max_candidates)
        .bind(p.is_active)
        .bind(p.created_by)
        .bind(p.created_at)
        .bind(p.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::from_unique_violation(e, DUPLICATE_POSITION_CODE))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Position>> {
        let position = sqlx::query_as::<_, Position>("SELECT * FROM positions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(position)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Position>> {
        let position = sqlx::query_as::<_, Position>("SELECT * FROM positions WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.db)
            .await?;
        Ok(position)
    }

    async fn list(&self, filters: &PositionFilters) -> Result<Vec<Position>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM positions WHERE 1=1");
        if let Some(level) = filters.level {
            qb.push(" AND level = ").push_bind(level);
        }
        if let Some(is_active) = filters.is_active {
            qb.push(" AND is_active = ").push_bind(is_active);
        }
        qb.push(" ORDER BY level, title");

        let positions = qb.build_query_as::<Position>().fetch_all(&self.db).await?;
        Ok(positions)
    }

    async fn update(&self, p: &Position) -> Result<Option<Position>> {
        let position = sqlx::query_as::<_, Position>(
            r#"
            UPDATE positions
            SET
                title = $2,
                description = $3,
                max_candidates = $4,
                is_active = $5,
                updated_at = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(p.id)
        .bind(&p.title)
        .bind(&p.description)
        .bind(p.max_candidates)
        .bind(p.is_active)
        .bind(p.updated_at)
        .fetch_optional(&self.db)
        .await?;

        Ok(position)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM positions WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
