//! Audit repository (审计数据访问)

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::Result;
use crate::models::audit::{
    AuditFilters, AuditLog, AuditSummary, EntityType, NewAuditEntry, PerformerCount,
};
use crate::repository::{AppendOutcome, AuditRepository};

/// 审计链写入使用的 advisory lock 键
const AUDIT_CHAIN_LOCK_KEY: i64 = 0x6175_6469_745f_6368;

pub struct PgAuditRepository {
    db: PgPool,
}

impl PgAuditRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn filtered<'a>(select: &str, filters: &AuditFilters) -> QueryBuilder<'a, Postgres> {
        let mut qb = QueryBuilder::<Postgres>::new(select);
        qb.push(" WHERE 1=1");

        if let Some(action) = filters.action {
            qb.push(" AND action = ").push_bind(action);
        }
        if let Some(entity_type) = filters.entity_type {
            qb.push(" AND entity_type = ").push_bind(entity_type);
        }
        if let Some(entity_id) = filters.entity_id {
            qb.push(" AND entity_id = ").push_bind(entity_id);
        }
        if let Some(performed_by) = filters.performed_by {
            qb.push(" AND performed_by = ").push_bind(performed_by);
        }
        if let Some(category) = filters.category {
            qb.push(" AND category = ").push_bind(category);
        }
        if let Some(severity) = filters.severity {
            qb.push(" AND severity = ").push_bind(severity);
        }
        if let Some(start) = filters.start_date {
            qb.push(" AND timestamp >= ").push_bind(start);
        }
        if let Some(end) = filters.end_date {
            qb.push(" AND timestamp <= ").push_bind(end);
        }
        if let Some(is_tampered) = filters.is_tampered {
            qb.push(" AND is_tampered = ").push_bind(is_tampered);
        }

        qb
    }

    async fn group_counts(&self, column: &str, filters: &AuditFilters) -> Result<BTreeMap<String, i64>> {
        let mut qb = Self::filtered(
            &format!("SELECT {}::text, COUNT(*) FROM audit_logs", column),
            filters,
        );
        qb.push(format!(" GROUP BY {}", column));

        let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(&self.db).await?;
        Ok(rows.into_iter().collect())
    }
}

#[async_trait]
impl AuditRepository for PgAuditRepository {
    async fn head(&self) -> Result<Option<AuditLog>> {
        let head = sqlx::query_as::<_, AuditLog>(
            "SELECT * FROM audit_logs ORDER BY timestamp DESC, sequence DESC LIMIT 1",
        )
        .fetch_optional(&self.db)
        .await?;
        Ok(head)
    }

    /// 事务内持有 advisory lock，且只有链头未变化时才插入
    async fn append(
        &self,
        e: &NewAuditEntry,
        expected_head: Option<Uuid>,
    ) -> Result<AppendOutcome> {
        let mut tx = self.db.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(AUDIT_CHAIN_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (
                id, action, entity_type, entity_id, performed_by, description, details,
                changes, request_info, severity, category, timestamp, hash, previous_hash
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14
            WHERE (
                SELECT id FROM audit_logs ORDER BY timestamp DESC, sequence DESC LIMIT 1
            ) IS NOT DISTINCT FROM $15::uuid
            RETURNING *
            "#,
        )
        .bind(e.id)
        .bind(e.action)
        .bind(e.entity_type)
        .bind(e.entity_id)
        .bind(e.performed_by)
        .bind(&e.description)
        .bind(&e.details)
        .bind(Json(&e.changes))
        .bind(Json(&e.request_info))
        .bind(e.severity)
        .bind(e.category)
        .bind(e.timestamp)
        .bind(&e.hash)
        .bind(&e.previous_hash)
        .bind(expected_head)
        .fetch_optional(&mut *tx)
        .await?;

        match inserted {
            Some(log) => {
                tx.commit().await?;
                Ok(AppendOutcome::Appended(log))
            }
            None => {
                tx.rollback().await?;
                Ok(AppendOutcome::Conflict)
            }
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AuditLog>> {
        let log = sqlx::query_as::<_, AuditLog>("SELECT * FROM audit_logs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(log)
    }

    /// 查询审计日志
    async fn query(&self, filters: &AuditFilters, limit: i64, offset: i64) -> Result<Vec<AuditLog>> {
        let mut qb = Self::filtered("SELECT * FROM audit_logs", filters);
        qb.push(" ORDER BY timestamp DESC, sequence DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let logs = qb.build_query_as::<AuditLog>().fetch_all(&self.db).await?;
        Ok(logs)
    }

    async fn count(&self, filters: &AuditFilters) -> Result<i64> {
        let mut qb = Self::filtered("SELECT COUNT(*) FROM audit_logs", filters);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.db).await?;
        Ok(count)
    }

    async fn trail(&self, entity_type: EntityType, entity_id: Uuid) -> Result<Vec<AuditLog>> {
        let logs = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY timestamp ASC, sequence ASC
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.db)
        .await?;
        Ok(logs)
    }

    async fn chain(&self) -> Result<Vec<AuditLog>> {
        let logs = sqlx::query_as::<_, AuditLog>(
            "SELECT * FROM audit_logs ORDER BY timestamp ASC, sequence ASC",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(logs)
    }

    async fn mark_tampered(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE audit_logs SET is_tampered = TRUE WHERE id = ANY($1) AND NOT is_tampered",
        )
        .bind(ids)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    async fn summarize(&self, filters: &AuditFilters) -> Result<AuditSummary> {
        let by_action = self.group_counts("action", filters).await?;
        let by_category = self.group_counts("category", filters).await?;
        let by_severity = self.group_counts("severity", filters).await?;

        let mut qb = Self::filtered(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_tampered) FROM audit_logs",
            filters,
        );
        let (total, tampered_count): (i64, i64) = qb.build_query_as().fetch_one(&self.db).await?;

        let mut qb = Self::filtered("SELECT performed_by, COUNT(*) AS count FROM audit_logs", filters);
        qb.push(" GROUP BY performed_by ORDER BY count DESC, performed_by LIMIT ")
            .push_bind(AuditSummary::TOP_PERFORMERS as i64);
        let top: Vec<(Uuid, i64)> = qb.build_query_as().fetch_all(&self.db).await?;

        Ok(AuditSummary {
            total,
            by_action,
            by_category,
            by_severity,
            top_performers: top
                .into_iter()
                .map(|(performed_by, count)| PerformerCount {
                    performed_by,
                    count,
                })
                .collect(),
            tampered_count,
            start_date: filters.start_date,
            end_date: filters.end_date,
        })
    }
}
