//! PostgreSQL 后端的启动与探活
//!
//! 只在 `DATABASE_URL` 不是 `memory` 时使用：建立连接池、执行 `migrations/`
//! 下的表结构迁移，并为 `/ready` 提供存储探活结果。

use crate::config::DatabaseConfig;
use anyhow::Context;
use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// 按配置建立连接池，连接失败时启动中止
pub async fn create_pool(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .connect(config.url.expose_secret())
        .await
        .context("Failed to connect to the election database")?;

    tracing::info!(
        max_connections = config.max_connections,
        "Election database pool ready"
    );
    Ok(pool)
}

/// 建表：users、positions、candidates、ballots、voters、audit_logs
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to apply election schema migrations")?;

    tracing::info!("Election schema is up to date");
    Ok(())
}

/// 存储后端的探活结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

pub async fn health_check(pool: &PgPool) -> HealthStatus {
    match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthStatus::Healthy,
        Err(e) => {
            tracing::warn!(error = %e, "Election database is not reachable");
            HealthStatus::Unhealthy(e.to_string())
        }
    }
}

/// 连接池占用情况，供 metrics 周期上报
pub fn record_pool_metrics(pool: &PgPool) {
    metrics::gauge!("election.db.pool.size").set(pool.size() as f64);
    metrics::gauge!("election.db.pool.idle").set(pool.num_idle() as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unhealthy_storage_keeps_reason() {
        assert!(HealthStatus::Healthy.is_healthy());

        let status = HealthStatus::Unhealthy("connection refused".to_string());
        assert!(!status.is_healthy());
        assert!(matches!(status, HealthStatus::Unhealthy(reason) if reason.contains("refused")));
    }
}
