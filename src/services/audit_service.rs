//! 审计日志服务
//!
//! 写入路径：进程内互斥锁串行化 → 读链头 → 计算 hash → 条件追加，
//! 链头被其他进程推进时重试，超过 `audit.append_max_attempts` 返回 409。
//!
//! 业务写入与审计追加成对出现：追加失败时由 [`AuditService::record_or_rollback`]
//! 撤销刚才的业务写入，不留下没有审计记录的变更。

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    audit::{truncate_millis, verify_chain, verify_entry, HashInput},
    error::{AppError, Result},
    models::audit::{
        AuditAction, AuditCategory, AuditChanges, AuditFilters, AuditLog, AuditSummary,
        ChainReport, EntityType, EntryVerification, NewAuditEntry, RequestInfo, Severity,
    },
    repository::{AppendOutcome, AuditRepository},
};

/// 一次写操作对应的审计事件
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Option<Uuid>,
    pub performed_by: Uuid,
    pub description: String,
    pub details: Value,
    pub changes: AuditChanges,
    pub request_info: RequestInfo,
    pub severity: Option<Severity>,
    pub category: Option<AuditCategory>,
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        entity_type: EntityType,
        entity_id: Option<Uuid>,
        performed_by: Uuid,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action,
            entity_type,
            entity_id,
            performed_by,
            description: description.into(),
            details: Value::Object(Default::default()),
            changes: AuditChanges::default(),
            request_info: RequestInfo::default(),
            severity: None,
            category: None,
        }
    }

    pub fn changes(mut self, changes: AuditChanges) -> Self {
        self.changes = changes;
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn request_info(mut self, request_info: &RequestInfo) -> Self {
        self.request_info = request_info.clone();
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

pub struct AuditService {
    repo: Arc<dyn AuditRepository>,
    append_lock: Mutex<()>,
    max_attempts: u32,
}

impl AuditService {
    pub fn new(repo: Arc<dyn AuditRepository>, max_attempts: u32) -> Self {
        Self {
            repo,
            append_lock: Mutex::new(()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// 记录审计日志条目（追加到哈希链）
    pub async fn record(&self, event: AuditEvent) -> Result<AuditLog> {
        let _guard = self.append_lock.lock().await;

        for attempt in 1..=self.max_attempts {
            let head = self.repo.head().await?;

            // 时间戳单调不减，相同时按 sequence 排序
            let mut timestamp = truncate_millis(Utc::now());
            if let Some(head) = &head {
                if head.timestamp > timestamp {
                    timestamp = head.timestamp;
                }
            }

            let mut entry = NewAuditEntry {
                id: Uuid::new_v4(),
                action: event.action,
                entity_type: event.entity_type,
                entity_id: event.entity_id,
                performed_by: event.performed_by,
                description: event.description.clone(),
                details: event.details.clone(),
                changes: event.changes.clone(),
                request_info: event.request_info.clone(),
                severity: event.severity.unwrap_or_else(|| event.action.default_severity()),
                category: event.category.unwrap_or_else(|| event.action.default_category()),
                timestamp,
                hash: String::new(),
                previous_hash: head.as_ref().map(|h| h.hash.clone()),
            };
            entry.hash = HashInput::of_new(&entry).hash();

            match self.repo.append(&entry, head.as_ref().map(|h| h.id)).await? {
                AppendOutcome::Appended(log) => {
                    metrics::counter!("audit_appends_total").increment(1);
                    tracing::debug!(
                        entry_id = %log.id,
                        action = log.action.as_str(),
                        hash = %log.hash,
                        "Audit entry appended"
                    );
                    return Ok(log);
                }
                AppendOutcome::Conflict => {
                    metrics::counter!("audit_append_conflicts_total").increment(1);
                    tracing::warn!(attempt, action = event.action.as_str(), "Audit chain head moved, retrying");
                }
            }
        }

        tracing::error!(
            attempts = self.max_attempts,
            action = event.action.as_str(),
            "Audit append gave up after repeated conflicts"
        );
        Err(AppError::Conflict(
            "Audit log is busy, please retry the request".to_string(),
        ))
    }

    /// 追加审计日志；失败时先执行 `rollback` 撤销对应的业务写入，再返回原错误
    ///
    /// `rollback` 只在追加失败时才会被 await。
    pub async fn record_or_rollback<T, R>(&self, event: AuditEvent, rollback: R) -> Result<AuditLog>
    where
        R: Future<Output = Result<T>>,
    {
        let action = event.action;
        let entity_id = event.entity_id;

        match self.record(event).await {
            Ok(log) => Ok(log),
            Err(err) => {
                match rollback.await {
                    Ok(_) => tracing::warn!(
                        action = action.as_str(),
                        entity_id = ?entity_id,
                        error = %err,
                        "Audit append failed, change rolled back"
                    ),
                    Err(rollback_err) => tracing::error!(
                        action = action.as_str(),
                        entity_id = ?entity_id,
                        error = %err,
                        rollback_error = %rollback_err,
                        "Audit append failed and the change could not be rolled back"
                    ),
                }
                Err(err)
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<AuditLog> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Audit log"))
    }

    /// 查询审计日志（最新在前）及总数
    pub async fn list(
        &self,
        filters: &AuditFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditLog>, i64)> {
        let logs = self.repo.query(filters, limit, offset).await?;
        let total = self.repo.count(filters).await?;
        Ok((logs, total))
    }

    pub async fn trail(&self, entity_type: EntityType, entity_id: Uuid) -> Result<Vec<AuditLog>> {
        self.repo.trail(entity_type, entity_id).await
    }

    pub async fn summary(&self, filters: &AuditFilters) -> Result<AuditSummary> {
        self.repo.summarize(filters).await
    }

    /// 导出不写审计日志，JSON 与 CSV 对同一过滤条件返回相同条数
    pub async fn export(&self, filters: &AuditFilters, max_rows: i64) -> Result<Vec<AuditLog>> {
        self.repo.query(filters, max_rows, 0).await
    }

    /// 校验单条日志；发现篡改时持久化 `isTampered`
    pub async fn verify(&self, id: Uuid) -> Result<EntryVerification> {
        let log = self.get(id).await?;
        let verification = verify_entry(&log);

        if !verification.valid && !log.is_tampered {
            self.repo.mark_tampered(&[log.id]).await?;
            metrics::counter!("audit_tamper_detected_total").increment(1);
            tracing::warn!(
                entry_id = %log.id,
                stored_hash = %verification.hash,
                computed_hash = %verification.computed_hash,
                "Audit entry failed verification"
            );
        }

        Ok(verification)
    }

    /// 沿链校验全部日志
    pub async fn verify_chain(&self) -> Result<ChainReport> {
        let logs = self.repo.chain().await?;
        let mut report = verify_chain(&logs);

        let flagged = self.repo.mark_tampered(&report.tampered).await?;
        report.newly_flagged = flagged as usize;

        if report.valid {
            tracing::info!(total = report.total, "Audit chain verified");
        } else {
            metrics::counter!("audit_tamper_detected_total").increment(flagged);
            tracing::warn!(
                total = report.total,
                tampered = report.tampered.len(),
                broken_links = report.broken_links.len(),
                forks = report.forks.len(),
                "Audit chain verification found problems"
            );
        }

        Ok(report)
    }
}
