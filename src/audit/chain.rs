//! 审计哈希链
//!
//! 每条日志的 `hash` 是下列字段规范化 JSON 的 SHA-256（十六进制）：
//! action, entityType, entityId, performedBy, description, timestamp, changes。
//! 规范化 = 对象键递归排序，时间戳固定为 RFC3339 毫秒精度 UTC。
//! `previousHash` 指向插入时链头的 `hash`。

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::audit::{
    AuditAction, AuditChanges, AuditLog, BrokenLink, ChainFork, ChainReport, EntityType,
    EntryVerification, NewAuditEntry,
};

/// 存储层只保证毫秒精度，哈希前统一截断
pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = ts.nanosecond() % 1_000_000_000;
    ts.with_nanosecond(nanos - nanos % 1_000_000).unwrap_or(ts)
}

pub fn canonical_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 递归排序对象键
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Fields covered by the hash
#[derive(Debug, Clone, Copy)]
pub struct HashInput<'a> {
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Option<Uuid>,
    pub performed_by: Uuid,
    pub description: &'a str,
    pub timestamp: DateTime<Utc>,
    pub changes: &'a AuditChanges,
}

impl<'a> HashInput<'a> {
    pub fn of(log: &'a AuditLog) -> Self {
        Self {
            action: log.action,
            entity_type: log.entity_type,
            entity_id: log.entity_id,
            performed_by: log.performed_by,
            description: &log.description,
            timestamp: log.timestamp,
            changes: &log.changes,
        }
    }

    pub fn of_new(entry: &'a NewAuditEntry) -> Self {
        Self {
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            performed_by: entry.performed_by,
            description: &entry.description,
            timestamp: entry.timestamp,
            changes: &entry.changes,
        }
    }

    pub fn canonical_string(&self) -> String {
        let changes = serde_json::to_value(self.changes).unwrap_or(Value::Null);
        let record = json!({
            "action": self.action.as_str(),
            "entityType": self.entity_type.as_str(),
            "entityId": self.entity_id.map(|id| id.to_string()),
            "performedBy": self.performed_by.to_string(),
            "description": self.description,
            "timestamp": canonical_timestamp(self.timestamp),
            "changes": changes,
        });
        canonicalize(&record).to_string()
    }

    pub fn hash(&self) -> String {
        let digest = Sha256::digest(self.canonical_string().as_bytes());
        hex::encode(digest)
    }
}

/// 重新计算并与存储的 hash 比较；不沿链检查
pub fn verify_entry(log: &AuditLog) -> EntryVerification {
    let computed_hash = HashInput::of(log).hash();
    EntryVerification {
        id: log.id,
        valid: computed_hash == log.hash,
        hash: log.hash.clone(),
        computed_hash,
    }
}

/// 校验整条链，`logs` 按 (timestamp, sequence) 升序
///
/// 报告三类问题：
/// - 哈希无法复算的条目（内容被改动）
/// - `previousHash` 不等于前一条 `hash` 的断链
/// - 多个条目指向同一前驱的分叉
pub fn verify_chain(logs: &[AuditLog]) -> ChainReport {
    let mut report = ChainReport {
        total: logs.len(),
        ..ChainReport::default()
    };

    let mut successors: BTreeMap<Option<&str>, Vec<Uuid>> = BTreeMap::new();
    let mut previous: Option<&AuditLog> = None;

    for log in logs {
        if !verify_entry(log).valid {
            report.tampered.push(log.id);
        }

        let expected = previous.map(|p| p.hash.clone());
        if log.previous_hash != expected {
            report.broken_links.push(BrokenLink {
                id: log.id,
                expected_previous_hash: expected,
                actual_previous_hash: log.previous_hash.clone(),
            });
        }

        successors
            .entry(log.previous_hash.as_deref())
            .or_default()
            .push(log.id);
        previous = Some(log);
    }

    report.forks = successors
        .into_iter()
        .filter(|(_, entries)| entries.len() > 1)
        .map(|(previous_hash, entries)| ChainFork {
            previous_hash: previous_hash.map(str::to_string),
            entries,
        })
        .collect();

    report.valid =
        report.tampered.is_empty() && report.broken_links.is_empty() && report.forks.is_empty();
    report
}
