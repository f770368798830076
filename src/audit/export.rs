//! 审计日志导出（CSV）

use crate::audit::chain::canonical_timestamp;
use crate::models::audit::AuditLog;

/// CSV 列，顺序固定
pub const CSV_COLUMNS: [&str; 11] = [
    "Timestamp",
    "Action",
    "Entity Type",
    "Entity ID",
    "Performed By",
    "Description",
    "Severity",
    "Category",
    "IP Address",
    "Hash",
    "Previous Hash",
];

/// 表头一行 + 每条日志一行，行尾 CRLF
pub fn to_csv(logs: &[AuditLog]) -> String {
    let mut out = String::new();
    push_row(&mut out, CSV_COLUMNS.iter().map(|c| c.to_string()));

    for log in logs {
        push_row(
            &mut out,
            [
                canonical_timestamp(log.timestamp),
                log.action.as_str().to_string(),
                log.entity_type.as_str().to_string(),
                log.entity_id.map(|id| id.to_string()).unwrap_or_default(),
                log.performed_by.to_string(),
                log.description.clone(),
                log.severity.as_str().to_string(),
                log.category.as_str().to_string(),
                log.request_info.ip.clone().unwrap_or_default(),
                log.hash.clone(),
                log.previous_hash.clone().unwrap_or_default(),
            ],
        );
    }

    out
}

fn push_row(out: &mut String, fields: impl IntoIterator<Item = String>) {
    let row: Vec<String> = fields.into_iter().map(|f| escape(&f)).collect();
    out.push_str(&row.join(","));
    out.push_str("\r\n");
}

/// RFC 4180：包含逗号、引号或换行时加引号，内部引号加倍
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
