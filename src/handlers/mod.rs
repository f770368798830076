//! HTTP 处理器模块

pub mod audit;
pub mod auth;
pub mod ballot;
pub mod candidate;
pub mod health;
pub mod position;
pub mod voter;

use crate::middleware::AppState;
use crate::models::pagination::PageQuery;

/// 按配置的默认值 / 上限解析分页参数，返回 (page, limit, offset)
pub(crate) fn page_params(state: &AppState, query: PageQuery) -> (i64, i64, i64) {
    query.resolve(state.config.audit.default_page_size, state.config.audit.max_page_size)
}
