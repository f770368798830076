//! 审计哈希链与导出

pub mod chain;
pub mod export;

pub use chain::{canonicalize, truncate_millis, verify_chain, verify_entry, HashInput};
pub use export::{to_csv, CSV_COLUMNS};
