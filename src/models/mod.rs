//! 数据模型模块
//! 候选人、选票、职位、选民、用户与审计日志

pub mod audit;
pub mod ballot;
pub mod candidate;
pub mod jurisdiction;
pub mod pagination;
pub mod position;
pub mod user;
pub mod voter;
