//! 选举管理服务库
//! 候选人、选票、职位、选民管理与防篡改审计日志

pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod telemetry;
pub mod validation;
