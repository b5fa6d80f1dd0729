//! 持久化（persist）
//!
//! 定义投递结果的存储形状（`DeliveryOutcome`）与仓储协议：
//! - `save_delivery_outcome` 按记录 id 幂等，重复保存不产生新行；
//! - `InMemoryOutcomeRepository` 供测试与本地运行使用。
//!
//! 具体存储后端（如 Postgres）在 `infra` 中实现并注入。
//!
mod outcome;
mod outcome_repository;

pub use outcome::{DeliveryOutcome, MessageKind};
pub use outcome_repository::{DeliveryOutcomeRepository, InMemoryOutcomeRepository};
