//! 变更传播与运营商投递的领域层（courier-domain）
//!
//! 两条彼此独立、仅通过数据存储交汇的链路：
//! - 变更传播：数据存储通知 → `ChangeListener` → `SubscriberRegistry` → 订阅者发件箱（`eventing`）
//! - 出站投递：提交 → 限流退避 → 状态轮询 → 持久化（`delivery`、`persist`）
//!
//! 另提供变更事件模型（`change`）、会话标识（`conversation`）与统一错误类型（`error`）。
//! 具体基础设施（Postgres、运营商 HTTP）位于 `infra`，按 feature 启用。
//!
//! 典型用法：
//! 1. 以某个 `NotificationSource` 构建 `SubscriberRegistry`，由连接处理方调用 `subscribe`/`remove_subscriber`；
//! 2. 以 `Carrier` 与 `DeliveryOutcomeRepository` 构建 `DeliveryPipeline`，对每条出站消息调用 `send`。
//!
pub mod change;
pub mod conversation;
pub mod delivery;
pub mod error;
pub mod eventing;
pub mod infra;
pub mod persist;
