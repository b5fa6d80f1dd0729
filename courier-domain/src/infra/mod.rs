//! 基础设施实现（按 feature 启用）
//!
//! - `infra-sqlx`：Postgres LISTEN 通知源、投递结果仓储；
//! - `infra-reqwest`：运营商 HTTP 客户端。
//!
#[cfg(feature = "infra-sqlx")]
mod pg_listener;
#[cfg(feature = "infra-sqlx")]
mod pg_outcome_repository;
#[cfg(feature = "infra-reqwest")]
mod twilio;

#[cfg(feature = "infra-sqlx")]
pub use pg_listener::PgNotificationSource;
#[cfg(feature = "infra-sqlx")]
pub use pg_outcome_repository::PgDeliveryOutcomeRepository;
#[cfg(feature = "infra-reqwest")]
pub use twilio::{CarrierConfig, DEFAULT_BASE_URL, TwilioCarrier};
