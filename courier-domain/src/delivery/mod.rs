//! 出站投递（delivery）
//!
//! - 运营商协议与原始响应（`Carrier`、`CarrierResponse`）；
//! - 标准化记录与响应元信息（`DeliveryRecord`、`ResponseMeta`）；
//! - 提交/轮询状态机（`SubmitState`、`PollState`）；
//! - 投递管道（`DeliveryPipeline`）。
//!
mod attempt;
mod carrier;
mod pipeline;
mod record;
mod state;

pub use attempt::{AttemptStatus, DeliveryAttempt};
pub use carrier::{Carrier, CarrierErrorDetail, CarrierResponse, OutboundMessage, RATE_LIMITED};
pub use pipeline::{DeliveryPipeline, DeliveryReceipt};
pub use record::{DeliveryRecord, DeliveryStatus, ResponseMeta, parse_timestamp};
pub use state::{DeliveryConfig, PollState, RetryCause, SubmitState};
