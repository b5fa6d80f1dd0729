//! 单次发送尝试（DeliveryAttempt）
//!
//! 每次 `send` 创建一个尝试，仅由投递管道修改；终态记录恰好交给持久化一次。
//!
use super::carrier::OutboundMessage;
use super::record::DeliveryStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Submitted,
    RateLimited,
    Sent,
    Delivered,
    Undelivered,
    Failed,
}

impl AttemptStatus {
    /// 由运营商状态映射；未终结的状态都归为 `Sent`
    pub fn from_carrier(status: &DeliveryStatus) -> Self {
        match status {
            DeliveryStatus::Delivered => AttemptStatus::Delivered,
            DeliveryStatus::Undelivered => AttemptStatus::Undelivered,
            DeliveryStatus::Failed => AttemptStatus::Failed,
            _ => AttemptStatus::Sent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::RateLimited => "rate_limited",
            AttemptStatus::Sent => "sent",
            AttemptStatus::Delivered => "delivered",
            AttemptStatus::Undelivered => "undelivered",
            AttemptStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryAttempt {
    id: Uuid,
    request: OutboundMessage,
    carrier_ref: Option<String>,
    status: AttemptStatus,
    retry_count: u32,
    delivery_poll_count: u32,
}

impl DeliveryAttempt {
    pub fn new(request: OutboundMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            carrier_ref: None,
            status: AttemptStatus::Submitted,
            retry_count: 0,
            delivery_poll_count: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &OutboundMessage {
        &self.request
    }

    pub fn carrier_ref(&self) -> Option<&str> {
        self.carrier_ref.as_deref()
    }

    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn delivery_poll_count(&self) -> u32 {
        self.delivery_poll_count
    }

    pub(crate) fn rate_limited(&mut self, retry_count: u32) {
        self.status = AttemptStatus::RateLimited;
        self.retry_count = retry_count;
    }

    pub(crate) fn resubmitted(&mut self) {
        self.status = AttemptStatus::Submitted;
    }

    pub(crate) fn accepted(&mut self, carrier_ref: &str, status: &DeliveryStatus, retry_count: u32) {
        self.carrier_ref = Some(carrier_ref.to_string());
        self.status = AttemptStatus::from_carrier(status);
        self.retry_count = retry_count;
    }

    pub(crate) fn observed(&mut self, status: &DeliveryStatus, poll_count: u32) {
        self.status = AttemptStatus::from_carrier(status);
        self.delivery_poll_count = poll_count;
    }

    pub(crate) fn failed(&mut self, retry_count: u32) {
        self.status = AttemptStatus::Failed;
        self.retry_count = retry_count;
    }

    pub(crate) fn poll_failed(&mut self, poll_count: u32) {
        self.status = AttemptStatus::Failed;
        self.delivery_poll_count = poll_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_carrier_status() {
        assert_eq!(
            AttemptStatus::from_carrier(&DeliveryStatus::Queued),
            AttemptStatus::Sent
        );
        assert_eq!(
            AttemptStatus::from_carrier(&DeliveryStatus::Undelivered),
            AttemptStatus::Undelivered
        );
        assert_eq!(AttemptStatus::RateLimited.to_string(), "rate_limited");
    }

    #[test]
    fn attempt_tracks_counters() {
        let msg = OutboundMessage::builder()
            .to("+1".into())
            .from("+2".into())
            .body("x".into())
            .build();
        let mut attempt = DeliveryAttempt::new(msg);
        assert_eq!(attempt.status(), AttemptStatus::Submitted);

        attempt.rate_limited(2);
        attempt.resubmitted();
        attempt.accepted("SM1", &DeliveryStatus::Queued, 2);
        attempt.observed(&DeliveryStatus::Delivered, 3);

        assert_eq!(attempt.carrier_ref(), Some("SM1"));
        assert_eq!(attempt.status(), AttemptStatus::Delivered);
        assert_eq!(attempt.retry_count(), 2);
        assert_eq!(attempt.delivery_poll_count(), 3);
    }
}
