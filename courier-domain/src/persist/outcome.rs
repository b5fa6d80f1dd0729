use crate::delivery::{AttemptStatus, DeliveryAttempt, DeliveryRecord};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 消息类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Sms,
    Mms,
    Email,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Sms => "sms",
            MessageKind::Mms => "mms",
            MessageKind::Email => "email",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 投递结果：对应一行消息记录
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    id: Uuid,
    to_contact: String,
    from_contact: String,
    body: String,
    #[builder(default)]
    kind: MessageKind,
    timestamp: DateTime<Utc>,
    /// 运营商最后一次报告的状态
    status: String,
    attempt_status: AttemptStatus,
    conversation_id: Uuid,
    external_sid: Option<String>,
    direction: Option<String>,
    error_code: Option<i64>,
    error_message: Option<String>,
    #[builder(default)]
    num_media: u32,
    #[builder(default = 1)]
    num_segments: u32,
    price: Option<f64>,
    price_unit: Option<String>,
    date_sent: Option<DateTime<Utc>>,
    date_updated: Option<DateTime<Utc>>,
    #[builder(default)]
    retry_count: u32,
    #[builder(default)]
    delivery_poll_count: u32,
}

impl DeliveryOutcome {
    /// 由尝试与最后观察到的运营商记录组装
    pub fn from_attempt(
        attempt: &DeliveryAttempt,
        record: &DeliveryRecord,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let request = attempt.request();
        Self {
            id: attempt.id(),
            to_contact: request.to().to_string(),
            from_contact: request.from().to_string(),
            body: request.body().to_string(),
            kind: MessageKind::Sms,
            timestamp,
            status: record.status.to_string(),
            attempt_status: attempt.status(),
            conversation_id: request.conversation_id(),
            external_sid: Some(record.carrier_ref.clone()),
            direction: record.direction.clone(),
            error_code: record.error_code,
            error_message: record.error_message.clone(),
            num_media: record.num_media,
            num_segments: record.num_segments,
            price: record.price,
            price_unit: record.price_unit.clone(),
            date_sent: record.date_sent,
            date_updated: record.date_updated,
            retry_count: attempt.retry_count(),
            delivery_poll_count: attempt.delivery_poll_count(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn to_contact(&self) -> &str {
        &self.to_contact
    }

    pub fn from_contact(&self) -> &str {
        &self.from_contact
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn attempt_status(&self) -> AttemptStatus {
        self.attempt_status
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn external_sid(&self) -> Option<&str> {
        self.external_sid.as_deref()
    }

    pub fn direction(&self) -> Option<&str> {
        self.direction.as_deref()
    }

    pub fn error_code(&self) -> Option<i64> {
        self.error_code
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn num_media(&self) -> u32 {
        self.num_media
    }

    pub fn num_segments(&self) -> u32 {
        self.num_segments
    }

    pub fn price(&self) -> Option<f64> {
        self.price
    }

    pub fn price_unit(&self) -> Option<&str> {
        self.price_unit.as_deref()
    }

    pub fn date_sent(&self) -> Option<DateTime<Utc>> {
        self.date_sent
    }

    pub fn date_updated(&self) -> Option<DateTime<Utc>> {
        self.date_updated
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn delivery_poll_count(&self) -> u32 {
        self.delivery_poll_count
    }
}
