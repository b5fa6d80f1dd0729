//! 标准化投递记录（DeliveryRecord）
//!
//! 从运营商的消息资源中提取驱动状态机与持久化所需的字段，
//! 并解析响应头中的请求元信息（`ResponseMeta`）。
//!
use super::carrier::CarrierResponse;
use crate::error::{DomainError, DomainResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 运营商侧的消息状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeliveryStatus {
    Accepted,
    Scheduled,
    Queued,
    Sending,
    Sent,
    Delivered,
    Undelivered,
    Failed,
    Other(String),
}

impl DeliveryStatus {
    /// 终态：delivered / undelivered / failed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::Undelivered | DeliveryStatus::Failed
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeliveryStatus::Accepted => "accepted",
            DeliveryStatus::Scheduled => "scheduled",
            DeliveryStatus::Queued => "queued",
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Undelivered => "undelivered",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Other(s) => s,
        }
    }
}

impl From<&str> for DeliveryStatus {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "accepted" => DeliveryStatus::Accepted,
            "scheduled" => DeliveryStatus::Scheduled,
            "queued" => DeliveryStatus::Queued,
            "sending" => DeliveryStatus::Sending,
            "sent" => DeliveryStatus::Sent,
            "delivered" => DeliveryStatus::Delivered,
            "undelivered" => DeliveryStatus::Undelivered,
            "failed" => DeliveryStatus::Failed,
            other => DeliveryStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for DeliveryStatus {
    fn from(s: String) -> Self {
        DeliveryStatus::from(s.as_str())
    }
}

impl From<DeliveryStatus> for String {
    fn from(s: DeliveryStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 标准化投递记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// 运营商引用（消息 SID）
    pub carrier_ref: String,
    pub status: DeliveryStatus,
    pub to: String,
    pub from: String,
    pub body: String,
    pub direction: Option<String>,
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
    pub num_media: u32,
    pub num_segments: u32,
    pub price: Option<f64>,
    pub price_unit: Option<String>,
    pub date_created: Option<DateTime<Utc>>,
    pub date_sent: Option<DateTime<Utc>>,
    pub date_updated: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    /// 解析运营商消息资源；缺少 `sid` 或 `status` 视为无法解析的响应
    pub fn from_carrier_json(body: &Value) -> DomainResult<Self> {
        let carrier_ref = str_field(body, "sid")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DomainError::InvalidCarrierResponse {
                reason: "missing message sid".to_string(),
            })?;
        let status = str_field(body, "status")
            .filter(|s| !s.is_empty())
            .map(DeliveryStatus::from)
            .ok_or_else(|| DomainError::InvalidCarrierResponse {
                reason: format!("missing status for message {carrier_ref}"),
            })?;

        Ok(Self {
            carrier_ref,
            status,
            to: str_field(body, "to").unwrap_or_default(),
            from: str_field(body, "from").unwrap_or_default(),
            body: str_field(body, "body").unwrap_or_default(),
            direction: str_field(body, "direction"),
            error_code: num_field(body, "error_code").map(|n| n as i64),
            error_message: str_field(body, "error_message"),
            num_media: num_field(body, "num_media").map_or(0, |n| n as u32),
            num_segments: num_field(body, "num_segments").map_or(1, |n| n as u32),
            price: num_field(body, "price"),
            price_unit: str_field(body, "price_unit"),
            date_created: date_field(body, "date_created"),
            date_sent: date_field(body, "date_sent"),
            date_updated: date_field(body, "date_updated"),
        })
    }

    pub fn from_response(response: &CarrierResponse) -> DomainResult<Self> {
        Self::from_carrier_json(response.body())
    }
}

fn str_field(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}

// 运营商把部分数值编码为字符串（如 price: "-0.0075"）
fn num_field(body: &Value, key: &str) -> Option<f64> {
    match body.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn date_field(body: &Value, key: &str) -> Option<DateTime<Utc>> {
    body.get(key).and_then(Value::as_str).and_then(parse_timestamp)
}

/// 依次尝试 HTTP 日期（RFC 2822）、RFC 3339 与无时区 ISO 格式；均失败返回 None
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// 运营商响应头中的请求元信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub request_id: Option<String>,
    pub concurrent_requests: Option<u32>,
    pub request_duration: Option<f64>,
    pub date: Option<DateTime<Utc>>,
}

impl ResponseMeta {
    pub fn from_response(response: &CarrierResponse) -> Self {
        Self {
            request_id: response.header("twilio-request-id").map(str::to_string),
            concurrent_requests: response
                .header("twilio-concurrent-requests")
                .and_then(|v| v.trim().parse().ok()),
            request_duration: response
                .header("twilio-request-duration")
                .and_then(|v| v.trim().parse().ok()),
            date: response.header("date").and_then(parse_timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "account_sid": "ACd67d920e2f8354696051a98d2d444815",
            "api_version": "2010-04-01",
            "body": "Test message",
            "date_created": "Mon, 26 May 2025 19:22:31 +0000",
            "date_sent": "2024-01-15T10:30:05Z",
            "date_updated": "2024-01-15T10:30:05",
            "direction": "outbound-api",
            "error_code": null,
            "error_message": null,
            "from": "+18333450761",
            "num_media": "0",
            "num_segments": "1",
            "price": "-0.0075",
            "price_unit": "USD",
            "sid": "SM1234567890abcdef1234567890abcdef",
            "status": "sent",
            "to": "+18777804236"
        })
    }

    #[test]
    fn parses_carrier_message_resource() {
        let rec = DeliveryRecord::from_carrier_json(&sample()).unwrap();
        assert_eq!(rec.carrier_ref, "SM1234567890abcdef1234567890abcdef");
        assert_eq!(rec.status, DeliveryStatus::Sent);
        assert!(!rec.status.is_terminal());
        assert_eq!(rec.from, "+18333450761");
        assert_eq!(rec.num_segments, 1);
        assert_eq!(rec.price, Some(-0.0075));
        assert_eq!(rec.error_code, None);
        assert!(rec.date_created.is_some());
        assert!(rec.date_sent.is_some());
        assert!(rec.date_updated.is_some());
    }

    #[test]
    fn missing_sid_is_invalid() {
        let err = DeliveryRecord::from_carrier_json(&json!({"status": "queued"})).unwrap_err();
        assert!(matches!(err, DomainError::InvalidCarrierResponse { .. }));
    }

    #[test]
    fn unparseable_dates_become_none() {
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn terminal_statuses() {
        for s in ["delivered", "undelivered", "failed", "DELIVERED"] {
            assert!(DeliveryStatus::from(s).is_terminal(), "{s}");
        }
        for s in ["queued", "sent", "sending", "accepted", "read"] {
            assert!(!DeliveryStatus::from(s).is_terminal(), "{s}");
        }
        assert_eq!(DeliveryStatus::from("read").as_str(), "read");
    }

    #[test]
    fn response_meta_from_headers() {
        let resp = CarrierResponse::new(201, sample()).with_headers([
            ("Twilio-Request-Id", "RQ1234"),
            ("Twilio-Concurrent-Requests", "5"),
            ("Twilio-Request-Duration", "0.256"),
            ("Date", "Mon, 26 May 2025 19:22:31 GMT"),
        ]);
        let meta = ResponseMeta::from_response(&resp);
        assert_eq!(meta.request_id.as_deref(), Some("RQ1234"));
        assert_eq!(meta.concurrent_requests, Some(5));
        assert_eq!(meta.request_duration, Some(0.256));
        assert!(meta.date.is_some());
    }
}
