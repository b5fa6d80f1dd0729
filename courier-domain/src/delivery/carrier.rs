//! 运营商（Carrier）协议
//!
//! 投递管道只依赖两个调用：提交消息与按运营商引用查询状态。
//! 响应保留原始状态码、JSON 主体与响应头，由管道自行解析驱动状态机。
//!
use crate::conversation::conversation_id;
use crate::error::DomainResult as Result;
use async_trait::async_trait;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// 限流状态码
pub const RATE_LIMITED: u16 = 429;

/// 待发送的出站消息
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct OutboundMessage {
    to: String,
    from: String,
    body: String,
}

impl OutboundMessage {
    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn conversation_id(&self) -> Uuid {
        conversation_id(&self.to, &self.from)
    }
}

/// 运营商错误诊断字段（`code`/`message`/`more_info`）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierErrorDetail {
    pub code: Option<i64>,
    pub message: String,
    pub more_info: Option<String>,
}

/// 运营商原始响应
#[derive(Debug, Clone, PartialEq)]
pub struct CarrierResponse {
    status_code: u16,
    body: Value,
    headers: HashMap<String, String>,
}

impl CarrierResponse {
    pub fn new(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            body,
            headers: HashMap::new(),
        }
    }

    /// 附加响应头；名称统一小写存储
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.headers.extend(
            headers
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into())),
        );
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status_code == RATE_LIMITED
    }

    /// 提取错误诊断；主体缺字段时以状态码兜底
    pub fn error_detail(&self) -> CarrierErrorDetail {
        let code = match self.body.get("code") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        let message = self
            .body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("carrier responded with status {}", self.status_code));
        let more_info = self
            .body
            .get("more_info")
            .and_then(Value::as_str)
            .map(str::to_string);

        CarrierErrorDetail {
            code,
            message,
            more_info,
        }
    }
}

/// 运营商：提交消息与查询投递状态
#[async_trait]
pub trait Carrier: Send + Sync {
    async fn submit(&self, message: &OutboundMessage) -> Result<CarrierResponse>;

    async fn poll_status(&self, carrier_ref: &str) -> Result<CarrierResponse>;
}
