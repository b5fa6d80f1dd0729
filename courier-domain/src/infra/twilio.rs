//! Twilio 运营商 HTTP 客户端
//!
//! - 提交：`POST {base_url}/Accounts/{sid}/Messages.json`，表单字段 `To`/`From`/`Body`；
//! - 查询：`GET {base_url}/Accounts/{sid}/Messages/{ref}.json`；
//! - Basic 认证（account sid / auth token）。
//!
//! 只负责传输：任何状态码都原样返回给投递管道，由管道判断限流与拒绝。
//!
use crate::delivery::{Carrier, CarrierResponse, OutboundMessage};
use crate::error::{DomainError, DomainResult as Result};
use async_trait::async_trait;
use bon::Builder;
use reqwest::{Client, Response};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.twilio.com/2010-04-01";

#[derive(Clone, Builder)]
pub struct CarrierConfig {
    #[builder(into, default = DEFAULT_BASE_URL.to_string())]
    base_url: String,
    #[builder(into)]
    account_sid: String,
    #[builder(into)]
    auth_token: String,
    #[builder(default = Duration::from_secs(30))]
    timeout: Duration,
}

impl CarrierConfig {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn account_sid(&self) -> &str {
        &self.account_sid
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

// 避免在日志中输出凭据
impl fmt::Debug for CarrierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CarrierConfig")
            .field("base_url", &self.base_url)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct TwilioCarrier {
    config: CarrierConfig,
    http: Client,
}

impl TwilioCarrier {
    pub fn new(config: CarrierConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DomainError::Config {
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { config, http })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    fn message_url(&self, carrier_ref: &str) -> String {
        format!(
            "{}/Accounts/{}/Messages/{}.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_sid,
            carrier_ref
        )
    }
}

#[async_trait]
impl Carrier for TwilioCarrier {
    async fn submit(&self, message: &OutboundMessage) -> Result<CarrierResponse> {
        let form = [
            ("To", message.to()),
            ("From", message.from()),
            ("Body", message.body()),
        ];
        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await?;
        into_carrier_response(response).await
    }

    async fn poll_status(&self, carrier_ref: &str) -> Result<CarrierResponse> {
        let response = self
            .http
            .get(self.message_url(carrier_ref))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .send()
            .await?;
        into_carrier_response(response).await
    }
}

async fn into_carrier_response(response: Response) -> Result<CarrierResponse> {
    let status_code = response.status().as_u16();
    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let text = response.text().await?;
    // 错误响应的主体未必是 JSON；无法解析时以 Null 交给管道兜底
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::Null)
    };
    debug!(status_code, "carrier responded");

    Ok(CarrierResponse::new(status_code, body).with_headers(headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_resource_urls() {
        let carrier = TwilioCarrier::new(
            CarrierConfig::builder()
                .base_url("https://api.example.test/2010-04-01/")
                .account_sid("AC123")
                .auth_token("secret")
                .build(),
        )
        .unwrap();
        assert_eq!(
            carrier.messages_url(),
            "https://api.example.test/2010-04-01/Accounts/AC123/Messages.json"
        );
        assert_eq!(
            carrier.message_url("SM9"),
            "https://api.example.test/2010-04-01/Accounts/AC123/Messages/SM9.json"
        );
    }

    #[test]
    fn debug_hides_token() {
        let config = CarrierConfig::builder()
            .account_sid("AC123")
            .auth_token("secret")
            .build();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
    }
}
