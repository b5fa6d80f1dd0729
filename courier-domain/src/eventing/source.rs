//! 通知源（NotificationSource）协议
//!
//! 抽象数据存储的发布/订阅通道：每次 `connect` 都建立一条全新的监听连接，
//! 并在返回前完成全部通道的订阅；连接一旦失效即被丢弃重建，不做原地修复。
//!
use crate::error::DomainResult as Result;
use async_trait::async_trait;
use std::time::Duration;

/// 数据存储投递的原始通知：`(channel_name, json_payload)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    channel: String,
    payload: String,
}

impl RawNotification {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// 通知源：负责创建已订阅全部通道的监听连接
#[async_trait]
pub trait NotificationSource: Send + Sync {
    async fn connect(&self, channels: &[String]) -> Result<Box<dyn ListenerConnection>>;
}

/// 单条监听连接，由监听器独占
#[async_trait]
pub trait ListenerConnection: Send {
    /// 连接是否仍可用
    fn is_valid(&self) -> bool;

    /// 取出当前待处理的通知，最多等待 `wait`；无通知时返回空批次。
    /// 连接级故障返回 `DomainError::Connection`。
    async fn poll(&mut self, wait: Duration) -> Result<Vec<RawNotification>>;

    /// 释放底层连接
    async fn close(&mut self);
}
