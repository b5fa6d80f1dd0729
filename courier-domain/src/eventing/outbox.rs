//! 订阅者发件箱（Outbox）
//!
//! 每个推送订阅者对应一个发件箱，注册表把序列化后的事件写入其中；
//! 写入必须是非阻塞的，失败（已关闭/已满）即视为订阅者断开。
//!
use futures_core::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// 序列化后的事件帧，同一事件在所有订阅者之间共享
pub type EventFrame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OutboxError {
    #[error("outbox closed")]
    Closed,
    #[error("outbox full")]
    Full,
}

/// 发件箱：非阻塞写入
pub trait Outbox: Send + Sync {
    fn put(&self, frame: EventFrame) -> Result<(), OutboxError>;
}

impl Outbox for mpsc::UnboundedSender<EventFrame> {
    fn put(&self, frame: EventFrame) -> Result<(), OutboxError> {
        self.send(frame).map_err(|_| OutboxError::Closed)
    }
}

impl Outbox for mpsc::Sender<EventFrame> {
    fn put(&self, frame: EventFrame) -> Result<(), OutboxError> {
        self.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => OutboxError::Full,
            TrySendError::Closed(_) => OutboxError::Closed,
        })
    }
}

/// 订阅者标识（即其发件箱的身份）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl SubscriberId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// 由注册表创建的无界订阅：持有接收端，连接处理方负责在断开时注销
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<EventFrame>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, rx: mpsc::UnboundedReceiver<EventFrame>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<EventFrame> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EventFrame> {
        self.rx.try_recv().ok()
    }

    /// 转换为 'static 生命周期的帧流，便于上层转成流式响应
    pub fn into_stream(self) -> BoxStream<'static, EventFrame> {
        Box::pin(UnboundedReceiverStream::new(self.rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_outbox_reports_closed() {
        let (tx, rx) = mpsc::unbounded_channel::<EventFrame>();
        assert!(tx.put(Arc::from("a")).is_ok());
        drop(rx);
        assert_eq!(tx.put(Arc::from("b")), Err(OutboxError::Closed));
    }

    #[test]
    fn bounded_outbox_reports_full_without_blocking() {
        let (tx, _rx) = mpsc::channel::<EventFrame>(1);
        assert!(tx.put(Arc::from("a")).is_ok());
        assert_eq!(tx.put(Arc::from("b")), Err(OutboxError::Full));
    }
}
