//! 内存版通知源（InMemoryNotificationSource）
//!
//! 基于 `tokio::sync::broadcast` 模拟数据存储的 LISTEN/NOTIFY：
//! - `notify`：向当前所有在线连接广播一条通知，无连接时通知直接丢失；
//! - `sever_connections`：使现有连接全部失效，用于模拟断线；
//! - `fail_next_connects`：令接下来若干次 `connect` 失败，用于模拟鉴权/网络故障。
//!
//! 典型用途：测试环境、示例与本地开发。

use super::source::{ListenerConnection, NotificationSource, RawNotification};
use crate::error::{DomainError, DomainResult as Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

#[derive(Clone)]
pub struct InMemoryNotificationSource {
    inner: Arc<Inner>,
}

struct Inner {
    tx: broadcast::Sender<RawNotification>,
    epoch: AtomicU64,
    connects: AtomicUsize,
    open: AtomicUsize,
    failures_left: AtomicUsize,
}

impl InMemoryNotificationSource {
    /// `capacity` 为每条连接的缓冲容量
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                tx,
                epoch: AtomicU64::new(0),
                connects: AtomicUsize::new(0),
                open: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(0),
            }),
        }
    }

    /// 发送通知，返回收到该通知的连接数
    pub fn notify(&self, channel: &str, payload: &str) -> usize {
        self.inner
            .tx
            .send(RawNotification::new(channel, payload))
            .unwrap_or(0)
    }

    pub fn sever_connections(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn fail_next_connects(&self, n: usize) {
        self.inner.failures_left.store(n, Ordering::SeqCst);
    }

    /// 成功建立的连接总数
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// 尚未释放的连接数
    pub fn open_connections(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryNotificationSource {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl NotificationSource for InMemoryNotificationSource {
    async fn connect(&self, channels: &[String]) -> Result<Box<dyn ListenerConnection>> {
        let failed = self
            .inner
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(DomainError::connection("simulated connect failure"));
        }

        let conn = InMemoryConnection {
            rx: self.inner.tx.subscribe(),
            channels: channels.to_vec(),
            epoch: self.inner.epoch.load(Ordering::SeqCst),
            inner: self.inner.clone(),
            closed: false,
        };
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(conn))
    }
}

struct InMemoryConnection {
    rx: broadcast::Receiver<RawNotification>,
    channels: Vec<String>,
    epoch: u64,
    inner: Arc<Inner>,
    closed: bool,
}

impl InMemoryConnection {
    fn accept(&self, n: RawNotification, batch: &mut Vec<RawNotification>) {
        if self.channels.iter().any(|c| c == n.channel()) {
            batch.push(n);
        }
    }
}

#[async_trait]
impl ListenerConnection for InMemoryConnection {
    fn is_valid(&self) -> bool {
        !self.closed && self.epoch == self.inner.epoch.load(Ordering::SeqCst)
    }

    async fn poll(&mut self, wait: Duration) -> Result<Vec<RawNotification>> {
        if !self.is_valid() {
            return Err(DomainError::connection("connection severed"));
        }

        let mut batch = Vec::new();
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Err(_elapsed) => return Ok(batch),
            Ok(Ok(n)) => self.accept(n, &mut batch),
            Ok(Err(RecvError::Lagged(skipped))) => {
                warn!(skipped, "in-memory listener lagged, notifications dropped");
            }
            Ok(Err(RecvError::Closed)) => {
                return Err(DomainError::connection("notification channel closed"));
            }
        }

        loop {
            match self.rx.try_recv() {
                Ok(n) => self.accept(n, &mut batch),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "in-memory listener lagged, notifications dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        Ok(batch)
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        self.inner.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> Vec<String> {
        vec!["message_changes".to_string()]
    }

    #[tokio::test]
    async fn delivers_only_subscribed_channels_in_order() {
        let source = InMemoryNotificationSource::new(16);
        let mut conn = source.connect(&channels()).await.unwrap();

        source.notify("message_changes", "1");
        source.notify("elsewhere", "x");
        source.notify("message_changes", "2");

        let batch = conn.poll(Duration::from_millis(50)).await.unwrap();
        let payloads: Vec<&str> = batch.iter().map(|n| n.payload()).collect();
        assert_eq!(payloads, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn notifications_without_connection_are_lost() {
        let source = InMemoryNotificationSource::new(16);
        assert_eq!(source.notify("message_changes", "lost"), 0);

        let mut conn = source.connect(&channels()).await.unwrap();
        let batch = conn.poll(Duration::from_millis(20)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn severed_connection_reports_error_and_drop_releases() {
        let source = InMemoryNotificationSource::new(16);
        let mut conn = source.connect(&channels()).await.unwrap();
        assert_eq!(source.open_connections(), 1);

        source.sever_connections();
        assert!(!conn.is_valid());
        let err = conn.poll(Duration::from_millis(10)).await.unwrap_err();
        assert!(err.is_connectivity());

        drop(conn);
        assert_eq!(source.open_connections(), 0);
    }

    #[tokio::test]
    async fn scripted_connect_failures() {
        let source = InMemoryNotificationSource::new(16);
        source.fail_next_connects(2);
        assert!(source.connect(&channels()).await.is_err());
        assert!(source.connect(&channels()).await.is_err());
        assert!(source.connect(&channels()).await.is_ok());
        assert_eq!(source.connect_count(), 1);
    }
}
