//! Postgres LISTEN/NOTIFY 通知源
//!
use crate::error::{DomainError, DomainResult as Result};
use crate::eventing::{ListenerConnection, NotificationSource, RawNotification};
use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgPool};
use std::time::Duration;
use tracing::{debug, warn};

pub struct PgNotificationSource {
    pool: PgPool,
}

impl PgNotificationSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSource for PgNotificationSource {
    async fn connect(&self, channels: &[String]) -> Result<Box<dyn ListenerConnection>> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener
            .listen_all(channels.iter().map(String::as_str))
            .await?;
        debug!(channels = ?channels, "LISTEN issued");
        Ok(Box::new(PgListenerConnection {
            listener: Some(listener),
        }))
    }
}

struct PgListenerConnection {
    listener: Option<PgListener>,
}

#[async_trait]
impl ListenerConnection for PgListenerConnection {
    fn is_valid(&self) -> bool {
        self.listener.is_some()
    }

    async fn poll(&mut self, wait: Duration) -> Result<Vec<RawNotification>> {
        let Some(listener) = self.listener.as_mut() else {
            return Err(DomainError::connection("listener connection closed"));
        };

        let first = match tokio::time::timeout(wait, listener.try_recv()).await {
            Err(_) => return Ok(Vec::new()),
            Ok(Ok(Some(n))) => n,
            // 连接已断开；交由监听循环重建，不使用 PgListener 的隐式重连
            Ok(Ok(None)) => {
                self.listener = None;
                return Err(DomainError::connection("notification connection lost"));
            }
            Ok(Err(e)) => {
                self.listener = None;
                return Err(e.into());
            }
        };

        let mut batch = vec![RawNotification::new(first.channel(), first.payload())];
        while let Some(n) = listener.next_buffered() {
            batch.push(RawNotification::new(n.channel(), n.payload()));
        }
        Ok(batch)
    }

    async fn close(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            match listener.unlisten_all().await {
                Ok(()) => debug!("UNLISTEN issued"),
                Err(e) => warn!(error = %e, "UNLISTEN failed, dropping connection"),
            }
        }
    }
}
