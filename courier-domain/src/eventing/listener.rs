//! 变更监听器（ChangeListener）
//!
//! 在连接抖动下维持对变更通知的持续订阅：
//! - `start`：幂等，启动后台监听任务；
//! - `stop`：发出停止信号并等待任务结束，释放连接；返回后不再产生任何事件；
//! - 监听循环：校验连接 → 有界等待拉取通知 → 解析并投递事件 → 空闲时短暂休眠。
//!
//! 连接级故障只会让当前连接失效，并在固定冷却后重建，不向调用方传播；
//! 单条负载解析失败只记录日志并跳过。循环没有致命错误路径，只有 `stop` 能结束它。
//!
use super::source::{ListenerConnection, NotificationSource, RawNotification};
use crate::change::{ChangeEvent, DEFAULT_CHANNELS};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 事件接收方：监听器把每个事件交给它（同步、不得阻塞）
pub trait ChangeEventSink: Send + Sync {
    fn emit(&self, event: ChangeEvent);
}

impl<F> ChangeEventSink for F
where
    F: Fn(ChangeEvent) + Send + Sync,
{
    fn emit(&self, event: ChangeEvent) {
        self(event)
    }
}

/// 监听器配置
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// 始终订阅的通道集合
    pub channels: Vec<String>,
    /// 单次拉取的最长等待
    pub poll_timeout: Duration,
    /// 无通知时的休眠间隔
    pub idle_interval: Duration,
    /// 连接失败后的冷却时间
    pub reconnect_delay: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            channels: DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect(),
            poll_timeout: Duration::from_millis(100),
            idle_interval: Duration::from_millis(100),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

struct RunningLoop {
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct ChangeListener {
    source: Arc<dyn NotificationSource>,
    sink: Arc<dyn ChangeEventSink>,
    config: ListenerConfig,
    running: Mutex<Option<RunningLoop>>,
    starts: AtomicUsize,
}

impl ChangeListener {
    pub fn new(
        source: Arc<dyn NotificationSource>,
        sink: Arc<dyn ChangeEventSink>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            source,
            sink,
            config,
            running: Mutex::new(None),
            starts: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// 启动监听任务；已在运行时为空操作。返回本次是否真正启动了新任务。
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return false;
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(listen_loop(
            self.source.clone(),
            self.sink.clone(),
            self.config.clone(),
            token.clone(),
        ));
        *running = Some(RunningLoop { token, task });
        self.starts.fetch_add(1, Ordering::SeqCst);
        info!(channels = ?self.config.channels, "change listener started");
        true
    }

    /// 停止监听任务并等待其退出；可重复调用，也可由非启动方调用
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(RunningLoop { token, task }) = running.take() else {
            return;
        };

        token.cancel();
        if let Err(e) = task.await {
            error!(error = %e, "change listener task ended abnormally");
        }
        info!("change listener stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// 累计启动次数
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl Drop for ChangeListener {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }
    }
}

async fn listen_loop(
    source: Arc<dyn NotificationSource>,
    sink: Arc<dyn ChangeEventSink>,
    config: ListenerConfig,
    token: CancellationToken,
) {
    let mut conn: Option<Box<dyn ListenerConnection>> = None;

    while !token.is_cancelled() {
        if !conn.as_ref().is_some_and(|c| c.is_valid()) {
            if let Some(mut stale) = conn.take() {
                stale.close().await;
            }

            match source.connect(&config.channels).await {
                Ok(fresh) => {
                    info!(channels = ?config.channels, "listener connection established");
                    conn = Some(fresh);
                }
                Err(e) => {
                    error!(
                        error = %e,
                        retry_in = ?config.reconnect_delay,
                        "failed to establish listener connection"
                    );
                    if pause(&token, config.reconnect_delay).await {
                        break;
                    }
                    continue;
                }
            }
        }

        let Some(active) = conn.as_mut() else {
            continue;
        };

        match active.poll(config.poll_timeout).await {
            Ok(batch) if batch.is_empty() => {
                if pause(&token, config.idle_interval).await {
                    break;
                }
            }
            Ok(batch) => {
                for notification in batch {
                    dispatch(sink.as_ref(), &notification);
                }
            }
            Err(e) => {
                error!(
                    error = %e,
                    retry_in = ?config.reconnect_delay,
                    "listener connection lost"
                );
                if let Some(mut broken) = conn.take() {
                    broken.close().await;
                }
                if pause(&token, config.reconnect_delay).await {
                    break;
                }
            }
        }
    }

    if let Some(mut last) = conn.take() {
        last.close().await;
    }
    debug!("listen loop exited");
}

fn dispatch(sink: &dyn ChangeEventSink, notification: &RawNotification) {
    match ChangeEvent::from_notification(notification.channel(), notification.payload(), Utc::now())
    {
        Ok(event) => {
            debug!(
                channel = notification.channel(),
                kind = ?event.kind(),
                conversation_id = ?event.conversation_id(),
                "notification received"
            );
            sink.emit(event);
        }
        Err(e) => {
            warn!(
                channel = notification.channel(),
                error = %e,
                "dropping malformed notification"
            );
        }
    }
}

/// 可被 `stop` 打断的休眠；返回 true 表示已收到停止信号
async fn pause(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
