//! 订阅者注册表（SubscriberRegistry）
//!
//! 按需驱动的事件扇出：
//! - 第一个订阅者加入时启动监听器，最后一个离开时停止监听器（仅在 0→1 / 1→0 时触发）；
//! - 监听器的每个事件只序列化一次，写入所有订阅者的发件箱；
//! - 写入失败的订阅者在本轮扫描结束后统一移除，不在遍历中修改集合。
//!
//! 成员变更与启停决策都在 `lifecycle` 锁内完成；广播路径只读成员表，
//! 剪除导致集合为空时异步触发一次对账，由对账在锁内停止监听器。
//!
use super::listener::{ChangeEventSink, ChangeListener, ListenerConfig};
use super::outbox::{EventFrame, Outbox, SubscriberId, Subscription};
use super::source::NotificationSource;
use crate::change::ChangeEvent;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

/// 单次广播的结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: usize,
}

#[derive(Clone)]
pub struct SubscriberRegistry {
    shared: Arc<RegistryShared>,
}

struct RegistryShared {
    members: DashMap<SubscriberId, Arc<dyn Outbox>>,
    lifecycle: Mutex<()>,
    listener: ChangeListener,
    next_id: AtomicU64,
}

/// 监听器回调：弱引用注册表，避免监听任务延长注册表的生命周期
struct BroadcastSink {
    shared: Weak<RegistryShared>,
}

impl ChangeEventSink for BroadcastSink {
    fn emit(&self, event: ChangeEvent) {
        if let Some(shared) = self.shared.upgrade() {
            shared.broadcast(&event);
        }
    }
}

impl SubscriberRegistry {
    pub fn new(source: Arc<dyn NotificationSource>, config: ListenerConfig) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<RegistryShared>| {
            let sink = Arc::new(BroadcastSink {
                shared: weak.clone(),
            });
            RegistryShared {
                members: DashMap::new(),
                lifecycle: Mutex::new(()),
                listener: ChangeListener::new(source, sink, config),
                next_id: AtomicU64::new(1),
            }
        });
        Self { shared }
    }

    /// 注册发件箱；若为第一个订阅者则启动监听器
    pub async fn add_subscriber(&self, outbox: Arc<dyn Outbox>) -> SubscriberId {
        let id = SubscriberId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));

        let _guard = self.shared.lifecycle.lock().await;
        let was_empty = self.shared.members.is_empty();
        self.shared.members.insert(id, outbox);
        info!(
            subscriber = %id,
            total = self.shared.members.len(),
            "subscriber added"
        );

        if was_empty {
            self.shared.listener.start().await;
        }
        id
    }

    /// 创建一个无界发件箱并注册，返回持有接收端的订阅
    pub async fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel::<EventFrame>();
        let id = self.add_subscriber(Arc::new(tx)).await;
        Subscription::new(id, rx)
    }

    /// 注销订阅者；集合变空时停止监听器并释放上游连接
    pub async fn remove_subscriber(&self, id: SubscriberId) {
        let _guard = self.shared.lifecycle.lock().await;
        let removed = self.shared.members.remove(&id).is_some();
        info!(
            subscriber = %id,
            removed,
            total = self.shared.members.len(),
            "subscriber removed"
        );

        if self.shared.members.is_empty() {
            self.shared.listener.stop().await;
        }
    }

    /// 向所有当前订阅者广播事件
    pub fn broadcast(&self, event: &ChangeEvent) -> BroadcastReport {
        self.shared.broadcast(event)
    }

    /// 清空订阅者并停止监听器
    pub async fn shutdown(&self) {
        let _guard = self.shared.lifecycle.lock().await;
        self.shared.members.clear();
        self.shared.listener.stop().await;
        info!("subscriber registry shut down");
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.members.len()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.shared.members.contains_key(&id)
    }

    pub async fn is_listening(&self) -> bool {
        self.shared.listener.is_running().await
    }

    /// 监听器累计启动次数
    pub fn listener_starts(&self) -> usize {
        self.shared.listener.start_count()
    }
}

impl RegistryShared {
    fn broadcast(self: &Arc<Self>, event: &ChangeEvent) -> BroadcastReport {
        let frame: EventFrame = match event.to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!(error = %e, "failed to serialize change event");
                return BroadcastReport::default();
            }
        };

        let mut delivered = 0;
        let mut disconnected = Vec::new();
        for member in self.members.iter() {
            match member.value().put(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(subscriber = %member.key(), error = %e, "push to subscriber failed");
                    disconnected.push(*member.key());
                }
            }
        }

        for id in &disconnected {
            self.members.remove(id);
        }

        debug!(
            kind = ?event.kind(),
            delivered,
            pruned = disconnected.len(),
            "change event broadcast"
        );

        if !disconnected.is_empty() && self.members.is_empty() {
            self.schedule_reconcile();
        }

        BroadcastReport {
            delivered,
            pruned: disconnected.len(),
        }
    }

    // 剪除使集合变空：在独立任务中取锁确认后停止监听器
    fn schedule_reconcile(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no runtime available to stop idle change listener");
            return;
        };

        let shared = self.clone();
        handle.spawn(async move {
            let _guard = shared.lifecycle.lock().await;
            if shared.members.is_empty() {
                info!("last subscriber pruned, stopping change listener");
                shared.listener.stop().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{ChangeAction, ChangeKind};
    use crate::eventing::InMemoryNotificationSource;
    use chrono::Utc;

    fn event(message_id: &str) -> ChangeEvent {
        ChangeEvent::builder()
            .kind(ChangeKind::MessageUpdate)
            .action(ChangeAction::Insert)
            .message_id(message_id.to_string())
            .observed_at(Utc::now())
            .build()
    }

    fn registry() -> SubscriberRegistry {
        SubscriberRegistry::new(
            Arc::new(InMemoryNotificationSource::new(16)),
            ListenerConfig::default(),
        )
    }

    #[tokio::test]
    async fn broadcast_serializes_once_and_preserves_fifo() {
        let reg = registry();
        let mut a = reg.subscribe().await;
        let mut b = reg.subscribe().await;

        reg.broadcast(&event("m-1"));
        reg.broadcast(&event("m-2"));

        for sub in [&mut a, &mut b] {
            let first: serde_json::Value =
                serde_json::from_str(&sub.try_recv().unwrap()).unwrap();
            let second: serde_json::Value =
                serde_json::from_str(&sub.try_recv().unwrap()).unwrap();
            assert_eq!(first["message_id"], "m-1");
            assert_eq!(second["message_id"], "m-2");
        }
        reg.shutdown().await;
    }

    #[tokio::test]
    async fn full_outbox_is_pruned_without_blocking() {
        let reg = registry();
        let (tx, _rx) = mpsc::channel::<EventFrame>(1);
        let slow = reg.add_subscriber(Arc::new(tx)).await;
        let mut healthy = reg.subscribe().await;

        assert_eq!(
            reg.broadcast(&event("m-1")),
            BroadcastReport {
                delivered: 2,
                pruned: 0
            }
        );
        assert_eq!(
            reg.broadcast(&event("m-2")),
            BroadcastReport {
                delivered: 1,
                pruned: 1
            }
        );
        assert!(!reg.contains(slow));
        assert!(healthy.try_recv().is_some());
        assert!(healthy.try_recv().is_some());
        reg.shutdown().await;
    }
}
