//! 事件子系统（eventing）
//!
//! 变更通知从数据存储到推送订阅者的传播链路：
//! - `NotificationSource`：数据存储通知通道的统一抽象，每次连接都重新订阅全部通道；
//! - `ChangeListener`：长驻监听任务，断线自愈，把通知转换为 `ChangeEvent`；
//! - `SubscriberRegistry`：按需启停监听器，并将事件扇出到所有订阅者的发件箱；
//! - `Outbox`：订阅者发件箱协议（非阻塞写入）。
//!
//! 该模块仅定义协议与运行时，不绑定具体存储实现，Postgres 适配见 `infra`。
//!
pub mod listener;
pub mod outbox;
pub mod registry;
pub mod source;
pub mod source_inmemory;

pub use listener::{ChangeEventSink, ChangeListener, ListenerConfig};
pub use outbox::{EventFrame, Outbox, OutboxError, SubscriberId, Subscription};
pub use registry::{BroadcastReport, SubscriberRegistry};
pub use source::{ListenerConnection, NotificationSource, RawNotification};
pub use source_inmemory::InMemoryNotificationSource;
