//! 变更事件（change）
//!
//! 描述数据存储经由通知通道推送的行变更，及其到标准化 `ChangeEvent` 的转换：
//! - `ChangeEvent`：一次通知对应的、只读的传输态事件；
//! - `ChangeKind`/`ChangeAction`：事件类别与行操作；
//! - `channel`：订阅通道与事件类别的静态映射表。
//!
pub mod channel;
mod event;

pub use channel::{CONVERSATION_CHANNEL, DEFAULT_CHANNELS, MESSAGE_CHANNEL, kind_for_channel};
pub use event::{ChangeAction, ChangeEvent, ChangeKind};
