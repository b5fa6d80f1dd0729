//! 通道 → 事件类别映射表
//!
use super::ChangeKind;

/// 消息表变更通道
pub const MESSAGE_CHANNEL: &str = "message_changes";
/// 会话变更通道
pub const CONVERSATION_CHANNEL: &str = "conversation_changes";

/// 监听器始终订阅的固定通道集合
pub const DEFAULT_CHANNELS: [&str; 2] = [MESSAGE_CHANNEL, CONVERSATION_CHANNEL];

const CHANNEL_KINDS: [(&str, ChangeKind); 2] = [
    (MESSAGE_CHANNEL, ChangeKind::MessageUpdate),
    (CONVERSATION_CHANNEL, ChangeKind::ConversationUpdate),
];

/// 未登记的通道映射为 `ChangeKind::Unknown`
pub fn kind_for_channel(channel: &str) -> ChangeKind {
    CHANNEL_KINDS
        .iter()
        .find(|(name, _)| *name == channel)
        .map(|(_, kind)| *kind)
        .unwrap_or(ChangeKind::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_channels_map_to_kinds() {
        assert_eq!(kind_for_channel("message_changes"), ChangeKind::MessageUpdate);
        assert_eq!(
            kind_for_channel("conversation_changes"),
            ChangeKind::ConversationUpdate
        );
    }

    #[test]
    fn unmapped_channel_is_unknown() {
        assert_eq!(kind_for_channel("user_changes"), ChangeKind::Unknown);
        assert_eq!(kind_for_channel(""), ChangeKind::Unknown);
    }
}
