use super::channel::kind_for_channel;
use crate::error::{DomainError, DomainResult};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 事件类别（由通道决定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    MessageUpdate,
    ConversationUpdate,
    Unknown,
}

/// 触发通知的行操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    #[serde(alias = "insert")]
    Insert,
    #[serde(alias = "update")]
    Update,
    #[serde(alias = "delete")]
    Delete,
}

/// 标准化的变更事件
///
/// 每条原始通知恰好产生一个；不做持久化，仅在监听器与订阅者之间传递。
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    kind: ChangeKind,
    conversation_id: Option<String>,
    action: Option<ChangeAction>,
    message_id: Option<String>,
    /// 监听器收到通知的时间
    #[serde(rename = "timestamp")]
    observed_at: DateTime<Utc>,
}

/// 通知负载：`{conversation_id, action, message_id}`，均可缺省
#[derive(Debug, Default, Deserialize)]
struct NotificationPayload {
    #[serde(default, deserialize_with = "opaque_id")]
    conversation_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_action")]
    action: Option<ChangeAction>,
    #[serde(default, deserialize_with = "opaque_id")]
    message_id: Option<String>,
}

// 触发器可能把主键编码为字符串或数字
fn opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, found {other}"
        ))),
    }
}

// 未知的行操作（如 TRUNCATE）记为 None，通知照常转发
fn lenient_action<'de, D>(deserializer: D) -> Result<Option<ChangeAction>, D::Error>
where
    D: Deserializer<'de>,
{
    let action = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => match s.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeAction::Insert),
            "UPDATE" => Some(ChangeAction::Update),
            "DELETE" => Some(ChangeAction::Delete),
            _ => None,
        },
        _ => None,
    };
    Ok(action)
}

impl ChangeEvent {
    /// 由一条原始通知构造事件；空负载视为 `{}`，非法 JSON 返回 `MalformedNotification`
    pub fn from_notification(
        channel: &str,
        payload: &str,
        observed_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let parsed = if payload.trim().is_empty() {
            NotificationPayload::default()
        } else {
            serde_json::from_str::<NotificationPayload>(payload).map_err(|e| {
                DomainError::MalformedNotification {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                }
            })?
        };

        Ok(ChangeEvent {
            kind: kind_for_channel(channel),
            conversation_id: parsed.conversation_id,
            action: parsed.action,
            message_id: parsed.message_id,
            observed_at,
        })
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn action(&self) -> Option<ChangeAction> {
        self.action
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// 序列化为推送给订阅者的 JSON 文本
    pub fn to_json(&self) -> DomainResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_payload() {
        let now = Utc::now();
        let ev = ChangeEvent::from_notification(
            "message_changes",
            r#"{"conversation_id":"c-1","action":"INSERT","message_id":"m-9"}"#,
            now,
        )
        .unwrap();

        assert_eq!(ev.kind(), ChangeKind::MessageUpdate);
        assert_eq!(ev.conversation_id(), Some("c-1"));
        assert_eq!(ev.action(), Some(ChangeAction::Insert));
        assert_eq!(ev.message_id(), Some("m-9"));
        assert_eq!(ev.observed_at(), now);
    }

    #[test]
    fn empty_payload_yields_empty_fields() {
        let ev = ChangeEvent::from_notification("conversation_changes", "", Utc::now()).unwrap();
        assert_eq!(ev.kind(), ChangeKind::ConversationUpdate);
        assert_eq!(ev.conversation_id(), None);
        assert_eq!(ev.action(), None);
        assert_eq!(ev.message_id(), None);
    }

    #[test]
    fn numeric_ids_and_lowercase_actions_are_accepted() {
        let ev = ChangeEvent::from_notification(
            "other",
            r#"{"conversation_id":17,"action":"delete","message_id":null}"#,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(ev.kind(), ChangeKind::Unknown);
        assert_eq!(ev.conversation_id(), Some("17"));
        assert_eq!(ev.action(), Some(ChangeAction::Delete));
        assert_eq!(ev.message_id(), None);
    }

    #[test]
    fn unknown_action_still_yields_event() {
        for payload in [
            r#"{"conversation_id":"c-1","action":"TRUNCATE"}"#,
            r#"{"conversation_id":"c-1","action":7}"#,
        ] {
            let ev = ChangeEvent::from_notification("message_changes", payload, Utc::now())
                .unwrap();
            assert_eq!(ev.kind(), ChangeKind::MessageUpdate);
            assert_eq!(ev.conversation_id(), Some("c-1"));
            assert_eq!(ev.action(), None);
        }
    }

    #[test]
    fn malformed_payload_is_rejected() {
        for bad in ["{not json", "42", r#"{"message_id":{}}"#] {
            let err = ChangeEvent::from_notification("message_changes", bad, Utc::now())
                .unwrap_err();
            assert!(
                matches!(err, DomainError::MalformedNotification { .. }),
                "payload {bad} gave {err:?}"
            );
        }
    }

    #[test]
    fn json_shape_matches_push_contract() {
        let ev = ChangeEvent::builder()
            .kind(ChangeKind::MessageUpdate)
            .conversation_id("c-1".into())
            .action(ChangeAction::Update)
            .observed_at(Utc::now())
            .build();
        let v: Value = serde_json::from_str(&ev.to_json().unwrap()).unwrap();
        assert_eq!(v["type"], "message_update");
        assert_eq!(v["action"], "UPDATE");
        assert_eq!(v["conversation_id"], "c-1");
        assert!(v["message_id"].is_null());
        assert!(v["timestamp"].is_string());
    }
}
