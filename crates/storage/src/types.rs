use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ConversationId, MessageId};

/// Title given to new conversations and to stored rows that lack one.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Chat";

/// Storage-local message role, decoupled from the chat-layer enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
}

impl MessageRecord {
    pub fn new(id: MessageId, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
        }
    }
}

/// Serializable projection of one conversation. Session handles never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: ConversationId,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
    pub created_at: DateTime<Utc>,
}

fn default_title() -> String {
    DEFAULT_CONVERSATION_TITLE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_uses_camel_case_and_lowercase_roles() {
        let record = ConversationRecord {
            id: ConversationId::parse("c1").expect("valid id"),
            title: "Greeting".to_string(),
            messages: vec![MessageRecord::new(
                MessageId::parse("m1").expect("valid id"),
                MessageRole::Assistant,
                "Hi",
            )],
            created_at: "2024-05-01T12:00:00Z".parse().expect("valid timestamp"),
        };

        let value = serde_json::to_value(&record).expect("serializes");

        assert_eq!(value["createdAt"], "2024-05-01T12:00:00Z");
        assert_eq!(value["messages"][0]["role"], "assistant");
        assert!(value.get("created_at").is_none());
    }

    #[test]
    fn missing_title_and_messages_take_defaults() {
        let raw = r#"{"id":"c1","createdAt":"2024-05-01T12:00:00.000Z"}"#;
        let record: ConversationRecord = serde_json::from_str(raw).expect("deserializes");

        assert_eq!(record.title, DEFAULT_CONVERSATION_TITLE);
        assert!(record.messages.is_empty());
    }
}
