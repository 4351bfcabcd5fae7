use chrono::{DateTime, Utc};
use parley_llm::TranscriptLine;
use parley_storage::{
    ConversationRecord, DEFAULT_CONVERSATION_TITLE, MessageRecord, MessageRole,
};

pub use parley_storage::{ConversationId, MessageId};

/// Chat speaker role. `Error` marks a failed reply rendered in place of the assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    Error,
}

impl From<MessageRole> for Role {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => Self::User,
            MessageRole::Assistant => Self::Assistant,
            MessageRole::Error => Self::Error,
        }
    }
}

impl From<Role> for MessageRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
            Role::Error => Self::Error,
        }
    }
}

impl From<Role> for parley_llm::Role {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
            Role::Error => Self::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(id: MessageId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageId::new_v4(), Role::User, content)
    }

    /// Empty assistant turn that stream deltas are appended to.
    pub fn assistant_placeholder() -> Self {
        Self::new(MessageId::new_v4(), Role::Assistant, String::new())
    }

    fn from_record(record: MessageRecord) -> Self {
        Self::new(record.id, record.role.into(), record.content)
    }

    fn to_record(&self) -> MessageRecord {
        MessageRecord::new(self.id.clone(), self.role.into(), self.content.clone())
    }
}

/// Conversation aggregate. The model session bound to it lives in the store side table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: ConversationId::new_v4(),
            title: DEFAULT_CONVERSATION_TITLE.to_string(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn from_record(record: ConversationRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            messages: record.messages.into_iter().map(Message::from_record).collect(),
            created_at: record.created_at,
        }
    }

    pub fn to_record(&self) -> ConversationRecord {
        ConversationRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            messages: self.messages.iter().map(Message::to_record).collect(),
            created_at: self.created_at,
        }
    }

    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_CONVERSATION_TITLE
    }

    pub fn message(&self, message_id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| &message.id == message_id)
    }

    pub(crate) fn message_mut(&mut self, message_id: &MessageId) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .find(|message| &message.id == message_id)
    }

    /// Role-tagged lines fed to the title summarizer. Error turns are left out.
    pub fn transcript(&self) -> Vec<TranscriptLine> {
        self.messages
            .iter()
            .filter(|message| message.role != Role::Error)
            .map(|message| TranscriptLine::new(message.role.into(), message.content.clone()))
            .collect()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn record_conversion_keeps_every_field() {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let record = ConversationRecord {
            id: ConversationId::parse("c-1").unwrap(),
            title: "Rust lifetimes".to_string(),
            messages: vec![
                MessageRecord::new(MessageId::parse("m-1").unwrap(), MessageRole::User, "hi"),
                MessageRecord::new(
                    MessageId::parse("m-2").unwrap(),
                    MessageRole::Assistant,
                    "hello",
                ),
            ],
            created_at,
        };

        let conversation = Conversation::from_record(record.clone());
        assert_eq!(conversation.messages[1].role, Role::Assistant);
        assert_eq!(conversation.to_record(), record);
    }

    #[test]
    fn transcript_skips_error_turns() {
        let mut conversation = Conversation::new();
        conversation.messages.push(Message::user("Hello"));
        conversation
            .messages
            .push(Message::new(MessageId::new_v4(), Role::Error, "boom"));

        let transcript = conversation.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].role, parley_llm::Role::User);
        assert_eq!(transcript[0].content, "Hello");
    }

    #[test]
    fn new_conversation_is_empty_with_default_title() {
        let conversation = Conversation::new();
        assert!(conversation.messages.is_empty());
        assert!(conversation.has_default_title());
    }
}
