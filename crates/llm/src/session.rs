use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use uuid::Uuid;

use crate::events::Role;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful and friendly AI assistant. \
Format your responses using markdown where appropriate, especially for code blocks, lists, and emphasis.";

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 1.0;
pub const DEFAULT_TOP_K: u32 = 1;

/// Model and sampling parameters shared by every session of one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub model_id: String,
    pub system_instruction: String,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_GEMINI_MODEL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl SessionConfig {
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        if !model_id.trim().is_empty() {
            self.model_id = model_id.trim().to_string();
        }
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// One committed turn of a session's dialogue context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTurn {
    pub role: Role,
    pub content: String,
}

/// Open dialogue context with the model.
///
/// Sessions live only in memory. The history grows by one user/assistant pair
/// each time a reply stream completes; failed or cancelled streams leave it untouched.
#[derive(Debug)]
pub struct ChatSession {
    id: SessionId,
    config: SessionConfig,
    history: ArcSwap<Vec<SessionTurn>>,
}

pub type SessionHandle = Arc<ChatSession>;

impl ChatSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            id: SessionId::new_v4(),
            config,
            history: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn open(config: SessionConfig) -> SessionHandle {
        Arc::new(Self::new(config))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Snapshot of the committed history; never blocks a concurrent commit.
    pub fn history(&self) -> Arc<Vec<SessionTurn>> {
        self.history.load_full()
    }

    pub fn turn_count(&self) -> usize {
        self.history.load().len()
    }

    pub fn commit_exchange(&self, user_text: &str, assistant_text: &str) {
        self.history.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(SessionTurn {
                role: Role::User,
                content: user_text.to_string(),
            });
            next.push(SessionTurn {
                role: Role::Assistant,
                content: assistant_text.to_string(),
            });
            next
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_has_empty_history_and_default_sampling() {
        let session = ChatSession::open(SessionConfig::default());

        assert_eq!(session.turn_count(), 0);
        assert_eq!(session.config().model_id, DEFAULT_GEMINI_MODEL);
        assert_eq!(session.config().temperature, 0.7);
        assert_eq!(session.config().top_k, 1);
    }

    #[test]
    fn commit_appends_user_then_assistant() {
        let session = ChatSession::open(SessionConfig::default());
        session.commit_exchange("Hello", "Hi there!");

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "Hello");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Hi there!");
    }

    #[test]
    fn history_snapshot_is_isolated_from_later_commits() {
        let session = ChatSession::open(SessionConfig::default());
        let before = session.history();
        session.commit_exchange("a", "b");

        assert!(before.is_empty());
        assert_eq!(session.turn_count(), 2);
    }

    #[test]
    fn blank_model_override_keeps_default() {
        let config = SessionConfig::default().with_model("   ");
        assert_eq!(config.model_id, DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn sessions_get_distinct_ids() {
        let first = ChatSession::open(SessionConfig::default());
        let second = ChatSession::open(SessionConfig::default());
        assert_ne!(first.id(), second.id());
    }
}
