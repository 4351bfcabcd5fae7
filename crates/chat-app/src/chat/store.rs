use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use parley_llm::{LlmProvider, SessionHandle};
use parley_storage::ConversationRecord;
use snafu::{OptionExt, Snafu};
use tokio::sync::broadcast;

use super::message::{Conversation, ConversationId, Message, MessageId, Role};
use crate::persistence::PersistenceHandle;

const STORE_EVENT_CAPACITY: usize = 1024;

/// Change notifications fanned out to presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    ConversationCreated {
        conversation_id: ConversationId,
    },
    ActiveChanged {
        conversation_id: Option<ConversationId>,
    },
    MessagesAppended {
        conversation_id: ConversationId,
        message_ids: Vec<MessageId>,
    },
    MessagePatched {
        conversation_id: ConversationId,
        message_id: MessageId,
        delta: String,
    },
    MessageErrored {
        conversation_id: ConversationId,
        message_id: MessageId,
        content: String,
    },
    TitleChanged {
        conversation_id: ConversationId,
        title: String,
    },
    Restored {
        count: usize,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("[{stage}] conversation {conversation_id} does not exist"))]
    ConversationNotFound {
        stage: &'static str,
        conversation_id: ConversationId,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Single source of truth for conversations, the active selection, and the
/// model session bound to each conversation.
///
/// Every mutation hands a full snapshot to the persistence writer unless the
/// collection is empty.
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active_conversation_id: Option<ConversationId>,
    sessions: HashMap<ConversationId, SessionHandle>,
    provider: Arc<dyn LlmProvider>,
    persistence: PersistenceHandle,
    events: broadcast::Sender<StoreEvent>,
}

impl ConversationStore {
    pub fn new(provider: Arc<dyn LlmProvider>, persistence: PersistenceHandle) -> Self {
        let (events, _) = broadcast::channel(STORE_EVENT_CAPACITY);
        Self {
            conversations: Vec::new(),
            active_conversation_id: None,
            sessions: HashMap::new(),
            provider,
            persistence,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Replaces the collection with persisted records. Every conversation gets a
    /// fresh model session; the newest one becomes active.
    pub fn restore(&mut self, records: Vec<ConversationRecord>) {
        self.conversations = records.into_iter().map(Conversation::from_record).collect();
        self.sessions = self
            .conversations
            .iter()
            .map(|conversation| (conversation.id.clone(), self.provider.open_session()))
            .collect();
        self.active_conversation_id = self
            .conversations
            .iter()
            .max_by_key(|conversation| conversation.created_at)
            .map(|conversation| conversation.id.clone());

        tracing::info!(
            conversations = self.conversations.len(),
            active = ?self.active_conversation_id,
            "conversations restored"
        );
        self.emit(StoreEvent::Restored {
            count: self.conversations.len(),
        });
    }

    /// Inserts a fresh conversation at the head and makes it active.
    pub fn create_conversation(&mut self) -> &Conversation {
        let conversation = Conversation::new();
        let conversation_id = conversation.id.clone();
        self.sessions
            .insert(conversation_id.clone(), self.provider.open_session());
        self.conversations.insert(0, conversation);
        self.active_conversation_id = Some(conversation_id.clone());

        tracing::debug!(conversation_id = %conversation_id, "conversation created");
        self.changed(StoreEvent::ConversationCreated {
            conversation_id: conversation_id.clone(),
        });
        self.emit(StoreEvent::ActiveChanged {
            conversation_id: Some(conversation_id),
        });
        &self.conversations[0]
    }

    /// Makes `conversation_id` active. Unknown ids leave the selection untouched.
    pub fn select_conversation(&mut self, conversation_id: &ConversationId) -> bool {
        if self.conversation(conversation_id).is_none() {
            tracing::debug!(conversation_id = %conversation_id, "ignoring selection of unknown conversation");
            return false;
        }
        if self.active_conversation_id.as_ref() == Some(conversation_id) {
            return true;
        }

        self.active_conversation_id = Some(conversation_id.clone());
        self.emit(StoreEvent::ActiveChanged {
            conversation_id: Some(conversation_id.clone()),
        });
        true
    }

    /// Appends the user turn followed by an empty assistant placeholder and
    /// returns the placeholder id.
    pub fn append_user_and_placeholder(
        &mut self,
        conversation_id: &ConversationId,
        text: &str,
    ) -> StoreResult<MessageId> {
        let conversation = self
            .conversation_mut(conversation_id)
            .context(ConversationNotFoundSnafu {
                stage: "append-user-and-placeholder",
                conversation_id: conversation_id.clone(),
            })?;

        let user = Message::user(text);
        let placeholder = Message::assistant_placeholder();
        let message_ids = vec![user.id.clone(), placeholder.id.clone()];
        let placeholder_id = placeholder.id.clone();
        conversation.messages.push(user);
        conversation.messages.push(placeholder);

        self.changed(StoreEvent::MessagesAppended {
            conversation_id: conversation_id.clone(),
            message_ids,
        });
        Ok(placeholder_id)
    }

    /// Appends `delta` to one message. Stale targets are ignored.
    pub fn patch_message_content(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        delta: &str,
    ) -> bool {
        let Some(message) = self.message_mut(conversation_id, message_id) else {
            tracing::debug!(conversation_id = %conversation_id, message_id = %message_id, "dropping delta for stale target");
            return false;
        };
        message.content.push_str(delta);

        self.changed(StoreEvent::MessagePatched {
            conversation_id: conversation_id.clone(),
            message_id: message_id.clone(),
            delta: delta.to_string(),
        });
        true
    }

    /// Turns one message into an error turn carrying `error_text`.
    pub fn replace_placeholder_with_error(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        error_text: &str,
    ) -> bool {
        let Some(message) = self.message_mut(conversation_id, message_id) else {
            return false;
        };
        message.role = Role::Error;
        message.content = error_text.to_string();

        self.changed(StoreEvent::MessageErrored {
            conversation_id: conversation_id.clone(),
            message_id: message_id.clone(),
            content: error_text.to_string(),
        });
        true
    }

    pub fn set_title(&mut self, conversation_id: &ConversationId, title: &str) -> bool {
        let Some(conversation) = self.conversation_mut(conversation_id) else {
            return false;
        };
        conversation.title = title.to_string();

        self.changed(StoreEvent::TitleChanged {
            conversation_id: conversation_id.clone(),
            title: title.to_string(),
        });
        true
    }

    pub fn active_conversation_id(&self) -> Option<&ConversationId> {
        self.active_conversation_id.as_ref()
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_conversation_id
            .as_ref()
            .and_then(|conversation_id| self.conversation(conversation_id))
    }

    pub fn conversation(&self, conversation_id: &ConversationId) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| &conversation.id == conversation_id)
    }

    pub fn session(&self, conversation_id: &ConversationId) -> Option<SessionHandle> {
        self.sessions.get(conversation_id).cloned()
    }

    /// Conversations in sidebar order.
    pub fn list_newest_first(&self) -> Vec<&Conversation> {
        let mut conversations = self.conversations.iter().collect::<Vec<_>>();
        conversations.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn snapshot(&self) -> Vec<ConversationRecord> {
        self.conversations
            .iter()
            .map(Conversation::to_record)
            .collect()
    }

    fn conversation_mut(&mut self, conversation_id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|conversation| &conversation.id == conversation_id)
    }

    fn message_mut(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Option<&mut Message> {
        self.conversation_mut(conversation_id)?
            .message_mut(message_id)
    }

    fn changed(&self, event: StoreEvent) {
        if !self.conversations.is_empty() {
            self.persistence.enqueue(self.snapshot());
        }
        self.emit(event);
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Shared handle to the store. The lock is never held across an await.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<ConversationStore>>,
}

impl SharedStore {
    pub fn new(store: ConversationStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn write<R>(&self, apply: impl FnOnce(&mut ConversationStore) -> R) -> R {
        let mut store = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut store)
    }

    pub fn read<R>(&self, inspect: impl FnOnce(&ConversationStore) -> R) -> R {
        let store = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inspect(&store)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.read(ConversationStore::subscribe)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use parley_storage::{
        BlobStore, CONVERSATIONS_KEY, ConversationRepository, MemoryBlobStore, MessageRecord,
        MessageRole,
    };

    use super::*;
    use crate::persistence::spawn_persistence_writer;
    use crate::test_support::ScriptedProvider;

    fn store() -> ConversationStore {
        ConversationStore::new(
            Arc::new(ScriptedProvider::new()),
            PersistenceHandle::disabled(),
        )
    }

    fn record(title: &str, minutes_ago: i64) -> ConversationRecord {
        ConversationRecord {
            id: ConversationId::new_v4(),
            title: title.to_string(),
            messages: vec![MessageRecord::new(
                MessageId::new_v4(),
                MessageRole::User,
                format!("about {title}"),
            )],
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn create_inserts_at_head_and_activates() {
        let mut store = store();
        let first = store.create_conversation().id.clone();
        let second = store.create_conversation().id.clone();

        assert_eq!(store.len(), 2);
        assert_eq!(store.active_conversation_id(), Some(&second));
        assert_eq!(store.snapshot()[0].id, second);
        assert!(store.session(&first).is_some());
        assert!(store.session(&second).is_some());
    }

    #[test]
    fn each_conversation_gets_its_own_session() {
        let mut store = store();
        let first = store.create_conversation().id.clone();
        let second = store.create_conversation().id.clone();

        let first_session = store.session(&first).unwrap();
        let second_session = store.session(&second).unwrap();
        assert_ne!(first_session.id(), second_session.id());
    }

    #[test]
    fn selecting_unknown_conversation_is_a_no_op() {
        let mut store = store();
        let active = store.create_conversation().id.clone();

        assert!(!store.select_conversation(&ConversationId::new_v4()));
        assert_eq!(store.active_conversation_id(), Some(&active));
    }

    #[test]
    fn append_and_patch_build_the_reply() {
        let mut store = store();
        let conversation_id = store.create_conversation().id.clone();
        let placeholder = store
            .append_user_and_placeholder(&conversation_id, "Hello")
            .unwrap();

        for delta in ["Hi", " there", "!"] {
            assert!(store.patch_message_content(&conversation_id, &placeholder, delta));
        }

        let conversation = store.conversation(&conversation_id).unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[0].content, "Hello");
        assert_eq!(conversation.messages[1].role, Role::Assistant);
        assert_eq!(conversation.messages[1].content, "Hi there!");
    }

    #[test]
    fn append_to_unknown_conversation_fails() {
        let mut store = store();
        let result = store.append_user_and_placeholder(&ConversationId::new_v4(), "Hello");
        assert!(matches!(result, Err(StoreError::ConversationNotFound { .. })));
    }

    #[test]
    fn stale_patch_is_ignored() {
        let mut store = store();
        let conversation_id = store.create_conversation().id.clone();
        assert!(!store.patch_message_content(&conversation_id, &MessageId::new_v4(), "x"));
        assert!(!store.patch_message_content(&ConversationId::new_v4(), &MessageId::new_v4(), "x"));
        assert!(store.conversation(&conversation_id).unwrap().messages.is_empty());
    }

    #[test]
    fn placeholder_can_become_an_error_turn() {
        let mut store = store();
        let conversation_id = store.create_conversation().id.clone();
        let placeholder = store
            .append_user_and_placeholder(&conversation_id, "Hello")
            .unwrap();
        store.patch_message_content(&conversation_id, &placeholder, "partial");

        assert!(store.replace_placeholder_with_error(&conversation_id, &placeholder, "boom"));
        let message = store
            .conversation(&conversation_id)
            .unwrap()
            .message(&placeholder)
            .unwrap();
        assert_eq!(message.role, Role::Error);
        assert_eq!(message.content, "boom");
    }

    #[test]
    fn restore_activates_the_newest_and_opens_fresh_sessions() {
        let mut store = store();
        let older = record("older", 30);
        let newest = record("newest", 1);
        let middle = record("middle", 10);
        let newest_id = newest.id.clone();

        store.restore(vec![older, newest, middle]);

        assert_eq!(store.active_conversation_id(), Some(&newest_id));
        let titles = store
            .list_newest_first()
            .into_iter()
            .map(|conversation| conversation.title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["newest", "middle", "older"]);
        assert_eq!(store.session(&newest_id).unwrap().turn_count(), 0);
    }

    #[test]
    fn restore_of_nothing_leaves_no_active_conversation() {
        let mut store = store();
        store.restore(Vec::new());
        assert!(store.is_empty());
        assert!(store.active_conversation().is_none());
    }

    #[tokio::test]
    async fn subscribers_see_mutations_in_order() {
        let mut store = store();
        let mut events = store.subscribe();
        let conversation_id = store.create_conversation().id.clone();
        store.set_title(&conversation_id, "Greeting");

        assert!(matches!(
            events.recv().await.unwrap(),
            StoreEvent::ConversationCreated { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            StoreEvent::ActiveChanged { .. }
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent::TitleChanged {
                conversation_id,
                title: "Greeting".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn mutations_are_persisted_and_restore_round_trips() {
        let repository = ConversationRepository::new(Arc::new(MemoryBlobStore::new()));
        let (persistence, _writer) = spawn_persistence_writer(repository.clone());
        let provider = Arc::new(ScriptedProvider::new());
        let mut store = ConversationStore::new(provider.clone(), persistence.clone());

        let conversation_id = store.create_conversation().id.clone();
        let placeholder = store
            .append_user_and_placeholder(&conversation_id, "Hello")
            .unwrap();
        store.patch_message_content(&conversation_id, &placeholder, "Hi!");
        store.set_title(&conversation_id, "Greeting");
        persistence.flush().await;

        let saved = repository.load().unwrap();
        assert_eq!(saved, store.snapshot());

        let mut restored = ConversationStore::new(provider, PersistenceHandle::disabled());
        restored.restore(saved);
        let conversation = restored.active_conversation().unwrap();
        assert_eq!(conversation.title, "Greeting");
        assert_eq!(conversation.messages[1].content, "Hi!");
    }

    #[tokio::test]
    async fn empty_collection_is_never_saved() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let repository = ConversationRepository::new(blobs.clone());
        let (persistence, _writer) = spawn_persistence_writer(repository);
        let mut store =
            ConversationStore::new(Arc::new(ScriptedProvider::new()), persistence.clone());

        store.restore(Vec::new());
        store.select_conversation(&ConversationId::new_v4());
        persistence.flush().await;

        assert_eq!(blobs.get(CONVERSATIONS_KEY).unwrap(), None);
    }
}
