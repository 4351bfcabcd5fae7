use std::sync::Arc;

use super::BlobStore;
use super::error::StorageResult;
use super::snapshot::{decode_snapshot, encode_snapshot};
use super::types::ConversationRecord;

/// Key the conversation snapshot is stored under.
pub const CONVERSATIONS_KEY: &str = "conversations";

/// Whole-collection load/save of conversations over any [`BlobStore`].
#[derive(Clone)]
pub struct ConversationRepository {
    store: Arc<dyn BlobStore>,
    key: String,
}

impl ConversationRepository {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            key: CONVERSATIONS_KEY.to_string(),
        }
    }

    /// Returns the stored conversations in stored order; a missing key is an empty list.
    pub fn load(&self) -> StorageResult<Vec<ConversationRecord>> {
        match self.store.get(&self.key)? {
            Some(raw) => decode_snapshot(&raw),
            None => Ok(Vec::new()),
        }
    }

    pub fn save(&self, conversations: &[ConversationRecord]) -> StorageResult<()> {
        let encoded = encode_snapshot(conversations)?;
        self.store.put(&self.key, &encoded)
    }
}
