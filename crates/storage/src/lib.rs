pub mod error;
pub mod file;
pub mod ids;
pub mod memory;
pub mod repository;
pub mod snapshot;
pub mod sqlite;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use file::FileBlobStore;
pub use ids::{ConversationId, MessageId};
pub use memory::MemoryBlobStore;
pub use repository::{CONVERSATIONS_KEY, ConversationRepository};
pub use snapshot::{CURRENT_SCHEMA_VERSION, decode_snapshot, encode_snapshot};
pub use sqlite::SqliteBlobStore;
pub use types::{ConversationRecord, DEFAULT_CONVERSATION_TITLE, MessageRecord, MessageRole};

/// Durable string key-value medium with whole-value replace semantics.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn put(&self, key: &str, value: &str) -> StorageResult<()>;
}
