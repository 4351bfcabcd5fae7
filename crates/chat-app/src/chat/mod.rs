mod controller;
mod message;
mod state;
mod store;

pub use controller::{
    DEFAULT_STREAM_IDLE_TIMEOUT, FAILED_REPLY_MESSAGE, SendError, SendReport, StreamingController,
};
pub use message::{Conversation, ConversationId, Message, MessageId, Role};
pub use state::{SendState, SendTarget, SendTransition, SendTransitionRejection, SendTransitionResult};
pub use store::{ConversationStore, SharedStore, StoreError, StoreEvent, StoreResult};
