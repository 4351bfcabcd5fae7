use parley_llm::StreamTarget;

use super::message::{ConversationId, MessageId};

/// Routing key for one send: the conversation, its assistant placeholder, and the stream tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SendTarget {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub stream: StreamTarget,
}

impl SendTarget {
    pub fn new(conversation_id: ConversationId, message_id: MessageId, stream: StreamTarget) -> Self {
        Self {
            conversation_id,
            message_id,
            stream,
        }
    }
}

/// Lifecycle of one send.
///
/// `Idle -> Sending -> Streaming -> Complete`, with `Failed` reachable from either
/// in-flight state. Terminal states may begin a new send directly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SendState {
    #[default]
    Idle,
    Sending(SendTarget),
    Streaming(SendTarget),
    Complete(SendTarget),
    Failed {
        target: SendTarget,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTransition {
    Begin(SendTarget),
    StreamOpened(SendTarget),
    Complete(SendTarget),
    Fail { target: SendTarget, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTransitionRejection {
    AlreadyInFlight {
        active: SendTarget,
        attempted: SendTarget,
    },
    NotInFlight,
    StreamNotOpened(SendTarget),
    StreamAlreadyOpen(SendTarget),
    TargetMismatch {
        active: SendTarget,
        attempted: SendTarget,
    },
}

pub type SendTransitionResult = Result<SendState, SendTransitionRejection>;

impl SendState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Sending(_) => "sending",
            Self::Streaming(_) => "streaming",
            Self::Complete(_) => "complete",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Failed { .. })
    }

    /// Returns true when a stream event tagged `stream` belongs to the open stream.
    pub fn accepts_stream_event(&self, stream: StreamTarget) -> bool {
        matches!(self, Self::Streaming(active) if active.stream == stream)
    }

    pub fn apply(&self, transition: SendTransition) -> SendTransitionResult {
        match transition {
            SendTransition::Begin(target) => self.apply_begin(target),
            SendTransition::StreamOpened(target) => self.apply_stream_opened(target),
            SendTransition::Complete(target) => self.apply_complete(target),
            SendTransition::Fail { target, message } => self.apply_fail(target, message),
        }
    }

    fn apply_begin(&self, target: SendTarget) -> SendTransitionResult {
        match self {
            Self::Sending(active) | Self::Streaming(active) => {
                Err(SendTransitionRejection::AlreadyInFlight {
                    active: active.clone(),
                    attempted: target,
                })
            }
            Self::Idle | Self::Complete(_) | Self::Failed { .. } => Ok(Self::Sending(target)),
        }
    }

    fn apply_stream_opened(&self, target: SendTarget) -> SendTransitionResult {
        match self {
            Self::Sending(active) if *active == target => Ok(Self::Streaming(target)),
            Self::Sending(active) => Err(SendTransitionRejection::TargetMismatch {
                active: active.clone(),
                attempted: target,
            }),
            Self::Streaming(active) => Err(SendTransitionRejection::StreamAlreadyOpen(
                active.clone(),
            )),
            Self::Idle | Self::Complete(_) | Self::Failed { .. } => {
                Err(SendTransitionRejection::NotInFlight)
            }
        }
    }

    fn apply_complete(&self, target: SendTarget) -> SendTransitionResult {
        match self {
            Self::Streaming(active) if *active == target => Ok(Self::Complete(target)),
            Self::Streaming(active) => Err(SendTransitionRejection::TargetMismatch {
                active: active.clone(),
                attempted: target,
            }),
            Self::Sending(active) => Err(SendTransitionRejection::StreamNotOpened(active.clone())),
            Self::Idle | Self::Complete(_) | Self::Failed { .. } => {
                Err(SendTransitionRejection::NotInFlight)
            }
        }
    }

    fn apply_fail(&self, target: SendTarget, message: String) -> SendTransitionResult {
        match self {
            Self::Sending(active) | Self::Streaming(active) if *active == target => {
                Ok(Self::Failed { target, message })
            }
            Self::Sending(active) | Self::Streaming(active) => {
                Err(SendTransitionRejection::TargetMismatch {
                    active: active.clone(),
                    attempted: target,
                })
            }
            Self::Idle | Self::Complete(_) | Self::Failed { .. } => {
                Err(SendTransitionRejection::NotInFlight)
            }
        }
    }
}
