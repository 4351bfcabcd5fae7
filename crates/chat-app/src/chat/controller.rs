use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parley_llm::{
    LlmProvider, ProviderStreamHandle, SessionHandle, StreamEventPayload, StreamTarget,
};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

use super::message::{Conversation, ConversationId, MessageId};
use super::state::{SendState, SendTarget, SendTransition};
use super::store::{SharedStore, StoreError};

/// Shown in place of the assistant reply when a send fails.
pub const FAILED_REPLY_MESSAGE: &str =
    "Failed to get response from AI. Please check your API key and network connection.";
pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SendError {
    #[snafu(display("[{stage}] message is empty"))]
    EmptyInput { stage: &'static str },
    #[snafu(display("[{stage}] a reply is already streaming"))]
    Busy { stage: &'static str },
    #[snafu(display("[{stage}] {source}"))]
    Store {
        stage: &'static str,
        source: StoreError,
    },
}

/// Outcome of one accepted send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub conversation_id: ConversationId,
    pub assistant_message_id: MessageId,
    pub created_conversation: bool,
    pub state: SendState,
    pub title: Option<String>,
}

impl SendReport {
    pub fn is_complete(&self) -> bool {
        matches!(self.state, SendState::Complete(_))
    }
}

/// Drives one user message through the provider and into the store.
///
/// At most one send is in flight across the whole application.
#[derive(Clone)]
pub struct StreamingController {
    store: SharedStore,
    provider: Arc<dyn LlmProvider>,
    in_flight: Arc<AtomicBool>,
    next_stream_id: Arc<AtomicU64>,
    idle_timeout: Duration,
}

struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct PreparedSend {
    target: SendTarget,
    session: Option<SessionHandle>,
    created_conversation: bool,
    first_exchange: bool,
}

impl StreamingController {
    pub fn new(store: SharedStore, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            store,
            provider,
            in_flight: Arc::new(AtomicBool::new(false)),
            next_stream_id: Arc::new(AtomicU64::new(1)),
            idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Sends `input` to the active conversation, creating one when none is active.
    ///
    /// Whitespace-only input and sends made while another reply is in flight are
    /// rejected without touching the store. Provider failures are not errors here:
    /// they end as an error turn in the transcript and a `Failed` report.
    pub async fn send(&self, input: &str) -> Result<SendReport, SendError> {
        let text = input.trim();
        ensure!(
            !text.is_empty(),
            EmptyInputSnafu {
                stage: "send-validate"
            }
        );
        let _guard = InFlightGuard::acquire(&self.in_flight).context(BusySnafu {
            stage: "send-acquire",
        })?;

        let stream = StreamTarget::new(self.next_stream_id.fetch_add(1, Ordering::Relaxed));
        let prepared = self
            .store
            .write(|store| {
                let (conversation_id, created_conversation) =
                    match store.active_conversation_id().cloned() {
                        Some(conversation_id) => (conversation_id, false),
                        None => (store.create_conversation().id.clone(), true),
                    };
                let first_exchange = store
                    .conversation(&conversation_id)
                    .is_some_and(|conversation| conversation.messages.is_empty());
                let message_id = store.append_user_and_placeholder(&conversation_id, text)?;
                Ok::<_, StoreError>(PreparedSend {
                    session: store.session(&conversation_id),
                    target: SendTarget::new(conversation_id, message_id, stream),
                    created_conversation,
                    first_exchange,
                })
            })
            .context(StoreSnafu {
                stage: "send-prepare",
            })?;

        let PreparedSend {
            target,
            session,
            created_conversation,
            first_exchange,
        } = prepared;
        let mut state = SendState::Idle;
        advance(&mut state, SendTransition::Begin(target.clone()));
        tracing::info!(
            conversation_id = %target.conversation_id,
            stream = target.stream.0,
            created_conversation,
            "send started"
        );

        let outcome = match session {
            Some(session) => self.stream_reply(&session, &target, text, &mut state).await,
            None => Err("conversation has no model session".to_string()),
        };

        let mut title = None;
        match outcome {
            Ok(()) => {
                advance(&mut state, SendTransition::Complete(target.clone()));
                if first_exchange {
                    title = self.generate_title(&target.conversation_id).await;
                }
            }
            Err(detail) => {
                tracing::warn!(
                    conversation_id = %target.conversation_id,
                    stream = target.stream.0,
                    error = %detail,
                    "send failed"
                );
                let error_text = format!("{FAILED_REPLY_MESSAGE}\n{detail}");
                self.store.write(|store| {
                    store.replace_placeholder_with_error(
                        &target.conversation_id,
                        &target.message_id,
                        &error_text,
                    )
                });
                advance(
                    &mut state,
                    SendTransition::Fail {
                        target: target.clone(),
                        message: detail,
                    },
                );
            }
        }

        Ok(SendReport {
            conversation_id: target.conversation_id,
            assistant_message_id: target.message_id,
            created_conversation,
            state,
            title,
        })
    }

    async fn stream_reply(
        &self,
        session: &SessionHandle,
        target: &SendTarget,
        text: &str,
        state: &mut SendState,
    ) -> Result<(), String> {
        let ProviderStreamHandle { mut stream, worker } = self
            .provider
            .stream_reply(session, target.stream, text)
            .map_err(|error| error.to_string())?;
        let _worker = tokio::spawn(worker);
        advance(state, SendTransition::StreamOpened(target.clone()));
        tracing::debug!(stream = stream.target().0, "reply stream opened");

        loop {
            let event = match tokio::time::timeout(self.idle_timeout, stream.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => return Err("the reply stream ended unexpectedly".to_string()),
                Err(_) => {
                    stream.cancel();
                    return Err(format!(
                        "no reply data for {}s",
                        self.idle_timeout.as_secs_f32()
                    ));
                }
            };

            if !state.accepts_stream_event(event.target) {
                tracing::debug!(stream = event.target.0, "dropping event for another stream");
                continue;
            }

            match event.payload {
                StreamEventPayload::Delta(delta) => {
                    self.store.write(|store| {
                        store.patch_message_content(
                            &target.conversation_id,
                            &target.message_id,
                            &delta,
                        )
                    });
                }
                StreamEventPayload::Done => return Ok(()),
                StreamEventPayload::Error(message) => return Err(message),
            }
        }
    }

    /// Replaces the default title after the first exchange. Any failure keeps the default.
    async fn generate_title(&self, conversation_id: &ConversationId) -> Option<String> {
        let transcript = self.store.read(|store| {
            store
                .conversation(conversation_id)
                .map(Conversation::transcript)
        })?;

        let title =
            match tokio::time::timeout(self.idle_timeout, self.provider.summarize_title(&transcript))
                .await
            {
                Ok(title) => title,
                Err(_) => {
                    tracing::warn!(conversation_id = %conversation_id, "title generation timed out");
                    return None;
                }
            };

        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        self.store
            .write(|store| store.set_title(conversation_id, title))
            .then(|| title.to_string())
    }
}

fn advance(state: &mut SendState, transition: SendTransition) {
    match state.apply(transition) {
        Ok(next) => *state = next,
        Err(rejection) => {
            tracing::error!(state = state.name(), ?rejection, "illegal send transition")
        }
    }
}
