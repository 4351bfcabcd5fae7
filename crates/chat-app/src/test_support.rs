use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use parley_llm::{
    BoxFuture, FALLBACK_TITLE, LlmProvider, ProviderError, ProviderResult, ProviderStreamHandle,
    SessionConfig, SessionHandle, StreamEventMapped, StreamTarget, TranscriptLine,
    make_event_stream,
};
use tokio::sync::Notify;

/// One canned reply for [`ScriptedProvider::stream_reply`].
pub(crate) enum ReplyScript {
    Chunks(Vec<String>),
    FailAfter { chunks: Vec<String>, message: String },
    /// Sends `before`, waits for `gate`, then sends `after`.
    Gated {
        before: Vec<String>,
        gate: Arc<Notify>,
        after: Vec<String>,
    },
    /// Never emits anything and keeps the stream open until cancelled.
    Stall,
    /// Closes the channel without a terminal event.
    Hangup,
    RejectOpen,
}

impl ReplyScript {
    pub(crate) fn chunks(chunks: &[&str]) -> Self {
        Self::Chunks(owned(chunks))
    }

    pub(crate) fn fail_after(chunks: &[&str], message: &str) -> Self {
        Self::FailAfter {
            chunks: owned(chunks),
            message: message.to_string(),
        }
    }

    pub(crate) fn gated(before: &[&str], gate: Arc<Notify>, after: &[&str]) -> Self {
        Self::Gated {
            before: owned(before),
            gate,
            after: owned(after),
        }
    }
}

fn owned(chunks: &[&str]) -> Vec<String> {
    chunks.iter().map(|chunk| chunk.to_string()).collect()
}

/// Deterministic provider double that replays queued scripts.
pub(crate) struct ScriptedProvider {
    config: SessionConfig,
    replies: Mutex<VecDeque<ReplyScript>>,
    title: Option<String>,
    stream_calls: AtomicUsize,
    title_calls: AtomicUsize,
    title_transcripts: Mutex<Vec<Vec<TranscriptLine>>>,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            replies: Mutex::new(VecDeque::new()),
            title: None,
            stream_calls: AtomicUsize::new(0),
            title_calls: AtomicUsize::new(0),
            title_transcripts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub(crate) fn with_reply(self, reply: ReplyScript) -> Self {
        self.push_reply(reply);
        self
    }

    pub(crate) fn push_reply(&self, reply: ReplyScript) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn title_calls(&self) -> usize {
        self.title_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn title_transcripts(&self) -> Vec<Vec<TranscriptLine>> {
        self.title_transcripts.lock().unwrap().clone()
    }
}

impl LlmProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    fn session_config(&self) -> &SessionConfig {
        &self.config
    }

    fn stream_reply(
        &self,
        session: &SessionHandle,
        target: StreamTarget,
        input: &str,
    ) -> ProviderResult<ProviderStreamHandle> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ReplyScript::chunks(&["ok"]));

        if matches!(script, ReplyScript::RejectOpen) {
            return Err(ProviderError::MissingApiKey {
                stage: "scripted-open",
                provider_id: "scripted".to_string(),
            });
        }

        let (event_tx, stream, cancel_rx) = make_event_stream(target);
        let session = session.clone();
        let input = input.to_string();
        let worker = Box::pin(async move {
            let send_all = |chunks: &[String]| {
                chunks
                    .iter()
                    .all(|chunk| event_tx.send(StreamEventMapped::delta(target, chunk.as_str())).is_ok())
            };

            match script {
                ReplyScript::Chunks(chunks) => {
                    if send_all(&chunks) {
                        session.commit_exchange(&input, &chunks.concat());
                        let _ = event_tx.send(StreamEventMapped::done(target));
                    }
                }
                ReplyScript::FailAfter { chunks, message } => {
                    if send_all(&chunks) {
                        let _ = event_tx.send(StreamEventMapped::error(target, message));
                    }
                }
                ReplyScript::Gated {
                    before,
                    gate,
                    after,
                } => {
                    if !send_all(&before) {
                        return;
                    }
                    gate.notified().await;
                    if send_all(&after) {
                        session.commit_exchange(&input, &[before, after].concat().concat());
                        let _ = event_tx.send(StreamEventMapped::done(target));
                    }
                }
                ReplyScript::Stall => {
                    let _ = cancel_rx.await;
                }
                ReplyScript::Hangup | ReplyScript::RejectOpen => {}
            }
        });

        Ok(ProviderStreamHandle { stream, worker })
    }

    fn summarize_title<'a>(&'a self, transcript: &'a [TranscriptLine]) -> BoxFuture<'a, String> {
        Box::pin(async move {
            self.title_calls.fetch_add(1, Ordering::SeqCst);
            self.title_transcripts
                .lock()
                .unwrap()
                .push(transcript.to_vec());
            self.title
                .clone()
                .unwrap_or_else(|| FALLBACK_TITLE.to_string())
        })
    }
}
