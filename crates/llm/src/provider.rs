use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

use crate::events::{StreamEventMapped, StreamTarget, TranscriptLine};
use crate::session::{ChatSession, SessionConfig, SessionHandle};

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    pub base_url: String,
    pub session: SessionConfig,
}

impl ProviderConfig {
    pub fn new(
        provider_id: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            base_url: base_url.into().trim().to_string(),
            session: SessionConfig::default(),
        }
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ProviderWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("stream request for {target:?} has empty input"))]
    EmptyInput {
        stage: &'static str,
        target: StreamTarget,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
    #[snafu(display("prompt failed on `{stage}`, {source}"))]
    PromptFailed {
        stage: &'static str,
        source: rig::completion::PromptError,
    },
}

/// Receiving half of one reply stream.
///
/// Dropping it (or calling [`cancel`](Self::cancel)) tells the worker to stop.
pub struct ProviderEventStream {
    target: StreamTarget,
    events: mpsc::UnboundedReceiver<StreamEventMapped>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

/// A reply stream plus the worker future that feeds it. The caller spawns the worker.
pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
    pub worker: ProviderWorker,
}

impl ProviderEventStream {
    pub(crate) fn new(
        target: StreamTarget,
        events: mpsc::UnboundedReceiver<StreamEventMapped>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            target,
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn target(&self) -> StreamTarget {
        self.target
    }

    pub async fn recv(&mut self) -> Option<StreamEventMapped> {
        self.events.recv().await
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for ProviderEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// External model collaborator: sessions, streamed replies and title summaries.
pub trait LlmProvider: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn session_config(&self) -> &SessionConfig;

    /// Opens a fresh dialogue context bound to the provider's fixed configuration.
    fn open_session(&self) -> SessionHandle {
        ChatSession::open(self.session_config().clone())
    }

    fn stream_reply(
        &self,
        session: &SessionHandle,
        target: StreamTarget,
        input: &str,
    ) -> ProviderResult<ProviderStreamHandle>;

    /// Best effort: implementations return a fallback title instead of failing.
    fn summarize_title<'a>(&'a self, transcript: &'a [TranscriptLine]) -> BoxFuture<'a, String>;
}

/// Builds the channel pair shared by a stream worker and its [`ProviderEventStream`].
pub fn make_event_stream(
    target: StreamTarget,
) -> (
    mpsc::UnboundedSender<StreamEventMapped>,
    ProviderEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        ProviderEventStream::new(target, event_rx, cancel_tx),
        cancel_rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_values_are_trimmed() {
        let config = ProviderConfig::new(" gemini ", " key\n", " https://example.test ");
        assert_eq!(config.provider_id, "gemini");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.base_url, "https://example.test");
    }

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let target = StreamTarget::new(7);
        let (event_tx, mut stream, _cancel_rx) = make_event_stream(target);

        event_tx.send(StreamEventMapped::delta(target, "a")).ok();
        event_tx.send(StreamEventMapped::delta(target, "b")).ok();
        event_tx.send(StreamEventMapped::done(target)).ok();
        drop(event_tx);

        assert_eq!(stream.target(), target);
        assert_eq!(stream.recv().await, Some(StreamEventMapped::delta(target, "a")));
        assert_eq!(stream.recv().await, Some(StreamEventMapped::delta(target, "b")));
        assert_eq!(stream.recv().await, Some(StreamEventMapped::done(target)));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn cancel_signals_worker_once() {
        let (_event_tx, mut stream, cancel_rx) = make_event_stream(StreamTarget::new(1));

        assert!(stream.cancel());
        assert!(!stream.cancel());
        assert!(cancel_rx.await.is_ok());
    }

    #[tokio::test]
    async fn dropping_stream_signals_worker() {
        let (_event_tx, stream, cancel_rx) = make_event_stream(StreamTarget::new(1));
        drop(stream);
        assert!(cancel_rx.await.is_ok());
    }
}
