use futures::StreamExt;
use rig::completion::{CompletionModel, Message as RigMessage, Prompt};
use rig::prelude::CompletionClient;
use rig::providers::gemini;
use rig::streaming::StreamedAssistantContent;
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::events::{Role, StreamEventMapped, StreamTarget, TranscriptLine};
use super::provider::{
    BoxFuture, CompletionsFailedSnafu, EmptyInputSnafu, HttpClientSnafu, LlmProvider,
    MissingApiKeySnafu, PromptFailedSnafu, ProviderConfig, ProviderError, ProviderResult,
    ProviderStreamHandle, ProviderWorker, make_event_stream,
};
use super::session::{ChatSession, SessionConfig, SessionHandle, SessionTurn};
use super::title::{FALLBACK_TITLE, build_title_prompt, clean_title};

pub const RIG_GEMINI_PROVIDER_ID: &str = "gemini";

type RigStreamingResponse = rig::streaming::StreamingCompletionResponse<
    <gemini::completion::CompletionModel as CompletionModel>::StreamingResponse,
>;

pub struct RigGeminiAdapter {
    config: ProviderConfig,
    client: gemini::Client,
}

impl RigGeminiAdapter {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        let client = Self::build_client(&config)?;
        Ok(Self { config, client })
    }

    fn build_client(config: &ProviderConfig) -> ProviderResult<gemini::Client> {
        let mut builder = gemini::Client::builder().api_key(config.api_key.as_str());
        if !config.base_url.is_empty() {
            builder = builder.base_url(config.base_url.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    fn to_rig_message(turn: &SessionTurn) -> Option<RigMessage> {
        match turn.role {
            Role::User => Some(RigMessage::user(turn.content.clone())),
            Role::Assistant => Some(RigMessage::assistant(turn.content.clone())),
            Role::Error => None,
        }
    }

    fn generation_params(config: &SessionConfig) -> serde_json::Value {
        serde_json::json!({
            "generationConfig": {
                "topP": config.top_p,
                "topK": config.top_k,
            }
        })
    }

    async fn open_stream(
        client: &gemini::Client,
        session: &ChatSession,
        input: &str,
    ) -> ProviderResult<RigStreamingResponse> {
        let config = session.config();
        let model = client.completion_model(config.model_id.clone());

        let history = session
            .history()
            .iter()
            .filter_map(Self::to_rig_message)
            .collect::<Vec<_>>();

        let mut builder = model
            .completion_request(RigMessage::user(input.to_string()))
            .messages(history)
            .temperature(config.temperature)
            .additional_params(Self::generation_params(config));

        if !config.system_instruction.trim().is_empty() {
            builder = builder.preamble(config.system_instruction.clone());
        }

        builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
    }

    fn emit_error_event(
        event_tx: &mpsc::UnboundedSender<StreamEventMapped>,
        target: StreamTarget,
        error: ProviderError,
    ) {
        let _ = event_tx.send(StreamEventMapped::error(target, error.to_string()));
    }

    fn text_fragment<R>(item: StreamedAssistantContent<R>) -> Option<String>
    where
        R: Clone + Unpin,
    {
        match item {
            StreamedAssistantContent::Text(text) if !text.text.is_empty() => Some(text.text),
            // Reasoning, tool calls and the final usage frame carry no transcript text.
            _ => None,
        }
    }

    async fn run_stream_worker(
        client: gemini::Client,
        session: SessionHandle,
        input: String,
        target: StreamTarget,
        event_tx: mpsc::UnboundedSender<StreamEventMapped>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let mut stream = match Self::open_stream(&client, &session, &input).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(
                    target = ?target,
                    session_id = %session.id(),
                    model_id = %session.config().model_id,
                    error = %error,
                    "failed to open provider stream"
                );
                Self::emit_error_event(&event_tx, target, error);
                return;
            }
        };

        let mut reply = String::new();
        let mut cancelled = false;
        let mut stream_failed = false;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    cancelled = true;
                    tracing::debug!(target = ?target, "provider stream cancelled");
                    stream.cancel();
                    break;
                }
                next_item = stream.next() => {
                    match next_item {
                        Some(Ok(item)) => {
                            if let Some(text) = Self::text_fragment(item) {
                                reply.push_str(&text);
                                if event_tx.send(StreamEventMapped::delta(target, text)).is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Err(source)) => {
                            stream_failed = true;
                            tracing::warn!(
                                target = ?target,
                                error = %source,
                                "provider stream emitted an error chunk"
                            );
                            let error = ProviderError::CompletionsFailed {
                                stage: "stream-chunk",
                                source,
                            };
                            Self::emit_error_event(&event_tx, target, error);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        if !cancelled && !stream_failed {
            session.commit_exchange(&input, &reply);
            let _ = event_tx.send(StreamEventMapped::done(target));
        }
    }

    async fn request_title(&self, transcript: &[TranscriptLine]) -> ProviderResult<String> {
        let prompt = build_title_prompt(transcript);
        let agent = self
            .client
            .agent(self.config.session.model_id.as_str())
            .build();

        agent.prompt(prompt).await.context(PromptFailedSnafu {
            stage: "summarize-title",
        })
    }
}

impl LlmProvider for RigGeminiAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        "Rig Gemini"
    }

    fn session_config(&self) -> &SessionConfig {
        &self.config.session
    }

    fn stream_reply(
        &self,
        session: &SessionHandle,
        target: StreamTarget,
        input: &str,
    ) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !input.trim().is_empty(),
            EmptyInputSnafu {
                stage: "stream-reply",
                target,
            }
        );

        let (event_tx, stream, cancel_rx) = make_event_stream(target);
        let worker: ProviderWorker = Box::pin(Self::run_stream_worker(
            self.client.clone(),
            session.clone(),
            input.to_string(),
            target,
            event_tx,
            cancel_rx,
        ));

        Ok(ProviderStreamHandle { stream, worker })
    }

    fn summarize_title<'a>(&'a self, transcript: &'a [TranscriptLine]) -> BoxFuture<'a, String> {
        Box::pin(async move {
            match self.request_title(transcript).await {
                Ok(raw_title) => clean_title(&raw_title),
                Err(error) => {
                    tracing::warn!(
                        provider_id = %self.id(),
                        error = %error,
                        "title generation failed; keeping fallback title"
                    );
                    FALLBACK_TITLE.to_string()
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_rejected_before_any_client_is_built() {
        let result = RigGeminiAdapter::new(ProviderConfig::new("gemini", "   ", ""));
        assert!(matches!(
            result,
            Err(ProviderError::MissingApiKey {
                stage: "rig-adapter-new",
                ..
            })
        ));
    }

    #[test]
    fn error_turns_are_not_replayed_to_the_model() {
        let turn = SessionTurn {
            role: Role::Error,
            content: "boom".to_string(),
        };
        assert!(RigGeminiAdapter::to_rig_message(&turn).is_none());
    }

    #[test]
    fn sampling_params_use_generation_config_keys() {
        let params = RigGeminiAdapter::generation_params(&SessionConfig::default());
        assert_eq!(params["generationConfig"]["topP"], serde_json::json!(1.0));
        assert_eq!(params["generationConfig"]["topK"], serde_json::json!(1));
    }
}
