use std::sync::Arc;

mod events;
mod provider;
mod rig_adapter;
mod session;
mod title;

pub use events::{Role, StreamEventMapped, StreamEventPayload, StreamTarget, TranscriptLine};
pub use provider::{
    BoxFuture, LlmProvider, ProviderConfig, ProviderError, ProviderEventStream, ProviderResult,
    ProviderStreamHandle, ProviderWorker, make_event_stream,
};
pub use rig_adapter::{RIG_GEMINI_PROVIDER_ID, RigGeminiAdapter};
pub use session::{
    ChatSession, DEFAULT_GEMINI_MODEL, DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_TEMPERATURE,
    DEFAULT_TOP_K, DEFAULT_TOP_P, SessionConfig, SessionHandle, SessionId, SessionTurn,
};
pub use title::{FALLBACK_TITLE, build_title_prompt, clean_title};

pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "gemini" | "google" | "rig-gemini" => {
            config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigGeminiAdapter::new(config)?))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        let result = create_provider(ProviderConfig::new("openai", "key", ""));
        assert!(matches!(
            result,
            Err(ProviderError::UnsupportedProvider { provider_id, .. }) if provider_id == "openai"
        ));
    }

    #[test]
    fn blank_provider_defaults_to_gemini_and_still_requires_a_key() {
        let result = create_provider(ProviderConfig::new("", "", ""));
        assert!(matches!(
            result,
            Err(ProviderError::MissingApiKey { provider_id, .. }) if provider_id == RIG_GEMINI_PROVIDER_ID
        ));
    }
}
