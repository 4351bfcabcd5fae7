use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use parley_llm::{
    DEFAULT_GEMINI_MODEL, DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_TEMPERATURE, DEFAULT_TOP_K,
    DEFAULT_TOP_P, ProviderConfig, RIG_GEMINI_PROVIDER_ID, SessionConfig,
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::view::Theme;

pub const SETTINGS_DIRECTORY_NAME: &str = "parley";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "PARLEY_";
pub const DEFAULT_LOG_FILTER: &str = "warn";
pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;

// Checked in order when no key was configured through the file or `PARLEY_API_KEY`.
const CREDENTIAL_FALLBACK_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Where conversation snapshots are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// `<data_dir>/conversations.json`
    #[default]
    File,
    /// `<data_dir>/parley.db`
    Sqlite,
    /// Nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider_id: String,
    pub api_key: String,
    /// Empty means the provider's public endpoint.
    pub base_url: String,
    pub model: String,
    pub system_instruction: String,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub storage: StorageBackend,
    pub data_dir: Option<PathBuf>,
    pub stream_idle_timeout_secs: u64,
    pub theme: Theme,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider_id: RIG_GEMINI_PROVIDER_ID.to_string(),
            api_key: String::new(),
            base_url: String::new(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            storage: StorageBackend::default(),
            data_dir: None,
            stream_idle_timeout_secs: DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
            theme: Theme::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Settings {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".parley"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Defaults, then the JSON file at `config_path` (if present), then `PARLEY_*`.
    pub fn figment(config_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(Self::figment(&Self::default_config_path()))
    }

    pub fn load_from(figment: Figment) -> Result<Self, SettingsError> {
        let mut settings = figment.extract::<Settings>().context(ExtractSnafu {
            stage: "extract-settings",
        })?;
        settings.apply_credential_fallback(|name| std::env::var(name).ok());
        Ok(settings.normalized())
    }

    fn apply_credential_fallback(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if !self.api_key.trim().is_empty() {
            return;
        }

        if let Some(api_key) = CREDENTIAL_FALLBACK_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|value| !value.trim().is_empty())
        {
            self.api_key = api_key;
        }
    }

    fn normalized(mut self) -> Self {
        self.provider_id = self.provider_id.trim().to_string();
        if self.provider_id.is_empty() {
            self.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
        }
        self.api_key = self.api_key.trim().to_string();
        self.base_url = self.base_url.trim().to_string();
        self.model = self.model.trim().to_string();
        if self.model.is_empty() {
            self.model = DEFAULT_GEMINI_MODEL.to_string();
        }
        self.stream_idle_timeout_secs = self.stream_idle_timeout_secs.max(1);
        self
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|path| path.join(SETTINGS_DIRECTORY_NAME)))
            .unwrap_or_else(|| PathBuf::from(".parley"))
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            ..SessionConfig::default()
        }
        .with_model(self.model.as_str())
        .with_system_instruction(self.system_instruction.as_str())
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(&self.provider_id, &self.api_key, &self.base_url)
            .with_session(self.session_config())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to load settings on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        source: figment::Error,
    },
}
