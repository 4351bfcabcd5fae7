mod state;

pub use state::{
    DEFAULT_LOG_FILTER, DEFAULT_STREAM_IDLE_TIMEOUT_SECS, ENV_PREFIX, SETTINGS_DIRECTORY_NAME,
    SETTINGS_FILE_NAME, Settings, SettingsError, StorageBackend,
};
