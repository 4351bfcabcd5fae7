use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("storage id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
    },
    #[snafu(display("blob key '{key}' is invalid: {details}"))]
    InvalidKey {
        stage: &'static str,
        key: String,
        details: &'static str,
    },
    #[snafu(display("storage invariant violation: {details}"))]
    InvariantViolation {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("failed to create storage directory at {path}"))]
    CreateDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to read blob from {path}"))]
    ReadBlob {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to write blob to {path}"))]
    WriteBlob {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to encode conversation snapshot"))]
    EncodeSnapshot {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to decode conversation snapshot at {stage}: {source}"))]
    DecodeSnapshot {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("conversation snapshot is malformed: {details}"))]
    MalformedSnapshot {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("conversation snapshot version {found} is newer than supported version {supported}"))]
    UnsupportedSchemaVersion {
        stage: &'static str,
        found: u64,
        supported: u64,
    },
    #[snafu(display("failed to parse sqlite connection URL '{database_url}'"))]
    SqliteConnectOptions {
        stage: &'static str,
        database_url: String,
        source: sqlx::Error,
    },
    #[snafu(display("failed to connect sqlite database '{database_url}'"))]
    SqliteConnect {
        stage: &'static str,
        database_url: String,
        source: sqlx::Error,
    },
    #[snafu(display("sqlite query failed at {stage}: {source}"))]
    SqliteQuery {
        stage: &'static str,
        source: sqlx::Error,
    },
    #[snafu(display("failed to spawn sqlite worker thread"))]
    SqliteThreadSpawn {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to initialize sqlite worker runtime"))]
    SqliteRuntimeInit {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;
