use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use snafu::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Connection, SqliteConnection};

use super::BlobStore;
use super::error::{
    CreateDirectorySnafu, InvariantViolationSnafu, SqliteConnectOptionsSnafu, SqliteConnectSnafu,
    SqliteQuerySnafu, SqliteRuntimeInitSnafu, SqliteThreadSpawnSnafu, StorageResult,
};

const CREATE_BLOBS_TABLE: &str = "CREATE TABLE IF NOT EXISTS blobs (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
)";

/// Key-value blob store backed by a single SQLite table.
///
/// Every call opens its own connection, so in-memory databases are not supported;
/// use [`MemoryBlobStore`](crate::MemoryBlobStore) for ephemeral runs.
#[derive(Debug, Clone)]
pub struct SqliteBlobStore {
    connect_options: SqliteConnectOptions,
    database_url: String,
}

impl SqliteBlobStore {
    pub async fn open(database_location: &str) -> StorageResult<Self> {
        ensure_database_directory(database_location)?;

        let database_url = normalize_database_url(database_location);
        let connect_options = SqliteConnectOptions::from_str(&database_url)
            .context(SqliteConnectOptionsSnafu {
                stage: "sqlite-open-parse-url",
                database_url: database_url.clone(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));

        let mut connection = SqliteConnection::connect_with(&connect_options)
            .await
            .context(SqliteConnectSnafu {
                stage: "sqlite-open-connect",
                database_url: database_url.clone(),
            })?;

        sqlx::query(CREATE_BLOBS_TABLE)
            .execute(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "sqlite-open-create-table",
            })?;

        connection.close().await.context(SqliteQuerySnafu {
            stage: "sqlite-open-close",
        })?;

        tracing::debug!(database_url = %database_url, "opened sqlite blob store");
        Ok(Self {
            connect_options,
            database_url,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    fn run_db_call<T, F>(&self, stage: &'static str, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: Future<Output = StorageResult<T>> + Send + 'static,
    {
        // Store traits are sync, so each call executes on a dedicated worker thread
        // with its own current-thread runtime to avoid nested-runtime blocking panics.
        let worker = std::thread::Builder::new()
            .name(format!("sqlite-blob-{stage}"))
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context(SqliteRuntimeInitSnafu {
                        stage: "sqlite-blob-runtime-build",
                    })?;
                runtime.block_on(op)
            })
            .context(SqliteThreadSpawnSnafu {
                stage: "sqlite-blob-spawn-worker",
            })?;

        match worker.join() {
            Ok(result) => result,
            Err(_) => InvariantViolationSnafu {
                stage,
                details: "sqlite blob worker thread panicked".to_string(),
            }
            .fail(),
        }
    }
}

impl BlobStore for SqliteBlobStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let connect_options = self.connect_options.clone();
        let database_url = self.database_url.clone();
        let key = key.to_string();
        self.run_db_call("blob-get", async move {
            let mut connection =
                connect_store_connection(&connect_options, &database_url, "blob-get-connect")
                    .await?;
            sqlx::query_scalar::<_, String>("SELECT value FROM blobs WHERE key = ?")
                .bind(key)
                .fetch_optional(&mut connection)
                .await
                .context(SqliteQuerySnafu {
                    stage: "blob-get-select",
                })
        })
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        let connect_options = self.connect_options.clone();
        let database_url = self.database_url.clone();
        let key = key.to_string();
        let value = value.to_string();
        self.run_db_call("blob-put", async move {
            let mut connection =
                connect_store_connection(&connect_options, &database_url, "blob-put-connect")
                    .await?;
            sqlx::query(
                "INSERT INTO blobs (key, value, updated_at) VALUES (?, ?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value)
            .bind(unix_timestamp_seconds())
            .execute(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "blob-put-upsert",
            })?;
            Ok(())
        })
    }
}

async fn connect_store_connection(
    connect_options: &SqliteConnectOptions,
    database_url: &str,
    stage: &'static str,
) -> StorageResult<SqliteConnection> {
    SqliteConnection::connect_with(connect_options)
        .await
        .context(SqliteConnectSnafu {
            stage,
            database_url: database_url.to_string(),
        })
}

fn unix_timestamp_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
}

fn ensure_database_directory(database_location: &str) -> StorageResult<()> {
    if database_location.starts_with("sqlite:") {
        return Ok(());
    }

    let path = Path::new(database_location);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateDirectorySnafu {
            stage: "sqlite-open-create-directory",
            path: parent.display().to_string(),
        })?;
    }

    Ok(())
}

fn normalize_database_url(database_location: &str) -> String {
    if database_location.starts_with("sqlite:") {
        return database_location.to_string();
    }

    format!("sqlite://{database_location}")
}
