use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{ResultExt, ensure};

use super::error::{
    DecodeSnapshotSnafu, EncodeSnapshotSnafu, MalformedSnapshotSnafu, StorageResult,
    UnsupportedSchemaVersionSnafu,
};
use super::types::ConversationRecord;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u64 = 1;

#[derive(Serialize)]
struct VersionedSnapshotRef<'a> {
    version: u64,
    conversations: &'a [ConversationRecord],
}

#[derive(Deserialize)]
struct VersionedSnapshot {
    version: u64,
    #[serde(default)]
    conversations: Vec<ConversationRecord>,
}

pub fn encode_snapshot(conversations: &[ConversationRecord]) -> StorageResult<String> {
    serde_json::to_string(&VersionedSnapshotRef {
        version: CURRENT_SCHEMA_VERSION,
        conversations,
    })
    .context(EncodeSnapshotSnafu {
        stage: "encode-snapshot",
    })
}

/// Decodes either the versioned envelope or the legacy bare array of conversations.
pub fn decode_snapshot(raw: &str) -> StorageResult<Vec<ConversationRecord>> {
    let value: Value = serde_json::from_str(raw).context(DecodeSnapshotSnafu {
        stage: "decode-snapshot-json",
    })?;

    match value {
        Value::Array(_) => serde_json::from_value(value).context(DecodeSnapshotSnafu {
            stage: "decode-snapshot-legacy",
        }),
        Value::Object(_) => {
            let snapshot: VersionedSnapshot =
                serde_json::from_value(value).context(DecodeSnapshotSnafu {
                    stage: "decode-snapshot-versioned",
                })?;
            ensure!(
                snapshot.version <= CURRENT_SCHEMA_VERSION,
                UnsupportedSchemaVersionSnafu {
                    stage: "decode-snapshot-version",
                    found: snapshot.version,
                    supported: CURRENT_SCHEMA_VERSION,
                }
            );
            Ok(snapshot.conversations)
        }
        other => MalformedSnapshotSnafu {
            stage: "decode-snapshot-shape",
            details: format!("expected an array or object, found {}", json_kind(&other)),
        }
        .fail(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
