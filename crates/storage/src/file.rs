use std::path::{Path, PathBuf};

use snafu::{ResultExt, ensure};

use super::BlobStore;
use super::error::{
    CreateDirectorySnafu, InvalidKeySnafu, ReadBlobSnafu, StorageResult, WriteBlobSnafu,
};

/// One `<key>.json` file per key under a data directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        ensure!(
            !key.is_empty(),
            InvalidKeySnafu {
                stage: "file-blob-key",
                key: key.to_string(),
                details: "key is empty",
            }
        );
        ensure!(
            key.chars()
                .all(|character| character.is_ascii_alphanumeric() || matches!(character, '-' | '_')),
            InvalidKeySnafu {
                stage: "file-blob-key",
                key: key.to_string(),
                details: "only ASCII letters, digits, '-' and '_' are allowed",
            }
        );
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(source).context(ReadBlobSnafu {
                stage: "file-blob-read",
                path: path.display().to_string(),
            }),
        }
    }

    fn put(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.root).context(CreateDirectorySnafu {
            stage: "file-blob-create-directory",
            path: self.root.display().to_string(),
        })?;

        // Write-then-rename so a crash mid-write never leaves a truncated snapshot.
        let staging_path = path.with_extension("json.tmp");
        std::fs::write(&staging_path, value).context(WriteBlobSnafu {
            stage: "file-blob-write-staging",
            path: staging_path.display().to_string(),
        })?;
        std::fs::rename(&staging_path, &path).context(WriteBlobSnafu {
            stage: "file-blob-rename",
            path: path.display().to_string(),
        })
    }
}
