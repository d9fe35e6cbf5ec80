//! Filesystem-backed record store
//!
//! Writes go to a temporary file inside the storage directory and are then
//! renamed over the target, so a reader sees either the previous document or
//! the new one in full.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::fs;

use super::identifier::Identifier;
use super::record::MetadataRecord;

/// Storage failures, surfaced to clients as 500 responses
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Write { path: String, source: io::Error },
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("failed to encode record: {0}")]
    Encode(serde_json::Error),
    #[error("stored record {path} is not valid JSON: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Record store rooted at one directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document stored for `id`
    pub fn path_for(&self, id: &Identifier) -> PathBuf {
        self.root.join(id.file_name())
    }

    /// Create the storage directory if it does not exist yet
    pub async fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    /// Whether the storage directory is present
    pub async fn is_ready(&self) -> bool {
        fs::metadata(&self.root)
            .await
            .is_ok_and(|m| m.is_dir())
    }

    /// Store `record` under `id`, replacing any previous document
    pub async fn put(&self, id: &Identifier, record: &MetadataRecord) -> Result<(), StoreError> {
        let content = record.to_pretty_json().map_err(StoreError::Encode)?;
        let root = self.root.clone();
        let target = self.path_for(id);

        tokio::task::spawn_blocking(move || write_replace(&root, &target, &content)).await?
    }

    /// Load the record stored under `id`, `None` if there is none
    pub async fn get(&self, id: &Identifier) -> Result<Option<MetadataRecord>, StoreError> {
        let path = self.path_for(id);
        let content = match fs::read(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|source| StoreError::Decode {
                path: path.display().to_string(),
                source,
            })
    }
}

/// Write `content` to a sibling temp file, then rename it onto `target`
///
/// The temp file lives in `dir` so the rename stays on one filesystem.
/// If anything fails before the rename the temp file is removed on drop.
fn write_replace(dir: &Path, target: &Path, content: &[u8]) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: target.display().to_string(),
        source,
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(write_err)?;
    temp.write_all(content).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(target).map_err(|e| write_err(e.error))?;
    Ok(())
}
