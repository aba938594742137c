//! Persistence collaborators: the needs-attention store and the
//! confirmed-output writer.
//!
//! Both defaults are file based. `JsonLinesStore` appends one JSON document
//! per record; `JsonFileWriter` writes one JSON file per confirmed card using
//! a private temp file that is linked into place only under a free name.

use crate::attention::NeedsAttentionRecord;
use crate::error::AdapterError;
use crate::output::ConfirmedRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Acknowledgement returned by a successful insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAck {
    /// Store-specific identifier of the inserted record.
    pub id: String,
}

/// Persists validated needs-attention records.
#[async_trait]
pub trait NeedsAttentionStore: Send + Sync {
    async fn insert(&self, record: &NeedsAttentionRecord) -> Result<StoreAck, AdapterError>;
}

/// Writes confirmed-output records and returns where they went.
#[async_trait]
pub trait OutputWriter: Send + Sync {
    async fn write(&self, record: &ConfirmedRecord) -> Result<PathBuf, AdapterError>;
}

/// Appends needs-attention records to a JSON Lines file.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    // Serialises appends from concurrent jobs.
    lock: Mutex<()>,
}

impl JsonLinesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl NeedsAttentionStore for JsonLinesStore {
    async fn insert(&self, record: &NeedsAttentionRecord) -> Result<StoreAck, AdapterError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let offset = file.metadata().await?.len();
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Stored needs-attention record at {}:{}", self.path.display(), offset);
        Ok(StoreAck {
            id: format!("{}:{offset}", self.path.display()),
        })
    }
}

/// Upper bound on `<stem>-<n>.json` suffixes tried before giving up.
const MAX_NAME_ATTEMPTS: usize = 10_000;

/// Writes each confirmed record to `<dir>/<source-stem>.json`.
///
/// The target is never overwritten: when another card with the same stem got
/// there first the record lands in `<stem>-1.json`, `<stem>-2.json`, ...
#[derive(Debug, Clone)]
pub struct JsonFileWriter {
    dir: PathBuf,
}

impl JsonFileWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn stem_for(record: &ConfirmedRecord) -> String {
        Path::new(&record.path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "card".to_string())
    }
}

#[async_trait]
impl OutputWriter for JsonFileWriter {
    async fn write(&self, record: &ConfirmedRecord) -> Result<PathBuf, AdapterError> {
        let stem = Self::stem_for(record);
        let body = serde_json::to_vec_pretty(record)?;
        let dir = self.dir.clone();

        let path = tokio::task::spawn_blocking(move || persist_unique(&dir, &stem, &body))
            .await
            .map_err(|e| AdapterError::Other(format!("output writer task failed: {e}")))??;

        debug!("Wrote confirmed record {}", path.display());
        Ok(path)
    }
}

/// Write `body` to a private temp file in `dir`, then link it to the first
/// free `<stem>.json` / `<stem>-<n>.json` name.
fn persist_unique(dir: &Path, stem: &str, body: &[u8]) -> std::io::Result<PathBuf> {
    use std::io::Write;

    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".confirmed-")
        .suffix(".json.tmp")
        .tempfile_in(dir)?;
    tmp.write_all(body)?;
    tmp.flush()?;

    for n in 0..MAX_NAME_ATTEMPTS {
        let target = if n == 0 {
            dir.join(format!("{stem}.json"))
        } else {
            dir.join(format!("{stem}-{n}.json"))
        };
        match tmp.persist_noclobber(&target) {
            Ok(_) => return Ok(target),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => tmp = e.file,
            Err(e) => return Err(e.error),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free output name for {stem} in {}", dir.display()),
    ))
}
