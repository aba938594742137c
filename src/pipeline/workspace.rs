//! Job working directories.
//!
//! Each job crops its regions into a directory it owns exclusively. The
//! directory is created during Init and removed during Cleanup. If the job
//! future is dropped before Cleanup (cancellation, panic), [`WorkspaceGuard`]
//! removes it synchronously on drop.

use crate::error::AdapterError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Creates and removes job-scoped working directories.
#[async_trait]
pub trait DirectoryProvisioner: Send + Sync {
    /// Create a new, unique, empty directory.
    async fn create(&self) -> Result<PathBuf, AdapterError>;

    /// Recursively remove a directory created by [`Self::create`].
    async fn remove(&self, dir: &Path) -> Result<(), AdapterError>;
}

/// Creates `cardscan-*` directories under a root (system temp dir by default).
#[derive(Debug, Clone, Default)]
pub struct TempDirProvisioner {
    root: Option<PathBuf>,
}

impl TempDirProvisioner {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

#[async_trait]
impl DirectoryProvisioner for TempDirProvisioner {
    async fn create(&self) -> Result<PathBuf, AdapterError> {
        let root = self.root.clone();
        let dir = tokio::task::spawn_blocking(move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix("cardscan-");
            let tmp = match root {
                Some(root) => {
                    std::fs::create_dir_all(&root)?;
                    builder.tempdir_in(root)?
                }
                None => builder.tempdir()?,
            };
            // Ownership passes to the job; removal goes through `remove`.
            Ok::<_, std::io::Error>(tmp.keep())
        })
        .await
        .map_err(|e| AdapterError::Other(format!("Directory task panicked: {e}")))??;

        debug!("Created working directory {}", dir.display());
        Ok(dir)
    }

    async fn remove(&self, dir: &Path) -> Result<(), AdapterError> {
        tokio::fs::remove_dir_all(dir).await?;
        Ok(())
    }
}

/// Removes a working directory on drop unless it was released first.
///
/// The orchestrator calls [`WorkspaceGuard::release`] right before its own
/// asynchronous cleanup, so the directory is removed exactly once either way.
#[derive(Debug)]
pub struct WorkspaceGuard {
    dir: Option<PathBuf>,
}

impl WorkspaceGuard {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir: Some(dir) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Hand the directory back to the caller; drop becomes a no-op.
    pub fn release(mut self) -> Option<PathBuf> {
        self.dir.take()
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            warn!("Job dropped before cleanup; removing {}", dir.display());
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!("Failed to remove {}: {}", dir.display(), e);
            }
        }
    }
}
