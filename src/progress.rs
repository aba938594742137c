//! Progress-callback trait for job and region events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::config::ProcessorConfigBuilder::progress_callback`] to receive
//! events as a job crops and reads each region.
//!
//! # Example
//!
//! ```rust
//! use cardscan::{JobProgressCallback, ProcessorConfig, Region};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter {
//!     failed: AtomicUsize,
//! }
//!
//! impl JobProgressCallback for FailureCounter {
//!     fn on_region_error(&self, source: &Path, region: Region, error: &str) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}: {region} failed: {error}", source.display());
//!     }
//! }
//!
//! let config = ProcessorConfig::builder()
//!     .progress_callback(Arc::new(FailureCounter { failed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::job::Region;
use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it processes a job.
///
/// Implementations must be `Send + Sync`: with `concurrent_regions` enabled,
/// or in batch mode, methods may be called from several tasks at once. All
/// methods default to no-ops.
pub trait JobProgressCallback: Send + Sync {
    /// Called once the working directory exists, before any region is cropped.
    fn on_job_start(&self, source: &Path) {
        let _ = source;
    }

    /// Called before a region is cropped.
    fn on_region_start(&self, source: &Path, region: Region) {
        let _ = (source, region);
    }

    /// Called when a region was cropped and read.
    ///
    /// * `text_len`: byte length of the clean text
    fn on_region_complete(&self, source: &Path, region: Region, text_len: usize) {
        let _ = (source, region, text_len);
    }

    /// Called when a region failed to crop or read.
    fn on_region_error(&self, source: &Path, region: Region, error: &str) {
        let _ = (source, region, error);
    }

    /// Called once after cleanup.
    ///
    /// * `success`: whether the job ended without a fatal error
    fn on_job_complete(&self, source: &Path, success: bool) {
        let _ = (source, success);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessorConfig`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;
