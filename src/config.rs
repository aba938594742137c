//! Configuration types for card processing.
//!
//! All job behaviour is controlled through [`ProcessorConfig`], built via its
//! [`ProcessorConfigBuilder`]. The same config is shared by every job of a
//! batch; per-job state lives in [`crate::job::ProcessingJob`].

use crate::error::CardScanError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a card-processing job.
///
/// Built via [`ProcessorConfig::builder()`] or using
/// [`ProcessorConfig::default()`].
///
/// # Example
/// ```rust
/// use cardscan::ProcessorConfig;
///
/// let config = ProcessorConfig::builder()
///     .querying_enabled(true)
///     .concurrent_regions(true)
///     .ocr_timeout_secs(20)
///     .build()
///     .unwrap();
/// assert!(config.querying_enabled);
/// ```
#[derive(Clone)]
pub struct ProcessorConfig {
    /// Persist needs-attention records and query the catalog. Default: false.
    ///
    /// With querying disabled a job still builds and validates its records,
    /// but nothing is stored. Use it for dry runs and tests.
    pub querying_enabled: bool,

    /// Crop and read the four regions concurrently. Default: false.
    ///
    /// Region results are keyed by region, so output order is identical in
    /// both modes. Per-region failure isolation is unchanged.
    pub concurrent_regions: bool,

    /// Parent directory for job working directories. Default: system temp dir.
    pub work_root: Option<PathBuf>,

    /// Directory confirmed-output records are written to. Default: `cardscan-output`.
    pub output_dir: PathBuf,

    /// Timeout for creating or removing the working directory. Default: 10.
    pub workspace_timeout_secs: u64,

    /// Timeout for one region crop. Default: 30.
    pub extract_timeout_secs: u64,

    /// Timeout for one OCR call. Default: 60.
    pub ocr_timeout_secs: u64,

    /// Timeout for one name or type match. Default: 30.
    pub match_timeout_secs: u64,

    /// Timeout for the result/export service. Default: 60.
    pub export_timeout_secs: u64,

    /// Timeout for one needs-attention insert. Default: 30.
    pub store_timeout_secs: u64,

    /// Number of jobs [`crate::batch::process_batch`] runs at once. Default: 4.
    pub job_concurrency: usize,

    /// Optional observer for job and region events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            querying_enabled: false,
            concurrent_regions: false,
            work_root: None,
            output_dir: PathBuf::from("cardscan-output"),
            workspace_timeout_secs: 10,
            extract_timeout_secs: 30,
            ocr_timeout_secs: 60,
            match_timeout_secs: 30,
            export_timeout_secs: 60,
            store_timeout_secs: 30,
            job_concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("querying_enabled", &self.querying_enabled)
            .field("concurrent_regions", &self.concurrent_regions)
            .field("work_root", &self.work_root)
            .field("output_dir", &self.output_dir)
            .field("workspace_timeout_secs", &self.workspace_timeout_secs)
            .field("extract_timeout_secs", &self.extract_timeout_secs)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("match_timeout_secs", &self.match_timeout_secs)
            .field("export_timeout_secs", &self.export_timeout_secs)
            .field("store_timeout_secs", &self.store_timeout_secs)
            .field("job_concurrency", &self.job_concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn JobProgressCallback>"),
            )
            .finish()
    }
}

impl ProcessorConfig {
    /// Create a new builder for `ProcessorConfig`.
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn workspace_timeout(&self) -> Duration {
        Duration::from_secs(self.workspace_timeout_secs)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }

    pub fn match_timeout(&self) -> Duration {
        Duration::from_secs(self.match_timeout_secs)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// Builder for [`ProcessorConfig`].
#[derive(Debug)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    pub fn querying_enabled(mut self, v: bool) -> Self {
        self.config.querying_enabled = v;
        self
    }

    pub fn concurrent_regions(mut self, v: bool) -> Self {
        self.config.concurrent_regions = v;
        self
    }

    pub fn work_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_root = Some(dir.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn workspace_timeout_secs(mut self, secs: u64) -> Self {
        self.config.workspace_timeout_secs = secs.max(1);
        self
    }

    pub fn extract_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extract_timeout_secs = secs.max(1);
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs.max(1);
        self
    }

    pub fn match_timeout_secs(mut self, secs: u64) -> Self {
        self.config.match_timeout_secs = secs.max(1);
        self
    }

    pub fn export_timeout_secs(mut self, secs: u64) -> Self {
        self.config.export_timeout_secs = secs.max(1);
        self
    }

    pub fn store_timeout_secs(mut self, secs: u64) -> Self {
        self.config.store_timeout_secs = secs.max(1);
        self
    }

    pub fn job_concurrency(mut self, n: usize) -> Self {
        self.config.job_concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessorConfig, CardScanError> {
        let c = &self.config;
        if c.job_concurrency == 0 {
            return Err(CardScanError::InvalidConfig(
                "Job concurrency must be ≥ 1".into(),
            ));
        }
        if c.output_dir.as_os_str().is_empty() {
            return Err(CardScanError::InvalidConfig(
                "Output directory must not be empty".into(),
            ));
        }
        if let Some(root) = &c.work_root {
            if root.exists() && !root.is_dir() {
                return Err(CardScanError::InvalidConfig(format!(
                    "Work root '{}' is not a directory",
                    root.display()
                )));
            }
        }
        Ok(self.config)
    }
}
