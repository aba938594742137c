//! Single-card job orchestration.
//!
//! A [`CardJob`] owns one source image and walks it through a fixed, linear
//! sequence of [`Stage`]s:
//!
//! ```text
//! Init ──▶ RegionExtraction ──▶ FuzzyMatching ──▶ ResultRouting ──▶ Cleanup
//! (workdir)  (crop + OCR ×4)     (name, type)      (export / review)  (always)
//! ```
//!
//! Each stage returns a `Flow` value telling the orchestrator whether to go on
//! or finish early with an outcome. Fatal conditions abort with a
//! [`CardScanError`].
//! Cleanup runs exactly once on every path after Init; a [`WorkspaceGuard`]
//! removes the directory if the job future is dropped before that.
//!
//! All collaborators are injected through [`Adapters`]; nothing in this module
//! touches global state.

use crate::attention::NeedsAttentionRouter;
use crate::config::ProcessorConfig;
use crate::error::{AdapterError, CardScanError, RegionError};
use crate::job::{rank, MatchCategory, ProcessingJob, Region, RegionStatus};
use crate::output::{created_today, ConfirmedRecord, JobOutcome};
use crate::pipeline::export::{ExportOutcome, ResultExporter};
use crate::pipeline::matching::{NameMatcher, TypeMatcher};
use crate::pipeline::ocr::TextExtractor;
use crate::pipeline::region::RegionExtractor;
use crate::pipeline::store::{JsonFileWriter, JsonLinesStore, NeedsAttentionStore, OutputWriter};
use crate::pipeline::workspace::{DirectoryProvisioner, TempDirProvisioner, WorkspaceGuard};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// File name of the default needs-attention store inside `output_dir`.
pub const DEFAULT_STORE_FILE: &str = "needs-attention.jsonl";

// ── Adapters ─────────────────────────────────────────────────────────────

/// The collaborators a job talks to. Shared read-only between jobs.
#[derive(Clone)]
pub struct Adapters {
    pub provisioner: Arc<dyn DirectoryProvisioner>,
    pub extractor: Arc<dyn RegionExtractor>,
    pub ocr: Arc<dyn TextExtractor>,
    pub names: Arc<dyn NameMatcher>,
    pub types: Arc<dyn TypeMatcher>,
    pub exporter: Arc<dyn ResultExporter>,
    pub store: Arc<dyn NeedsAttentionStore>,
    pub writer: Arc<dyn OutputWriter>,
}

impl fmt::Debug for Adapters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapters").finish_non_exhaustive()
    }
}

impl Adapters {
    pub fn builder() -> AdaptersBuilder {
        AdaptersBuilder::default()
    }
}

/// Builder for [`Adapters`].
///
/// The cropper, OCR engine, both matchers and the exporter are required.
/// Provisioner, store and writer default to [`TempDirProvisioner`] under
/// `work_root`, a [`JsonLinesStore`] at `<output_dir>/needs-attention.jsonl`
/// and a [`JsonFileWriter`] into `output_dir`.
#[derive(Default)]
pub struct AdaptersBuilder {
    provisioner: Option<Arc<dyn DirectoryProvisioner>>,
    extractor: Option<Arc<dyn RegionExtractor>>,
    ocr: Option<Arc<dyn TextExtractor>>,
    names: Option<Arc<dyn NameMatcher>>,
    types: Option<Arc<dyn TypeMatcher>>,
    exporter: Option<Arc<dyn ResultExporter>>,
    store: Option<Arc<dyn NeedsAttentionStore>>,
    writer: Option<Arc<dyn OutputWriter>>,
}

impl AdaptersBuilder {
    pub fn provisioner(mut self, p: Arc<dyn DirectoryProvisioner>) -> Self {
        self.provisioner = Some(p);
        self
    }

    pub fn extractor(mut self, e: Arc<dyn RegionExtractor>) -> Self {
        self.extractor = Some(e);
        self
    }

    pub fn ocr(mut self, o: Arc<dyn TextExtractor>) -> Self {
        self.ocr = Some(o);
        self
    }

    pub fn names(mut self, m: Arc<dyn NameMatcher>) -> Self {
        self.names = Some(m);
        self
    }

    pub fn types(mut self, m: Arc<dyn TypeMatcher>) -> Self {
        self.types = Some(m);
        self
    }

    pub fn exporter(mut self, e: Arc<dyn ResultExporter>) -> Self {
        self.exporter = Some(e);
        self
    }

    pub fn store(mut self, s: Arc<dyn NeedsAttentionStore>) -> Self {
        self.store = Some(s);
        self
    }

    pub fn writer(mut self, w: Arc<dyn OutputWriter>) -> Self {
        self.writer = Some(w);
        self
    }

    /// Fill defaults from `config` and check required adapters are present.
    pub fn build(self, config: &ProcessorConfig) -> Result<Adapters, CardScanError> {
        fn required<T: ?Sized>(v: Option<Arc<T>>, what: &str) -> Result<Arc<T>, CardScanError> {
            v.ok_or_else(|| CardScanError::InvalidConfig(format!("missing {what} adapter")))
        }

        Ok(Adapters {
            extractor: required(self.extractor, "region extractor")?,
            ocr: required(self.ocr, "text extractor")?,
            names: required(self.names, "name matcher")?,
            types: required(self.types, "type matcher")?,
            exporter: required(self.exporter, "result exporter")?,
            provisioner: self
                .provisioner
                .unwrap_or_else(|| Arc::new(TempDirProvisioner::new(config.work_root.clone()))),
            store: self.store.unwrap_or_else(|| {
                Arc::new(JsonLinesStore::new(config.output_dir.join(DEFAULT_STORE_FILE)))
            }),
            writer: self
                .writer
                .unwrap_or_else(|| Arc::new(JsonFileWriter::new(config.output_dir.clone()))),
        })
    }
}

// ── Stages ───────────────────────────────────────────────────────────────

/// One step of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Init,
    RegionExtraction,
    FuzzyMatching,
    ResultRouting,
    Cleanup,
}

impl Stage {
    /// Stages run between Init and Cleanup, in order.
    pub const BODY: [Stage; 3] = [
        Stage::RegionExtraction,
        Stage::FuzzyMatching,
        Stage::ResultRouting,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::RegionExtraction => "region-extraction",
            Stage::FuzzyMatching => "fuzzy-matching",
            Stage::ResultRouting => "result-routing",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a stage asks the orchestrator to do next.
#[derive(Debug)]
enum Flow {
    Continue,
    Finish(JobOutcome),
}

/// Run `fut` under `limit`, turning an elapsed timer into [`AdapterError::Timeout`].
async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, AdapterError>
where
    F: Future<Output = Result<T, AdapterError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout {
            secs: limit.as_secs(),
        }),
    }
}

// ── CardJob ──────────────────────────────────────────────────────────────

/// One card image moving through the pipeline.
///
/// ```rust,no_run
/// # async fn run(adapters: std::sync::Arc<cardscan::Adapters>) -> Result<(), cardscan::CardScanError> {
/// use cardscan::{CardJob, ProcessorConfig};
///
/// let mut job = CardJob::new("scans/bolt.jpg", adapters, ProcessorConfig::default());
/// if job.execute().await?.is_confirmed() {
///     let path = job.generate_output().await?;
///     println!("wrote {}", path.display());
/// }
/// # Ok(())
/// # }
/// ```
pub struct CardJob {
    state: ProcessingJob,
    adapters: Arc<Adapters>,
    config: ProcessorConfig,
    executed: bool,
    outcome: Option<JobOutcome>,
    written: Option<PathBuf>,
}

impl CardJob {
    pub fn new(source: impl Into<PathBuf>, adapters: Arc<Adapters>, config: ProcessorConfig) -> Self {
        let state = ProcessingJob::new(source, config.querying_enabled);
        Self {
            state,
            adapters,
            config,
            executed: false,
            outcome: None,
            written: None,
        }
    }

    pub fn source(&self) -> &Path {
        &self.state.source
    }

    /// Per-region results and match lists gathered so far.
    pub fn state(&self) -> &ProcessingJob {
        &self.state
    }

    /// The outcome of a successful [`execute`](Self::execute), if any.
    pub fn outcome(&self) -> Option<&JobOutcome> {
        self.outcome.as_ref()
    }

    /// Where [`generate_output`](Self::generate_output) wrote its record.
    pub fn written(&self) -> Option<&Path> {
        self.written.as_deref()
    }

    /// Run the whole job.
    ///
    /// # Errors
    /// Fatal conditions only: the working directory cannot be created, every
    /// region failed, the name region is unusable, or the name matcher failed.
    /// Export errors and needs-attention routing are reported through
    /// [`JobOutcome`].
    pub async fn execute(&mut self) -> Result<JobOutcome, CardScanError> {
        if self.executed {
            return Err(CardScanError::Internal(format!(
                "job for '{}' was already executed",
                self.state.source.display()
            )));
        }
        self.executed = true;

        let start = Instant::now();
        let source = self.state.source.clone();
        info!(job = %source.display(), "Starting card job");

        // ── Init ─────────────────────────────────────────────────────────
        let workdir = match with_timeout(
            self.config.workspace_timeout(),
            self.adapters.provisioner.create(),
        )
        .await
        {
            Ok(dir) => dir,
            Err(e) => {
                error!(job = %source.display(), stage = %Stage::Init, "Failed to create working directory: {}", e);
                self.notify_complete(false);
                return Err(CardScanError::WorkspaceFailed {
                    reason: e.to_string(),
                });
            }
        };
        debug!(job = %source.display(), "Working directory {}", workdir.display());
        let guard = WorkspaceGuard::new(workdir.clone());
        self.state.workdir = Some(workdir.clone());
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_job_start(&source);
        }

        // ── Body ─────────────────────────────────────────────────────────
        let result = self.run_body(&workdir).await;

        // ── Cleanup ──────────────────────────────────────────────────────
        self.cleanup(guard).await;

        // ── Terminal ─────────────────────────────────────────────────────
        match &result {
            Ok(outcome) => {
                info!(
                    job = %source.display(),
                    outcome = outcome.label(),
                    "Card job complete in {}ms",
                    start.elapsed().as_millis()
                );
                self.outcome = Some(outcome.clone());
            }
            Err(e) => error!(job = %source.display(), "Card job failed: {}", e),
        }
        self.notify_complete(result.is_ok());
        result
    }

    async fn run_body(&mut self, workdir: &Path) -> Result<JobOutcome, CardScanError> {
        for stage in Stage::BODY {
            debug!(job = %self.state.source.display(), %stage, "Entering stage");
            let flow = match stage {
                Stage::RegionExtraction => self.extract_regions(workdir).await?,
                Stage::FuzzyMatching => self.match_text().await?,
                Stage::ResultRouting => self.route_result().await,
                Stage::Init | Stage::Cleanup => Flow::Continue,
            };
            if let Flow::Finish(outcome) = flow {
                return Ok(outcome);
            }
        }
        Err(CardScanError::Internal(
            "pipeline finished without an outcome".into(),
        ))
    }

    // ── Stage: RegionExtraction ──────────────────────────────────────────

    async fn extract_regions(&mut self, workdir: &Path) -> Result<Flow, CardScanError> {
        let results: Vec<(Region, RegionStatus)> = if self.config.concurrent_regions {
            futures::future::join_all(
                Region::ALL
                    .into_iter()
                    .map(|region| self.process_region(workdir, region)),
            )
            .await
        } else {
            let mut out = Vec::with_capacity(Region::ALL.len());
            for region in Region::ALL {
                out.push(self.process_region(workdir, region).await);
            }
            out
        };
        self.state.regions.extend(results);

        if self.state.all_regions_failed() {
            error!(
                job = %self.state.source.display(),
                stage = %Stage::RegionExtraction,
                "No Image paths to process"
            );
            return Err(CardScanError::NoImagePaths {
                path: self.state.source.clone(),
            });
        }

        info!(
            job = %self.state.source.display(),
            "Images pre-processed: {} of {} regions read",
            self.state.regions.values().filter(|s| s.is_present()).count(),
            Region::ALL.len()
        );
        Ok(Flow::Continue)
    }

    /// Crop then OCR one region. Never fails; failures become the status.
    async fn process_region(&self, workdir: &Path, region: Region) -> (Region, RegionStatus) {
        let source = &self.state.source;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_region_start(source, region);
        }

        let image = match with_timeout(
            self.config.extract_timeout(),
            self.adapters.extractor.extract(source, workdir, region),
        )
        .await
        {
            Ok(image) => image,
            Err(e) => {
                let reason = region_error(region, "extract", e);
                self.report_region_error(region, &reason);
                return (region, RegionStatus::Absent { reason });
            }
        };

        match with_timeout(self.config.ocr_timeout(), self.adapters.ocr.extract_text(&image)).await {
            Ok(text) => {
                debug!(
                    job = %source.display(),
                    %region,
                    "Read {} chars: {:?}",
                    text.clean_text.len(),
                    text.clean_text
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_region_complete(source, region, text.clean_text.len());
                }
                (region, RegionStatus::Present { image, text })
            }
            Err(e) => {
                let reason = region_error(region, "ocr", e);
                self.report_region_error(region, &reason);
                (region, RegionStatus::Unread { image, reason })
            }
        }
    }

    fn report_region_error(&self, region: Region, reason: &RegionError) {
        warn!(
            job = %self.state.source.display(),
            stage = %Stage::RegionExtraction,
            %region,
            "{}",
            reason
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_region_error(&self.state.source, region, &reason.to_string());
        }
    }

    // ── Stage: FuzzyMatching ─────────────────────────────────────────────

    async fn match_text(&mut self) -> Result<Flow, CardScanError> {
        let source = self.state.source.clone();

        let name_text = match self.state.status(Region::Name) {
            Some(RegionStatus::Present { text, .. }) => text.clean_text.clone(),
            other => {
                let reason = other
                    .and_then(RegionStatus::error)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "name region was not processed".into());
                error!(job = %source.display(), stage = %Stage::FuzzyMatching, "Name region unavailable: {}", reason);
                return Err(CardScanError::NameRegionMissing { path: source, reason });
            }
        };

        let names = with_timeout(
            self.config.match_timeout(),
            self.adapters.names.match_name(&name_text),
        )
        .await
        .map_err(|e| {
            error!(job = %source.display(), stage = %Stage::FuzzyMatching, "Name matching failed: {}", e);
            CardScanError::MatchingFailed {
                path: source.clone(),
                reason: e.to_string(),
            }
        })?;

        let types = match self.state.text(Region::Type) {
            Some(text) => {
                match with_timeout(
                    self.config.match_timeout(),
                    self.adapters.types.match_type(&text.clean_text),
                )
                .await
                {
                    Ok(types) => types,
                    Err(e) => {
                        warn!(job = %source.display(), stage = %Stage::FuzzyMatching, "Type matching failed: {}", e);
                        Vec::new()
                    }
                }
            }
            None => {
                warn!(job = %source.display(), stage = %Stage::FuzzyMatching, "Type region unavailable; skipping type match");
                Vec::new()
            }
        };

        info!(
            job = %source.display(),
            "Matched {} name and {} type candidates",
            names.len(),
            types.len()
        );
        self.state.matches.insert(MatchCategory::Name, rank(names));
        self.state.matches.insert(MatchCategory::Type, rank(types));
        Ok(Flow::Continue)
    }

    // ── Stage: ResultRouting ─────────────────────────────────────────────

    async fn route_result(&self) -> Flow {
        let source = &self.state.source;
        let router = NeedsAttentionRouter::new(self.adapters.store.clone(), self.config.store_timeout());

        let Some(best) = self.state.best(MatchCategory::Name).cloned() else {
            warn!(job = %source.display(), stage = %Stage::ResultRouting, "No name candidate; storing in needs attention");
            return Flow::Finish(JobOutcome::NeedsAttention(router.route(&self.state, &[]).await));
        };

        let exported = with_timeout(
            self.config.export_timeout(),
            self.adapters
                .exporter
                .export(&best.name, source, self.state.querying_enabled),
        )
        .await;

        let outcome = match exported {
            Ok(ExportOutcome::Error { message }) => {
                error!(job = %source.display(), stage = %Stage::ResultRouting, "Export error: {}", message);
                JobOutcome::ExportFailed { reason: message }
            }
            Err(e) => {
                error!(job = %source.display(), stage = %Stage::ResultRouting, "Export service failed: {}", e);
                JobOutcome::ExportFailed {
                    reason: e.to_string(),
                }
            }
            Ok(ExportOutcome::Ambiguous { sets }) if !sets.is_empty() => {
                warn!(
                    job = %source.display(),
                    stage = %Stage::ResultRouting,
                    "No Match Found Storing in Needs Atn: '{}' in {} sets",
                    best.name,
                    sets.len()
                );
                JobOutcome::NeedsAttention(router.route(&self.state, &sets).await)
            }
            Ok(_) => {
                info!(job = %source.display(), "Confirmed '{}' ({:.2})", best.name, best.confidence);
                JobOutcome::Confirmed { candidate: best }
            }
        };
        Flow::Finish(outcome)
    }

    // ── Stage: Cleanup ───────────────────────────────────────────────────

    async fn cleanup(&mut self, guard: WorkspaceGuard) {
        let source = &self.state.source;
        let Some(dir) = guard.release() else {
            return;
        };
        info!(job = %source.display(), "Beginning clean up {}", dir.display());
        match with_timeout(
            self.config.workspace_timeout(),
            self.adapters.provisioner.remove(&dir),
        )
        .await
        {
            Ok(()) => debug!(job = %source.display(), "Removed {}", dir.display()),
            Err(e) => error!(
                job = %source.display(),
                stage = %Stage::Cleanup,
                "Failed to remove {}: {}",
                dir.display(),
                e
            ),
        }
        self.state.workdir = None;
    }

    fn notify_complete(&self, success: bool) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_job_complete(&self.state.source, success);
        }
    }

    // ── Output ───────────────────────────────────────────────────────────

    /// Write the confirmed-output record for this job.
    ///
    /// Only valid once, after [`execute`](Self::execute) returned
    /// [`JobOutcome::Confirmed`]. Type fields are `null` when no type
    /// candidate was found.
    pub async fn generate_output(&mut self) -> Result<PathBuf, CardScanError> {
        let source = self.state.source.clone();
        if let Some(written) = &self.written {
            return Err(CardScanError::OutputAlreadyWritten {
                path: source,
                written: written.clone(),
            });
        }

        match &self.outcome {
            Some(JobOutcome::Confirmed { .. }) => {}
            Some(other) => {
                return Err(CardScanError::OutputNotReady {
                    path: source,
                    reason: format!("job ended as {}", other.label()),
                })
            }
            None => {
                return Err(CardScanError::OutputNotReady {
                    path: source,
                    reason: "job has not completed".into(),
                })
            }
        }

        let name = self
            .state
            .best(MatchCategory::Name)
            .ok_or_else(|| CardScanError::OutputNotReady {
                path: source.clone(),
                reason: "no name candidate".into(),
            })?;
        let record = ConfirmedRecord::new(
            source.display().to_string(),
            created_today(),
            name,
            self.state.best(MatchCategory::Type),
        );

        let path = with_timeout(self.config.store_timeout(), self.adapters.writer.write(&record))
            .await
            .map_err(|e| {
                error!(job = %source.display(), "Failed to write confirmed output: {}", e);
                CardScanError::OutputWriteFailed {
                    path: source.clone(),
                    reason: e.to_string(),
                }
            })?;

        info!(job = %source.display(), "Wrote confirmed output {}", path.display());
        self.written = Some(path.clone());
        Ok(path)
    }
}

impl fmt::Debug for CardJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardJob")
            .field("state", &self.state)
            .field("executed", &self.executed)
            .field("outcome", &self.outcome)
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}

fn region_error(region: Region, stage: &str, e: AdapterError) -> RegionError {
    match (stage, e) {
        (_, AdapterError::Timeout { secs }) => RegionError::Timeout {
            region,
            stage: stage.to_string(),
            secs,
        },
        ("extract", e) => RegionError::ExtractFailed {
            region,
            detail: e.to_string(),
        },
        (_, e) => RegionError::OcrFailed {
            region,
            detail: e.to_string(),
        },
    }
}
