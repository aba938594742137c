//! Batch processing: many card images, one job each.
//!
//! Sources are validated up front with [`resolve_source`], then run as
//! independent [`CardJob`]s with at most `job_concurrency` in flight. Each job
//! gets its own working directory; the adapters are shared. Results come back
//! in input order whatever order the jobs finished in.

use crate::config::ProcessorConfig;
use crate::error::CardScanError;
use crate::output::JobOutcome;
use crate::pipeline::input::resolve_source;
use crate::processor::{Adapters, CardJob};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Result of one source in a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub source: PathBuf,
    /// The job result, or the pre-validation error when the job never ran.
    pub result: Result<JobOutcome, CardScanError>,
    /// Confirmed-output write result; `None` unless output was requested and
    /// the job was confirmed.
    pub output: Option<Result<PathBuf, CardScanError>>,
}

impl BatchItem {
    fn failed(source: PathBuf, err: CardScanError) -> Self {
        Self {
            source,
            result: Err(err),
            output: None,
        }
    }
}

/// Per-outcome counts over a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub confirmed: usize,
    pub needs_attention: usize,
    pub export_failed: usize,
    pub failed: usize,
    pub written: usize,
}

impl BatchSummary {
    pub fn from_items(items: &[BatchItem]) -> Self {
        let mut s = Self::default();
        for item in items {
            match &item.result {
                Ok(JobOutcome::Confirmed { .. }) => s.confirmed += 1,
                Ok(JobOutcome::NeedsAttention(_)) => s.needs_attention += 1,
                Ok(JobOutcome::ExportFailed { .. }) => s.export_failed += 1,
                Err(_) => s.failed += 1,
            }
            if matches!(item.output, Some(Ok(_))) {
                s.written += 1;
            }
        }
        s
    }

    pub fn total(&self) -> usize {
        self.confirmed + self.needs_attention + self.export_failed + self.failed
    }
}

/// Run one job per source with bounded concurrency.
///
/// When `write_output` is set, every confirmed job also calls
/// [`CardJob::generate_output`]. One failing source never affects the others.
pub async fn process_batch<I, P>(
    sources: I,
    adapters: Arc<Adapters>,
    config: &ProcessorConfig,
    write_output: bool,
) -> Vec<BatchItem>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let start = Instant::now();
    let sources: Vec<PathBuf> = sources.into_iter().map(Into::into).collect();
    info!(
        "Starting batch of {} card images ({} at a time)",
        sources.len(),
        config.job_concurrency
    );

    let mut results: Vec<(usize, BatchItem)> = stream::iter(sources.into_iter().enumerate().map(
        |(idx, source)| {
            let adapters = Arc::clone(&adapters);
            let config = config.clone();
            async move { (idx, run_one(source, adapters, config, write_output).await) }
        },
    ))
    .buffer_unordered(config.job_concurrency.max(1))
    .collect()
    .await;

    results.sort_by_key(|(idx, _)| *idx);
    let items: Vec<BatchItem> = results.into_iter().map(|(_, item)| item).collect();

    let summary = BatchSummary::from_items(&items);
    info!(
        "Batch complete in {}ms: {} confirmed, {} needs attention, {} export failed, {} failed",
        start.elapsed().as_millis(),
        summary.confirmed,
        summary.needs_attention,
        summary.export_failed,
        summary.failed
    );
    items
}

async fn run_one(
    source: PathBuf,
    adapters: Arc<Adapters>,
    config: ProcessorConfig,
    write_output: bool,
) -> BatchItem {
    let source = match resolve_source(&source) {
        Ok((path, _format)) => path,
        Err(e) => {
            warn!(job = %source.display(), "Skipping source: {}", e);
            if let Some(cb) = &config.progress_callback {
                cb.on_job_complete(&source, false);
            }
            return BatchItem::failed(source, e);
        }
    };

    let mut job = CardJob::new(source.clone(), adapters, config);
    let result = job.execute().await;

    let output = match &result {
        Ok(outcome) if write_output && outcome.is_confirmed() => Some(job.generate_output().await),
        _ => None,
    };

    BatchItem {
        source,
        result,
        output,
    }
}
