//! Error types for the cardscan library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CardScanError`]: **Fatal**: the job cannot proceed (no working
//!   directory, no region could be read, the name region is missing).
//!   Returned as `Err(CardScanError)` from [`crate::processor::CardJob::execute`]
//!   and [`crate::processor::CardJob::generate_output`].
//!
//! * [`RegionError`]: **Non-fatal**: a single region failed to crop or read
//!   (a card without flavor text, a glare over the type line) while the other
//!   regions are fine. Stored inside [`crate::job::RegionStatus`] so callers
//!   and tests can see *why* a region is missing.
//!
//! Collaborators report [`AdapterError`]; the orchestrator decides whether a
//! given adapter failure is fatal or degrades to a [`RegionError`].

use crate::job::Region;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the cardscan library.
///
/// Region-level failures use [`RegionError`] and are stored in the job state
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum CardScanError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source image was not found at the given path.
    #[error("Card image not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    // ── Stage errors ──────────────────────────────────────────────────────
    /// The job-scoped working directory could not be created.
    #[error("Failed to create working directory: {reason}")]
    WorkspaceFailed { reason: String },

    /// Every region failed to crop or read; nothing left to match.
    #[error("No Image paths to process for '{path}'")]
    NoImagePaths { path: PathBuf },

    /// The name region has no text, so no name match can be attempted.
    #[error("Name region unavailable for '{path}': {reason}")]
    NameRegionMissing { path: PathBuf, reason: String },

    /// The name matcher itself failed.
    #[error("Name matching failed for '{path}': {reason}")]
    MatchingFailed { path: PathBuf, reason: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// `generate_output` was called before the job reached a confirmed match.
    #[error("No confirmed match to write for '{path}': {reason}")]
    OutputNotReady { path: PathBuf, reason: String },

    /// `generate_output` was already called successfully for this job.
    #[error("Confirmed output for '{path}' was already written to '{written}'")]
    OutputAlreadyWritten { path: PathBuf, written: PathBuf },

    /// Could not create or write the confirmed-output record.
    #[error("Failed to write output record '{path}': {reason}")]
    OutputWriteFailed { path: PathBuf, reason: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single region.
///
/// The job continues unless every region fails or the failed region is the
/// name region.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum RegionError {
    /// The cropper could not produce an image for the region.
    #[error("{region}: extraction failed: {detail}")]
    ExtractFailed { region: Region, detail: String },

    /// The region image exists but OCR could not read it.
    #[error("{region}: OCR failed: {detail}")]
    OcrFailed { region: Region, detail: String },

    /// A collaborator call for the region exceeded its timeout.
    #[error("{region}: {stage} timed out after {secs}s")]
    Timeout {
        region: Region,
        stage: String,
        secs: u64,
    },

    /// The region image could not be base64-encoded for manual review.
    #[error("{region}: encoding failed: {detail}")]
    EncodeFailed { region: Region, detail: String },
}

impl RegionError {
    /// The region this error belongs to.
    pub fn region(&self) -> Region {
        match self {
            RegionError::ExtractFailed { region, .. }
            | RegionError::OcrFailed { region, .. }
            | RegionError::Timeout { region, .. }
            | RegionError::EncodeFailed { region, .. } => *region,
        }
    }
}

/// Error reported by an external collaborator (cropper, OCR, matcher, store…).
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The underlying engine (OCR binary, catalog service…) reported a failure.
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("{0}")]
    Other(String),
}

/// Contract violations for [`crate::hash::compare_hash`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashCompareError {
    #[error("Cannot compare empty hashes")]
    Empty,

    #[error("Hash length mismatch: {left} vs {right} characters")]
    LengthMismatch { left: usize, right: usize },

    #[error("Hash length {len} is not a multiple of 4")]
    InvalidLength { len: usize },
}
