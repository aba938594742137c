//! # cardscan
//!
//! Identify trading cards from photographs.
//!
//! Each photograph is cropped into four regions and every crop is read with
//! OCR. The name and type-line text is then fuzzy-matched against a card-name
//! catalog and a type vocabulary. The best name goes to
//! a result service: a unique hit becomes a confirmed-output record, several
//! possible printings become a needs-attention record for manual review.
//!
//! The crate also ships [`compare_hash`], a windowed similarity score for
//! perceptual image hashes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! card.jpg
//!  │
//!  ├─ 1. Init      create a job-scoped working directory
//!  ├─ 2. Regions   crop + OCR art / flavor / name / type (per-region failures kept)
//!  ├─ 3. Match     rank name and type candidates
//!  ├─ 4. Route     confirmed │ needs attention │ export failed
//!  └─ 5. Cleanup   remove the working directory (always, exactly once)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cardscan::pipeline::export::CatalogExporter;
//! use cardscan::pipeline::matching::VocabularyMatcher;
//! use cardscan::pipeline::ocr::TesseractCli;
//! use cardscan::pipeline::region::FractionalCropper;
//! use cardscan::{Adapters, CardJob, ProcessorConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProcessorConfig::default();
//!     let adapters = Adapters::builder()
//!         .extractor(Arc::new(FractionalCropper::default()))
//!         .ocr(Arc::new(TesseractCli::default()))
//!         .names(Arc::new(VocabularyMatcher::from_file("names.txt").await?))
//!         .types(Arc::new(VocabularyMatcher::from_file("types.txt").await?))
//!         .exporter(Arc::new(CatalogExporter::from_file("catalog.json").await?))
//!         .build(&config)?;
//!
//!     let mut job = CardJob::new("bolt.jpg", Arc::new(adapters), config);
//!     let outcome = job.execute().await?;
//!     if outcome.is_confirmed() {
//!         println!("{}", job.generate_output().await?.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cardscan` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! cardscan = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod attention;
pub mod batch;
pub mod config;
pub mod error;
pub mod hash;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod processor;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use attention::{NeedsAttentionRecord, NeedsAttentionRouter, RouteOutcome, PLACEHOLDER_IMAGE_B64};
pub use batch::{process_batch, BatchItem, BatchSummary};
pub use config::{ProcessorConfig, ProcessorConfigBuilder};
pub use error::{AdapterError, CardScanError, HashCompareError, RegionError};
pub use hash::{compare_hash, compare_hash_with, HashComparison, WindowConvention};
pub use job::{ExtractedText, MatchCategory, ProcessingJob, RankedCandidate, Region, RegionStatus};
pub use output::{ConfirmedRecord, JobOutcome};
pub use processor::{Adapters, AdaptersBuilder, CardJob, Stage};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
