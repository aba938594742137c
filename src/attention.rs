//! Needs-attention routing: the manual-review path for cards that could not be
//! confirmed automatically.
//!
//! The router builds and validates one [`NeedsAttentionRecord`] from the job
//! state. The record is stored only when querying is enabled. Nothing here is fatal to
//! the job: an invalid record is logged and dropped, a store failure is logged
//! and reported in the [`RouteOutcome`].
//!
//! ## Placeholder payloads
//!
//! A region whose image cannot be encoded gets [`PLACEHOLDER_IMAGE_B64`]
//! instead of failing the whole record. This keeps the record insertable but
//! means the reviewer sees no image for that region, so every substitution is
//! listed in [`NeedsAttentionRecord::substituted_regions`].

use crate::job::{MatchCategory, ProcessingJob, Region};
use crate::pipeline::encode::{encode_region_images, is_valid_base64};
use crate::pipeline::store::{NeedsAttentionStore, StoreAck};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Base64 of `"This is a fake string!"`, stored for regions without an image.
pub const PLACEHOLDER_IMAGE_B64: &str = "VGhpcyBpcyBhIGZha2Ugc3RyaW5nIQ==";

/// Manual-review record for one card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedsAttentionRecord {
    /// Best name candidate, or empty when the matcher had none.
    pub card_name: String,
    /// Clean OCR text of the name region.
    pub extracted_text: String,
    /// Raw OCR text of the name region.
    pub dirty_extracted_text: String,
    pub name_image: String,
    pub type_image: String,
    pub art_image: String,
    pub flavor_image: String,
    /// Comma-joined catalog set identifiers the card could belong to.
    pub possible_sets: String,
    /// Regions whose image is [`PLACEHOLDER_IMAGE_B64`].
    #[serde(default)]
    pub substituted_regions: Vec<Region>,
}

impl NeedsAttentionRecord {
    pub fn image(&self, region: Region) -> &str {
        match region {
            Region::Art => &self.art_image,
            Region::Flavor => &self.flavor_image,
            Region::Name => &self.name_image,
            Region::Type => &self.type_image,
        }
    }

    fn image_mut(&mut self, region: Region) -> &mut String {
        match region {
            Region::Art => &mut self.art_image,
            Region::Flavor => &mut self.flavor_image,
            Region::Name => &mut self.name_image,
            Region::Type => &mut self.type_image,
        }
    }

    /// Check required fields. Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();
        if self.extracted_text.trim().is_empty() {
            problems.push("extracted name text is empty".to_string());
        }
        for region in Region::ALL {
            if !is_valid_base64(self.image(region)) {
                problems.push(format!("{region} image is not valid base64"));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }

    #[cfg(test)]
    pub(crate) fn placeholder_only(card_name: &str, clean: &str, dirty: &str, sets: &str) -> Self {
        Self {
            card_name: card_name.into(),
            extracted_text: clean.into(),
            dirty_extracted_text: dirty.into(),
            name_image: PLACEHOLDER_IMAGE_B64.into(),
            type_image: PLACEHOLDER_IMAGE_B64.into(),
            art_image: PLACEHOLDER_IMAGE_B64.into(),
            flavor_image: PLACEHOLDER_IMAGE_B64.into(),
            possible_sets: sets.into(),
            substituted_regions: Region::ALL.to_vec(),
        }
    }
}

/// What the router did with the record it built.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Valid and persisted.
    Stored { record: NeedsAttentionRecord, ack: StoreAck },
    /// Valid; querying disabled, so not persisted.
    Built { record: NeedsAttentionRecord },
    /// Failed validation; dropped.
    Invalid {
        record: NeedsAttentionRecord,
        problems: Vec<String>,
    },
    /// Valid, but the store rejected or timed out.
    StoreFailed {
        record: NeedsAttentionRecord,
        reason: String,
    },
}

impl RouteOutcome {
    pub fn record(&self) -> &NeedsAttentionRecord {
        match self {
            RouteOutcome::Stored { record, .. }
            | RouteOutcome::Built { record }
            | RouteOutcome::Invalid { record, .. }
            | RouteOutcome::StoreFailed { record, .. } => record,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, RouteOutcome::Stored { .. })
    }
}

/// Builds and conditionally persists needs-attention records.
pub struct NeedsAttentionRouter {
    store: Arc<dyn NeedsAttentionStore>,
    store_timeout: Duration,
}

impl NeedsAttentionRouter {
    pub fn new(store: Arc<dyn NeedsAttentionStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// Assemble the record from job state. Never fails; unencodable regions
    /// get the placeholder.
    pub async fn build_record(&self, job: &ProcessingJob, sets: &[String]) -> NeedsAttentionRecord {
        let name_text = job.text(Region::Name).cloned().unwrap_or_default();
        let mut record = NeedsAttentionRecord {
            card_name: job
                .best(MatchCategory::Name)
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            extracted_text: name_text.clean_text,
            dirty_extracted_text: name_text.dirty_text,
            name_image: String::new(),
            type_image: String::new(),
            art_image: String::new(),
            flavor_image: String::new(),
            possible_sets: sets.join(","),
            substituted_regions: Vec::new(),
        };

        for (region, encoded) in encode_region_images(&job.image_paths()).await {
            match encoded {
                Ok(b64) => *record.image_mut(region) = b64,
                Err(e) => {
                    warn!(
                        job = %job.source.display(),
                        stage = "needs-attention",
                        %region,
                        "Substituting placeholder image: {}",
                        e
                    );
                    *record.image_mut(region) = PLACEHOLDER_IMAGE_B64.to_string();
                    record.substituted_regions.push(region);
                }
            }
        }
        record
    }

    /// Build, validate and (when querying is enabled) persist a record.
    pub async fn route(&self, job: &ProcessingJob, sets: &[String]) -> RouteOutcome {
        let source = job.source.display().to_string();
        info!(job = %source, "Processing needs attention: {}", sets.join(","));

        let record = self.build_record(job, sets).await;

        if let Err(problems) = record.validate() {
            error!(
                job = %source,
                stage = "needs-attention",
                "Invalid needs-attention record dropped: {}",
                problems.join("; ")
            );
            return RouteOutcome::Invalid { record, problems };
        }

        if !job.querying_enabled {
            info!(job = %source, "Querying disabled; needs-attention record not stored");
            return RouteOutcome::Built { record };
        }

        match tokio::time::timeout(self.store_timeout, self.store.insert(&record)).await {
            Ok(Ok(ack)) => {
                info!(job = %source, id = %ack.id, "Stored needs-attention record");
                RouteOutcome::Stored { record, ack }
            }
            Ok(Err(e)) => {
                error!(job = %source, stage = "needs-attention", "Store failed: {}", e);
                RouteOutcome::StoreFailed {
                    record,
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                let reason = format!("timed out after {}s", self.store_timeout.as_secs());
                error!(job = %source, stage = "needs-attention", "Store {}", reason);
                RouteOutcome::StoreFailed { record, reason }
            }
        }
    }
}
