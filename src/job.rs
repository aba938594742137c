//! Per-job state: regions, extracted text and ranked match candidates.
//!
//! A [`ProcessingJob`] is created when a job starts, mutated stage by stage and
//! dropped with the job. It is never shared between jobs, so it carries no
//! synchronisation.

use crate::error::RegionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// One of the four semantic sub-areas of a card image.
///
/// Ordering follows processing order, which keeps maps keyed by region
/// deterministic regardless of completion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Art,
    Flavor,
    Name,
    Type,
}

impl Region {
    /// All regions in processing order.
    pub const ALL: [Region; 4] = [Region::Art, Region::Flavor, Region::Name, Region::Type];

    /// Tag handed to the cropper and used in file names.
    pub fn tag(self) -> &'static str {
        match self {
            Region::Art => "art",
            Region::Flavor => "flavor",
            Region::Name => "name",
            Region::Type => "type",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for Region {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "art" => Ok(Region::Art),
            "flavor" => Ok(Region::Flavor),
            "name" => Ok(Region::Name),
            "type" => Ok(Region::Type),
            other => Err(format!("Unknown region: '{other}'")),
        }
    }
}

/// OCR output pair: `clean_text` is used for matching, `dirty_text` is the raw
/// engine output kept for manual review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub clean_text: String,
    pub dirty_text: String,
}

impl ExtractedText {
    pub fn new(clean_text: impl Into<String>, dirty_text: impl Into<String>) -> Self {
        Self {
            clean_text: clean_text.into(),
            dirty_text: dirty_text.into(),
        }
    }
}

/// What happened to a region during extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegionStatus {
    /// Cropped and read.
    Present { image: PathBuf, text: ExtractedText },
    /// Cropped, but OCR failed. The image is still usable for manual review.
    Unread { image: PathBuf, reason: RegionError },
    /// The cropper produced nothing.
    Absent { reason: RegionError },
}

impl RegionStatus {
    pub fn image(&self) -> Option<&Path> {
        match self {
            RegionStatus::Present { image, .. } | RegionStatus::Unread { image, .. } => Some(image),
            RegionStatus::Absent { .. } => None,
        }
    }

    pub fn text(&self) -> Option<&ExtractedText> {
        match self {
            RegionStatus::Present { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&RegionError> {
        match self {
            RegionStatus::Present { .. } => None,
            RegionStatus::Unread { reason, .. } | RegionStatus::Absent { reason } => Some(reason),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, RegionStatus::Present { .. })
    }
}

/// Which vocabulary a candidate list was matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchCategory {
    Name,
    Type,
}

/// A catalog entry with the matcher's confidence (0.0–1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub confidence: f64,
    pub name: String,
}

impl RankedCandidate {
    pub fn new(confidence: f64, name: impl Into<String>) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 1.0),
            name: name.into(),
        }
    }
}

/// Sort candidates best-first. Ties keep their incoming order.
pub fn rank(mut candidates: Vec<RankedCandidate>) -> Vec<RankedCandidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    candidates
}

/// Mutable state of one card job.
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    /// The photograph being identified.
    pub source: PathBuf,
    /// Job-scoped working directory, set during Init and cleared by cleanup.
    pub workdir: Option<PathBuf>,
    pub regions: BTreeMap<Region, RegionStatus>,
    pub matches: BTreeMap<MatchCategory, Vec<RankedCandidate>>,
    /// When false, no record is persisted anywhere (dry run).
    pub querying_enabled: bool,
}

impl ProcessingJob {
    pub fn new(source: impl Into<PathBuf>, querying_enabled: bool) -> Self {
        Self {
            source: source.into(),
            workdir: None,
            regions: BTreeMap::new(),
            matches: BTreeMap::new(),
            querying_enabled,
        }
    }

    /// Region → cropped image path, for every region that produced an image.
    pub fn image_paths(&self) -> BTreeMap<Region, PathBuf> {
        self.regions
            .iter()
            .filter_map(|(region, status)| status.image().map(|p| (*region, p.to_path_buf())))
            .collect()
    }

    /// Region → OCR text, for every region that was read.
    pub fn extracted_text(&self) -> BTreeMap<Region, &ExtractedText> {
        self.regions
            .iter()
            .filter_map(|(region, status)| status.text().map(|t| (*region, t)))
            .collect()
    }

    pub fn text(&self, region: Region) -> Option<&ExtractedText> {
        self.regions.get(&region).and_then(RegionStatus::text)
    }

    pub fn status(&self, region: Region) -> Option<&RegionStatus> {
        self.regions.get(&region)
    }

    pub fn candidates(&self, category: MatchCategory) -> &[RankedCandidate] {
        self.matches.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Best-ranked candidate for a category, if any.
    pub fn best(&self, category: MatchCategory) -> Option<&RankedCandidate> {
        self.candidates(category).first()
    }

    /// Regions that did not yield text, with the reason.
    pub fn failed_regions(&self) -> Vec<(Region, &RegionError)> {
        self.regions
            .iter()
            .filter_map(|(region, status)| status.error().map(|e| (*region, e)))
            .collect()
    }

    pub fn all_regions_failed(&self) -> bool {
        !self.regions.values().any(RegionStatus::is_present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn present(region: Region, clean: &str) -> RegionStatus {
        RegionStatus::Present {
            image: PathBuf::from(format!("/tmp/job/{region}.png")),
            text: ExtractedText::new(clean, format!("~{clean}~")),
        }
    }

    #[test]
    fn region_tags_roundtrip() {
        use std::str::FromStr;
        for region in Region::ALL {
            assert_eq!(Region::from_str(region.tag()).unwrap(), region);
        }
        assert!(Region::from_str("border").is_err());
    }

    #[test]
    fn ranked_candidate_clamps_confidence() {
        assert_eq!(RankedCandidate::new(1.4, "x").confidence, 1.0);
        assert_eq!(RankedCandidate::new(-0.2, "x").confidence, 0.0);
    }

    #[test]
    fn rank_orders_best_first() {
        let ranked = rank(vec![
            RankedCandidate::new(0.4, "Shock"),
            RankedCandidate::new(0.92, "Lightning Bolt"),
            RankedCandidate::new(0.7, "Lightning Strike"),
        ]);
        let names: Vec<_> = ranked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Lightning Bolt", "Lightning Strike", "Shock"]);
    }

    #[test]
    fn unread_region_keeps_image_but_no_text() {
        let mut job = ProcessingJob::new("/cards/a.jpg", false);
        job.regions.insert(Region::Name, present(Region::Name, "Lightning Bolt"));
        job.regions.insert(
            Region::Flavor,
            RegionStatus::Unread {
                image: PathBuf::from("/tmp/job/flavor.png"),
                reason: RegionError::OcrFailed {
                    region: Region::Flavor,
                    detail: "blank".into(),
                },
            },
        );
        job.regions.insert(
            Region::Art,
            RegionStatus::Absent {
                reason: RegionError::ExtractFailed {
                    region: Region::Art,
                    detail: "out of bounds".into(),
                },
            },
        );

        let paths = job.image_paths();
        assert_eq!(paths.keys().copied().collect::<Vec<_>>(), [Region::Flavor, Region::Name]);
        assert_eq!(job.extracted_text().len(), 1);
        assert_eq!(job.text(Region::Name).unwrap().clean_text, "Lightning Bolt");

        let failed: Vec<_> = job.failed_regions().into_iter().map(|(r, _)| r).collect();
        assert_eq!(failed, [Region::Art, Region::Flavor]);
        assert!(!job.all_regions_failed());
    }

    #[test]
    fn empty_job_counts_as_all_failed() {
        let job = ProcessingJob::new("/cards/a.jpg", false);
        assert!(job.all_regions_failed());
        assert!(job.best(MatchCategory::Name).is_none());
        assert!(job.candidates(MatchCategory::Type).is_empty());
    }
}
