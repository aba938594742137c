//! Fuzzy matching of OCR text against the card-name catalog and the type
//! vocabulary.
//!
//! Matchers return candidates ranked best-first. An empty list means nothing
//! cleared the matcher's floor, which is a normal outcome and not an error.

use crate::error::AdapterError;
use crate::hash::dice_coefficient;
use crate::job::{rank, RankedCandidate};
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Matches clean name text against the card catalog.
#[async_trait]
pub trait NameMatcher: Send + Sync {
    async fn match_name(&self, clean_text: &str) -> Result<Vec<RankedCandidate>, AdapterError>;
}

/// Matches clean type-line text against the type vocabulary.
#[async_trait]
pub trait TypeMatcher: Send + Sync {
    async fn match_type(&self, clean_text: &str) -> Result<Vec<RankedCandidate>, AdapterError>;
}

/// In-memory vocabulary scored with the bigram Dice coefficient.
///
/// Comparison is case-insensitive. Candidates below `floor` are dropped and at
/// most `limit` are returned.
#[derive(Debug, Clone)]
pub struct VocabularyMatcher {
    entries: Vec<String>,
    floor: f64,
    limit: usize,
}

impl VocabularyMatcher {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries: Vec<String> = entries
            .into_iter()
            .map(|s| {
                let s: String = s.into();
                s.trim().to_string()
            })
            .filter(|s| !s.is_empty())
            .collect();
        entries.sort();
        entries.dedup();
        Self {
            entries,
            floor: 0.3,
            limit: 5,
        }
    }

    /// Load one entry per line. Blank lines and `#` comments are skipped.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let body = tokio::fs::read_to_string(path.as_ref()).await?;
        Ok(Self::new(
            body.lines().filter(|l| !l.trim_start().starts_with('#')),
        ))
    }

    pub fn floor(mut self, floor: f64) -> Self {
        self.floor = floor.clamp(0.0, 1.0);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Score every entry and return the best `limit` above the floor.
    pub fn rank_text(&self, text: &str) -> Vec<RankedCandidate> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let scored: Vec<RankedCandidate> = self
            .entries
            .iter()
            .map(|entry| {
                RankedCandidate::new(dice_coefficient(&needle, &entry.to_lowercase()), entry.clone())
            })
            .filter(|c| c.confidence >= self.floor)
            .collect();

        let mut ranked = rank(scored);
        ranked.truncate(self.limit);
        debug!("Matched {:?} → {} candidates", text, ranked.len());
        ranked
    }
}

#[async_trait]
impl NameMatcher for VocabularyMatcher {
    async fn match_name(&self, clean_text: &str) -> Result<Vec<RankedCandidate>, AdapterError> {
        Ok(self.rank_text(clean_text))
    }
}

#[async_trait]
impl TypeMatcher for VocabularyMatcher {
    async fn match_type(&self, clean_text: &str) -> Result<Vec<RankedCandidate>, AdapterError> {
        Ok(self.rank_text(clean_text))
    }
}
