//! Output types: the confirmed-match record and per-job outcomes.

use crate::attention::RouteOutcome;
use crate::job::RankedCandidate;
use serde::{Deserialize, Serialize};

/// Record written for a confirmed match.
///
/// Field names are part of the on-disk format consumed downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedRecord {
    pub path: String,
    /// Creation date, e.g. `"Sat Oct 17 2026"`.
    pub created: String,
    #[serde(rename = "name-percentage")]
    pub name_percentage: f64,
    #[serde(rename = "name-string")]
    pub name_string: String,
    #[serde(rename = "type-percentage")]
    pub type_percentage: Option<f64>,
    #[serde(rename = "type-string")]
    pub type_string: Option<String>,
}

impl ConfirmedRecord {
    pub fn new(
        path: impl Into<String>,
        created: impl Into<String>,
        name: &RankedCandidate,
        type_line: Option<&RankedCandidate>,
    ) -> Self {
        Self {
            path: path.into(),
            created: created.into(),
            name_percentage: name.confidence,
            name_string: name.name.clone(),
            type_percentage: type_line.map(|t| t.confidence),
            type_string: type_line.map(|t| t.name.clone()),
        }
    }
}

/// Today's date in the record's `created` format.
pub fn created_today() -> String {
    chrono::Local::now().format("%a %b %d %Y").to_string()
}

/// How a job that ran to completion ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The export service confirmed the best name candidate.
    Confirmed { candidate: RankedCandidate },
    /// No confirmed match; a manual-review record was built.
    NeedsAttention(RouteOutcome),
    /// The export service reported an error. Returned as data.
    ExportFailed { reason: String },
}

impl JobOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, JobOutcome::Confirmed { .. })
    }

    /// Short label for logs and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Confirmed { .. } => "confirmed",
            JobOutcome::NeedsAttention(_) => "needs-attention",
            JobOutcome::ExportFailed { .. } => "export-failed",
        }
    }
}
