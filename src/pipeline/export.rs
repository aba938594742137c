//! Result export: confirm a candidate name against the catalog.
//!
//! The exporter reports its verdict as data. An exporter error is a valid
//! job result, not a fatal failure.

use crate::error::AdapterError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// What the export service concluded about a candidate name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExportOutcome {
    /// The candidate identifies exactly one catalog entry.
    Confirmed,
    /// The candidate could be any of these catalog set identifiers.
    Ambiguous { sets: Vec<String> },
    /// The service could not process the candidate.
    Error { message: String },
}

/// Looks up (and, when querying is enabled, records) a matched card.
#[async_trait]
pub trait ResultExporter: Send + Sync {
    async fn export(
        &self,
        candidate: &str,
        source: &Path,
        querying_enabled: bool,
    ) -> Result<ExportOutcome, AdapterError>;
}

/// One printing family in a [`CatalogExporter`] catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub sets: Vec<String>,
}

/// Exporter backed by a local JSON catalog (`[{"name": …, "sets": […]}]`).
///
/// * a name printed in exactly one set is confirmed;
/// * a name printed in several sets is ambiguous (the photo alone cannot tell
///   which printing it is);
/// * an unknown name is an error.
#[derive(Debug, Clone, Default)]
pub struct CatalogExporter {
    /// Lower-cased name → merged entry.
    by_name: HashMap<String, CatalogEntry>,
}

impl CatalogExporter {
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut by_name: HashMap<String, CatalogEntry> = HashMap::new();
        for entry in entries {
            let merged = by_name
                .entry(entry.name.to_lowercase())
                .or_insert_with(|| CatalogEntry {
                    name: entry.name.clone(),
                    sets: Vec::new(),
                });
            for set in entry.sets {
                if !merged.sets.contains(&set) {
                    merged.sets.push(set);
                }
            }
        }
        Self { by_name }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let body = tokio::fs::read_to_string(path.as_ref()).await?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&body)?;
        Ok(Self::new(entries))
    }

    /// Every card name in the catalog, for building a name matcher.
    pub fn names(&self) -> Vec<String> {
        self.by_name.values().map(|e| e.name.clone()).collect()
    }
}

#[async_trait]
impl ResultExporter for CatalogExporter {
    async fn export(
        &self,
        candidate: &str,
        source: &Path,
        querying_enabled: bool,
    ) -> Result<ExportOutcome, AdapterError> {
        debug!(
            querying_enabled,
            "Looking up {:?} for {}",
            candidate,
            source.display()
        );
        let outcome = match self.by_name.get(&candidate.to_lowercase()) {
            None => ExportOutcome::Error {
                message: format!("'{candidate}' is not in the catalog"),
            },
            Some(entry) if entry.sets.len() > 1 => ExportOutcome::Ambiguous {
                sets: entry.sets.clone(),
            },
            Some(_) => ExportOutcome::Confirmed,
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> CatalogExporter {
        CatalogExporter::new([
            CatalogEntry {
                name: "Lightning Bolt".into(),
                sets: vec!["LEA".into(), "M10".into()],
            },
            CatalogEntry {
                name: "Black Lotus".into(),
                sets: vec!["LEA".into()],
            },
            CatalogEntry {
                name: "black lotus".into(),
                sets: vec!["LEA".into()],
            },
        ])
    }

    #[tokio::test]
    async fn single_printing_is_confirmed() {
        let out = catalog()
            .export("Black Lotus", Path::new("a.jpg"), false)
            .await
            .unwrap();
        assert_eq!(out, ExportOutcome::Confirmed);
    }

    #[tokio::test]
    async fn reprinted_card_is_ambiguous() {
        let out = catalog()
            .export("lightning bolt", Path::new("a.jpg"), true)
            .await
            .unwrap();
        assert_eq!(
            out,
            ExportOutcome::Ambiguous {
                sets: vec!["LEA".into(), "M10".into()]
            }
        );
    }

    #[tokio::test]
    async fn unknown_card_is_error_data() {
        let out = catalog()
            .export("Shock", Path::new("a.jpg"), false)
            .await
            .unwrap();
        assert!(matches!(out, ExportOutcome::Error { .. }));
    }

    #[tokio::test]
    async fn loads_json_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("catalog.json");
        std::fs::write(&p, r#"[{"name":"Shock","sets":["M19"]}]"#).unwrap();
        let exporter = CatalogExporter::from_file(&p).await.unwrap();
        assert_eq!(exporter.names(), vec!["Shock".to_string()]);
    }

    #[test]
    fn outcome_serialises_with_tag() {
        let json = serde_json::to_string(&ExportOutcome::Ambiguous {
            sets: vec!["LEA".into()],
        })
        .unwrap();
        assert_eq!(json, r#"{"outcome":"ambiguous","sets":["LEA"]}"#);
    }
}
