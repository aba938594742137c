//! Text extraction: region image → clean/dirty text pair.
//!
//! The raw engine output ("dirty" text) is kept verbatim for manual review.
//! The "clean" text is what the matchers see, produced by [`clean_text`].
//!
//! The default engine, [`TesseractCli`], shells out to the `tesseract`
//! executable in single-line mode, which suits name and type lines.

use crate::error::AdapterError;
use crate::job::ExtractedText;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Converts an image file into a clean/dirty text pair.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, image: &Path) -> Result<ExtractedText, AdapterError>;
}

/// OCR through the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
    lang: String,
    /// Tesseract page segmentation mode; 7 = single text line.
    psm: u8,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            lang: "eng".to_string(),
            psm: 7,
        }
    }
}

impl TesseractCli {
    pub fn binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary = path.into();
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn psm(mut self, psm: u8) -> Self {
        self.psm = psm;
        self
    }
}

#[async_trait]
impl TextExtractor for TesseractCli {
    async fn extract_text(&self, image: &Path) -> Result<ExtractedText, AdapterError> {
        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("--psm")
            .arg(self.psm.to_string())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                AdapterError::Engine(format!("failed to run {}: {e}", self.binary.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::Engine(format!(
                "tesseract failed (code {:?}): {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let dirty = String::from_utf8_lossy(&output.stdout).to_string();
        let clean = clean_text(&dirty);
        debug!("OCR {} → {:?}", image.display(), clean);
        Ok(ExtractedText::new(clean, dirty))
    }
}

// ── Cleanup rules ────────────────────────────────────────────────────────────

/// Normalise raw OCR output for matching.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 2. Map typographic quotes and dashes to ASCII
/// 3. Drop characters that never appear in card names or type lines
/// 4. Collapse all whitespace runs (including newlines) to one space
/// 5. Trim
pub fn clean_text(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_punctuation(&s);
    let s = strip_noise(&s);
    collapse_whitespace(&s).trim().to_string()
}

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'))
        .collect()
}

fn normalise_punctuation(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '`' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            other => other,
        })
        .collect()
}

// Letters (any script), digits, space and the punctuation real names use.
static RE_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s',\-]").unwrap());

fn strip_noise(input: &str) -> String {
    RE_NOISE.replace_all(input, "").to_string()
}

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input, " ").to_string()
}
