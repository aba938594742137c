//! Source validation: make sure a card photograph exists and is an image.
//!
//! Checking the magic bytes up front gives callers a clear
//! [`CardScanError::SourceNotFound`] instead of four identical per-region crop
//! failures followed by a generic "no image paths" error.

use crate::error::CardScanError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Image formats the default cropper can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Png,
    Jpeg,
}

/// Identify an image format from its first bytes.
pub fn sniff_format(magic: &[u8]) -> Option<SourceFormat> {
    if magic.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some(SourceFormat::Png)
    } else if magic.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(SourceFormat::Jpeg)
    } else {
        None
    }
}

/// Resolve a local card image, validating existence, readability and format.
pub fn resolve_source(path: impl AsRef<Path>) -> Result<(PathBuf, SourceFormat), CardScanError> {
    let path = path.as_ref().to_path_buf();

    if !path.is_file() {
        return Err(CardScanError::SourceNotFound { path });
    }

    let mut magic = [0u8; 4];
    match std::fs::File::open(&path) {
        Ok(mut f) => {
            if f.read_exact(&mut magic).is_err() {
                return Err(CardScanError::Internal(format!(
                    "'{}' is too short to be an image",
                    path.display()
                )));
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(CardScanError::Internal(format!(
                "Permission denied reading '{}'",
                path.display()
            )));
        }
        Err(_) => return Err(CardScanError::SourceNotFound { path }),
    }

    let format = sniff_format(&magic).ok_or_else(|| {
        CardScanError::Internal(format!(
            "'{}' is not a PNG or JPEG image (first bytes: {magic:?})",
            path.display()
        ))
    })?;

    debug!("Resolved card image: {} ({:?})", path.display(), format);
    Ok((path, format))
}
