//! Image encoding: region image files → base64 payloads for manual review.
//!
//! Each region is encoded independently. A region that cannot be encoded
//! yields an `Err` in its slot and never affects the other regions.

use crate::error::RegionError;
use crate::job::Region;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Base64-encode one image file.
pub async fn encode_image(region: Region, path: &Path) -> Result<String, RegionError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| RegionError::EncodeFailed {
            region,
            detail: format!("{}: {e}", path.display()),
        })?;
    if bytes.is_empty() {
        return Err(RegionError::EncodeFailed {
            region,
            detail: format!("{} is empty", path.display()),
        });
    }

    let b64 = STANDARD.encode(&bytes);
    debug!("Encoded {} → {} bytes base64", region, b64.len());
    Ok(b64)
}

/// Encode every region. Regions missing from `paths` get an
/// [`RegionError::EncodeFailed`] entry, so the result always has four slots.
pub async fn encode_region_images(
    paths: &BTreeMap<Region, PathBuf>,
) -> BTreeMap<Region, Result<String, RegionError>> {
    let mut out = BTreeMap::new();
    for region in Region::ALL {
        let encoded = match paths.get(&region) {
            Some(path) => encode_image(region, path).await,
            None => Err(RegionError::EncodeFailed {
                region,
                detail: "no image was extracted".into(),
            }),
        };
        out.insert(region, encoded);
    }
    out
}

/// Whether `payload` is non-empty, valid standard base64.
pub fn is_valid_base64(payload: &str) -> bool {
    !payload.is_empty() && STANDARD.decode(payload).is_ok()
}
