//! Region extraction: crop one image file per semantic card region.
//!
//! The default [`FractionalCropper`] cuts fixed boxes expressed as fractions
//! of the photo's width and height, which works for photographs that were
//! already squared to the card's edges. Decoding and cropping are CPU-bound,
//! so they run inside `spawn_blocking`.

use crate::error::AdapterError;
use crate::job::Region;
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Produces the cropped image for one region of a card photograph.
#[async_trait]
pub trait RegionExtractor: Send + Sync {
    /// Crop `region` out of `source` into a new file inside `workdir` and
    /// return its path.
    async fn extract(
        &self,
        source: &Path,
        workdir: &Path,
        region: Region,
    ) -> Result<PathBuf, AdapterError>;
}

/// A crop rectangle as fractions (0.0–1.0) of the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl CropBox {
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Convert to pixel coordinates, clipped to the image.
    /// Returns `None` when the clipped box is empty.
    pub fn to_pixels(&self, img_w: u32, img_h: u32) -> Option<(u32, u32, u32, u32)> {
        let x = ((self.left.clamp(0.0, 1.0)) * img_w as f32).round() as u32;
        let y = ((self.top.clamp(0.0, 1.0)) * img_h as f32).round() as u32;
        let w = ((self.width.max(0.0)) * img_w as f32).round() as u32;
        let h = ((self.height.max(0.0)) * img_h as f32).round() as u32;
        let w = w.min(img_w.saturating_sub(x));
        let h = h.min(img_h.saturating_sub(y));
        if w == 0 || h == 0 {
            None
        } else {
            Some((x, y, w, h))
        }
    }
}

/// Region boxes for a standard 63 × 88 mm card photographed edge to edge.
pub fn standard_layout() -> BTreeMap<Region, CropBox> {
    BTreeMap::from([
        (Region::Name, CropBox::new(0.06, 0.035, 0.70, 0.07)),
        (Region::Art, CropBox::new(0.08, 0.11, 0.84, 0.45)),
        (Region::Type, CropBox::new(0.06, 0.555, 0.76, 0.065)),
        (Region::Flavor, CropBox::new(0.08, 0.63, 0.84, 0.27)),
    ])
}

/// Crops fixed fractional boxes and writes them as PNG.
#[derive(Debug, Clone)]
pub struct FractionalCropper {
    layout: BTreeMap<Region, CropBox>,
    /// Crops narrower than this are upscaled; small text OCRs poorly.
    min_width: u32,
}

impl Default for FractionalCropper {
    fn default() -> Self {
        Self {
            layout: standard_layout(),
            min_width: 600,
        }
    }
}

impl FractionalCropper {
    pub fn with_box(mut self, region: Region, crop: CropBox) -> Self {
        self.layout.insert(region, crop);
        self
    }

    pub fn min_width(mut self, px: u32) -> Self {
        self.min_width = px;
        self
    }
}

#[async_trait]
impl RegionExtractor for FractionalCropper {
    async fn extract(
        &self,
        source: &Path,
        workdir: &Path,
        region: Region,
    ) -> Result<PathBuf, AdapterError> {
        let crop = *self
            .layout
            .get(&region)
            .ok_or_else(|| AdapterError::Other(format!("No crop box for region {region}")))?;
        let source = source.to_path_buf();
        let dest = workdir.join(format!("{}.png", region.tag()));
        let min_width = self.min_width;

        tokio::task::spawn_blocking(move || crop_blocking(&source, &dest, crop, min_width))
            .await
            .map_err(|e| AdapterError::Other(format!("Crop task panicked: {e}")))?
    }
}

/// Blocking implementation of a region crop.
fn crop_blocking(
    source: &Path,
    dest: &Path,
    crop: CropBox,
    min_width: u32,
) -> Result<PathBuf, AdapterError> {
    let img = image::open(source)?.to_rgb8();
    let (x, y, w, h) = crop.to_pixels(img.width(), img.height()).ok_or_else(|| {
        AdapterError::Other(format!(
            "Crop box {crop:?} is empty for a {}x{} image",
            img.width(),
            img.height()
        ))
    })?;

    let mut snippet = imageops::crop_imm(&img, x, y, w, h).to_image();
    if w < min_width {
        let scale = min_width as f32 / w as f32;
        let new_h = ((h as f32) * scale).round().max(1.0) as u32;
        snippet = imageops::resize(&snippet, min_width, new_h, FilterType::CatmullRom);
    }

    snippet.save(dest)?;
    debug!(
        "Cropped {} → {} ({}x{})",
        source.display(),
        dest.display(),
        snippet.width(),
        snippet.height()
    );
    Ok(dest.to_path_buf())
}
