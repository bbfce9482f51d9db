//! Detection filtering and face cropping.
//!
//! Turns raw detector output for one photo into the ranked list of face
//! crops kept for review: undersized boxes are dropped, survivors are padded,
//! clipped to the photo and re-encoded as standalone JPEGs.

use crate::compress::{CompressError, JpegCodec, PhotoEncoder};
use crate::types::{BoundingBox, CropRegion, Detection, FaceRecord};
use image::DynamicImage;
use thiserror::Error;

// --- Named constants ---
pub const DEFAULT_MIN_FACE_SIZE: f32 = 200.0;
pub const DEFAULT_CROP_PADDING: u32 = 20;
const CROP_JPEG_QUALITY: f32 = 0.92;

#[derive(Error, Debug)]
pub enum CurateError {
    #[error("failed to encode face crop: {0}")]
    Encode(#[from] CompressError),
}

#[derive(Debug, Clone, Copy)]
pub struct CurateConfig {
    /// Boxes narrower or shorter than this are too small to match reliably.
    pub min_face_size: f32,
    /// Margin added on every side of a kept box before cropping.
    pub padding: u32,
}

impl Default for CurateConfig {
    fn default() -> Self {
        Self {
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            padding: DEFAULT_CROP_PADDING,
        }
    }
}

/// Expand `bbox` by `padding` on all sides and clip it to the image.
///
/// Returns `None` when nothing of the padded box lies inside the image.
pub fn padded_region(
    bbox: &BoundingBox,
    padding: u32,
    image_width: u32,
    image_height: u32,
) -> Option<CropRegion> {
    let pad = padding as f32;
    let x0 = (bbox.x - pad).floor().max(0.0);
    let y0 = (bbox.y - pad).floor().max(0.0);
    let x1 = (bbox.x + bbox.width + pad).ceil().min(image_width as f32);
    let y1 = (bbox.y + bbox.height + pad).ceil().min(image_height as f32);

    if !(x1 > x0 && y1 > y0) {
        return None;
    }

    Some(CropRegion {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    })
}

/// Sort by descending score; ties keep detector order.
pub(crate) fn sort_by_score(faces: &mut [FaceRecord]) {
    faces.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Filters detections and crops the surviving faces out of their photo.
pub struct Curator<E = JpegCodec> {
    config: CurateConfig,
    encoder: E,
}

impl Curator<JpegCodec> {
    pub fn new(config: CurateConfig) -> Self {
        Self {
            config,
            encoder: JpegCodec,
        }
    }
}

impl Default for Curator<JpegCodec> {
    fn default() -> Self {
        Self::new(CurateConfig::default())
    }
}

impl<E: PhotoEncoder> Curator<E> {
    pub fn with_encoder(config: CurateConfig, encoder: E) -> Self {
        Self { config, encoder }
    }

    pub fn config(&self) -> &CurateConfig {
        &self.config
    }

    /// Curate one photo's detections into face records, best score first.
    ///
    /// An empty result is a normal outcome: the photo simply has no usable face.
    pub fn curate(
        &self,
        image: &DynamicImage,
        detections: Vec<Detection>,
    ) -> Result<Vec<FaceRecord>, CurateError> {
        let total = detections.len();
        let mut faces = Vec::with_capacity(total);

        for det in detections {
            if !det.bbox.is_at_least(self.config.min_face_size) {
                tracing::debug!(
                    width = det.bbox.width,
                    height = det.bbox.height,
                    min = self.config.min_face_size,
                    "rejecting undersized face"
                );
                continue;
            }

            let Some(region) =
                padded_region(&det.bbox, self.config.padding, image.width(), image.height())
            else {
                tracing::debug!(bbox = ?det.bbox, "face box lies outside the photo");
                continue;
            };

            let crop = image
                .crop_imm(region.x, region.y, region.width, region.height)
                .to_rgb8();
            let encoded = self.encoder.encode(&crop, CROP_JPEG_QUALITY)?;

            faces.push(FaceRecord {
                image: encoded,
                descriptor: det.descriptor,
                score: det.score,
                region,
            });
        }

        sort_by_score(&mut faces);
        tracing::debug!(detected = total, kept = faces.len(), "curated faces");
        Ok(faces)
    }
}
