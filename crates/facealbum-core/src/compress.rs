//! Photo compression before upload.
//!
//! Downscales oversized photos and re-encodes them as JPEG, with a single
//! fallback pass at lower quality when the first result is over budget.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbImage};
use thiserror::Error;

pub const DEFAULT_MAX_DIMENSION: u32 = 2100;
pub const DEFAULT_PRIMARY_QUALITY: f32 = 0.92;
pub const DEFAULT_FALLBACK_QUALITY: f32 = 0.80;
pub const DEFAULT_BYTE_BUDGET: usize = 1_000_000;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("failed to decode photo: {0}")]
    Decode(String),
    #[error("failed to encode photo: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Copy)]
pub struct CompressConfig {
    /// Largest allowed width or height, in pixels.
    pub max_dimension: u32,
    pub primary_quality: f32,
    pub fallback_quality: f32,
    /// Byte size above which the fallback quality is tried once.
    pub byte_budget: usize,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            primary_quality: DEFAULT_PRIMARY_QUALITY,
            fallback_quality: DEFAULT_FALLBACK_QUALITY,
            byte_budget: DEFAULT_BYTE_BUDGET,
        }
    }
}

/// Encodes an RGB raster at a quality in `(0, 1]`.
pub trait PhotoEncoder {
    fn encode(&self, image: &RgbImage, quality: f32) -> Result<Vec<u8>, CompressError>;
}

/// Baseline JPEG encoder from the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl PhotoEncoder for JpegCodec {
    fn encode(&self, image: &RgbImage, quality: f32) -> Result<Vec<u8>, CompressError> {
        let mut buffer = Vec::new();
        let quality_percent = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality_percent);
        encoder
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| CompressError::Encode(e.to_string()))?;
        Ok(buffer)
    }
}

/// Encoded upload plus what the compressor did to produce it.
#[derive(Debug, Clone)]
pub struct CompressedPhoto {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    /// Quality of the accepted encoding.
    pub quality: f32,
    pub used_fallback: bool,
}

/// Target dimensions after fitting the largest side within `max_dimension`.
pub fn scaled_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let largest = width.max(height);
    if largest <= max_dimension {
        return (width, height);
    }
    let scale = max_dimension as f64 / largest as f64;
    let new_w = ((width as f64 * scale).round() as u32).clamp(1, max_dimension);
    let new_h = ((height as f64 * scale).round() as u32).clamp(1, max_dimension);
    (new_w, new_h)
}

/// Upload filename, `album_<unix-millis>.jpg`.
pub fn upload_filename() -> String {
    format!("album_{}.jpg", chrono::Utc::now().timestamp_millis())
}

pub struct Compressor<E = JpegCodec> {
    config: CompressConfig,
    encoder: E,
}

impl Compressor<JpegCodec> {
    pub fn new(config: CompressConfig) -> Self {
        Self {
            config,
            encoder: JpegCodec,
        }
    }
}

impl Default for Compressor<JpegCodec> {
    fn default() -> Self {
        Self::new(CompressConfig::default())
    }
}

impl<E: PhotoEncoder> Compressor<E> {
    pub fn with_encoder(config: CompressConfig, encoder: E) -> Self {
        Self { config, encoder }
    }

    pub fn config(&self) -> &CompressConfig {
        &self.config
    }

    /// Decode encoded photo bytes and compress them.
    pub fn compress_bytes(&self, data: &[u8]) -> Result<CompressedPhoto, CompressError> {
        let image =
            image::load_from_memory(data).map_err(|e| CompressError::Decode(e.to_string()))?;
        self.compress(&image)
    }

    /// Downscale if needed, encode at primary quality and retry once at the
    /// fallback quality when over budget. The fallback result is accepted
    /// whatever its size.
    pub fn compress(&self, image: &DynamicImage) -> Result<CompressedPhoto, CompressError> {
        let (src_w, src_h) = (image.width(), image.height());
        let (width, height) = scaled_dimensions(src_w, src_h, self.config.max_dimension);

        let raster = if (width, height) == (src_w, src_h) {
            image.to_rgb8()
        } else {
            tracing::debug!(src_w, src_h, width, height, "downscaling photo");
            image.resize_exact(width, height, FilterType::Triangle).to_rgb8()
        };

        let mut quality = self.config.primary_quality;
        let mut bytes = self.encoder.encode(&raster, quality)?;
        let mut used_fallback = false;

        if bytes.len() > self.config.byte_budget {
            tracing::debug!(
                size = bytes.len(),
                budget = self.config.byte_budget,
                "over budget, re-encoding at fallback quality"
            );
            quality = self.config.fallback_quality;
            bytes = self.encoder.encode(&raster, quality)?;
            used_fallback = true;
        }

        Ok(CompressedPhoto {
            bytes,
            filename: upload_filename(),
            width,
            height,
            quality,
            used_fallback,
        })
    }
}
