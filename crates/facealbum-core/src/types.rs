use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Bounding box for a detected face, in pixels of the source photo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// True when both sides reach `min_side`. NaN sides never qualify.
    pub fn is_at_least(&self, min_side: f32) -> bool {
        self.width >= min_side && self.height >= min_side
    }
}

/// One face reported by the external detector.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
    pub descriptor: Embedding,
}

/// Rectangle cut out of the source photo, already clipped to its extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor length mismatch: query has {query} values, candidate has {candidate}")]
    LengthMismatch { query: usize, candidate: usize },
    #[error("descriptor space mismatch: query from {query}, candidate from {candidate}")]
    ModelMismatch { query: String, candidate: String },
    #[error("descriptor contains non-finite values")]
    NonFinite,
}

/// Face descriptor (embedding) vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Descriptor space that produced these values, when known.
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check that two descriptors live in the same space and can be compared.
    ///
    /// Untagged descriptors are accepted against anything; two tagged ones
    /// must carry the same tag. Lengths must always agree.
    pub fn check_comparable(&self, other: &Embedding) -> Result<(), DescriptorError> {
        if let (Some(query), Some(candidate)) = (&self.model_version, &other.model_version) {
            if query != candidate {
                return Err(DescriptorError::ModelMismatch {
                    query: query.clone(),
                    candidate: candidate.clone(),
                });
            }
        }
        if self.values.len() != other.values.len() {
            return Err(DescriptorError::LengthMismatch {
                query: self.values.len(),
                candidate: other.values.len(),
            });
        }
        Ok(())
    }

    /// Euclidean distance between two descriptors of the same space.
    pub fn euclidean_distance(&self, other: &Embedding) -> Result<f32, DescriptorError> {
        self.check_comparable(other)?;
        let distance = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt();
        if distance.is_finite() {
            Ok(distance)
        } else {
            Err(DescriptorError::NonFinite)
        }
    }
}

/// Single/Group classification of a processed photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    Single,
    Group,
}

impl ImageKind {
    /// Classification derived from the number of curated faces.
    pub fn from_face_count(count: usize) -> Self {
        if count <= 1 {
            ImageKind::Single
        } else {
            ImageKind::Group
        }
    }
}

impl std::fmt::Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageKind::Single => f.write_str("Single"),
            ImageKind::Group => f.write_str("Group"),
        }
    }
}

impl std::str::FromStr for ImageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(ImageKind::Single),
            "group" => Ok(ImageKind::Group),
            other => Err(format!("unknown image type: {other}")),
        }
    }
}

/// A curated face: JPEG crop plus the detector output it came from.
#[derive(Debug, Clone)]
pub struct FaceRecord {
    /// Standalone JPEG of the padded face region.
    pub image: Vec<u8>,
    pub descriptor: Embedding,
    pub score: f32,
    pub region: CropRegion,
}

/// One processed photo in an album.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub id: Uuid,
    pub file_name: String,
    /// Encoded bytes of the original, uncropped photo.
    pub original: Arc<[u8]>,
    /// Sorted by descending score.
    pub faces: Vec<FaceRecord>,
    pub kind: ImageKind,
}

/// An album under review, before it is persisted.
#[derive(Debug, Clone)]
pub struct Album {
    pub id: Uuid,
    pub title: String,
    pub date: NaiveDate,
    pub images: Vec<ImageRecord>,
    pub(crate) cursor: usize,
}

impl Album {
    pub fn new(title: String, date: NaiveDate, images: Vec<ImageRecord>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            date,
            images,
            cursor: 0,
        }
    }

    /// Index of the image under review, or `None` for an empty album.
    pub fn cursor(&self) -> Option<usize> {
        if self.images.is_empty() {
            None
        } else {
            Some(self.cursor.min(self.images.len() - 1))
        }
    }

    pub fn current_image(&self) -> Option<&ImageRecord> {
        self.cursor().and_then(|i| self.images.get(i))
    }

    pub fn face_count(&self) -> usize {
        self.images.iter().map(|img| img.faces.len()).sum()
    }
}

/// One record of the remote corpus: a stored photo or a known person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    /// Absolute URL (or store reference) of the stored photo.
    pub reference: String,
    pub title: Option<String>,
    /// Profile picture of a known person, when the entry is one.
    pub profile_pic: Option<String>,
    /// One descriptor per face found in the stored photo.
    pub descriptors: Vec<Embedding>,
}

impl CorpusEntry {
    /// Reference shown next to a match: the profile picture when present.
    pub fn display_ref(&self) -> &str {
        self.profile_pic.as_deref().unwrap_or(&self.reference)
    }
}
