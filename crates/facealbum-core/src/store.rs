//! Persistence backend seam.
//!
//! The backend owns stored photos, known people and their descriptors. These
//! traits describe the calls the core makes against it; `facealbum-store`
//! provides the HTTP implementation.

use crate::compress::CompressedPhoto;
use crate::types::{CorpusEntry, Embedding, ImageKind};
use chrono::NaiveDate;
use serde::Serialize;
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("failed to encode request: {0}")]
    Encode(String),
    #[error("authentication required")]
    Unauthorized,
}

/// Which paginated corpus to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusKind {
    /// Stored gallery photos with the descriptors of their faces.
    Gallery,
    /// Known people, one descriptor and a profile picture each.
    People,
}

impl std::fmt::Display for CorpusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorpusKind::Gallery => f.write_str("gallery"),
            CorpusKind::People => f.write_str("people"),
        }
    }
}

pub trait CorpusStore {
    /// Fetch one page of `limit` entries; a shorter page is the last one.
    fn fetch_page(
        &self,
        kind: CorpusKind,
        page: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<CorpusEntry>, StoreError>> + Send;
}

/// Per-image metadata sent alongside each upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
    #[serde(rename = "type")]
    pub kind: ImageKind,
    pub faces: Vec<FaceMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceMetadata {
    pub descriptor: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct UploadImage {
    pub photo: CompressedPhoto,
    pub metadata: ImageMetadata,
}

/// Everything the backend needs to persist one album.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub title: String,
    pub date: NaiveDate,
    pub images: Vec<UploadImage>,
}

/// Backend acknowledgement of a save, passed through untouched.
pub type SaveAck = serde_json::Value;

/// Title and date-range filter over the stored gallery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GalleryFilter {
    pub titles: Vec<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl GalleryFilter {
    pub fn is_empty(&self) -> bool {
        self.titles.is_empty() && self.date_from.is_none() && self.date_to.is_none()
    }
}

pub trait AlbumStore {
    /// One page of the plain gallery listing, newest first as the backend orders it.
    fn fetch_gallery_page(
        &self,
        page: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<CorpusEntry>, StoreError>> + Send;

    fn fetch_titles(&self) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    fn save_album(
        &self,
        request: SaveRequest,
    ) -> impl Future<Output = Result<SaveAck, StoreError>> + Send;

    /// Descriptor stored on the profile of the user owning `token`.
    fn fetch_user_embedding(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Embedding, StoreError>> + Send;

    fn filter_corpus(
        &self,
        filter: &GalleryFilter,
    ) -> impl Future<Output = Result<Vec<CorpusEntry>, StoreError>> + Send;
}
