//! In-memory album workspace: staged photos, processed albums and the review
//! edits made on them before saving.
//!
//! Every edit is a plain mutation of the tree. Edits addressing an album or
//! image that no longer exists are ignored, so a late click racing a save or
//! delete is harmless.

use crate::curate::{CurateConfig, CurateError, Curator};
use crate::detector::{DetectorError, FaceDetector, Photo};
use crate::types::{Album, ImageKind, ImageRecord};
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Most photos that can be staged for one processing run.
pub const MAX_BATCH_SIZE: usize = 10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlbumError {
    #[error("you can upload a maximum of {max} images ({staged} staged, {incoming} more requested)")]
    Capacity {
        staged: usize,
        incoming: usize,
        max: usize,
    },
    #[error("album form incomplete: {0}")]
    IncompleteForm(&'static str),
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Album(#[from] AlbumError),
    #[error("failed to decode {name}: {reason}")]
    Decode { name: String, reason: String },
    #[error("face detection failed on {name}: {source}")]
    Detector {
        name: String,
        #[source]
        source: DetectorError,
    },
    #[error(transparent)]
    Curate(#[from] CurateError),
}

/// A photo staged for processing: its name and encoded bytes.
#[derive(Debug, Clone)]
pub struct StagedPhoto {
    pub name: String,
    pub data: Arc<[u8]>,
}

impl StagedPhoto {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Title and date typed in before processing.
#[derive(Debug, Clone, Default)]
pub struct AlbumForm {
    pub title: String,
    pub date: Option<NaiveDate>,
}

/// Working set of staged photos and albums under review.
pub struct AlbumWorkspace {
    form: AlbumForm,
    staged: Vec<StagedPhoto>,
    albums: Vec<Album>,
    curator: Curator,
}

impl Default for AlbumWorkspace {
    fn default() -> Self {
        Self::new(CurateConfig::default())
    }
}

impl AlbumWorkspace {
    pub fn new(config: CurateConfig) -> Self {
        Self {
            form: AlbumForm::default(),
            staged: Vec::new(),
            albums: Vec::new(),
            curator: Curator::new(config),
        }
    }

    pub fn form(&self) -> &AlbumForm {
        &self.form
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.form.title = title.into();
    }

    pub fn set_date(&mut self, date: NaiveDate) {
        self.form.date = Some(date);
    }

    pub fn staged(&self) -> &[StagedPhoto] {
        &self.staged
    }

    pub fn albums(&self) -> &[Album] {
        &self.albums
    }

    pub fn album(&self, album_id: Uuid) -> Option<&Album> {
        self.albums.iter().find(|a| a.id == album_id)
    }

    fn album_mut(&mut self, album_id: Uuid) -> Option<&mut Album> {
        self.albums.iter_mut().find(|a| a.id == album_id)
    }

    /// Stage more photos. Rejected as a whole when the batch cap would be exceeded.
    pub fn add_images(&mut self, files: Vec<StagedPhoto>) -> Result<(), AlbumError> {
        if self.staged.len() + files.len() > MAX_BATCH_SIZE {
            return Err(AlbumError::Capacity {
                staged: self.staged.len(),
                incoming: files.len(),
                max: MAX_BATCH_SIZE,
            });
        }
        self.staged.extend(files);
        Ok(())
    }

    /// Drop a staged photo before processing.
    pub fn remove_staged_image(&mut self, index: usize) {
        if index < self.staged.len() {
            self.staged.remove(index);
        }
    }

    /// Whether the form has everything `process` needs.
    pub fn form_error(&self) -> Option<AlbumError> {
        if self.form.title.trim().is_empty() {
            Some(AlbumError::IncompleteForm("title is required"))
        } else if self.form.date.is_none() {
            Some(AlbumError::IncompleteForm("date is required"))
        } else if self.staged.is_empty() {
            Some(AlbumError::IncompleteForm("no images staged"))
        } else {
            None
        }
    }

    /// Run detection and curation over every staged photo, one at a time,
    /// and add the resulting album to the working set.
    ///
    /// On failure nothing is added and the staged photos are kept.
    pub async fn process<D: FaceDetector>(&mut self, detector: &D) -> Result<Uuid, ProcessError> {
        if let Some(err) = self.form_error() {
            return Err(err.into());
        }
        let date = self
            .form
            .date
            .ok_or(AlbumError::IncompleteForm("date is required"))?;

        let mut images = Vec::with_capacity(self.staged.len());
        for staged in &self.staged {
            let decoded =
                image::load_from_memory(&staged.data).map_err(|e| ProcessError::Decode {
                    name: staged.name.clone(),
                    reason: e.to_string(),
                })?;

            let detections = detector
                .detect(Photo {
                    name: &staged.name,
                    image: &decoded,
                })
                .await
                .map_err(|source| ProcessError::Detector {
                    name: staged.name.clone(),
                    source,
                })?;

            let faces = self.curator.curate(&decoded, detections)?;
            let kind = ImageKind::from_face_count(faces.len());
            tracing::debug!(
                file = %staged.name,
                faces = faces.len(),
                kind = %kind,
                "photo processed"
            );

            images.push(ImageRecord {
                id: Uuid::new_v4(),
                file_name: staged.name.clone(),
                original: Arc::clone(&staged.data),
                faces,
                kind,
            });
        }

        let album = Album::new(self.form.title.trim().to_string(), date, images);
        let id = album.id;
        tracing::info!(
            album = %id,
            title = %album.title,
            images = album.images.len(),
            faces = album.face_count(),
            "album processed"
        );

        self.albums.push(album);
        self.staged.clear();
        self.form = AlbumForm::default();
        Ok(id)
    }

    /// Remove one curated face. No-op if any index is stale.
    pub fn remove_face(&mut self, album_id: Uuid, image_index: usize, face_index: usize) {
        let Some(image) = self
            .album_mut(album_id)
            .and_then(|a| a.images.get_mut(image_index))
        else {
            return;
        };
        if face_index < image.faces.len() {
            image.faces.remove(face_index);
        }
    }

    /// Remove a processed photo with all its faces and keep the cursor in range.
    pub fn remove_image(&mut self, album_id: Uuid, image_index: usize) {
        let Some(album) = self.album_mut(album_id) else {
            return;
        };
        if image_index >= album.images.len() {
            return;
        }
        album.images.remove(image_index);

        if image_index == album.cursor && album.cursor > 0 {
            album.cursor -= 1;
        }
        album.cursor = album.cursor.min(album.images.len().saturating_sub(1));
    }

    /// Override the automatic Single/Group classification.
    pub fn set_image_type(&mut self, album_id: Uuid, image_index: usize, kind: ImageKind) {
        if let Some(image) = self
            .album_mut(album_id)
            .and_then(|a| a.images.get_mut(image_index))
        {
            image.kind = kind;
        }
    }

    /// Move the review cursor forward; stays put on the last image.
    pub fn next_image(&mut self, album_id: Uuid) {
        if let Some(album) = self.album_mut(album_id) {
            if album.cursor + 1 < album.images.len() {
                album.cursor += 1;
            }
        }
    }

    /// Move the review cursor back; stays put on the first image.
    pub fn previous_image(&mut self, album_id: Uuid) {
        if let Some(album) = self.album_mut(album_id) {
            album.cursor = album.cursor.saturating_sub(1);
        }
    }

    /// Take a persisted album out of the working set.
    pub fn retire_album(&mut self, album_id: Uuid) -> Option<Album> {
        let pos = self.albums.iter().position(|a| a.id == album_id)?;
        Some(self.albums.remove(pos))
    }
}
