//! Saving a reviewed album to the backend.

use crate::album::AlbumWorkspace;
use crate::compress::{CompressError, Compressor, PhotoEncoder};
use crate::store::{
    AlbumStore, FaceMetadata, ImageMetadata, SaveAck, SaveRequest, StoreError, UploadImage,
};
use crate::types::{Album, ImageRecord};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("album {0} is not in the working set")]
    UnknownAlbum(Uuid),
    #[error("failed to compress {file}: {source}")]
    Compress {
        file: String,
        #[source]
        source: CompressError,
    },
    #[error("failed to save album: {0}")]
    Store(#[from] StoreError),
}

fn metadata(image: &ImageRecord) -> ImageMetadata {
    ImageMetadata {
        kind: image.kind,
        faces: image
            .faces
            .iter()
            .map(|f| FaceMetadata {
                descriptor: f.descriptor.values.clone(),
            })
            .collect(),
    }
}

/// Compress every photo of `album` and pair it with its face metadata.
pub fn build_request<E: PhotoEncoder>(
    album: &Album,
    compressor: &Compressor<E>,
) -> Result<SaveRequest, PublishError> {
    let mut images = Vec::with_capacity(album.images.len());
    for image in &album.images {
        let photo = compressor
            .compress_bytes(&image.original)
            .map_err(|source| PublishError::Compress {
                file: image.file_name.clone(),
                source,
            })?;
        tracing::debug!(
            file = %image.file_name,
            bytes = photo.bytes.len(),
            fallback = photo.used_fallback,
            "photo compressed for upload"
        );
        images.push(UploadImage {
            photo,
            metadata: metadata(image),
        });
    }
    Ok(SaveRequest {
        title: album.title.clone(),
        date: album.date,
        images,
    })
}

/// Persist one album. It leaves the working set only once the backend
/// acknowledged the save; on any failure it stays for another attempt.
pub async fn save_album<S: AlbumStore, E: PhotoEncoder>(
    workspace: &mut AlbumWorkspace,
    album_id: Uuid,
    store: &S,
    compressor: &Compressor<E>,
) -> Result<SaveAck, PublishError> {
    let album = workspace
        .album(album_id)
        .ok_or(PublishError::UnknownAlbum(album_id))?;
    let request = build_request(album, compressor)?;
    let uploads = request.images.len();

    let ack = store
        .save_album(request)
        .await
        .inspect_err(|e| tracing::error!(album = %album_id, error = %e, "album save failed"))?;

    workspace.retire_album(album_id);
    tracing::info!(album = %album_id, images = uploads, "album saved");
    Ok(ack)
}
