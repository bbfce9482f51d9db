//! facealbum-store: HTTP client for the album and embedding backend.
//!
//! Implements the core `CorpusStore` and `AlbumStore` traits over the
//! backend's JSON and multipart endpoints.

mod wire;

use facealbum_core::store::{
    AlbumStore, CorpusKind, CorpusStore, GalleryFilter, ImageMetadata, SaveAck, SaveRequest,
    StoreError,
};
use facealbum_core::types::{CorpusEntry, Embedding};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use wire::{FilterBody, GalleryPage, PeoplePage, TitlesResponse, UserEmbedding};

pub struct HttpStore {
    client: reqwest::Client,
    api_url: String,
    /// Tag applied to every descriptor read from the backend.
    descriptor_model: Option<String>,
}

impl HttpStore {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            descriptor_model: None,
        }
    }

    pub fn with_descriptor_model(mut self, model: Option<String>) -> Self {
        self.descriptor_model = model;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Absolute URL for a path returned by the backend.
    pub fn resolve(&self, path: &str) -> String {
        wire::resolve(&self.api_url, path)
    }

    fn model(&self) -> Option<&str> {
        self.descriptor_model.as_deref()
    }

    fn gallery_entries(&self, page: GalleryPage) -> Vec<CorpusEntry> {
        page.images
            .into_iter()
            .map(|image| image.into_entry(&self.api_url, self.model()))
            .collect()
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

fn encode_metadata(metadata: &ImageMetadata) -> Result<String, StoreError> {
    serde_json::to_string(metadata)
        .map_err(|e| StoreError::Encode(format!("image metadata: {e}")))
}

/// Map non-success statuses to errors and decode the body.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(StoreError::Unauthorized);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(StoreError::Status {
            status: status.as_u16(),
            message,
        });
    }
    response
        .json()
        .await
        .map_err(|e| StoreError::Decode(e.to_string()))
}

impl CorpusStore for HttpStore {
    async fn fetch_page(
        &self,
        kind: CorpusKind,
        page: usize,
        limit: usize,
    ) -> Result<Vec<CorpusEntry>, StoreError> {
        let path = match kind {
            CorpusKind::Gallery => "/gallery/with-faces",
            CorpusKind::People => "/embeddings",
        };
        tracing::debug!(%kind, page, limit, "requesting corpus page");
        let response = self
            .client
            .get(self.resolve(path))
            .query(&[("page", page), ("limit", limit)])
            .send()
            .await
            .map_err(transport)?;

        match kind {
            CorpusKind::Gallery => {
                let body: GalleryPage = read_json(response).await?;
                Ok(self.gallery_entries(body))
            }
            CorpusKind::People => {
                let body: PeoplePage = read_json(response).await?;
                Ok(body
                    .embeddings
                    .into_iter()
                    .map(|person| person.into_entry(&self.api_url, self.model()))
                    .collect())
            }
        }
    }
}

impl AlbumStore for HttpStore {
    async fn fetch_gallery_page(
        &self,
        page: usize,
        limit: usize,
    ) -> Result<Vec<CorpusEntry>, StoreError> {
        tracing::debug!(page, limit, "requesting gallery page");
        let response = self
            .client
            .get(self.resolve("/gallery"))
            .query(&[("page", page), ("limit", limit)])
            .send()
            .await
            .map_err(transport)?;
        let body: GalleryPage = read_json(response).await?;
        Ok(self.gallery_entries(body))
    }

    async fn fetch_titles(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .client
            .get(self.resolve("/gallery/titles"))
            .send()
            .await
            .map_err(transport)?;
        let body: TitlesResponse = read_json(response).await?;
        Ok(body.titles)
    }

    async fn save_album(&self, request: SaveRequest) -> Result<SaveAck, StoreError> {
        let mut form = Form::new()
            .text("title", request.title)
            .text("date", request.date.format("%Y-%m-%d").to_string());

        let count = request.images.len();
        for image in request.images {
            let metadata = encode_metadata(&image.metadata)?;
            let part = Part::bytes(image.photo.bytes)
                .file_name(image.photo.filename)
                .mime_str("image/jpeg")
                .map_err(transport)?;
            form = form.part("images", part).text("metadata", metadata);
        }

        tracing::debug!(images = count, "uploading album");
        let response = self
            .client
            .post(self.resolve("/gallery/save"))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        read_json(response).await
    }

    async fn fetch_user_embedding(&self, token: &str) -> Result<Embedding, StoreError> {
        let response = self
            .client
            .get(self.resolve("/users/me/embedding"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;
        let body: UserEmbedding = read_json(response).await?;
        match body.embedding {
            Some(values) if !values.is_empty() => Ok(wire::descriptor(&values, self.model())),
            _ => Err(StoreError::Decode(
                "no embedding stored on the profile; update it first".to_string(),
            )),
        }
    }

    async fn filter_corpus(&self, filter: &GalleryFilter) -> Result<Vec<CorpusEntry>, StoreError> {
        let response = self
            .client
            .post(self.resolve("/gallery/filter"))
            .json(&FilterBody::from(filter))
            .send()
            .await
            .map_err(transport)?;
        let body: GalleryPage = read_json(response).await?;
        Ok(self.gallery_entries(body))
    }
}
