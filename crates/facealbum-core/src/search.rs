//! Search flows over the remote corpus.
//!
//! Album review matches every curated face against the known people; gallery
//! search matches one query descriptor (the signed-in user's stored
//! embedding, or the single face of an uploaded photo) against every stored
//! photo. Corpora are refetched on every call.

use crate::album::StagedPhoto;
use crate::corpus::{CorpusAggregator, CorpusConfig, CorpusError};
use crate::detector::{DetectorError, FaceDetector, Photo};
use crate::matcher::{
    match_faces, match_photos, EuclideanMatcher, FaceKey, MatchConfig, MatchError, MatchSet,
    PhotoMatches,
};
use crate::store::{AlbumStore, CorpusKind, CorpusStore, GalleryFilter, StoreError};
use crate::types::{Album, CorpusEntry, Detection, Embedding};
use thiserror::Error;

pub const DEFAULT_MIN_QUERY_FACE_SIZE: f32 = 150.0;
/// Photos per page when browsing the gallery.
pub const BROWSE_PAGE_SIZE: usize = 20;

/// Reasons a query photo cannot be used; each asks the user to try again.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryPhotoError {
    #[error("No faces detected. Please upload a clearer photo.")]
    NoFaceDetected,
    #[error("No valid faces found (faces too small). Try another photo.")]
    NoValidFace,
    #[error("Multiple faces detected ({0}). Please upload a photo with only you.")]
    MultipleFaces(usize),
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    QueryPhoto(#[from] QueryPhotoError),
    #[error("failed to decode {name}: {reason}")]
    Decode { name: String, reason: String },
    #[error("face detection failed: {0}")]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("select at least one title or date to filter by")]
    EmptyFilter,
}

/// Admits a query photo only when it holds exactly one usable face.
#[derive(Debug, Clone, Copy)]
pub struct QueryGate {
    pub min_face_size: f32,
}

impl Default for QueryGate {
    fn default() -> Self {
        Self {
            min_face_size: DEFAULT_MIN_QUERY_FACE_SIZE,
        }
    }
}

impl QueryGate {
    pub fn select(&self, detections: Vec<Detection>) -> Result<Detection, QueryPhotoError> {
        if detections.is_empty() {
            return Err(QueryPhotoError::NoFaceDetected);
        }
        let mut valid: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.bbox.is_at_least(self.min_face_size))
            .collect();
        match valid.len() {
            0 => Err(QueryPhotoError::NoValidFace),
            1 => Ok(valid.remove(0)),
            n => Err(QueryPhotoError::MultipleFaces(n)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchConfig {
    pub corpus: CorpusConfig,
    pub matching: MatchConfig,
    pub gate: QueryGate,
}

/// One page of the gallery listing.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryBrowse {
    pub page: usize,
    pub entries: Vec<CorpusEntry>,
    /// A full page means another one may follow.
    pub has_more: bool,
}

pub struct GallerySearch<'a, S> {
    store: &'a S,
    config: SearchConfig,
    matcher: EuclideanMatcher,
}

impl<'a, S: CorpusStore + AlbumStore> GallerySearch<'a, S> {
    pub fn new(store: &'a S, config: SearchConfig) -> Self {
        Self {
            store,
            matcher: EuclideanMatcher::new(config.matching),
            config,
        }
    }

    async fn collect(&self, kind: CorpusKind) -> Result<Vec<CorpusEntry>, SearchError> {
        let entries = CorpusAggregator::new(self.store, self.config.corpus)
            .collect(kind)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "corpus fetch failed"))?;
        Ok(entries)
    }

    async fn search_gallery(&self, query: &Embedding) -> Result<PhotoMatches, SearchError> {
        let corpus = self.collect(CorpusKind::Gallery).await?;
        let scanned = corpus.len();
        let result = match_photos(&self.matcher, query, corpus)?;
        tracing::info!(
            scanned,
            matched = result.photos.len(),
            skipped = result.skipped,
            "gallery search finished"
        );
        Ok(result)
    }

    /// Find every stored photo containing the user who owns `token`.
    pub async fn by_user_embedding(&self, token: &str) -> Result<PhotoMatches, SearchError> {
        let query = self
            .store
            .fetch_user_embedding(token)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "failed to fetch user embedding"))?;
        self.search_gallery(&query).await
    }

    /// Find every stored photo containing the single person in `photo`.
    ///
    /// The corpus is only fetched once the photo passed the query gate.
    pub async fn by_query_photo<D: FaceDetector>(
        &self,
        detector: &D,
        photo: &StagedPhoto,
    ) -> Result<PhotoMatches, SearchError> {
        let detections = {
            let decoded =
                image::load_from_memory(&photo.data).map_err(|e| SearchError::Decode {
                    name: photo.name.clone(),
                    reason: e.to_string(),
                })?;
            detector
                .detect(Photo {
                    name: &photo.name,
                    image: &decoded,
                })
                .await?
        };

        let face = self.config.gate.select(detections).inspect_err(|e| {
            tracing::info!(file = %photo.name, reason = %e, "query photo rejected");
        })?;
        self.search_gallery(&face.descriptor).await
    }

    /// Match every curated face of `albums` against the known people.
    pub async fn review_albums(&self, albums: &[Album]) -> Result<MatchSet<FaceKey>, SearchError> {
        let queries: Vec<(FaceKey, &Embedding)> = albums
            .iter()
            .flat_map(|album| {
                album.images.iter().enumerate().flat_map(move |(image, record)| {
                    record.faces.iter().enumerate().map(move |(face, f)| {
                        (
                            FaceKey {
                                album: album.id,
                                image,
                                face,
                            },
                            &f.descriptor,
                        )
                    })
                })
            })
            .collect();

        if queries.is_empty() {
            tracing::debug!("no curated faces to review");
            return Ok(match_faces(&self.matcher, queries, &[]));
        }

        let people = self.collect(CorpusKind::People).await?;
        let faces = queries.len();
        let set = match_faces(&self.matcher, queries, &people);
        tracing::info!(
            faces,
            people = people.len(),
            matched = set.len(),
            skipped = set.skipped(),
            "album review finished"
        );
        Ok(set)
    }

    /// Page `page` (zero-based) of the gallery, newest first.
    pub async fn browse(&self, page: usize) -> Result<GalleryBrowse, SearchError> {
        let entries = self
            .store
            .fetch_gallery_page(page, BROWSE_PAGE_SIZE)
            .await
            .inspect_err(|e| tracing::error!(page, error = %e, "failed to fetch gallery page"))?;
        let has_more = entries.len() >= BROWSE_PAGE_SIZE;
        tracing::debug!(page, photos = entries.len(), has_more, "gallery page loaded");
        Ok(GalleryBrowse {
            page,
            entries,
            has_more,
        })
    }

    /// Stored photos matching a title and date filter.
    pub async fn filter(&self, filter: &GalleryFilter) -> Result<Vec<CorpusEntry>, SearchError> {
        if filter.is_empty() {
            return Err(SearchError::EmptyFilter);
        }
        let entries = self
            .store
            .filter_corpus(filter)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "gallery filter failed"))?;
        Ok(entries)
    }

    pub async fn titles(&self) -> Result<Vec<String>, SearchError> {
        let titles = self
            .store
            .fetch_titles()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "failed to fetch titles"))?;
        Ok(titles)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::album::tests::{face, staged, TableDetector};
    use crate::album::AlbumWorkspace;
    use crate::corpus::tests::entry;
    use crate::store::{SaveAck, SaveRequest};
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// In-memory backend recording which calls reached it.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub(crate) gallery: Vec<CorpusEntry>,
        pub(crate) people: Vec<CorpusEntry>,
        pub(crate) user_embedding: Option<Embedding>,
        pub(crate) titles: Vec<String>,
        pub(crate) fail_saves: bool,
        pub(crate) pages: Mutex<Vec<CorpusKind>>,
        pub(crate) saved: Mutex<Vec<SaveRequest>>,
        pub(crate) filters: Mutex<Vec<GalleryFilter>>,
        pub(crate) browsed: Mutex<Vec<(usize, usize)>>,
    }

    impl MemoryStore {
        pub(crate) fn page_requests(&self) -> usize {
            self.pages.lock().unwrap().len()
        }
    }

    impl CorpusStore for MemoryStore {
        async fn fetch_page(
            &self,
            kind: CorpusKind,
            page: usize,
            limit: usize,
        ) -> Result<Vec<CorpusEntry>, StoreError> {
            self.pages.lock().unwrap().push(kind);
            let source = match kind {
                CorpusKind::Gallery => &self.gallery,
                CorpusKind::People => &self.people,
            };
            Ok(source.iter().skip(page * limit).take(limit).cloned().collect())
        }
    }

    impl AlbumStore for MemoryStore {
        async fn fetch_gallery_page(
            &self,
            page: usize,
            limit: usize,
        ) -> Result<Vec<CorpusEntry>, StoreError> {
            self.browsed.lock().unwrap().push((page, limit));
            Ok(self.gallery.iter().skip(page * limit).take(limit).cloned().collect())
        }

        async fn fetch_titles(&self) -> Result<Vec<String>, StoreError> {
            Ok(self.titles.clone())
        }

        async fn save_album(&self, request: SaveRequest) -> Result<SaveAck, StoreError> {
            if self.fail_saves {
                return Err(StoreError::Status {
                    status: 500,
                    message: "disk full".into(),
                });
            }
            let images = request.images.len();
            self.saved.lock().unwrap().push(request);
            Ok(serde_json::json!({ "saved": images }))
        }

        async fn fetch_user_embedding(&self, _token: &str) -> Result<Embedding, StoreError> {
            self.user_embedding.clone().ok_or(StoreError::Unauthorized)
        }

        async fn filter_corpus(&self, filter: &GalleryFilter) -> Result<Vec<CorpusEntry>, StoreError> {
            self.filters.lock().unwrap().push(filter.clone());
            Ok(self
                .gallery
                .iter()
                .filter(|e| {
                    e.title
                        .as_ref()
                        .is_some_and(|t| filter.titles.is_empty() || filter.titles.contains(t))
                })
                .cloned()
                .collect())
        }
    }

    fn gallery() -> Vec<CorpusEntry> {
        vec![
            entry("/uploads/1.jpg", vec![vec![0.9, 0.9, 0.9, 0.9], vec![0.5, 0.5, 0.5, 0.5]]),
            entry("/uploads/2.jpg", vec![vec![0.0, 0.0, 0.0, 0.0]]),
            entry("/uploads/3.jpg", vec![]),
            entry("/uploads/4.jpg", vec![vec![0.52, 0.5, 0.48, 0.5]]),
        ]
    }

    fn refs(matches: &PhotoMatches) -> Vec<&str> {
        matches.photos.iter().map(|e| e.reference.as_str()).collect()
    }

    #[test]
    fn test_gate_outcomes() {
        let gate = QueryGate::default();
        assert_eq!(gate.select(vec![]).unwrap_err(), QueryPhotoError::NoFaceDetected);
        assert_eq!(
            gate.select(vec![face(0.0, 0.0, 149.0, 0.9, vec![0.0; 4])]).unwrap_err(),
            QueryPhotoError::NoValidFace
        );
        assert_eq!(
            gate.select(vec![
                face(0.0, 0.0, 160.0, 0.9, vec![0.0; 4]),
                face(300.0, 0.0, 180.0, 0.8, vec![0.0; 4]),
            ])
            .unwrap_err(),
            QueryPhotoError::MultipleFaces(2)
        );

        let chosen = gate
            .select(vec![
                face(0.0, 0.0, 40.0, 0.99, vec![1.0; 4]),
                face(300.0, 0.0, 150.0, 0.7, vec![2.0; 4]),
            ])
            .unwrap();
        assert_eq!(chosen.descriptor.values, vec![2.0; 4]);
    }

    #[tokio::test]
    async fn test_query_photo_rejected_before_corpus_fetch() {
        let store = MemoryStore {
            gallery: gallery(),
            ..Default::default()
        };
        let detector = TableDetector::new(vec![
            ("nobody.png", vec![]),
            (
                "crowd.png",
                vec![
                    face(0.0, 0.0, 200.0, 0.9, vec![0.5; 4]),
                    face(300.0, 300.0, 200.0, 0.9, vec![0.1; 4]),
                ],
            ),
        ]);
        let search = GallerySearch::new(&store, SearchConfig::default());

        for name in ["nobody.png", "crowd.png"] {
            let err = search.by_query_photo(&detector, &staged(name)).await.unwrap_err();
            assert!(matches!(err, SearchError::QueryPhoto(_)), "{name}: {err}");
        }
        assert_eq!(store.page_requests(), 0);
    }

    #[tokio::test]
    async fn test_query_photo_matches_any_face() {
        let store = MemoryStore {
            gallery: gallery(),
            ..Default::default()
        };
        let detector = TableDetector::new(vec![(
            "me.png",
            vec![
                face(100.0, 100.0, 220.0, 0.95, vec![0.5; 4]),
                face(400.0, 20.0, 60.0, 0.9, vec![0.0; 4]),
            ],
        )]);
        let search = GallerySearch::new(&store, SearchConfig::default());

        let result = search.by_query_photo(&detector, &staged("me.png")).await.unwrap();
        assert_eq!(refs(&result), vec!["/uploads/1.jpg", "/uploads/4.jpg"]);
        assert_eq!(store.page_requests(), 1);
    }

    #[tokio::test]
    async fn test_user_embedding_search() {
        let store = MemoryStore {
            gallery: gallery(),
            user_embedding: Some(Embedding::new(vec![0.1, 0.0, 0.0, 0.0])),
            ..Default::default()
        };
        let search = GallerySearch::new(&store, SearchConfig::default());
        let result = search.by_user_embedding("token").await.unwrap();
        assert_eq!(refs(&result), vec!["/uploads/2.jpg"]);
    }

    #[tokio::test]
    async fn test_user_embedding_unauthorized_skips_corpus() {
        let store = MemoryStore {
            gallery: gallery(),
            ..Default::default()
        };
        let search = GallerySearch::new(&store, SearchConfig::default());
        let err = search.by_user_embedding("expired").await.unwrap_err();
        assert!(matches!(err, SearchError::Store(StoreError::Unauthorized)));
        assert_eq!(store.page_requests(), 0);
    }

    #[tokio::test]
    async fn test_review_albums_keys_faces_by_position() {
        let detector = TableDetector::new(vec![(
            "g.png",
            vec![
                face(20.0, 20.0, 220.0, 0.8, vec![0.9; 4]),
                face(300.0, 300.0, 240.0, 0.95, vec![0.1; 4]),
            ],
        )]);
        let mut ws = AlbumWorkspace::default();
        ws.set_title("Garba");
        ws.set_date(NaiveDate::from_ymd_opt(2025, 9, 28).unwrap());
        ws.add_images(vec![staged("g.png")]).unwrap();
        let id = ws.process(&detector).await.unwrap();

        let mut asha = entry("person-asha", vec![vec![0.12, 0.1, 0.1, 0.1]]);
        asha.profile_pic = Some("/uploads/asha.jpg".into());
        let store = MemoryStore {
            people: vec![asha, entry("person-ravi", vec![vec![3.0; 4]])],
            ..Default::default()
        };
        let search = GallerySearch::new(&store, SearchConfig::default());
        let set = search.review_albums(ws.albums()).await.unwrap();

        // Faces are sorted by score: the 0.95 face (descriptor 0.1) is first.
        let first = FaceKey { album: id, image: 0, face: 0 };
        let second = FaceKey { album: id, image: 0, face: 1 };
        assert_eq!(set.get(&first), &["/uploads/asha.jpg".to_string()]);
        assert!(set.get(&second).is_empty());
        assert_eq!(*store.pages.lock().unwrap(), vec![CorpusKind::People]);
    }

    #[tokio::test]
    async fn test_review_without_faces_fetches_nothing() {
        let store = MemoryStore::default();
        let search = GallerySearch::new(&store, SearchConfig::default());
        let set = search.review_albums(&[]).await.unwrap();
        assert!(set.is_empty());
        assert_eq!(store.page_requests(), 0);
    }

    #[tokio::test]
    async fn test_filter_requires_a_criterion() {
        let mut titled = entry("/uploads/9.jpg", vec![]);
        titled.title = Some("Diwali".into());
        let store = MemoryStore {
            gallery: vec![titled, entry("/uploads/10.jpg", vec![])],
            ..Default::default()
        };
        let search = GallerySearch::new(&store, SearchConfig::default());

        let err = search.filter(&GalleryFilter::default()).await.unwrap_err();
        assert!(matches!(err, SearchError::EmptyFilter));
        assert!(store.filters.lock().unwrap().is_empty());

        let found = search
            .filter(&GalleryFilter {
                titles: vec!["Diwali".into()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].reference, "/uploads/9.jpg");
    }

    #[tokio::test]
    async fn test_browse_pages_through_the_gallery() {
        let store = MemoryStore {
            gallery: (0..45)
                .map(|i| entry(&format!("/uploads/{i}.jpg"), vec![]))
                .collect(),
            ..Default::default()
        };
        let search = GallerySearch::new(&store, SearchConfig::default());

        let first = search.browse(0).await.unwrap();
        assert_eq!(first.entries.len(), 20);
        assert_eq!(first.entries[0].reference, "/uploads/0.jpg");
        assert!(first.has_more);

        let last = search.browse(2).await.unwrap();
        assert_eq!(last.page, 2);
        assert_eq!(last.entries.len(), 5);
        assert_eq!(last.entries[0].reference, "/uploads/40.jpg");
        assert!(!last.has_more);

        let beyond = search.browse(3).await.unwrap();
        assert!(beyond.entries.is_empty());
        assert!(!beyond.has_more);

        assert_eq!(
            *store.browsed.lock().unwrap(),
            vec![(0, 20), (2, 20), (3, 20)]
        );
        // browsing never runs the corpus aggregator
        assert_eq!(store.page_requests(), 0);
    }
}
