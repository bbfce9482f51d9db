//! facealbum-core: face curation, album review and embedding search.
//!
//! Detector output is filtered and cropped into ranked face records, grouped
//! into editable albums, compressed for upload and matched by Euclidean
//! distance against a paginated remote corpus. The detector and the backend
//! are injected through the `FaceDetector` and store traits.

pub mod album;
pub mod compress;
pub mod corpus;
pub mod curate;
pub mod detector;
pub mod matcher;
pub mod publish;
pub mod search;
pub mod store;
pub mod types;

pub use album::{AlbumWorkspace, StagedPhoto};
pub use detector::{FaceDetector, SharedDetector};
pub use matcher::{EuclideanMatcher, FaceKey, MatchSet, Matcher};
pub use search::{GalleryBrowse, GallerySearch, SearchConfig};
pub use types::{Album, BoundingBox, CorpusEntry, Detection, Embedding, ImageKind};
