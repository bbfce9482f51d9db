//! Threshold matching of face descriptors against a corpus.
//!
//! Every query descriptor is compared with every corpus descriptor; a pair
//! matches when its Euclidean distance is strictly below the threshold. All
//! matches are kept, nothing is ranked.

use crate::types::{CorpusEntry, DescriptorError, Embedding};
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.35;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("query descriptor is empty")]
    EmptyQuery,
    #[error("query descriptor contains non-finite values")]
    NonFiniteQuery,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchConfig {
    /// Largest distance (exclusive) at which two descriptors are the same person.
    pub threshold: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

/// Strategy for deciding whether two descriptors belong to the same person.
pub trait Matcher {
    fn distance(&self, query: &Embedding, candidate: &Embedding) -> Result<f32, DescriptorError>;

    fn threshold(&self) -> f32;

    fn is_match(&self, query: &Embedding, candidate: &Embedding) -> Result<bool, DescriptorError> {
        Ok(self.distance(query, candidate)? < self.threshold())
    }
}

/// Euclidean-distance matcher.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self {
            threshold: config.threshold,
        }
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(MatchConfig::default())
    }
}

impl Matcher for EuclideanMatcher {
    fn distance(&self, query: &Embedding, candidate: &Embedding) -> Result<f32, DescriptorError> {
        query.euclidean_distance(candidate)
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// Position of a curated face in the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FaceKey {
    pub album: Uuid,
    pub image: usize,
    pub face: usize,
}

impl std::fmt::Display for FaceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.album, self.image, self.face)
    }
}

/// Display references of the corpus entries matched by each query.
#[derive(Debug, Clone)]
pub struct MatchSet<K> {
    matches: HashMap<K, Vec<String>>,
    skipped: usize,
}

impl<K: Eq + Hash> MatchSet<K> {
    /// Matches for `key`, in corpus order. Empty when nothing matched.
    pub fn get(&self, key: &K) -> &[String] {
        self.matches.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of queries with at least one match.
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &[String])> {
        self.matches.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Corpus descriptors that could not be compared and were left out.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Stored photos matched by a single query.
#[derive(Debug, Clone)]
pub struct PhotoMatches {
    pub photos: Vec<CorpusEntry>,
    pub skipped: usize,
}

fn check_query(query: &Embedding) -> Result<(), MatchError> {
    if query.is_empty() {
        return Err(MatchError::EmptyQuery);
    }
    if query.values.iter().any(|v| !v.is_finite()) {
        return Err(MatchError::NonFiniteQuery);
    }
    Ok(())
}

/// Whether any descriptor of `entry` matches `query`.
///
/// Descriptors that cannot be compared are counted in `skipped` and never
/// treated as a match.
fn entry_matches<M: Matcher>(
    matcher: &M,
    query: &Embedding,
    entry: &CorpusEntry,
    skipped: &mut usize,
) -> bool {
    for candidate in &entry.descriptors {
        match matcher.is_match(query, candidate) {
            Ok(true) => return true,
            Ok(false) => {}
            Err(err) => {
                *skipped += 1;
                tracing::warn!(entry = %entry.reference, error = %err, "skipping incomparable descriptor");
            }
        }
    }
    false
}

/// Album-review matching: every query face collects the display references
/// of all corpus entries it matches.
///
/// Invalid query descriptors (empty or non-finite) are skipped and counted.
pub fn match_faces<'q, M, K, I>(matcher: &M, queries: I, corpus: &[CorpusEntry]) -> MatchSet<K>
where
    M: Matcher,
    K: Eq + Hash,
    I: IntoIterator<Item = (K, &'q Embedding)>,
{
    let mut matches: HashMap<K, Vec<String>> = HashMap::new();
    let mut skipped = 0;

    for (key, query) in queries {
        if let Err(err) = check_query(query) {
            skipped += 1;
            tracing::warn!(error = %err, "skipping invalid query face");
            continue;
        }
        let found: Vec<String> = corpus
            .iter()
            .filter(|entry| entry_matches(matcher, query, entry, &mut skipped))
            .map(|entry| entry.display_ref().to_string())
            .collect();
        if !found.is_empty() {
            matches.insert(key, found);
        }
    }

    MatchSet { matches, skipped }
}

/// Gallery-search matching: a stored photo matches when any of its faces does.
pub fn match_photos<M: Matcher>(
    matcher: &M,
    query: &Embedding,
    corpus: Vec<CorpusEntry>,
) -> Result<PhotoMatches, MatchError> {
    check_query(query)?;
    let mut skipped = 0;
    let photos = corpus
        .into_iter()
        .filter(|entry| entry_matches(matcher, query, entry, &mut skipped))
        .collect();
    Ok(PhotoMatches { photos, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::tests::entry;

    /// Descriptor at distance `d` from the origin along the first axis.
    fn at(d: f32) -> Embedding {
        Embedding::new(vec![d, 0.0, 0.0, 0.0])
    }

    fn origin() -> Embedding {
        at(0.0)
    }

    #[test]
    fn test_threshold_boundaries() {
        let m = EuclideanMatcher::default();
        assert!(m.is_match(&origin(), &at(0.30)).unwrap());
        assert!(!m.is_match(&origin(), &at(0.40)).unwrap());
        assert!(!m.is_match(&origin(), &at(DEFAULT_MATCH_THRESHOLD)).unwrap());
    }

    #[test]
    fn test_distance_symmetric() {
        let m = EuclideanMatcher::default();
        let a = Embedding::new(vec![0.12, 0.5, -0.3, 0.8]);
        let b = Embedding::new(vec![-0.2, 0.45, 0.1, 0.6]);
        assert_eq!(m.distance(&a, &b).unwrap(), m.distance(&b, &a).unwrap());
    }

    #[test]
    fn test_match_photos_is_existential() {
        let corpus = vec![
            entry("group", vec![vec![0.9, 0.0, 0.0, 0.0], vec![0.1, 0.0, 0.0, 0.0]]),
            entry("stranger", vec![vec![0.8, 0.0, 0.0, 0.0]]),
            entry("no-faces", vec![]),
            entry("me-again", vec![vec![0.0, 0.2, 0.0, 0.0]]),
        ];
        let result = match_photos(&EuclideanMatcher::default(), &origin(), corpus).unwrap();
        let refs: Vec<&str> = result.photos.iter().map(|e| e.reference.as_str()).collect();
        assert_eq!(refs, vec!["group", "me-again"]);
        assert_eq!(result.skipped, 0);
    }

    #[test]
    fn test_match_photos_skips_mismatched_lengths() {
        let corpus = vec![
            entry("short", vec![vec![0.0, 0.0]]),
            entry("mixed", vec![vec![0.0; 3], vec![0.1, 0.0, 0.0, 0.0]]),
        ];
        let result = match_photos(&EuclideanMatcher::default(), &origin(), corpus).unwrap();
        let refs: Vec<&str> = result.photos.iter().map(|e| e.reference.as_str()).collect();
        assert_eq!(refs, vec!["mixed"]);
        assert_eq!(result.skipped, 2);
    }

    #[test]
    fn test_match_photos_skips_other_descriptor_space() {
        let query = origin().with_model_version("face-api/v1");
        let mut other = entry("other-model", vec![]);
        other.descriptors = vec![at(0.0).with_model_version("arcface")];
        let result = match_photos(&EuclideanMatcher::default(), &query, vec![other]).unwrap();
        assert!(result.photos.is_empty());
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_match_photos_rejects_empty_query() {
        let result = match_photos(&EuclideanMatcher::default(), &Embedding::new(vec![]), vec![]);
        assert_eq!(result.unwrap_err(), MatchError::EmptyQuery);
    }

    #[test]
    fn test_match_faces_keys_and_all_matches_kept() {
        let album = Uuid::new_v4();
        let mut alice = entry("photo-a", vec![vec![0.1, 0.0, 0.0, 0.0]]);
        alice.profile_pic = Some("http://api/uploads/alice.jpg".into());
        let mut alice_twin = entry("photo-b", vec![vec![0.0, 0.1, 0.0, 0.0]]);
        alice_twin.profile_pic = Some("http://api/uploads/alice2.jpg".into());
        let bob = entry("photo-c", vec![vec![5.0, 5.0, 5.0, 5.0]]);
        let corpus = vec![alice, alice_twin, bob];

        let q0 = origin();
        let q1 = Embedding::new(vec![9.0, 9.0, 9.0, 9.0]);
        let k0 = FaceKey { album, image: 0, face: 0 };
        let k1 = FaceKey { album, image: 0, face: 1 };

        let set = match_faces(&EuclideanMatcher::default(), [(k0, &q0), (k1, &q1)], &corpus);

        assert_eq!(
            set.get(&k0),
            &[
                "http://api/uploads/alice.jpg".to_string(),
                "http://api/uploads/alice2.jpg".to_string()
            ]
        );
        assert!(set.get(&k1).is_empty());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_match_faces_entry_listed_once_for_many_descriptors() {
        let corpus = vec![entry("multi", vec![vec![0.0; 4], vec![0.05, 0.0, 0.0, 0.0]])];
        let q = origin();
        let set = match_faces(&EuclideanMatcher::default(), [("q", &q)], &corpus);
        assert_eq!(set.get(&"q"), &["multi".to_string()]);
    }

    #[test]
    fn test_match_faces_counts_invalid_queries() {
        let corpus = vec![entry("x", vec![vec![0.0; 4]])];
        let empty = Embedding::new(vec![]);
        let set = match_faces(&EuclideanMatcher::default(), [("bad", &empty)], &corpus);
        assert!(set.is_empty());
        assert_eq!(set.skipped(), 1);
    }

    #[test]
    fn test_face_key_display() {
        let album = Uuid::nil();
        let key = FaceKey { album, image: 2, face: 1 };
        assert_eq!(key.to_string(), format!("{album}-2-1"));
    }
}
