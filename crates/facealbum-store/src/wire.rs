//! JSON bodies exchanged with the backend.

use facealbum_core::store::GalleryFilter;
use facealbum_core::types::{CorpusEntry, Embedding};
use serde::{Deserialize, Serialize};

/// A descriptor component: stored as a JSON number, sometimes as a numeric string.
///
/// Any other JSON value is still accepted so one corrupt descriptor cannot
/// reject the whole page.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Component {
    Num(f64),
    Text(String),
    Other(serde_json::Value),
}

impl Component {
    /// Numeric value; anything non-numeric becomes NaN and fails comparison later.
    fn value(&self) -> f32 {
        match self {
            Component::Num(n) => *n as f32,
            Component::Text(s) => s.trim().parse().unwrap_or(f32::NAN),
            Component::Other(_) => f32::NAN,
        }
    }
}

pub(crate) fn descriptor(components: &[Component], model: Option<&str>) -> Embedding {
    let embedding = Embedding::new(components.iter().map(Component::value).collect());
    match model {
        Some(model) => embedding.with_model_version(model),
        None => embedding,
    }
}

/// Joins a server-relative path onto the API URL; absolute URLs pass through.
pub(crate) fn resolve(api_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        api_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct GalleryPage {
    #[serde(default)]
    pub images: Vec<WireImage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireImage {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub faces: Vec<WireFace>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFace {
    #[serde(default)]
    pub descriptor: Option<Vec<Component>>,
}

impl WireImage {
    pub(crate) fn into_entry(self, api_url: &str, model: Option<&str>) -> CorpusEntry {
        CorpusEntry {
            reference: resolve(api_url, &self.url),
            title: self.title,
            profile_pic: None,
            descriptors: self
                .faces
                .iter()
                .filter_map(|f| f.descriptor.as_deref())
                .map(|d| descriptor(d, model))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PeoplePage {
    #[serde(default)]
    pub embeddings: Vec<WirePerson>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WirePerson {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<Component>>,
    #[serde(default, rename = "profilePic")]
    pub profile_pic: Option<String>,
}

impl WirePerson {
    /// A person without a stored embedding becomes an entry with no
    /// descriptors, which never matches.
    pub(crate) fn into_entry(self, api_url: &str, model: Option<&str>) -> CorpusEntry {
        let profile_pic = self.profile_pic.map(|p| resolve(api_url, &p));
        CorpusEntry {
            reference: self
                .id
                .or_else(|| profile_pic.clone())
                .unwrap_or_default(),
            title: None,
            profile_pic,
            descriptors: self
                .embedding
                .as_deref()
                .map(|d| vec![descriptor(d, model)])
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TitlesResponse {
    #[serde(default)]
    pub titles: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserEmbedding {
    #[serde(default)]
    pub embedding: Option<Vec<Component>>,
}

/// Body of `POST /gallery/filter`; unset dates are sent as empty strings.
#[derive(Debug, Serialize)]
pub(crate) struct FilterBody<'a> {
    pub titles: &'a [String],
    #[serde(rename = "dateFrom")]
    pub date_from: String,
    #[serde(rename = "dateTo")]
    pub date_to: String,
}

impl<'a> From<&'a GalleryFilter> for FilterBody<'a> {
    fn from(filter: &'a GalleryFilter) -> Self {
        let day = |d: Option<chrono::NaiveDate>| {
            d.map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        };
        Self {
            titles: &filter.titles,
            date_from: day(filter.date_from),
            date_to: day(filter.date_to),
        }
    }
}
