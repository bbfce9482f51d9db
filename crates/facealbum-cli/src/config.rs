use anyhow::{Context, Result};
use facealbum_core::compress::{self, CompressConfig};
use facealbum_core::corpus::{self, CorpusConfig};
use facealbum_core::curate::{self, CurateConfig};
use facealbum_core::matcher::{self, MatchConfig};
use facealbum_core::search::{self, QueryGate, SearchConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI configuration: an optional TOML file, then `FACEALBUM_*` overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the album backend.
    pub api_url: String,
    /// Bearer token used to read the signed-in user's embedding.
    pub auth_token: Option<String>,
    /// Euclidean distance below which two faces are the same person.
    pub match_threshold: f32,
    /// Smallest face side kept when curating albums.
    pub min_face_size: f32,
    /// Smallest face side accepted on a query photo.
    pub min_query_face_size: f32,
    pub crop_padding: u32,
    pub page_size: usize,
    pub max_pages: usize,
    pub max_dimension: u32,
    pub byte_budget: usize,
    /// Descriptor space of the stored and detected faces, when known.
    pub descriptor_model: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000".to_string(),
            auth_token: None,
            match_threshold: matcher::DEFAULT_MATCH_THRESHOLD,
            min_face_size: curate::DEFAULT_MIN_FACE_SIZE,
            min_query_face_size: search::DEFAULT_MIN_QUERY_FACE_SIZE,
            crop_padding: curate::DEFAULT_CROP_PADDING,
            page_size: corpus::DEFAULT_PAGE_SIZE,
            max_pages: corpus::DEFAULT_MAX_PAGES,
            max_dimension: compress::DEFAULT_MAX_DIMENSION,
            byte_budget: compress::DEFAULT_BYTE_BUDGET,
            descriptor_model: None,
        }
    }
}

impl Config {
    /// Load from `path` (or `FACEALBUM_CONFIG`) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    fn load_with(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env("FACEALBUM_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(&env);
        config.validate();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) {
        if let Some(url) = env("FACEALBUM_API_URL") {
            self.api_url = url;
        }
        if let Some(token) = env("FACEALBUM_TOKEN") {
            self.auth_token = Some(token);
        }
        if let Some(model) = env("FACEALBUM_DESCRIPTOR_MODEL") {
            self.descriptor_model = Some(model);
        }
        self.match_threshold = env_parse(env, "FACEALBUM_MATCH_THRESHOLD", self.match_threshold);
        self.min_face_size = env_parse(env, "FACEALBUM_MIN_FACE_SIZE", self.min_face_size);
        self.min_query_face_size =
            env_parse(env, "FACEALBUM_MIN_QUERY_FACE_SIZE", self.min_query_face_size);
        self.crop_padding = env_parse(env, "FACEALBUM_CROP_PADDING", self.crop_padding);
        self.page_size = env_parse(env, "FACEALBUM_PAGE_SIZE", self.page_size);
        self.max_pages = env_parse(env, "FACEALBUM_MAX_PAGES", self.max_pages);
        self.max_dimension = env_parse(env, "FACEALBUM_MAX_DIMENSION", self.max_dimension);
        self.byte_budget = env_parse(env, "FACEALBUM_BYTE_BUDGET", self.byte_budget);
    }

    /// Replaces values no pipeline stage can run with by their defaults.
    fn validate(&mut self) {
        let defaults = Self::default();
        positive(&mut self.match_threshold, defaults.match_threshold, "match_threshold");
        positive(&mut self.min_face_size, defaults.min_face_size, "min_face_size");
        positive(
            &mut self.min_query_face_size,
            defaults.min_query_face_size,
            "min_query_face_size",
        );
        nonzero(&mut self.page_size, defaults.page_size, "page_size");
        nonzero(&mut self.max_pages, defaults.max_pages, "max_pages");
        nonzero(&mut self.byte_budget, defaults.byte_budget, "byte_budget");
        if self.max_dimension == 0 {
            tracing::warn!(key = "max_dimension", "must be positive; using default");
            self.max_dimension = defaults.max_dimension;
        }
    }

    pub fn curate(&self) -> CurateConfig {
        CurateConfig {
            min_face_size: self.min_face_size,
            padding: self.crop_padding,
        }
    }

    pub fn compress(&self) -> CompressConfig {
        CompressConfig {
            max_dimension: self.max_dimension,
            byte_budget: self.byte_budget,
            ..CompressConfig::default()
        }
    }

    pub fn search(&self) -> SearchConfig {
        SearchConfig {
            corpus: CorpusConfig {
                page_size: self.page_size,
                max_pages: self.max_pages,
            },
            matching: MatchConfig {
                threshold: self.match_threshold,
            },
            gate: QueryGate {
                min_face_size: self.min_query_face_size,
            },
        }
    }
}

/// Typed override; an unparseable value keeps the current one.
fn env_parse<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    current: T,
) -> T {
    match env(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparseable override");
            current
        }),
        None => current,
    }
}

fn positive(value: &mut f32, default: f32, key: &str) {
    if !value.is_finite() || *value <= 0.0 {
        tracing::warn!(key, value = %value, "must be a positive number; using default");
        *value = default;
    }
}

fn nonzero(value: &mut usize, default: usize, key: &str) {
    if *value == 0 {
        tracing::warn!(key, "must be positive; using default");
        *value = default;
    }
}
