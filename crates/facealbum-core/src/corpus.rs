//! Bounded aggregation of a paginated remote corpus.
//!
//! The backend offers no cursor or streaming guarantee, so pages are pulled
//! one after another until a short or empty page, with a hard page ceiling
//! as a guard against a server that always answers with a full page.

use crate::store::{CorpusKind, CorpusStore, StoreError};
use crate::types::CorpusEntry;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: usize = 200;
pub const DEFAULT_MAX_PAGES: usize = 30;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorpusError {
    #[error("failed to fetch {kind} page {page}: {source}")]
    Fetch {
        kind: CorpusKind,
        page: usize,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct CorpusConfig {
    pub page_size: usize,
    /// Upper bound on requests per aggregation.
    pub max_pages: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl CorpusConfig {
    /// Most entries a single aggregation can hold.
    pub fn entry_bound(&self) -> usize {
        self.page_size * self.max_pages
    }
}

pub struct CorpusAggregator<'a, S> {
    store: &'a S,
    config: CorpusConfig,
}

impl<'a, S: CorpusStore> CorpusAggregator<'a, S> {
    pub fn new(store: &'a S, config: CorpusConfig) -> Self {
        Self { store, config }
    }

    /// Fetch pages sequentially from page 0 and return everything collected.
    ///
    /// A failure on any page discards the pages already fetched.
    pub async fn collect(&self, kind: CorpusKind) -> Result<Vec<CorpusEntry>, CorpusError> {
        let limit = self.config.page_size;
        let mut entries = Vec::new();

        for page in 0..self.config.max_pages {
            let batch = self
                .store
                .fetch_page(kind, page, limit)
                .await
                .map_err(|source| CorpusError::Fetch { kind, page, source })?;

            let received = batch.len();
            tracing::debug!(%kind, page, received, "corpus page fetched");
            if received == 0 {
                break;
            }
            entries.extend(batch);
            if received < limit {
                break;
            }
            if page + 1 == self.config.max_pages {
                tracing::warn!(
                    %kind,
                    pages = self.config.max_pages,
                    entries = entries.len(),
                    "corpus page ceiling reached; remaining pages not fetched"
                );
            }
        }

        tracing::info!(%kind, entries = entries.len(), "corpus aggregated");
        Ok(entries)
    }
}
