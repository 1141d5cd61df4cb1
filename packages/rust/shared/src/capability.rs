//! External capabilities the pipeline depends on: web search and content fetch.
//!
//! Implementations live in `objectivedb-fetcher`; tests use in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One search result. Only the URL is consumed downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl SearchHit {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }
}

/// Web search: ordered hits for a query string.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// Content fetch: textual content of a URL, guided by extraction instructions.
///
/// `Ok(None)` means the URL yielded no usable text (e.g. a binary document).
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, instructions: &str) -> Result<Option<String>>;
}
