//! HTTP implementation of [`SearchProvider`] against a SearXNG-compatible
//! JSON endpoint (`GET <endpoint>?q=<query>&format=json`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use objectivedb_shared::{ObjectiveDbError, Result, SearchHit, SearchProvider};

use crate::{MAX_REDIRECTS, USER_AGENT};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Web search over HTTP.
pub struct HttpSearchProvider {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    max_results: usize,
}

impl HttpSearchProvider {
    /// Create a provider for `endpoint`. `api_key`, if given, is sent as a bearer token.
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        max_results: usize,
        timeout_secs: u64,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            ObjectiveDbError::config(format!("invalid search endpoint {endpoint}: {e}"))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ObjectiveDbError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            max_results,
        })
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    #[instrument(skip_all, fields(query = %query))]
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let mut request = self
            .client
            .get(self.endpoint.clone())
            .query(&[("q", query), ("format", "json")]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ObjectiveDbError::Network(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ObjectiveDbError::Network(format!("search endpoint returned HTTP {status}")));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ObjectiveDbError::parse(format!("invalid search response: {e}")))?;

        let hits: Vec<SearchHit> = body
            .results
            .into_iter()
            .filter_map(|raw| {
                let url = raw.url.filter(|u| !u.is_empty())?;
                Some(SearchHit {
                    url,
                    title: raw.title,
                })
            })
            .take(self.max_results)
            .collect();

        debug!(hits = hits.len(), "search complete");
        Ok(hits)
    }
}
