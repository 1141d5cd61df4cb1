//! Test discovery and objective extraction for a processing unit.
//!
//! Runs the tiered search queries, keeps authoritative hits, fetches each
//! hit once and scans it for certification tests. Transient search or fetch
//! failures are logged and skipped; discovery itself never fails.

mod authority;
mod parser;
mod queries;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use objectivedb_shared::{
    ContentFetcher, Objective, ProcessingUnit, ReferenceData, RunConfig, SearchProvider,
    TestCandidate,
};

pub use authority::is_authoritative;
pub use parser::{CONTENT_SAMPLE_CHARS, dedup_tests, extract_objectives, extract_tests};
pub use queries::{
    Query, QueryTier, build_queries, objective_instructions, test_listing_instructions,
};

/// Default number of hits considered per query.
const DEFAULT_TOP_K: usize = 5;

/// Default courtesy delay between queries.
const DEFAULT_QUERY_DELAY_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of discovering tests for one unit. Zero tests is a valid outcome.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    /// Deduplicated tests, in tier order then hit order.
    pub tests: Vec<TestCandidate>,
    /// Queries issued (including failed ones).
    pub queries_run: u32,
    /// Authoritative URLs that were fetched.
    pub sources: Vec<String>,
}

/// Result of extracting objectives for one test.
#[derive(Debug, Clone, Default)]
pub struct ObjectiveExtraction {
    /// Verified objectives, zero-based and ordered.
    pub objectives: Vec<Objective>,
    /// Raw page text, kept for standards synthesis.
    pub raw_text: Option<String>,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for the discovery process.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Hits considered per query.
    pub top_k: usize,
    /// Delay between consecutive queries, in ms.
    pub query_delay_ms: u64,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            query_delay_ms: DEFAULT_QUERY_DELAY_MS,
        }
    }
}

impl From<&RunConfig> for DiscoveryOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            top_k: config.top_k,
            query_delay_ms: config.query_delay_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Discovers tests and extracts objectives through injected capabilities.
pub struct DiscoveryEngine {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn ContentFetcher>,
    refs: Arc<ReferenceData>,
    opts: DiscoveryOptions,
}

impl DiscoveryEngine {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn ContentFetcher>,
        refs: Arc<ReferenceData>,
        opts: DiscoveryOptions,
    ) -> Self {
        Self {
            search,
            fetcher,
            refs,
            opts,
        }
    }

    /// Discover the certification tests published for `unit`.
    #[instrument(skip_all, fields(unit = %unit.name))]
    pub async fn discover(&self, unit: &ProcessingUnit) -> DiscoveryOutcome {
        let queries = build_queries(unit);
        let instructions = test_listing_instructions(unit);
        let mut fetched: HashSet<String> = HashSet::new();
        let mut outcome = DiscoveryOutcome::default();
        let mut candidates = Vec::new();

        info!(queries = queries.len(), "starting discovery");

        for (i, query) in queries.iter().enumerate() {
            if i > 0 && self.opts.query_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.opts.query_delay_ms)).await;
            }

            outcome.queries_run += 1;
            debug!(tier = query.tier.as_str(), query = %query.text, "searching");

            let hits = match self.search.search(&query.text).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(query = %query.text, error = %e, "search failed, skipping query");
                    continue;
                }
            };

            for hit in hits.into_iter().take(self.opts.top_k) {
                if !is_authoritative(&hit.url, &self.refs.authoritative_patterns) {
                    debug!(url = %hit.url, "skipping non-authoritative hit");
                    continue;
                }
                if !fetched.insert(hit.url.clone()) {
                    continue;
                }

                match self.fetcher.fetch(&hit.url, &instructions).await {
                    Ok(Some(content)) => {
                        let found = extract_tests(&content, &hit.url, &self.refs.test_patterns);
                        debug!(url = %hit.url, tests = found.len(), "scanned listing");
                        candidates.extend(found);
                        outcome.sources.push(hit.url);
                    }
                    Ok(None) => debug!(url = %hit.url, "no textual content"),
                    Err(e) => warn!(url = %hit.url, error = %e, "fetch failed, skipping hit"),
                }
            }
        }

        outcome.tests = dedup_tests(candidates);
        info!(
            tests = outcome.tests.len(),
            sources = outcome.sources.len(),
            queries_run = outcome.queries_run,
            "discovery complete"
        );
        outcome
    }

    /// Fetch a test's source page and extract verified objectives from it.
    ///
    /// A test without a source URL, or whose page cannot be fetched, yields
    /// an empty extraction.
    #[instrument(skip_all, fields(test = %test.name))]
    pub async fn extract_objectives(&self, test: &TestCandidate) -> ObjectiveExtraction {
        let Some(url) = test.source_url.as_deref().filter(|u| !u.is_empty()) else {
            return ObjectiveExtraction::default();
        };

        let instructions = objective_instructions(&test.name, test.provider.as_deref());
        let content = match self.fetcher.fetch(url, &instructions).await {
            Ok(Some(content)) => content,
            Ok(None) => return ObjectiveExtraction::default(),
            Err(e) => {
                warn!(%url, error = %e, "objective fetch failed");
                return ObjectiveExtraction::default();
            }
        };

        let objectives = extract_objectives(&content, url, &self.refs.extraction_verbs);
        info!(%url, objectives = objectives.len(), "extracted objectives");

        ObjectiveExtraction {
            objectives,
            raw_text: Some(content),
        }
    }
}
