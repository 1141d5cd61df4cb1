//! HTTP capabilities for objectivedb: web search, page fetch and PDF link checks.
//!
//! - [`HttpSearchProvider`]: SearXNG-compatible JSON search
//! - [`HttpFetcher`]: page fetch with SSRF guard and HTML → text conversion
//! - [`PdfValidator`]: HEAD/GET probing of candidate PDF links
//! - [`SourceUrlValidator`]: authority and reachability of test source URLs

mod guard;
mod http;
mod pdf;
mod search;
mod source;
mod text;

pub use guard::is_ssrf_target;
pub use http::HttpFetcher;
pub use pdf::{PdfCheck, PdfSearchResult, PdfValidator};
pub use search::HttpSearchProvider;
pub use source::{SourceCheck, SourceUrlValidator};
pub use text::html_to_text;

/// User-Agent string for outbound requests.
pub(crate) const USER_AGENT: &str = concat!("objectivedb/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects followed by search and fetch clients.
pub(crate) const MAX_REDIRECTS: usize = 5;
