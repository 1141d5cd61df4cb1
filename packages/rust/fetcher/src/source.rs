//! Source URL checks: well-formed, authoritative host, reachable.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use objectivedb_shared::{ObjectiveDbError, ReferenceData, Result};

use crate::USER_AGENT;
use crate::guard::is_ssrf_target;
use crate::pdf::classify_error;

/// Outcome of checking one source URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCheck {
    pub url: String,
    pub valid: bool,
    pub reason: String,
}

/// Checks that a test's source URL is authoritative and answers a HEAD
/// request with 200. Failures are reasons, never errors.
pub struct SourceUrlValidator {
    client: Client,
    refs: Arc<ReferenceData>,
    allow_localhost: bool,
}

impl SourceUrlValidator {
    pub fn new(refs: Arc<ReferenceData>, timeout_secs: u64, max_redirects: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ObjectiveDbError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            refs,
            allow_localhost: false,
        })
    }

    /// Allow checking localhost/private IPs (for integration tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    #[instrument(skip_all, fields(url = %url))]
    pub async fn check(&self, url: &str) -> SourceCheck {
        let (valid, reason) = self.classify(url).await;
        debug!(valid, %reason, "checked source url");
        SourceCheck {
            url: url.to_string(),
            valid,
            reason,
        }
    }

    async fn classify(&self, url: &str) -> (bool, String) {
        if url.trim().is_empty() {
            return (false, "No URL provided".into());
        }
        let parsed = match Url::parse(url) {
            Ok(u) if u.has_host() => u,
            _ => return (false, "Invalid URL format".into()),
        };
        let host = parsed.host_str().unwrap_or_default().to_lowercase();
        if !self
            .refs
            .authoritative_patterns
            .iter()
            .any(|p| host.contains(p.as_str()))
        {
            return (false, format!("Non-authoritative domain: {host}"));
        }
        if !self.allow_localhost && is_ssrf_target(&parsed) {
            return (false, "Blocked by SSRF protection".into());
        }

        match self.client.head(parsed).send().await {
            Ok(response) => match response.status() {
                StatusCode::OK => (true, "Valid and accessible".into()),
                StatusCode::NOT_FOUND => (false, "URL not found (404)".into()),
                status => (false, format!("HTTP {}", status.as_u16())),
            },
            Err(e) => (false, classify_error(&e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// Reference data that also treats the mock server's host as authoritative.
    fn validator() -> SourceUrlValidator {
        let mut refs = ReferenceData::default();
        refs.authoritative_patterns.push("127.0.0.1".into());
        SourceUrlValidator::new(Arc::new(refs), 2, 3)
            .unwrap()
            .allow_localhost()
    }

    #[tokio::test]
    async fn reachable_authoritative_url_is_valid() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/praxis/5001"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let check = validator().check(&format!("{}/praxis/5001", server.uri())).await;
        assert!(check.valid);
        assert_eq!(check.reason, "Valid and accessible");
    }

    #[tokio::test]
    async fn not_found_and_other_statuses_have_distinct_reasons() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/locked"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let v = validator();
        let gone = v.check(&format!("{}/gone", server.uri())).await;
        assert_eq!(gone.reason, "URL not found (404)");
        let locked = v.check(&format!("{}/locked", server.uri())).await;
        assert!(!locked.valid);
        assert_eq!(locked.reason, "HTTP 403");
    }

    #[tokio::test]
    async fn rejected_before_any_request() {
        let v = SourceUrlValidator::new(Arc::new(ReferenceData::default()), 2, 3).unwrap();
        assert_eq!(v.check("").await.reason, "No URL provided");
        assert_eq!(v.check("ets.org/praxis").await.reason, "Invalid URL format");
        assert_eq!(
            v.check("https://www.StudyBlog.com/praxis").await.reason,
            "Non-authoritative domain: www.studyblog.com"
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_connection_failure() {
        // Nothing listens on the discard port.
        let check = validator().check("http://127.0.0.1:9/tests").await;
        assert!(!check.valid);
        assert_eq!(check.reason, "Connection failed");
    }
}
