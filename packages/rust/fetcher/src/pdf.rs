//! PDF link validation.
//!
//! Checks whether a URL really serves a PDF: HEAD first, GET when HEAD is
//! not answered with 200, then Content-Type and, for `.pdf` URLs, the `%PDF`
//! signature. Every failure is reported as a reason, never as an error.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, info, instrument};
use url::Url;

use objectivedb_shared::{ObjectiveDbError, Result};

use crate::USER_AGENT;
use crate::guard::is_ssrf_target;

/// Bytes read when checking the PDF signature.
const SIGNATURE_PROBE_BYTES: usize = 8;

/// Outcome of checking one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfCheck {
    pub url: String,
    pub valid: bool,
    pub reason: String,
}

/// Outcome of checking a list of candidate links.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PdfSearchResult {
    /// First valid link, if any.
    pub found: Option<String>,
    /// Every link checked, in order, up to and including the first valid one.
    pub checked: Vec<PdfCheck>,
}

/// Validates PDF links over HTTP.
pub struct PdfValidator {
    client: Client,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl PdfValidator {
    pub fn new(timeout_secs: u64, max_redirects: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ObjectiveDbError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            allow_localhost: false,
        })
    }

    /// Allow checking localhost/private IPs (for integration tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Check whether `url` points to an accessible PDF.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn is_valid(&self, url: &str) -> PdfCheck {
        let (valid, reason) = match self.check(url).await {
            Ok(outcome) => outcome,
            Err(e) => (false, classify_error(&e)),
        };
        debug!(valid, %reason, "checked link");
        PdfCheck {
            url: url.to_string(),
            valid,
            reason,
        }
    }

    /// Check links in order and stop at the first valid one.
    pub async fn first_valid(&self, urls: &[String]) -> PdfSearchResult {
        let mut result = PdfSearchResult::default();
        for url in urls {
            let check = self.is_valid(url).await;
            let valid = check.valid;
            result.checked.push(check);
            if valid {
                result.found = Some(url.clone());
                break;
            }
        }
        info!(
            checked = result.checked.len(),
            found = result.found.is_some(),
            "pdf link search complete"
        );
        result
    }

    async fn check(&self, url: &str) -> std::result::Result<(bool, String), reqwest::Error> {
        let parsed = match Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") && u.has_host() => u,
            _ => return Ok((false, "Invalid URL format".into())),
        };
        if !self.allow_localhost && is_ssrf_target(&parsed) {
            return Ok((false, "Blocked by SSRF protection".into()));
        }

        let mut response = self.client.head(parsed.clone()).send().await?;
        let mut from_head = true;
        if response.status() != StatusCode::OK {
            response = self.client.get(parsed.clone()).send().await?;
            from_head = false;
        }

        let status = response.status();
        if status != StatusCode::OK {
            return Ok((false, format!("HTTP {}", status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if content_type.contains("application/pdf") {
            return Ok((true, "Valid PDF (Content-Type)".into()));
        }

        let final_url = response.url().as_str().to_ascii_lowercase();
        if url.to_ascii_lowercase().ends_with(".pdf") || final_url.ends_with(".pdf") {
            // A HEAD response has no body to sniff
            let mut body_response = if from_head {
                self.client.get(parsed).send().await?
            } else {
                response
            };
            let prefix = read_prefix(&mut body_response, SIGNATURE_PROBE_BYTES).await?;
            if !prefix.is_empty() {
                return Ok(if prefix.starts_with(b"%PDF") {
                    (true, "Valid PDF (signature check)".into())
                } else {
                    (false, "File exists but not a PDF".into())
                });
            }
        }

        if final_url.contains(".pdf") {
            return Ok((true, "Valid PDF (URL extension)".into()));
        }

        Ok((false, "Not a PDF file".into()))
    }
}

/// Read up to `n` bytes of the body without downloading the rest.
async fn read_prefix(response: &mut Response, n: usize) -> std::result::Result<Vec<u8>, reqwest::Error> {
    let mut buf = Vec::with_capacity(n);
    while buf.len() < n {
        match response.chunk().await? {
            Some(chunk) => buf.extend_from_slice(&chunk),
            None => break,
        }
    }
    Ok(buf)
}

pub(crate) fn classify_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timeout".into()
    } else if e.is_redirect() {
        "Too many redirects".into()
    } else if e.is_connect() {
        "Connection failed".into()
    } else {
        let msg: String = e.to_string().chars().take(50).collect();
        format!("Error: {msg}")
    }
}
