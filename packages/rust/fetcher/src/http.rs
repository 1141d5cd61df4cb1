//! HTTP implementation of [`ContentFetcher`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use tracing::{debug, instrument, warn};
use url::Url;

use objectivedb_shared::{ContentFetcher, ObjectiveDbError, Result};

use crate::guard::is_ssrf_target;
use crate::text::html_to_text;
use crate::{MAX_REDIRECTS, USER_AGENT};

/// Maximum response size we consider valid (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// Fetches pages over HTTP and returns their text content.
///
/// HTML is converted to line-oriented text, `text/plain` passes through, and
/// any other content type yields `None`.
pub struct HttpFetcher {
    client: Client,
    max_response_size: u64,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl HttpFetcher {
    /// Create a fetcher with the given per-request timeout.
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ObjectiveDbError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_response_size: MAX_RESPONSE_SIZE,
            allow_localhost: false,
        })
    }

    /// Allow fetching localhost/private IPs (for integration tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    #[cfg(test)]
    fn with_max_response_size(mut self, bytes: u64) -> Self {
        self.max_response_size = bytes;
        self
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    /// The instructions are advisory; extraction happens downstream.
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &str, _instructions: &str) -> Result<Option<String>> {
        let parsed = Url::parse(url)
            .map_err(|e| ObjectiveDbError::validation(format!("invalid URL {url}: {e}")))?;

        if !self.allow_localhost && is_ssrf_target(&parsed) {
            warn!("SSRF protection: blocked");
            return Err(ObjectiveDbError::validation(format!(
                "{url}: blocked by SSRF protection"
            )));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| ObjectiveDbError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ObjectiveDbError::Network(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_response_size {
                return Err(too_large(url, len, self.max_response_size));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let is_html = content_type.contains("text/html") || content_type.contains("xhtml");
        let is_plain = content_type.is_empty() || content_type.starts_with("text/");
        if !is_html && !is_plain {
            debug!(%content_type, "unsupported content type");
            return Ok(None);
        }

        let body = read_body_capped(response, url, self.max_response_size).await?;

        let text = if is_html { html_to_text(&body)? } else { body };
        debug!(len = text.len(), "fetched");

        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(text))
    }
}

/// Read the body chunk by chunk, failing once it exceeds `max` bytes.
/// Covers bodies sent without a Content-Length header.
async fn read_body_capped(mut response: Response, url: &str, max: u64) -> Result<String> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ObjectiveDbError::Network(format!("{url}: failed to read body: {e}")))?
    {
        buf.extend_from_slice(&chunk);
        if buf.len() as u64 > max {
            return Err(too_large(url, buf.len() as u64, max));
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn too_large(url: &str, len: u64, max: u64) -> ObjectiveDbError {
    ObjectiveDbError::validation(format!(
        "{url}: response too large ({len} bytes, max {max})"
    ))
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(5).unwrap().allow_localhost()
    }

    #[tokio::test]
    async fn html_page_converted_to_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tests"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "<html><body><main><p>Praxis 5001: Elementary Education</p></main></body></html>",
                    "text/html",
                ),
            )
            .mount(&server)
            .await;

        let text = fetcher()
            .fetch(&format!("{}/tests", server.uri()), "list tests")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text.trim(), "Praxis 5001: Elementary Education");
    }

    #[tokio::test]
    async fn plain_text_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/objectives.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("1. Apply reasoning\n2. Teach fractions\n", "text/plain"),
            )
            .mount(&server)
            .await;

        let text = fetcher()
            .fetch(&format!("{}/objectives.txt", server.uri()), "")
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("1. Apply reasoning\n2. Teach fractions\n"));
    }

    #[tokio::test]
    async fn binary_content_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/framework.pdf"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"%PDF-1.7".to_vec(), "application/pdf"),
            )
            .mount(&server)
            .await;

        let text = fetcher()
            .fetch(&format!("{}/framework.pdf", server.uri()), "")
            .await
            .unwrap();
        assert!(text.is_none());
    }

    #[tokio::test]
    async fn http_error_is_err() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch(&format!("{}/missing", server.uri()), "")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn ssrf_guard_blocks_localhost_by_default() {
        let strict = HttpFetcher::new(5).unwrap();
        let err = strict
            .fetch("http://127.0.0.1:9/admin", "")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SSRF"));
    }

    #[tokio::test]
    async fn declared_oversize_body_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("x".repeat(64), "text/plain"))
            .mount(&server)
            .await;

        let err = fetcher()
            .with_max_response_size(16)
            .fetch(&format!("{}/big.txt", server.uri()), "")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("response too large"));
    }

    /// Serves one chunked `text/plain` response without a Content-Length.
    async fn serve_chunked(chunks: Vec<String>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();

            let mut response = String::from(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
            );
            for chunk in &chunks {
                response.push_str(&format!("{:x}\r\n{chunk}\r\n", chunk.len()));
            }
            response.push_str("0\r\n\r\n");
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/stream.txt")
    }

    #[tokio::test]
    async fn chunked_oversize_body_rejected() {
        let url = serve_chunked(vec!["a".repeat(10), "b".repeat(10), "c".repeat(10)]).await;
        let err = fetcher()
            .with_max_response_size(16)
            .fetch(&url, "")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("response too large"));
    }

    #[tokio::test]
    async fn chunked_body_within_cap_is_read() {
        let url = serve_chunked(vec!["Apply ".into(), "reasoning".into()]).await;
        let text = fetcher()
            .with_max_response_size(64)
            .fetch(&url, "")
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("Apply reasoning"));
    }
}
