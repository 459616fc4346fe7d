//! HTTP transport for page fetches
//!
//! Features:
//! - One request per navigation: GET without body or urlencoded POST
//! - Relative URLs resolved against a base (the site root)
//! - Cookie jar, so sessions survive page swaps
//! - Brotli, Gzip, Deflate compression (auto-negotiated)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use tracing::{debug, info, instrument};

use crate::error::TransportError;

/// HTTP method of a page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub method: Method,
    pub url: String,
    /// Urlencoded form payload, POST only.
    pub body: Option<String>,
}

impl PageRequest {
    pub fn get(url: &str) -> Self {
        Self {
            method: Method::Get,
            url: url.to_string(),
            body: None,
        }
    }

    pub fn post(url: &str, body: &str) -> Self {
        Self {
            method: Method::Post,
            url: url.to_string(),
            body: Some(body.to_string()),
        }
    }
}

/// Response as consumed by the fetcher: status, content type and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl PageResponse {
    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: body.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only (X)HTML and form-family content types are usable pages.
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("html") || ct.contains("form-"))
    }
}

/// Network seam of the fetcher.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: PageRequest) -> Result<PageResponse, TransportError>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport resolving relative URLs against `base_url`.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        // Servers use this to serve partial layouts to Ajax requests
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        headers.insert(
            "Accept",
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );

        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a relative URL against the base URL.
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with("//") {
            let scheme = self.base_url.split("://").next().unwrap_or("https");
            format!("{scheme}:{url}")
        } else if url.starts_with('/') && !self.base_url.is_empty() {
            format!("{}{}", self.base_url, url)
        } else if !self.base_url.is_empty() {
            format!("{}/{}", self.base_url, url)
        } else {
            url.to_string()
        }
    }

    /// Get the underlying reqwest client
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(url = %request.url, method = ?request.method))]
    async fn send(&self, request: PageRequest) -> Result<PageResponse, TransportError> {
        let url = self.resolve(&request.url);
        debug!(resolved = %url, "Sending page request");

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(request.body.unwrap_or_default()),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        info!(
            status,
            version = ?response.version(),
            content_type = ?content_type,
            "Response received"
        );

        let body = response.text().await?;
        Ok(PageResponse {
            status,
            content_type,
            body,
        })
    }
}
