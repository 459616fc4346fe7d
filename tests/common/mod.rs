//! Shared fixtures for the navigation tests: a scripted transport and a
//! small three-page site.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use pronto::{PageRequest, PageResponse, Settings, Transport, TransportError};

/// Transport answering from a URL map and recording every request.
#[derive(Default)]
pub struct MockTransport {
    responses: HashMap<String, PageResponse>,
    /// URLs whose requests never complete.
    held: HashSet<String>,
    calls: Mutex<Vec<PageRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small site: `/page1`, `/page2`, `/page3`.
    pub fn site() -> Self {
        Self::new()
            .page("/page1", &page("Page One", "One", ""))
            .page("/page2", &page("Page Two", "Two", ""))
            .page("/page3", &page("Page Three", "Three", ""))
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.respond(url, PageResponse::html(html))
    }

    pub fn respond(mut self, url: &str, response: PageResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    pub fn hold(mut self, url: &str) -> Self {
        self.held.insert(url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<PageRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|r| r.url).collect()
    }

    pub fn count(&self, url: &str) -> usize {
        self.calls().iter().filter(|r| r.url == url).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: PageRequest) -> Result<PageResponse, TransportError> {
        self.calls.lock().unwrap().push(request.clone());
        if self.held.contains(&request.url) {
            return futures::future::pending().await;
        }
        self.responses
            .get(&request.url)
            .cloned()
            .ok_or_else(|| TransportError::Connect(format!("no route to {}", request.url)))
    }
}

/// Full page markup with one `#content` container.
pub fn page(title: &str, content: &str, head: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{title}</title>{head}</head>
<body class="{class}">
<div id="content"><p>{content}</p></div>
</body>
</html>"#,
        class = title.to_lowercase()
    )
}

/// Settings swapping `#content` only.
pub fn settings() -> Settings {
    Settings {
        containers: vec!["content".to_string()],
        ..Settings::default()
    }
}
