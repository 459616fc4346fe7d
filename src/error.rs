//! Error types for the navigation lifecycle
//!
//! None of these ever escape the asynchronous lifecycle: they are logged,
//! broadcast as `error` lifecycle events and handed to the completion callback.

use thiserror::Error;

/// Failure of the underlying HTTP exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_body() || e.is_decode() {
            Self::Body(e.to_string())
        } else if e.is_builder() {
            Self::InvalidUrl(e.to_string())
        } else {
            Self::Connect(e.to_string())
        }
    }
}

/// Navigation failure as reported to listeners and the completion callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("not an HTML response for {url} (content-type: {content_type:?})")]
    NotHtml {
        url: String,
        content_type: Option<String>,
    },
}

/// Reasons the engine refuses to attach to a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("engine switched off (pluginon = false)")]
    Disabled,

    #[error("history API not supported by host")]
    NoHistory,

    #[error("invalid selector '{0}'")]
    InvalidSelector(String),
}
