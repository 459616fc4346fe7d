//! `pronto` - Headless Ajax page-transition engine
//!
//! # Features
//!
//! - **Page swaps**: fetch the target page, normalize it into an inert
//!   fragment and replace only the registered content containers
//! - **Delta loading**: insert only the scripts and stylesheets the live
//!   document has not loaded yet; inline scripts run through `QuickJS`
//! - **Prefetch**: hover/touch intent loads pages into the cache ahead of the click
//! - **History**: push/replace entries, back/forward, scroll restoration
//! - **Forms**: GET and POST submissions travel the same Ajax path as links
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pronto::{
//!     HttpTransport, LinkEvent, MemoryHistory, NavEvent, Pronto, Settings, VirtualDocument,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings {
//!         containers: vec!["content".into()],
//!         ..Settings::default()
//!     };
//!     let transport = Arc::new(HttpTransport::new("https://example.com")?);
//!     let html = r#"<html><body><div id="content"></div></body></html>"#;
//!     let document = VirtualDocument::parse(html);
//!     let history = MemoryHistory::new("https://example.com/");
//!
//!     let mut pronto = Pronto::new(settings, transport, document, history)?;
//!     pronto.dispatch(NavEvent::Click(LinkEvent::new("/about")));
//!     pronto.settle().await;
//!     println!("Now at {}", pronto.current_url());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod delta;
pub mod dom;
pub mod error;
pub mod event;
pub mod fetcher;
pub mod form;
pub mod hints;
pub mod history;
pub mod http_client;
pub mod js_engine;
pub mod memory;
pub mod page;
pub mod pronto;
pub mod request;
pub mod scroll;

pub use cache::PageCache;
pub use config::{load_settings, DeltaMode, ScrollPolicy, Settings, Toggle};
pub use delta::{DeltaLoader, InlineAction, InlinePolicy, ScriptRegistry, ScriptRunner};
pub use dom::{Document, Mutation, VirtualDocument};
pub use error::{InitError, NavError, TransportError};
pub use event::{
    Dispatch, LifecycleEvent, LifecycleKind, LinkEvent, Modifiers, NavEvent, TriggerEvent,
};
pub use fetcher::{Completion, Fetcher, LoadStart, XhrInfo};
pub use form::{Form, FormSubmit};
pub use hints::Hints;
pub use history::{History, HistoryAdapter, HistoryEntry, HistoryState, MemoryHistory};
pub use http_client::{HttpTransport, Method, PageRequest, PageResponse, Transport};
pub use js_engine::JsEngine;
pub use memory::Memory;
pub use page::{normalize_html, ElementData, LinkTag, Page, Resources, ScriptTag};
pub use pronto::{CommandReply, NavState, NavigationSession, PageCommand, Pronto};
pub use request::{admit, is_internal, Admission, RequestKind, RequestState, TransferState};
pub use scroll::{ScrollManager, ScrollOffsets};

/// Version of pronto
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
