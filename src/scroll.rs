//! Scroll position bookkeeping
//!
//! Offsets are keyed by URL without query or fragment and recorded right
//! before the engine navigates away from a page.

use std::collections::HashMap;

use tracing::debug;

use crate::config::ScrollPolicy;
use crate::dom::Document;

/// Last recorded vertical offset per URL.
#[derive(Debug, Clone, Default)]
pub struct ScrollOffsets {
    offsets: HashMap<String, u32>,
}

impl ScrollOffsets {
    fn key(url: &str) -> &str {
        let end = url.find(['?', '#']).unwrap_or(url.len());
        &url[..end]
    }

    pub fn record(&mut self, url: &str, top: u32) {
        debug!(url, top, "Recording scroll offset");
        self.offsets.insert(Self::key(url).to_string(), top);
    }

    pub fn get(&self, url: &str) -> Option<u32> {
        self.offsets.get(Self::key(url)).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Applies the configured policy after a page swap.
#[derive(Debug, Clone, Default)]
pub struct ScrollManager {
    policy: ScrollPolicy,
    offsets: ScrollOffsets,
}

impl ScrollManager {
    pub fn new(policy: ScrollPolicy) -> Self {
        Self {
            policy,
            offsets: ScrollOffsets::default(),
        }
    }

    pub fn offsets(&self) -> &ScrollOffsets {
        &self.offsets
    }

    /// Remember where the document is scrolled for `url`.
    pub fn record<D: Document + ?Sized>(&mut self, url: &str, doc: &D) {
        self.offsets.record(url, doc.scroll_top());
    }

    /// Scroll after rendering `url`.
    ///
    /// A fragment overrides the policy: the document scrolls to the named
    /// element, or stays where it is when no such element exists.
    pub fn apply<D: Document + ?Sized>(&self, url: &str, doc: &mut D) {
        if let Some((_, hash)) = url.split_once('#') {
            if !hash.is_empty() {
                match doc.element_offset(hash) {
                    Some(top) => doc.scroll_to(top),
                    None => debug!(hash, "No element for fragment"),
                }
                return;
            }
        }

        match self.policy {
            ScrollPolicy::Smart => {
                if let Some(top) = self.offsets.get(url) {
                    doc.scroll_to(top);
                } else {
                    doc.scroll_to(0);
                }
            }
            ScrollPolicy::Top => doc.scroll_to(0),
            ScrollPolicy::Keep => {}
        }
    }
}
