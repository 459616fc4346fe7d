//! Page cache
//!
//! Fetched pages are kept in an array keyed by URL. Independently of that
//! array, a single "current" slot holds the page most recently fetched or
//! looked up; the delta loader and the renderer read from it.

use std::rc::Rc;

use tracing::debug;

use crate::memory::Memory;
use crate::page::Page;

#[derive(Debug, Default)]
pub struct PageCache {
    pages: Vec<(String, Rc<Page>)>,
    current: Option<Rc<Page>>,
    memory: Memory,
}

impl PageCache {
    pub fn new(memory: Memory) -> Self {
        Self {
            pages: Vec::new(),
            current: None,
            memory,
        }
    }

    fn position(&self, url: &str) -> Option<usize> {
        self.pages.iter().position(|(u, _)| u == url)
    }

    /// Look up a page, honoring the memory filter.
    ///
    /// The current slot follows the lookup result, including a miss.
    pub fn get(&mut self, url: &str) -> Option<Rc<Page>> {
        let found = if self.memory.should_remember(url) {
            self.position(url).map(|i| Rc::clone(&self.pages[i].1))
        } else {
            None
        };
        self.current.clone_from(&found);
        found
    }

    /// Store a page, overwriting any entry for the same URL.
    pub fn put(&mut self, url: &str, page: Rc<Page>) {
        self.current = Some(Rc::clone(&page));
        match self.position(url) {
            Some(i) => self.pages[i].1 = page,
            None => self.pages.push((url.to_string(), page)),
        }
    }

    pub fn flush(&mut self) {
        self.pages.clear();
        debug!("Cache flushed");
    }

    pub fn current(&self) -> Option<Rc<Page>> {
        self.current.clone()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.position(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
