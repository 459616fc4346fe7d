//! Browser history seam
//!
//! Entries carry a serde state object `{"url": ...}` and the title
//! `"state-" + url`, matching what a browser's `pushState` receives.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// State object stored with every history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryState {
    pub url: String,
}

impl HistoryState {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }

    /// Title passed alongside the state.
    pub fn title(&self) -> String {
        format!("state-{}", self.url)
    }
}

/// Host history API.
pub trait History {
    /// Current location.
    fn location(&self) -> String;
    fn push_state(&mut self, state: &HistoryState, title: &str, url: &str);
    fn replace_state(&mut self, state: &HistoryState, title: &str, url: &str);
    /// Full, non-Ajax navigation to `url`.
    fn assign(&mut self, url: &str);
    /// Whether the host supports state manipulation at all.
    fn supported(&self) -> bool {
        true
    }
}

/// One recorded history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub state: HistoryState,
    pub title: String,
    pub url: String,
}

/// In-memory history stack with a cursor, for tests and the CLI.
#[derive(Debug, Clone)]
pub struct MemoryHistory {
    entries: Vec<HistoryEntry>,
    index: usize,
    assigned: Vec<String>,
    supported: bool,
}

impl MemoryHistory {
    pub fn new(initial_url: &str) -> Self {
        let state = HistoryState::new(initial_url);
        Self {
            entries: vec![HistoryEntry {
                title: String::new(),
                url: initial_url.to_string(),
                state,
            }],
            index: 0,
            assigned: Vec::new(),
            supported: true,
        }
    }

    /// History without state support.
    pub fn unsupported(initial_url: &str) -> Self {
        Self {
            supported: false,
            ..Self::new(initial_url)
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// URLs handed to [`History::assign`].
    pub fn assigned(&self) -> &[String] {
        &self.assigned
    }

    /// Move the cursor back and return the state to deliver with `popstate`.
    pub fn back(&mut self) -> Option<HistoryState> {
        self.index = self.index.checked_sub(1)?;
        Some(self.entries[self.index].state.clone())
    }

    pub fn forward(&mut self) -> Option<HistoryState> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        Some(self.entries[self.index].state.clone())
    }
}

impl History for MemoryHistory {
    fn location(&self) -> String {
        self.entries[self.index].url.clone()
    }

    fn push_state(&mut self, state: &HistoryState, title: &str, url: &str) {
        self.entries.truncate(self.index + 1);
        self.entries.push(HistoryEntry {
            state: state.clone(),
            title: title.to_string(),
            url: url.to_string(),
        });
        self.index = self.entries.len() - 1;
    }

    fn replace_state(&mut self, state: &HistoryState, title: &str, url: &str) {
        self.entries[self.index] = HistoryEntry {
            state: state.clone(),
            title: title.to_string(),
            url: url.to_string(),
        };
    }

    fn assign(&mut self, url: &str) {
        self.assigned.push(url.to_string());
    }

    fn supported(&self) -> bool {
        self.supported
    }
}

/// Keeps the engine's notion of the current URL in step with history.
#[derive(Debug)]
pub struct HistoryAdapter<H> {
    history: H,
    current_url: String,
}

impl<H: History> HistoryAdapter<H> {
    pub fn new(history: H) -> Self {
        let current_url = history.location();
        Self {
            history,
            current_url,
        }
    }

    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    /// Push `url`, unless the host is already there.
    pub fn push(&mut self, url: &str) {
        self.current_url = url.to_string();
        if self.history.location() == url {
            return;
        }
        let state = HistoryState::new(url);
        debug!(url, "History push");
        self.history.push_state(&state, &state.title(), url);
    }

    pub fn replace(&mut self, url: &str) {
        let state = HistoryState::new(url);
        debug!(url, "History replace");
        self.history.replace_state(&state, &state.title(), url);
        self.current_url = url.to_string();
    }

    /// Leave the engine and let the host load `url` itself.
    pub fn assign(&mut self, url: &str) {
        self.history.assign(url);
    }

    pub fn supported(&self) -> bool {
        self.history.supported()
    }

    pub fn inner(&self) -> &H {
        &self.history
    }

    pub fn inner_mut(&mut self) -> &mut H {
        &mut self.history
    }
}
