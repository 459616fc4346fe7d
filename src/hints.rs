//! Substring hint sets
//!
//! Several settings (`memoryoff`, `prefetchoff`, `inlineskip`, ...) accept a
//! comma-separated list of substrings. A [`Hints`] set is built once from such a
//! string and answers whether any hint occurs in a given text.

use crate::config::Toggle;

/// Set of substring hints parsed from a comma-separated string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hints {
    hints: Vec<String>,
}

impl Hints {
    /// Parse `"foo, bar"` into the hints `foo` and `bar`.
    ///
    /// Blank entries are dropped, so an empty string yields an empty set that
    /// never matches.
    #[must_use]
    pub fn new(list: &str) -> Self {
        let hints = list
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(ToString::to_string)
            .collect();

        Self { hints }
    }

    /// Build from a bool-or-string setting. Boolean settings carry no hints.
    #[must_use]
    pub fn from_toggle(toggle: &Toggle) -> Self {
        match toggle {
            Toggle::Flag(_) => Self::default(),
            Toggle::Text(list) => Self::new(list),
        }
    }

    /// Returns `true` if `text` contains any of the hints.
    pub fn matches_any(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        self.hints.iter().any(|h| text.contains(h.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }
}
