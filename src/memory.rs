//! Memory filter deciding which URLs may be served from the page cache.

use crate::config::Toggle;
use crate::hints::Hints;

#[derive(Debug, Clone)]
pub struct Memory {
    mode: Toggle,
    hints: Hints,
}

impl Memory {
    pub fn new(memoryoff: &Toggle) -> Self {
        Self {
            mode: memoryoff.clone(),
            hints: Hints::from_toggle(memoryoff),
        }
    }

    /// `memoryoff = true` disables the cache, `false` always remembers, and a
    /// hint list bypasses the cache for URLs containing any hint.
    pub fn should_remember(&self, url: &str) -> bool {
        match self.mode {
            Toggle::Flag(off) => !off,
            Toggle::Text(_) => !self.hints.matches_any(url),
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(&Toggle::Flag(false))
    }
}
