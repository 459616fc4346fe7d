//! Pending request state and admission policy
//!
//! [`RequestState`] is the single record describing the navigation currently
//! being prepared or in flight. [`admit`] decides whether a new request may
//! start while the fetcher is busy.

use crate::event::TriggerEvent;

/// Kind of a fetch: user navigation or speculative prefetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Normal,
    Prefetch,
}

/// Activity of the fetcher's current request handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Busy(RequestKind),
}

/// Outcome of the admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    /// Abort the in-flight request first, then start the new one.
    AbortThenProceed,
    /// Start the new request and let the in-flight one race it.
    ProceedWithoutAbort,
    /// Drop the new request.
    Reject,
}

impl Admission {
    pub fn allows(self) -> bool {
        !matches!(self, Self::Reject)
    }
}

/// Decide whether a request of `kind` may start while the fetcher is in `state`.
pub fn admit(state: TransferState, kind: RequestKind) -> Admission {
    match (state, kind) {
        (TransferState::Idle, _) => Admission::Proceed,
        (TransferState::Busy(_), RequestKind::Normal) => Admission::AbortThenProceed,
        (TransferState::Busy(RequestKind::Normal), RequestKind::Prefetch) => Admission::Reject,
        (TransferState::Busy(RequestKind::Prefetch), RequestKind::Prefetch) => {
            Admission::ProceedWithoutAbort
        }
    }
}

/// Whether `url` belongs to the site rooted at `root`.
///
/// Empty URLs and URLs without a scheme separator count as internal.
pub fn is_internal(url: &str, root: &str) -> bool {
    url.is_empty() || url.starts_with(root) || !url.contains(':')
}

/// State of the pending navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestState {
    href: String,
    is_post: bool,
    data: Option<String>,
    push: bool,
    canonical: Option<String>,
    event: Option<TriggerEvent>,
    last: Option<String>,
}

impl Default for RequestState {
    fn default() -> Self {
        Self {
            href: String::new(),
            is_post: false,
            data: None,
            push: true,
            canonical: None,
            event: None,
            last: None,
        }
    }
}

impl RequestState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset request defaults and return the current href.
    pub fn init(&mut self) -> &str {
        self.is_post = false;
        self.data = None;
        self.push = true;
        self.canonical = None;
        &self.href
    }

    /// Set the href directly, forgetting the originating event.
    pub fn set_href_hard(&mut self, href: &str) {
        self.event = None;
        self.href = href.to_string();
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    /// Store the triggering event and take the href from it.
    pub fn set_event(&mut self, event: TriggerEvent) {
        if let Some(href) = event.href() {
            self.href = href.to_string();
        }
        self.event = Some(event);
    }

    pub fn event(&self) -> Option<&TriggerEvent> {
        self.event.as_ref()
    }

    /// Take a user event as the new request, rejecting non-internal targets.
    ///
    /// On success the request defaults are reset and the href is returned.
    pub fn validate(&mut self, event: TriggerEvent, root: &str) -> Option<String> {
        self.set_event(event);
        if !is_internal(&self.href, root) {
            return None;
        }
        Some(self.init().to_string())
    }

    pub fn push(&self) -> bool {
        self.push
    }

    pub fn set_push(&mut self, push: bool) {
        self.push = push;
    }

    pub fn is_post(&self) -> bool {
        self.is_post
    }

    pub fn set_post(&mut self, is_post: bool) {
        self.is_post = is_post;
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    pub fn set_data(&mut self, data: String) {
        self.data = Some(data);
    }

    pub fn canonical(&self) -> Option<&str> {
        self.canonical.as_deref()
    }

    pub fn set_canonical(&mut self, canonical: Option<String>) {
        self.canonical = canonical;
    }

    /// Remember the href as the last committed request.
    pub fn commit_last(&mut self) {
        self.last = Some(self.href.clone());
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }

    /// Whether the href equals the current URL, or with `include_last`, the
    /// last committed request.
    pub fn is_same(&self, current_url: &str, include_last: bool) -> bool {
        self.href == current_url || (include_last && self.last.as_deref() == Some(&self.href))
    }

    /// The canonical URL if it should replace `href` in history.
    ///
    /// URLs carrying a query or hash keep their own form.
    pub fn canonical_or<'a>(&'a self, href: &'a str) -> &'a str {
        match self.canonical.as_deref() {
            Some(can) if can != href && !href.contains('#') && !href.contains('?') => can,
            _ => href,
        }
    }
}
