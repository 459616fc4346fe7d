//! Page fetcher
//!
//! Resolves a navigation target either from the page cache or with exactly one
//! network request. In-flight requests are [`Abortable`] futures polled
//! through a [`FuturesUnordered`]; the fetcher keeps one handle per live
//! request, the most recent of which is the "current" transfer.

use std::rc::Rc;
use std::sync::Arc;

use futures::future::{AbortHandle, Abortable, Aborted, LocalBoxFuture};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tracing::{debug, info, warn};

use crate::cache::PageCache;
use crate::error::{NavError, TransportError};
use crate::http_client::{PageRequest, PageResponse, Transport};
use crate::page::Page;
use crate::request::{RequestKind, RequestState, TransferState};

/// Result of a finished (or aborted) transfer.
#[derive(Debug)]
pub struct FetchOutcome {
    pub id: u64,
    pub url: String,
    pub kind: RequestKind,
    pub result: Result<Result<PageResponse, TransportError>, Aborted>,
}

/// Public view of the current transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XhrInfo {
    pub id: u64,
    pub kind: RequestKind,
    pub url: String,
}

#[derive(Debug)]
struct XhrHandle {
    info: XhrInfo,
    abort: AbortHandle,
}

/// How a [`Fetcher::load`] call was served.
#[derive(Debug, Clone)]
pub enum LoadStart {
    /// Served from the cache; the continuation runs right away.
    Cached(Rc<Page>),
    /// A network request with this id is in flight.
    Started(u64),
    /// A prefetch of the same URL is already in flight and now counts as
    /// the normal request.
    Joined(u64),
}

/// Classified completion of a transfer.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Superseded by an abort, nothing to do.
    Aborted,
    /// Page stored in the cache, with an error if the exchange failed.
    Loaded {
        id: u64,
        url: String,
        kind: RequestKind,
        error: Option<NavError>,
    },
    /// A normal request returned something that is not a page; the host
    /// should load the URL itself.
    Escape { url: String, error: NavError },
    /// A prefetch returned something that is not a page.
    Dropped { url: String },
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    inflight: FuturesUnordered<LocalBoxFuture<'static, FetchOutcome>>,
    handles: Vec<XhrHandle>,
    prefetch_pending: Option<String>,
    next_id: u64,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            inflight: FuturesUnordered::new(),
            handles: Vec::new(),
            prefetch_pending: None,
            next_id: 1,
        }
    }

    /// Kind of the current transfer, or idle.
    pub fn state(&self) -> TransferState {
        self.handles
            .last()
            .map_or(TransferState::Idle, |h| TransferState::Busy(h.info.kind))
    }

    pub fn xhr(&self) -> Option<XhrInfo> {
        self.handles.last().map(|h| h.info.clone())
    }

    /// URL of the prefetch whose result has not arrived yet.
    pub fn prefetch_pending(&self) -> Option<&str> {
        self.prefetch_pending.as_deref()
    }

    /// Whether any transfer, current or stale, still has to be polled.
    pub fn has_inflight(&self) -> bool {
        !self.inflight.is_empty()
    }

    /// Resolve `url` from the cache or start a network request.
    ///
    /// The hash fragment is stripped first. POST requests always go to the
    /// network.
    pub fn load(
        &mut self,
        url: &str,
        kind: RequestKind,
        rq: &RequestState,
        cache: &mut PageCache,
    ) -> LoadStart {
        let url = strip_hash(url);

        if kind == RequestKind::Normal && !rq.is_post() {
            if let Some(handle) = self.handles.iter_mut().find(|h| {
                h.info.kind == RequestKind::Prefetch && h.info.url == url
            }) {
                debug!(url, "Promoting in-flight prefetch");
                handle.info.kind = RequestKind::Normal;
                return LoadStart::Joined(handle.info.id);
            }
        }

        if !rq.is_post() {
            if let Some(page) = cache.get(url) {
                debug!(url, "Cache hit");
                self.prefetch_pending = None;
                return LoadStart::Cached(page);
            }
        }

        let request = match (rq.is_post(), rq.data()) {
            (true, data) => PageRequest::post(url, data.unwrap_or_default()),
            (false, _) => PageRequest::get(url),
        };
        LoadStart::Started(self.start(request, kind))
    }

    fn start(&mut self, request: PageRequest, kind: RequestKind) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let url = request.url.clone();
        info!(id, url = %url, ?kind, method = ?request.method, "Fetching page");

        let (abort, registration) = AbortHandle::new_pair();
        let transport = Arc::clone(&self.transport);
        let outcome_url = url.clone();
        let fut = Abortable::new(
            async move { transport.send(request).await },
            registration,
        )
        .map(move |result| FetchOutcome {
            id,
            url: outcome_url,
            kind,
            result,
        });
        self.inflight.push(fut.boxed_local());

        if kind == RequestKind::Prefetch {
            self.prefetch_pending = Some(url.clone());
        }
        self.handles.push(XhrHandle {
            info: XhrInfo { id, kind, url },
            abort,
        });
        id
    }

    /// Abort every live transfer. Safe to call when idle.
    pub fn abort(&mut self) {
        for handle in self.handles.drain(..) {
            debug!(id = handle.info.id, url = %handle.info.url, "Aborting request");
            handle.abort.abort();
        }
        self.prefetch_pending = None;
    }

    /// Wait for the next transfer to finish.
    ///
    /// Never resolves while nothing is in flight.
    pub async fn next_outcome(&mut self) -> FetchOutcome {
        match self.inflight.next().await {
            Some(outcome) => outcome,
            None => futures::future::pending().await,
        }
    }

    /// Classify a finished transfer and update the cache.
    pub fn complete(&mut self, outcome: FetchOutcome, cache: &mut PageCache) -> Completion {
        let FetchOutcome {
            id,
            url,
            kind,
            result,
        } = outcome;

        let kind = match self.handles.iter().position(|h| h.info.id == id) {
            Some(i) => self.handles.remove(i).info.kind,
            None => kind,
        };
        if self.prefetch_pending.as_deref() == Some(url.as_str()) {
            self.prefetch_pending = None;
        }

        let response = match result {
            Err(Aborted) => {
                debug!(id, url = %url, "Request aborted");
                return Completion::Aborted;
            }
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "Page request failed");
                cache.put(&url, Rc::new(Page::parse("")));
                return Completion::Loaded {
                    id,
                    url,
                    kind,
                    error: Some(NavError::Transport(e)),
                };
            }
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            warn!(url = %url, status = response.status, "Page request returned error status");
            cache.put(&url, Rc::new(Page::parse(&response.body)));
            let error = NavError::Status {
                url: url.clone(),
                status: response.status,
            };
            return Completion::Loaded {
                id,
                url,
                kind,
                error: Some(error),
            };
        }

        if response.body.trim().is_empty() || !response.is_html() {
            let error = NavError::NotHtml {
                url: url.clone(),
                content_type: response.content_type,
            };
            return match kind {
                RequestKind::Normal => {
                    info!(url = %url, "Not a page, falling back to full navigation");
                    Completion::Escape { url, error }
                }
                RequestKind::Prefetch => {
                    debug!(url = %url, "Dropping non-HTML prefetch");
                    Completion::Dropped { url }
                }
            };
        }

        cache.put(&url, Rc::new(Page::parse(&response.body)));
        Completion::Loaded {
            id,
            url,
            kind,
            error: None,
        }
    }
}

/// URL without its fragment.
pub fn strip_hash(url: &str) -> &str {
    url.split_once('#').map_or(url, |(base, _)| base)
}
