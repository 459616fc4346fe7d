//! Navigation controller
//!
//! [`Pronto`] owns a [`NavigationSession`] and drives the whole page-swap
//! lifecycle:
//!
//! ```text
//! click ─▶ validate ─▶ request ─▶ fetch ─▶ render ─(delay)─▶ do_render
//!                        │                                     │
//!                   "request"                      "load" … "render" + callback
//! ```
//!
//! Input events are dispatched synchronously; fetch completions and the
//! render debounce timer are driven by [`Pronto::run`] or [`Pronto::settle`].
//! The controller is single-threaded and not `Send`.

use std::collections::HashMap;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use scraper::Selector;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, Sleep};
use tracing::{debug, info, instrument, warn};

use crate::cache::PageCache;
use crate::config::Settings;
use crate::delta::{DeltaLoader, ScriptRunner};
use crate::dom::Document;
use crate::error::{InitError, NavError};
use crate::event::{Dispatch, LifecycleEvent, LifecycleKind, LinkEvent, NavEvent, TriggerEvent};
use crate::fetcher::{strip_hash, Completion, FetchOutcome, Fetcher, LoadStart, XhrInfo};
use crate::form::{Form, FormSubmit};
use crate::hints::Hints;
use crate::history::{History, HistoryAdapter};
use crate::http_client::Transport;
use crate::memory::Memory;
use crate::page::Page;
use crate::request::{admit, is_internal, Admission, RequestKind, RequestState, TransferState};
use crate::scroll::ScrollManager;

const EVENT_CAPACITY: usize = 64;

/// Coarse state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Idle,
    RequestPending,
    /// Page fetched, waiting for the render delay.
    Rendering,
}

/// Low-level page operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCommand {
    /// Load a URL into the cache.
    FetchByUrl(String),
    /// Speculatively load a URL into the cache.
    Prefetch(String),
    /// Swap the current cached page into the document.
    LoadIntoDom,
    Abort,
    GetState,
    GetXhr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Started(u64),
    Cached,
    Skipped,
    /// Canonical URL of the page just loaded, when enabled and present.
    Canonical(Option<String>),
    Aborted,
    State(TransferState),
    Xhr(Option<XhrInfo>),
}

/// What happens when a transfer finishes.
#[derive(Debug, Clone)]
enum Continuation {
    Render,
    Preview(LinkEvent),
}

enum Step {
    Input(NavEvent),
    Closed,
    Fetched(FetchOutcome),
    Render,
}

/// All state of one engine instance that outlives a single navigation.
#[derive(Debug)]
pub struct NavigationSession {
    pub rq: RequestState,
    pub cache: PageCache,
    pub delta: DeltaLoader,
    pub scroll: ScrollManager,
    /// Number of page swaps so far; 0 until the first render.
    pub pass: u64,
    /// Forms taken over in the latest pass.
    pub forms: Vec<Form>,
    pub last_error: Option<NavError>,
    target: Option<Rc<Page>>,
}

impl NavigationSession {
    pub fn new(settings: &Settings) -> Self {
        Self {
            rq: RequestState::new(),
            cache: PageCache::new(Memory::new(&settings.memoryoff)),
            delta: DeltaLoader::new(settings),
            scroll: ScrollManager::new(settings.scrolltop),
            pass: 0,
            forms: Vec::new(),
            last_error: None,
            target: None,
        }
    }
}

type CompletionCallback = Box<dyn FnMut(Option<&NavError>)>;

/// Ajax page-transition engine bound to one document and history.
pub struct Pronto<D: Document, H: History> {
    settings: Settings,
    root: String,
    selector: Selector,
    forms_selector: Option<Selector>,
    prefetch_hints: Hints,
    preview_hints: Hints,
    excluded: Hints,
    session: NavigationSession,
    fetcher: Fetcher,
    document: D,
    history: HistoryAdapter<H>,
    runner: Option<Box<dyn ScriptRunner>>,
    events: broadcast::Sender<LifecycleEvent>,
    callback: Option<CompletionCallback>,
    continuations: HashMap<u64, Continuation>,
    render_timer: Option<Pin<Box<Sleep>>>,
}

impl<D: Document, H: History> Pronto<D, H> {
    /// Attach the engine to a document.
    ///
    /// Records the initial history state, takes over forms in the whole body
    /// and registers the resources the document already loads.
    pub fn new(
        settings: Settings,
        transport: Arc<dyn Transport>,
        document: D,
        history: H,
    ) -> Result<Self, InitError> {
        if !settings.pluginon {
            return Err(InitError::Disabled);
        }
        if !history.supported() {
            return Err(InitError::NoHistory);
        }

        let selector = parse_selector(&settings.selector)?;
        let forms_selector = settings.forms_selector().map(parse_selector).transpose()?;
        let history = HistoryAdapter::new(history);
        let root = settings
            .root_url
            .clone()
            .unwrap_or_else(|| root_url(history.current_url()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let mut pronto = Self {
            prefetch_hints: Hints::from_toggle(&settings.prefetchoff),
            preview_hints: Hints::from_toggle(&settings.previewoff),
            excluded: Hints::new(&settings.excluded_paths),
            session: NavigationSession::new(&settings),
            fetcher: Fetcher::new(transport),
            settings,
            root,
            selector,
            forms_selector,
            document,
            history,
            runner: None,
            events,
            callback: None,
            continuations: HashMap::new(),
            render_timer: None,
        };
        pronto.attach();
        Ok(pronto)
    }

    fn attach(&mut self) {
        let location = self.history.current_url().to_string();
        self.history.replace(&location);

        let body = self.document.body_html();
        self.ajaxify_forms(&body);
        self.session.delta.init_from(&self.document.resources());

        info!(
            root = %self.root,
            containers = ?self.settings.containers,
            "Pronto attached"
        );
    }

    /// Evaluate inline scripts through `runner` instead of skipping them.
    #[must_use]
    pub fn with_script_runner(mut self, runner: impl ScriptRunner + 'static) -> Self {
        self.runner = Some(Box::new(runner));
        self
    }

    /// Called after every render with the error of the last request, if any.
    pub fn on_complete(&mut self, callback: impl FnMut(Option<&NavError>) + 'static) {
        self.callback = Some(Box::new(callback));
    }

    /// Receive lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn history(&self) -> &H {
        self.history.inner()
    }

    pub fn history_mut(&mut self) -> &mut H {
        self.history.inner_mut()
    }

    pub fn session(&self) -> &NavigationSession {
        &self.session
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn current_url(&self) -> &str {
        self.history.current_url()
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn state(&self) -> NavState {
        if self.render_timer.is_some() {
            NavState::Rendering
        } else if self.fetcher.state() == TransferState::Busy(RequestKind::Normal) {
            NavState::RequestPending
        } else {
            NavState::Idle
        }
    }

    /// Whether nothing is in flight and no render is scheduled.
    pub fn is_settled(&self) -> bool {
        !self.fetcher.has_inflight() && self.render_timer.is_none()
    }

    /// A scheduled render counts as a busy normal request.
    fn transfer_state(&self) -> TransferState {
        if self.render_timer.is_some() {
            TransferState::Busy(RequestKind::Normal)
        } else {
            self.fetcher.state()
        }
    }

    fn emit(&self, kind: LifecycleKind, url: &str, error: Option<NavError>) {
        debug!(event = kind.as_str(), url, "Lifecycle event");
        // No subscribers is fine
        let _ = self.events.send(LifecycleEvent {
            kind,
            url: url.to_string(),
            error,
        });
    }

    /// Handle one input event.
    #[instrument(skip(self), level = "debug")]
    pub fn dispatch(&mut self, event: NavEvent) -> Dispatch {
        match event {
            NavEvent::Click(link) => self.click(link, false),
            NavEvent::Hover(link) | NavEvent::Touch(link) => self.prefetch(link),
            NavEvent::PopState { url } => self.pop_state(url),
            NavEvent::Submit(submit) => self.submit(submit),
            NavEvent::Navigate(url) => self.navigate(&url),
        }
    }

    fn click(&mut self, link: LinkEvent, not_push: bool) -> Dispatch {
        if !link.matches(&self.selector) {
            return Dispatch::Ignored;
        }
        let current = self.history.current_url().to_string();
        let link = link.resolved_against(&current);

        // The pending request only changes once the click is taken over
        let mut rq = self.session.rq.clone();
        let Some(href) = rq.validate(TriggerEvent::Link(link.clone()), &self.root) else {
            return Dispatch::Ignored;
        };
        if self.is_exotic(&link, &href) {
            return Dispatch::Ignored;
        }
        if href.ends_with('#') {
            return Dispatch::Default;
        }
        if link.hash().is_some() && strip_hash(&href) == strip_hash(&current) {
            debug!(href = %href, "Hash change only");
            self.history.replace(&href);
            return Dispatch::Default;
        }

        self.session.rq = rq;
        self.session.scroll.record(&current, &self.document);
        let same = self.session.rq.is_same(&current, false);
        if same {
            self.history.replace(&current);
        }
        if self.settings.refresh || !same {
            self.request(not_push);
        } else if self.transfer_state() == TransferState::Busy(RequestKind::Normal) {
            debug!(href = %href, "Staying on the current page");
            self.abort();
        }
        Dispatch::Handled
    }

    /// Modified clicks, new windows and admin areas are left to the host.
    fn is_exotic(&self, link: &LinkEvent, href: &str) -> bool {
        link.button > 1
            || link.modifiers.any()
            || link.target() == Some("_blank")
            || self.excluded.matches_any(href)
    }

    fn prefetch(&mut self, link: LinkEvent) -> Dispatch {
        if self.settings.prefetchoff.is_true() || !link.matches(&self.selector) {
            return Dispatch::Ignored;
        }
        if !admit(self.transfer_state(), RequestKind::Prefetch).allows() {
            debug!(href = %link.href, "Prefetch rejected, request in flight");
            return Dispatch::Rejected;
        }
        let current = self.history.current_url().to_string();
        let link = link.resolved_against(&current);

        // Prefetches never touch the pending request
        let mut rq = self.session.rq.clone();
        let Some(href) = rq.validate(TriggerEvent::Link(link.clone()), &self.root) else {
            return Dispatch::Ignored;
        };
        if rq.is_same(&current, true) || self.prefetch_hints.matches_any(&href) {
            return Dispatch::Ignored;
        }

        match self
            .fetcher
            .load(&href, RequestKind::Prefetch, &rq, &mut self.session.cache)
        {
            LoadStart::Cached(_) => self.preview(link),
            LoadStart::Started(id) | LoadStart::Joined(id) => {
                self.continuations.insert(id, Continuation::Preview(link));
            }
        }
        Dispatch::Default
    }

    /// Render a prefetched page without pushing history, if allowed.
    fn preview(&mut self, link: LinkEvent) {
        if self.settings.previewoff.is_true() {
            return;
        }
        let inside = self
            .settings
            .containers
            .iter()
            .any(|id| link.is_inside(id));
        if inside && !self.preview_hints.matches_any(&link.href) {
            debug!(href = %link.href, "Previewing prefetched page");
            self.click(link, true);
        }
    }

    fn pop_state(&mut self, url: Option<String>) -> Dispatch {
        let current = self.history.current_url().to_string();
        self.session.scroll.record(&current, &self.document);

        let Some(url) = url.filter(|u| *u != current) else {
            return Dispatch::Ignored;
        };
        self.session.rq.init();
        self.session.rq.set_event(TriggerEvent::Pop(Some(url.clone())));
        self.session.rq.set_push(false);
        self.emit(LifecycleKind::Request, &url, None);
        self.fetch(&url);
        Dispatch::Handled
    }

    fn submit(&mut self, submit: FormSubmit) -> Dispatch {
        let eligible = self
            .forms_selector
            .as_ref()
            .is_some_and(|selector| submit.form.matches(selector));
        if !eligible {
            return Dispatch::Ignored;
        }
        if !self.session.forms.iter().any(|f| f.is_same_element(&submit.form)) {
            debug!(action = %submit.form.action, "Form not taken over in this pass");
            return Dispatch::Ignored;
        }

        let action = if submit.form.action.is_empty() {
            self.history.current_url().to_string()
        } else {
            submit.form.action.clone()
        };
        if !is_internal(&action, &self.root) {
            return Dispatch::Ignored;
        }

        self.session.rq.init();
        let href = if submit.form.is_post() {
            self.session.rq.set_post(true);
            self.session.rq.set_data(submit.serialize());
            action
        } else {
            submit.query_url(&action)
        };

        info!(href = %href, post = self.session.rq.is_post(), "Form submitted");
        self.emit(LifecycleKind::Submit, &href, None);
        self.session.rq.set_href_hard(&href);
        self.request(false);
        Dispatch::Handled
    }

    /// Programmatic page change; the history entry is replaced.
    pub fn navigate(&mut self, url: &str) -> Dispatch {
        if !url.contains('/') {
            return Dispatch::Ignored;
        }
        self.session.rq.init();
        self.session.rq.set_href_hard(url);
        self.request(true);
        Dispatch::Handled
    }

    fn request(&mut self, not_push: bool) {
        self.session.rq.commit_last();
        if not_push {
            self.session.rq.set_push(false);
        }
        let href = self.session.rq.href().to_string();
        self.emit(LifecycleKind::Request, &href, None);
        self.fetch(&href);
    }

    /// Admit and start a normal fetch whose completion renders.
    fn fetch(&mut self, href: &str) {
        match admit(self.transfer_state(), RequestKind::Normal) {
            Admission::AbortThenProceed => self.abort(),
            Admission::Reject => return,
            Admission::Proceed | Admission::ProceedWithoutAbort => {}
        }

        match self.fetcher.load(
            href,
            RequestKind::Normal,
            &self.session.rq,
            &mut self.session.cache,
        ) {
            LoadStart::Cached(page) => {
                self.session.last_error = None;
                self.session.target = Some(page);
                self.render();
            }
            LoadStart::Started(id) | LoadStart::Joined(id) => {
                self.continuations.insert(id, Continuation::Render);
            }
        }
    }

    fn abort(&mut self) {
        self.fetcher.abort();
        self.continuations.clear();
        self.render_timer = None;
    }

    fn handle_outcome(&mut self, outcome: FetchOutcome) {
        let continuation = self.continuations.remove(&outcome.id);
        match self.fetcher.complete(outcome, &mut self.session.cache) {
            Completion::Aborted | Completion::Dropped { .. } => {}
            Completion::Escape { url, error } => {
                self.session.last_error = Some(error);
                self.history.assign(&url);
            }
            Completion::Loaded { url, error, .. } => match continuation {
                Some(Continuation::Render) => {
                    if let Some(e) = &error {
                        warn!(url = %url, error = %e, "Error in request");
                        self.emit(LifecycleKind::Error, &url, Some(e.clone()));
                    }
                    self.session.last_error = error;
                    self.session.target = self.session.cache.current();
                    self.render();
                }
                Some(Continuation::Preview(link)) if error.is_none() => self.preview(link),
                Some(Continuation::Preview(_)) | None => {}
            },
        }
    }

    fn render(&mut self) {
        let href = self.session.rq.href().to_string();
        self.emit(LifecycleKind::BeforeLoad, &href, None);
        if self.settings.request_delay > 0 {
            let delay = Duration::from_millis(self.settings.request_delay);
            self.render_timer = Some(Box::pin(sleep(delay)));
        } else {
            self.do_render();
        }
    }

    fn do_render(&mut self) {
        self.render_timer = None;
        let href = self.session.rq.href().to_string();
        let Some(page) = self
            .session
            .target
            .take()
            .or_else(|| self.session.cache.current())
        else {
            warn!(href = %href, "Nothing to render");
            return;
        };

        self.emit(LifecycleKind::Load, &href, None);
        if self.settings.body_classes {
            self.document.set_body_classes(page.body_classes().as_deref());
        }

        let canonical = self.load_into_dom(&page);
        self.session.rq.set_canonical(canonical);
        let url = self.session.rq.canonical_or(&href).to_string();

        let containers: String = self
            .settings
            .containers
            .iter()
            .filter_map(|id| self.document.element(id))
            .map(|el| el.inner_html)
            .collect();
        self.ajaxify_forms(&containers);

        if self.session.rq.push() {
            self.history.push(&url);
        } else {
            self.history.replace(&url);
        }
        if let Some(title) = page.title() {
            self.document.set_title(&title);
        }

        self.session.scroll.apply(&url, &mut self.document);
        self.document.track_page_view(&analytics_path(&url, &self.root));
        if let Some(id) = &self.settings.pass_count {
            self.document.set_inner_html(id, &format!("Pass: {}", self.session.pass));
        }

        info!(url = %url, pass = self.session.pass, "Page rendered");
        self.emit(LifecycleKind::Render, &url, None);
        if let Some(callback) = self.callback.as_mut() {
            callback(self.session.last_error.as_ref());
        }
    }

    /// Swap containers, then scripts, then styles. Returns the canonical URL
    /// when enabled.
    fn load_into_dom(&mut self, page: &Page) -> Option<String> {
        self.session.pass += 1;

        for id in &self.settings.containers {
            match (page.element_by_id(id), self.document.element(id)) {
                (Some(fresh), _) => self.document.replace_element(id, fresh.without_scripts()),
                (None, Some(live)) => {
                    warn!(id = %id, "Inserting placeholder");
                    self.document.insert_placeholder(id, &live.tag);
                }
                (None, None) => debug!(id = %id, "Container missing on both pages"),
            }
        }

        let resources = page.resources();
        self.session.delta.clear_inline(&mut self.document);
        if let Some(runner) = self.runner.as_mut() {
            runner.enter_page(self.session.rq.href());
        }
        self.session
            .delta
            .apply_scripts(&resources, &mut self.document, self.runner.as_deref_mut());
        self.session.delta.apply_styles(&resources, &mut self.document);

        if self.settings.canonical {
            resources.canonical
        } else {
            None
        }
    }

    fn ajaxify_forms(&mut self, html: &str) {
        let Some(selector) = self.settings.forms_selector() else {
            return;
        };
        match Form::parse_all(html, selector) {
            Ok(forms) => {
                let root = &self.root;
                self.session.forms = forms
                    .into_iter()
                    .filter(|f| f.action.is_empty() || is_internal(&f.action, root))
                    .collect();
                debug!(count = self.session.forms.len(), "Forms ajaxified");
            }
            Err(e) => warn!(error = %e, "Cannot select forms"),
        }
    }

    /// Execute a low-level page command.
    pub fn command(&mut self, command: PageCommand) -> CommandReply {
        match command {
            PageCommand::FetchByUrl(url) => {
                match self.fetcher.load(
                    &url,
                    RequestKind::Normal,
                    &self.session.rq,
                    &mut self.session.cache,
                ) {
                    LoadStart::Cached(_) => CommandReply::Cached,
                    LoadStart::Started(id) | LoadStart::Joined(id) => {
                        self.continuations.remove(&id);
                        CommandReply::Started(id)
                    }
                }
            }
            PageCommand::Prefetch(url) => {
                if self.fetcher.prefetch_pending() == Some(strip_hash(&url)) {
                    return CommandReply::Skipped;
                }
                match self.fetcher.load(
                    &url,
                    RequestKind::Prefetch,
                    &self.session.rq,
                    &mut self.session.cache,
                ) {
                    LoadStart::Cached(_) => CommandReply::Cached,
                    LoadStart::Started(id) | LoadStart::Joined(id) => CommandReply::Started(id),
                }
            }
            PageCommand::LoadIntoDom => match self.session.cache.current() {
                Some(page) => CommandReply::Canonical(self.load_into_dom(&page)),
                None => CommandReply::Skipped,
            },
            PageCommand::Abort => {
                self.abort();
                CommandReply::Aborted
            }
            PageCommand::GetState => CommandReply::State(self.fetcher.state()),
            PageCommand::GetXhr => CommandReply::Xhr(self.fetcher.xhr()),
        }
    }

    fn step(&mut self, step: Step) -> bool {
        match step {
            Step::Input(event) => {
                self.dispatch(event);
            }
            Step::Closed => return false,
            Step::Fetched(outcome) => self.handle_outcome(outcome),
            Step::Render => self.do_render(),
        }
        true
    }

    /// Process input events until the channel closes and all work is done.
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<NavEvent>) {
        let mut open = true;
        loop {
            if !open && self.is_settled() {
                break;
            }
            let step = tokio::select! {
                event = events.recv(), if open => event.map_or(Step::Closed, Step::Input),
                outcome = self.fetcher.next_outcome() => Step::Fetched(outcome),
                () = render_due(&mut self.render_timer) => Step::Render,
            };
            if !self.step(step) {
                debug!("Input closed, draining");
                open = false;
            }
        }
    }

    /// Drive in-flight fetches and scheduled renders to completion.
    pub async fn settle(&mut self) {
        while !self.is_settled() {
            let step = tokio::select! {
                outcome = self.fetcher.next_outcome() => Step::Fetched(outcome),
                () = render_due(&mut self.render_timer) => Step::Render,
            };
            self.step(step);
        }
    }
}

async fn render_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => std::future::pending().await,
    }
}

fn parse_selector(selector: &str) -> Result<Selector, InitError> {
    Selector::parse(selector).map_err(|_| InitError::InvalidSelector(selector.to_string()))
}

/// `scheme://host[:port]/` of an absolute URL, `/` otherwise.
pub fn root_url(location: &str) -> String {
    url::Url::parse(location)
        .ok()
        .filter(|u| u.has_host())
        .map_or_else(
            || "/".to_string(),
            |u| format!("{}/", u.origin().ascii_serialization()),
        )
}

/// Path reported to analytics: the URL relative to the root, with one
/// leading slash.
pub fn analytics_path(url: &str, root: &str) -> String {
    let relative = url.strip_prefix(root).unwrap_or(url);
    format!("/{}", relative.trim_start_matches('/'))
}
