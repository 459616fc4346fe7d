//! Input and lifecycle events
//!
//! Hosts translate their UI events into [`NavEvent`]s and feed them to the
//! controller. The controller reports progress as [`LifecycleEvent`]s.

use std::fmt::Write as _;

use scraper::{Html, Selector};
use url::Url;

use crate::error::NavError;
use crate::form::FormSubmit;

/// Keyboard modifiers held during a click.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub meta: bool,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub fn any(self) -> bool {
        self.meta || self.ctrl || self.shift || self.alt
    }
}

/// Activation of a link-like element (click, hover intent, touch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    /// Target URL. Relative hrefs are resolved against the current location
    /// when that location is absolute.
    pub href: String,
    /// Tag name of the trigger element.
    pub tag: String,
    /// Attributes of the trigger element.
    pub attrs: Vec<(String, String)>,
    /// Mouse button, `1` = primary.
    pub button: u8,
    pub modifiers: Modifiers,
    /// Ids of the elements enclosing the trigger, innermost first.
    pub ancestors: Vec<String>,
}

impl LinkEvent {
    /// Primary-button activation of `<a href="{href}">`.
    pub fn new(href: impl Into<String>) -> Self {
        let href = href.into();
        Self {
            attrs: vec![("href".to_string(), href.clone())],
            href,
            tag: "a".to_string(),
            button: 1,
            modifiers: Modifiers::default(),
            ancestors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.retain(|(n, _)| n != name);
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_button(mut self, button: u8) -> Self {
        self.button = button;
        self
    }

    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Declare the trigger as nested in the element with `id`.
    #[must_use]
    pub fn inside(mut self, id: &str) -> Self {
        self.ancestors.push(id.to_string());
        self
    }

    /// The same activation with `href` joined onto `base`.
    ///
    /// Left unchanged when `base` is not an absolute URL.
    #[must_use]
    pub fn resolved_against(mut self, base: &str) -> Self {
        if let Ok(joined) = Url::parse(base).and_then(|base| base.join(&self.href)) {
            self.href = joined.to_string();
        }
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn target(&self) -> Option<&str> {
        self.attr("target")
    }

    /// Fragment part of the href including `#`, if non-empty.
    pub fn hash(&self) -> Option<&str> {
        let idx = self.href.find('#')?;
        let hash = &self.href[idx..];
        (hash.len() > 1).then_some(hash)
    }

    pub fn is_inside(&self, id: &str) -> bool {
        self.ancestors.iter().any(|a| a == id)
    }

    /// Whether the trigger element matches a CSS selector.
    ///
    /// Only the element itself is considered; combinators that reach into
    /// ancestors never match.
    pub fn matches(&self, selector: &Selector) -> bool {
        let mut markup = format!("<{}", self.tag);
        for (name, value) in &self.attrs {
            let _ = write!(markup, " {}=\"{}\"", name, escape_attr(value));
        }
        let _ = write!(markup, "></{}>", self.tag);

        let fragment = Html::parse_fragment(&markup);
        fragment.select(selector).next().is_some()
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

/// The event that started the pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    Link(LinkEvent),
    /// Back/forward navigation carrying the history state URL.
    Pop(Option<String>),
}

impl TriggerEvent {
    pub fn href(&self) -> Option<&str> {
        match self {
            Self::Link(link) => Some(link.href.as_str()),
            Self::Pop(url) => url.as_deref(),
        }
    }
}

/// Input accepted by the navigation controller.
#[derive(Debug, Clone)]
pub enum NavEvent {
    Click(LinkEvent),
    /// Hover intent over a link: prefetch candidate.
    Hover(LinkEvent),
    /// Touch start on a link: prefetch candidate.
    Touch(LinkEvent),
    /// Browser back/forward with the URL from the history state.
    PopState { url: Option<String> },
    Submit(FormSubmit),
    /// Programmatic page change.
    Navigate(String),
}

/// What the host should do with the original UI event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Not handled by the engine; default browser behavior applies.
    Ignored,
    /// Handled partially; default browser behavior must still run.
    Default,
    /// Default behavior suppressed; the engine took over.
    Handled,
    /// Refused by the admission policy.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    Request,
    BeforeLoad,
    Load,
    Render,
    Submit,
    Error,
}

impl LifecycleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::BeforeLoad => "beforeload",
            Self::Load => "load",
            Self::Render => "render",
            Self::Submit => "submit",
            Self::Error => "error",
        }
    }
}

/// Lifecycle notification broadcast to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub url: String,
    pub error: Option<NavError>,
}
