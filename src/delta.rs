//! Delta loading of scripts, stylesheets and style blocks
//!
//! After a page swap only the external resources the live document has not
//! seen yet are inserted. Resources that disappear from later pages are kept:
//! nothing is ever purged. Inline scripts are filtered by an inclusion policy
//! and either appended to the body (tagged for removal on the next pass) or
//! handed to a [`ScriptRunner`].

use tracing::{debug, warn};

use crate::config::{DeltaMode, Settings};
use crate::dom::Document;
use crate::hints::Hints;
use crate::page::{LinkTag, Resources, ScriptTag};

/// Inline scripts containing this are the engine's own bootstrap.
const BOOTSTRAP_MARKER: &str = ").ajaxify(";

/// Evaluates inline script text in the page's global scope.
pub trait ScriptRunner {
    /// Run `source`; errors are reported, never fatal.
    fn run(&mut self, source: &str) -> anyhow::Result<()>;

    /// Called with the new URL before a page's scripts run.
    fn enter_page(&mut self, _href: &str) {}
}

/// URLs of external resources known to be loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptRegistry {
    stylesheets: Vec<String>,
    scripts: Vec<String>,
}

impl ScriptRegistry {
    fn set(&mut self, kind: ResourceKind) -> &mut Vec<String> {
        match kind {
            ResourceKind::Stylesheet => &mut self.stylesheets,
            ResourceKind::Script => &mut self.scripts,
        }
    }

    /// Track `url`; returns `false` if it was already tracked.
    fn track(&mut self, kind: ResourceKind, url: &str) -> bool {
        let set = self.set(kind);
        if set.iter().any(|u| u == url) {
            return false;
        }
        set.push(url.to_string());
        true
    }

    pub fn stylesheets(&self) -> &[String] {
        &self.stylesheets
    }

    pub fn scripts(&self) -> &[String] {
        &self.scripts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    Stylesheet,
    Script,
}

/// What to do with one inline script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineAction {
    Skip,
    Append,
    Eval,
}

/// Inclusion and execution policy for inline scripts.
#[derive(Debug, Clone)]
pub struct InlinePolicy {
    inline: bool,
    skip: Hints,
    hints: Hints,
    append: bool,
}

impl InlinePolicy {
    pub fn new(settings: &Settings) -> Self {
        Self {
            inline: settings.inline,
            skip: Hints::from_toggle(&settings.inlineskip),
            hints: Hints::from_toggle(&settings.inlinehints),
            append: settings.inlineappend,
        }
    }

    pub fn decide(&self, script: &ScriptTag) -> InlineAction {
        let text = script.text.as_str();
        if text.contains(BOOTSTRAP_MARKER) {
            return InlineAction::Skip;
        }

        let included = (self.inline && !self.skip.matches_any(text))
            || script.has_class("ajaxy")
            || self.hints.matches_any(text);
        if !included || text.is_empty() {
            return InlineAction::Skip;
        }

        let foreign_type = script
            .attr("type")
            .is_some_and(|t| !t.is_empty() && !t.contains("text/javascript"));
        if self.append || foreign_type {
            InlineAction::Append
        } else {
            InlineAction::Eval
        }
    }
}

/// Reconciles page resources against the live document.
#[derive(Debug, Clone)]
pub struct DeltaLoader {
    mode: DeltaMode,
    asyncdef: bool,
    always: Hints,
    style: bool,
    inline: InlinePolicy,
    registry: ScriptRegistry,
}

impl DeltaLoader {
    pub fn new(settings: &Settings) -> Self {
        Self {
            mode: settings.deltas,
            asyncdef: settings.asyncdef,
            always: Hints::from_toggle(&settings.alwayshints),
            style: settings.style,
            inline: InlinePolicy::new(settings),
            registry: ScriptRegistry::default(),
        }
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    /// First pass: remember what the live document already loads.
    pub fn init_from(&mut self, live: &Resources) {
        for href in live.stylesheets.iter().filter_map(LinkTag::href) {
            self.registry.track(ResourceKind::Stylesheet, href);
        }
        for src in live.scripts.iter().filter_map(ScriptTag::src) {
            self.registry.track(ResourceKind::Script, src);
        }
        debug!(
            stylesheets = self.registry.stylesheets.len(),
            scripts = self.registry.scripts.len(),
            "Resource registry initialised"
        );
    }

    /// Remove inline scripts injected by the previous pass.
    pub fn clear_inline<D: Document + ?Sized>(&self, doc: &mut D) {
        doc.remove_inline_scripts();
    }

    /// Stylesheets, then external and inline scripts, of a new page.
    pub fn apply_scripts<D: Document + ?Sized>(
        &mut self,
        page: &Resources,
        doc: &mut D,
        runner: Option<&mut (dyn ScriptRunner + '_)>,
    ) {
        if self.mode == DeltaMode::Off {
            return;
        }

        for link in &page.stylesheets {
            let Some(href) = link.href() else { continue };
            if self.mode == DeltaMode::All {
                doc.append_stylesheet(href);
            } else if link.attr("data-class") == Some("always") || self.always.matches_any(href) {
                doc.remove_stylesheet(href);
                doc.append_stylesheet(href);
            } else if self.registry.track(ResourceKind::Stylesheet, href) {
                debug!(href, "Inserting stylesheet");
                doc.append_stylesheet(href);
            }
        }

        let mut runner = runner;
        for script in &page.scripts {
            let Some(src) = script.src() else {
                self.inline_script(script, doc, runner.as_deref_mut());
                continue;
            };
            let is_async = self.asyncdef || script.attr("async").is_some();
            if self.mode == DeltaMode::All {
                doc.append_script(script, is_async);
            } else if script.attr("data-class") == Some("always") || self.always.matches_any(src)
            {
                debug!(src, "Reloading script");
                doc.remove_script(src);
                doc.append_script(script, is_async);
            } else if self.registry.track(ResourceKind::Script, src) {
                debug!(src, "Inserting script");
                doc.append_script(script, is_async);
            }
        }
    }

    fn inline_script<D: Document + ?Sized>(
        &self,
        script: &ScriptTag,
        doc: &mut D,
        runner: Option<&mut (dyn ScriptRunner + '_)>,
    ) {
        match self.inline.decide(script) {
            InlineAction::Skip => {}
            InlineAction::Append => doc.append_inline_script(script),
            InlineAction::Eval => match runner {
                Some(runner) => {
                    if let Err(e) = runner.run(&script.text) {
                        warn!(error = %e, "Error in inline script");
                    }
                }
                None => debug!("No script runner, inline script skipped"),
            },
        }
    }

    /// Replace all head style blocks with the new page's.
    pub fn apply_styles<D: Document + ?Sized>(&self, page: &Resources, doc: &mut D) {
        if !self.style {
            return;
        }
        doc.remove_styles();
        for css in &page.styles {
            doc.append_style(css);
        }
    }
}
