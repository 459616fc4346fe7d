//! Live document seam
//!
//! The controller never touches a real DOM. Hosts implement [`Document`] over
//! whatever they render into; [`VirtualDocument`] is the in-memory
//! implementation used by the CLI and the tests. It records every mutation so
//! callers can observe exactly what a page swap changed.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::page::{ElementData, LinkTag, Resources, ScriptTag, INLINE_CLASS};

/// Operations the engine needs from the live document.
pub trait Document {
    /// Element with the given id.
    fn element(&self, id: &str) -> Option<ElementData>;

    /// Replace attributes and content of the element with `id`.
    fn replace_element(&mut self, id: &str, element: ElementData);

    /// Replace the element with an empty `<tag id="id">`.
    fn insert_placeholder(&mut self, id: &str, tag: &str);

    fn title(&self) -> Option<String>;
    fn set_title(&mut self, title: &str);

    fn body_classes(&self) -> Option<String>;
    fn set_body_classes(&mut self, classes: Option<&str>);

    /// Markup of the whole body, used to discover forms at startup.
    fn body_html(&self) -> String;

    /// Stylesheets, scripts and style blocks currently loaded.
    fn resources(&self) -> Resources;

    fn append_stylesheet(&mut self, href: &str);
    /// Remove stylesheet links whose href contains `href`.
    fn remove_stylesheet(&mut self, href: &str);
    fn append_script(&mut self, script: &ScriptTag, is_async: bool);
    /// Remove script elements whose src contains `src`.
    fn remove_script(&mut self, src: &str);

    /// Append an inline script to the body, tagged for later removal.
    fn append_inline_script(&mut self, script: &ScriptTag);
    /// Remove every tagged inline script from the body.
    fn remove_inline_scripts(&mut self);

    fn remove_styles(&mut self);
    fn append_style(&mut self, css: &str);

    fn scroll_top(&self) -> u32;
    fn scroll_to(&mut self, top: u32);
    /// Vertical offset of the element with `id`, `None` if absent.
    fn element_offset(&self, id: &str) -> Option<u32>;

    fn set_inner_html(&mut self, id: &str, html: &str);

    /// Analytics page view.
    fn track_page_view(&mut self, _path: &str) {}
}

/// A change applied to a [`VirtualDocument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    ReplaceElement(String),
    Placeholder(String),
    Title(String),
    BodyClasses(Option<String>),
    AppendStylesheet(String),
    RemoveStylesheet(String),
    AppendScript(String),
    RemoveScript(String),
    AppendInlineScript,
    RemoveInlineScripts(usize),
    RemoveStyles,
    AppendStyle,
    InnerHtml(String),
    Scroll(u32),
}

impl Mutation {
    /// Whether the mutation touched external or inline scripts.
    pub fn is_script(&self) -> bool {
        matches!(
            self,
            Self::AppendScript(_)
                | Self::RemoveScript(_)
                | Self::AppendInlineScript
                | Self::RemoveInlineScripts(_)
        )
    }
}

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static HEAD_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("head link").unwrap());
static HEAD_STYLE: Lazy<Selector> = Lazy::new(|| Selector::parse("head style").unwrap());
static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());
static WITH_ID: Lazy<Selector> = Lazy::new(|| Selector::parse("body [id]").unwrap());

/// In-memory document built from an HTML page.
#[derive(Debug, Clone, Default)]
pub struct VirtualDocument {
    title: Option<String>,
    body_classes: Option<String>,
    body_html: String,
    elements: Vec<(String, ElementData)>,
    stylesheets: Vec<LinkTag>,
    scripts: Vec<ScriptTag>,
    inline_scripts: Vec<ScriptTag>,
    styles: Vec<String>,
    scroll: u32,
    offsets: HashMap<String, u32>,
    page_views: Vec<String>,
    mutations: Vec<Mutation>,
}

impl VirtualDocument {
    /// Build a document from full page markup.
    pub fn parse(html: &str) -> Self {
        let doc = Html::parse_document(html);
        let body = doc.select(&BODY).next();

        let elements = doc
            .select(&WITH_ID)
            .filter_map(|el| {
                let id = el.value().attr("id")?.to_string();
                Some((id, element_data(el)))
            })
            .collect();

        let stylesheets = doc
            .select(&HEAD_LINK)
            .map(|el| LinkTag { attrs: attrs_of(el) })
            .filter(|l| l.rel_contains("stylesheet"))
            .collect();

        let scripts = doc
            .select(&SCRIPT)
            .map(|el| ScriptTag {
                attrs: attrs_of(el),
                text: el.text().collect(),
            })
            .collect();

        Self {
            title: doc.select(&TITLE).next().map(|t| t.inner_html()),
            body_classes: body.and_then(|b| b.value().attr("class").map(ToString::to_string)),
            body_html: body.map(|b| b.inner_html()).unwrap_or_default(),
            elements,
            stylesheets,
            scripts,
            styles: doc
                .select(&HEAD_STYLE)
                .map(|s| s.text().collect())
                .collect(),
            ..Self::default()
        }
    }

    /// Set the layout offset reported for an element.
    pub fn set_offset(&mut self, id: &str, top: u32) {
        self.offsets.insert(id.to_string(), top);
    }

    /// Inner markup of the element with `id`.
    pub fn element_html(&self, id: &str) -> Option<&str> {
        self.find(id).map(|e| e.inner_html.as_str())
    }

    pub fn stylesheets(&self) -> Vec<&str> {
        self.stylesheets.iter().filter_map(LinkTag::href).collect()
    }

    pub fn script_sources(&self) -> Vec<&str> {
        self.scripts.iter().filter_map(ScriptTag::src).collect()
    }

    pub fn inline_scripts(&self) -> &[ScriptTag] {
        &self.inline_scripts
    }

    pub fn styles(&self) -> &[String] {
        &self.styles
    }

    pub fn page_views(&self) -> &[String] {
        &self.page_views
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn clear_mutations(&mut self) {
        self.mutations.clear();
    }

    fn find(&self, id: &str) -> Option<&ElementData> {
        self.elements.iter().find(|(i, _)| i == id).map(|(_, e)| e)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut ElementData> {
        self.elements
            .iter_mut()
            .find(|(i, _)| i == id)
            .map(|(_, e)| e)
    }

    fn set(&mut self, id: &str, data: ElementData) {
        match self.find_mut(id) {
            Some(slot) => *slot = data,
            None => self.elements.push((id.to_string(), data)),
        }
    }
}

impl Document for VirtualDocument {
    fn element(&self, id: &str) -> Option<ElementData> {
        self.find(id).cloned()
    }

    fn replace_element(&mut self, id: &str, element: ElementData) {
        self.set(id, element);
        self.mutations.push(Mutation::ReplaceElement(id.to_string()));
    }

    fn insert_placeholder(&mut self, id: &str, tag: &str) {
        self.set(
            id,
            ElementData {
                tag: tag.to_string(),
                attrs: vec![("id".to_string(), id.to_string())],
                inner_html: String::new(),
            },
        );
        self.mutations.push(Mutation::Placeholder(id.to_string()));
    }

    fn title(&self) -> Option<String> {
        self.title.clone()
    }

    fn set_title(&mut self, title: &str) {
        self.title = Some(title.to_string());
        self.mutations.push(Mutation::Title(title.to_string()));
    }

    fn body_classes(&self) -> Option<String> {
        self.body_classes.clone()
    }

    fn set_body_classes(&mut self, classes: Option<&str>) {
        self.body_classes = classes.map(ToString::to_string);
        self.mutations.push(Mutation::BodyClasses(self.body_classes.clone()));
    }

    fn body_html(&self) -> String {
        self.body_html.clone()
    }

    fn resources(&self) -> Resources {
        let mut scripts = self.scripts.clone();
        scripts.extend(self.inline_scripts.iter().cloned());
        Resources {
            stylesheets: self.stylesheets.clone(),
            scripts,
            styles: self.styles.clone(),
            canonical: None,
        }
    }

    fn append_stylesheet(&mut self, href: &str) {
        self.stylesheets.push(LinkTag::stylesheet(href));
        self.mutations.push(Mutation::AppendStylesheet(href.to_string()));
    }

    fn remove_stylesheet(&mut self, href: &str) {
        let before = self.stylesheets.len();
        self.stylesheets.retain(|l| !l.href().is_some_and(|h| h.contains(href)));
        if self.stylesheets.len() != before {
            self.mutations.push(Mutation::RemoveStylesheet(href.to_string()));
        }
    }

    fn append_script(&mut self, script: &ScriptTag, is_async: bool) {
        let mut script = script.clone();
        if is_async && script.attr("async").is_none() {
            script = script.with_attr("async", "");
        }
        let src = script.src().unwrap_or_default().to_string();
        self.scripts.push(script);
        self.mutations.push(Mutation::AppendScript(src));
    }

    fn remove_script(&mut self, src: &str) {
        let before = self.scripts.len();
        self.scripts.retain(|s| !s.src().is_some_and(|s| s.contains(src)));
        if self.scripts.len() != before {
            self.mutations.push(Mutation::RemoveScript(src.to_string()));
        }
    }

    fn append_inline_script(&mut self, script: &ScriptTag) {
        let class = match script.attr("class") {
            Some(c) if !c.is_empty() => format!("{c} {INLINE_CLASS}"),
            _ => INLINE_CLASS.to_string(),
        };
        self.inline_scripts.push(script.clone().with_attr("class", &class));
        self.mutations.push(Mutation::AppendInlineScript);
    }

    fn remove_inline_scripts(&mut self) {
        let removed = self.inline_scripts.len();
        self.inline_scripts.clear();
        if removed > 0 {
            self.mutations.push(Mutation::RemoveInlineScripts(removed));
        }
    }

    fn remove_styles(&mut self) {
        self.styles.clear();
        self.mutations.push(Mutation::RemoveStyles);
    }

    fn append_style(&mut self, css: &str) {
        self.styles.push(css.to_string());
        self.mutations.push(Mutation::AppendStyle);
    }

    fn scroll_top(&self) -> u32 {
        self.scroll
    }

    fn scroll_to(&mut self, top: u32) {
        self.scroll = top;
        self.mutations.push(Mutation::Scroll(top));
    }

    fn element_offset(&self, id: &str) -> Option<u32> {
        self.find(id)
            .map(|_| self.offsets.get(id).copied().unwrap_or(0))
    }

    fn set_inner_html(&mut self, id: &str, html: &str) {
        if let Some(el) = self.find_mut(id) {
            el.inner_html = html.to_string();
            self.mutations.push(Mutation::InnerHtml(id.to_string()));
        }
    }

    fn track_page_view(&mut self, path: &str) {
        self.page_views.push(path.to_string());
    }
}

fn element_data(el: ElementRef<'_>) -> ElementData {
    ElementData {
        tag: el.value().name().to_string(),
        attrs: attrs_of(el),
        inner_html: el.inner_html(),
    }
}

fn attrs_of(el: ElementRef<'_>) -> Vec<(String, String)> {
    el.value()
        .attrs()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}
