//! Fetched page normalization and lookups
//!
//! A whole HTML document cannot be parsed as an inert fragment: `<html>`,
//! `<head>` and `<body>` would be dropped or restructured. Before parsing, the
//! structural tags are rewritten to `<div>` wrappers:
//!
//! | Source              | Rewritten                      |
//! |---------------------|--------------------------------|
//! | `<!DOCTYPE ...>`    | removed                        |
//! | `<html ...>`        | `<div class="ajy-html" ...>`   |
//! | `<head ...>`        | `<div class="ajy-head" ...>`   |
//! | `<link ...>`        | `<div class="ajy-link" ...>`   |
//! | `<body ...>`        | `<div id="ajy-body" ...>`      |
//! | `</html>` `</head>` `</body>` `</link>` | `</div>` |
//!
//! Downstream lookups ([`Page::styles`], [`Page::links`], [`Page::body_classes`])
//! rely on exactly these class and id names.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static DOC_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<!DOCTYPE[^>]*>").unwrap());
static TAGS_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(html|head|link)([\s>])").unwrap());
static TAGS_OPEN_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<(body)([\s>])").unwrap());
static TAGS_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(html|head|body|link)>").unwrap());
static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());

static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());
static STYLE: Lazy<Selector> = Lazy::new(|| Selector::parse("style").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static HEAD: Lazy<Selector> = Lazy::new(|| Selector::parse(".ajy-head").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse(".ajy-link").unwrap());
static ANY: Lazy<Selector> = Lazy::new(|| Selector::parse("*").unwrap());

/// Class given to inline scripts injected by the engine.
pub const INLINE_CLASS: &str = "ajy-inline";

/// Rewrite a full HTML document so it parses as an inert fragment.
pub fn normalize_html(html: &str) -> String {
    let html = DOC_TYPE.replace(html, "");
    let html = TAGS_OPEN.replace_all(&html, r#"<div class="ajy-${1}"${2}"#);
    let html = TAGS_OPEN_ID.replace_all(&html, r#"<div id="ajy-${1}"${2}"#);
    let html = TAGS_CLOSE.replace_all(&html, "</div>");
    html.trim().to_string()
}

/// Element snapshot detached from any document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub inner_html: String,
}

impl ElementData {
    fn from_ref(el: ElementRef<'_>) -> Self {
        Self {
            tag: el.value().name().to_string(),
            attrs: attrs_of(el),
            inner_html: el.inner_html(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    /// Copy with every `<script>` block removed from the content, so that
    /// scripts only ever run through the delta loader.
    #[must_use]
    pub fn without_scripts(&self) -> Self {
        Self {
            tag: self.tag.clone(),
            attrs: self.attrs.clone(),
            inner_html: SCRIPT_BLOCK.replace_all(&self.inner_html, "").into_owned(),
        }
    }
}

/// A `<script>` tag of a page, external or inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTag {
    pub attrs: Vec<(String, String)>,
    pub text: String,
}

impl ScriptTag {
    pub fn external(src: &str) -> Self {
        Self {
            attrs: vec![("src".to_string(), src.to_string())],
            text: String::new(),
        }
    }

    pub fn inline(text: &str) -> Self {
        Self {
            attrs: Vec::new(),
            text: text.to_string(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.retain(|(n, _)| n != name);
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn src(&self) -> Option<&str> {
        self.attr("src").filter(|s| !s.is_empty())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }
}

/// `<link>` element as found in a page head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTag {
    pub attrs: Vec<(String, String)>,
}

impl LinkTag {
    pub fn stylesheet(href: &str) -> Self {
        Self {
            attrs: vec![
                ("rel".to_string(), "stylesheet".to_string()),
                ("href".to_string(), href.to_string()),
            ],
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn href(&self) -> Option<&str> {
        self.attr("href").filter(|s| !s.is_empty())
    }

    pub fn rel_contains(&self, rel: &str) -> bool {
        self.attr("rel").is_some_and(|r| r.contains(rel))
    }
}

/// Scripts, stylesheets, style blocks and canonical link of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources {
    pub stylesheets: Vec<LinkTag>,
    pub scripts: Vec<ScriptTag>,
    pub styles: Vec<String>,
    pub canonical: Option<String>,
}

impl Resources {
    /// Sort head links into stylesheets and the first canonical href.
    pub fn from_links(links: &[LinkTag]) -> (Vec<LinkTag>, Option<String>) {
        let stylesheets = links
            .iter()
            .filter(|l| l.rel_contains("stylesheet"))
            .cloned()
            .collect();
        let canonical = links
            .iter()
            .find(|l| l.rel_contains("canonical"))
            .and_then(|l| l.href().map(ToString::to_string));
        (stylesheets, canonical)
    }
}

/// A fetched page, normalized and parsed as a fragment.
#[derive(Debug)]
pub struct Page {
    source: String,
    doc: Html,
}

impl Page {
    /// Normalize and parse a raw HTML response body.
    pub fn parse(raw: &str) -> Self {
        let source = normalize_html(raw);
        let doc = Html::parse_fragment(&source);
        Self { source, doc }
    }

    /// The normalized markup the page was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    fn find_id(&self, id: &str) -> Option<ElementRef<'_>> {
        self.doc
            .select(&ANY)
            .find(|el| el.value().attr("id") == Some(id))
    }

    /// Element with the given id.
    pub fn element_by_id(&self, id: &str) -> Option<ElementData> {
        self.find_id(id).map(ElementData::from_ref)
    }

    /// Inner markup of the first `<title>`.
    pub fn title(&self) -> Option<String> {
        self.doc.select(&TITLE).next().map(|t| t.inner_html())
    }

    /// `class` attribute of the rewritten `<body>`.
    pub fn body_classes(&self) -> Option<String> {
        self.find_id("ajy-body")
            .and_then(|b| b.value().attr("class").map(ToString::to_string))
    }

    fn head(&self) -> Option<ElementRef<'_>> {
        self.doc.select(&HEAD).next()
    }

    /// `<link>` tags inside the head.
    pub fn links(&self) -> Vec<LinkTag> {
        self.head()
            .map(|head| {
                head.select(&LINK)
                    .map(|el| LinkTag {
                        attrs: attrs_of(el)
                            .into_iter()
                            .filter(|(n, _)| !(n == "class" && is_link_marker(el)))
                            .collect(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Text of every `<style>` in the head.
    pub fn styles(&self) -> Vec<String> {
        self.head()
            .map(|head| {
                head.select(&STYLE)
                    .map(|s| s.text().collect::<String>())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every `<script>` of the page, head and body.
    pub fn scripts(&self) -> Vec<ScriptTag> {
        self.doc
            .select(&SCRIPT)
            .map(|el| ScriptTag {
                attrs: attrs_of(el),
                text: el.text().collect(),
            })
            .collect()
    }

    /// Resources of this page as consumed by the delta loader.
    pub fn resources(&self) -> Resources {
        let (stylesheets, canonical) = Resources::from_links(&self.links());
        Resources {
            stylesheets,
            scripts: self.scripts(),
            styles: self.styles(),
            canonical,
        }
    }
}

/// Rewritten links carry `class="ajy-link"` exactly; their own classes follow
/// in a second attribute the parser drops, so the marker class is not data.
fn is_link_marker(el: ElementRef<'_>) -> bool {
    el.value().attr("class") == Some("ajy-link")
}

fn attrs_of(el: ElementRef<'_>) -> Vec<(String, String)> {
    el.value()
        .attrs()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}
