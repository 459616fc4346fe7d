//! Form discovery and submission
//!
//! Forms matching the configured selector are taken over by the engine:
//! - Discovered in the whole body at startup, then in the swapped containers
//!   after every render
//! - Serialized in document order (successful controls only)
//! - The activating submit button contributes its own `name=value`
//! - GET submissions become `action?query`, POST submissions carry the
//!   urlencoded payload

use std::fmt::Write as _;

use anyhow::Result;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

static CONTROLS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input, select, textarea").unwrap());
static OPTION: Lazy<Selector> = Lazy::new(|| Selector::parse("option").unwrap());

/// A form as found in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    /// Action URL as written in the markup (may be empty or relative)
    pub action: String,
    /// `GET` or `POST`
    pub method: String,
    /// All attributes of the `<form>` element
    pub attrs: Vec<(String, String)>,
    /// Successful controls in document order
    pub fields: Vec<(String, String)>,
}

impl Form {
    /// Parse every form in `html` matching `selector`.
    pub fn parse_all(html: &str, selector: &str) -> Result<Vec<Self>> {
        let document = Html::parse_fragment(html);
        let form_selector = Selector::parse(selector).map_err(|e| anyhow::anyhow!("{:?}", e))?;

        Ok(document
            .select(&form_selector)
            .filter(|el| el.value().name() == "form")
            .map(Self::from_element)
            .collect())
    }

    fn from_element(form: ElementRef<'_>) -> Self {
        let attrs = form
            .value()
            .attrs()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect();
        let method = form
            .value()
            .attr("method")
            .unwrap_or("get")
            .to_uppercase();

        let fields = form.select(&CONTROLS).filter_map(control_value).collect();

        Self {
            action: form.value().attr("action").unwrap_or("").to_string(),
            method,
            attrs,
            fields,
        }
    }

    pub fn is_post(&self) -> bool {
        self.method.eq_ignore_ascii_case("post")
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the `<form>` element itself matches `selector`.
    pub fn matches(&self, selector: &Selector) -> bool {
        let mut markup = String::from("<form");
        for (name, value) in &self.attrs {
            let _ = write!(markup, " {}=\"{}\"", name, value.replace('"', "&quot;"));
        }
        markup.push_str("></form>");
        Html::parse_fragment(&markup).select(selector).next().is_some()
    }

    /// Whether `other` is this `<form>` element, whatever its field values.
    ///
    /// Forms with an id are matched by id, others by their attributes.
    pub fn is_same_element(&self, other: &Form) -> bool {
        match (self.attr("id"), other.attr("id")) {
            (Some(a), Some(b)) => a == b,
            _ => self.attrs == other.attrs,
        }
    }

    /// Set a field value, as the user would by typing.
    pub fn set_field(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(field) => field.1 = value.to_string(),
            None => self.fields.push((name.to_string(), value.to_string())),
        }
    }
}

/// Value contributed by one control, if it is successful.
fn control_value(el: ElementRef<'_>) -> Option<(String, String)> {
    let value = el.value();
    let name = value.attr("name").filter(|n| !n.is_empty())?;
    if value.attr("disabled").is_some() {
        return None;
    }

    let field = match value.name() {
        "input" => {
            let kind = value.attr("type").unwrap_or("text").to_ascii_lowercase();
            match kind.as_str() {
                "submit" | "button" | "reset" | "image" | "file" => return None,
                "checkbox" | "radio" if value.attr("checked").is_none() => return None,
                "checkbox" | "radio" => value.attr("value").unwrap_or("on").to_string(),
                _ => value.attr("value").unwrap_or("").to_string(),
            }
        }
        "select" => {
            let mut options = el.select(&OPTION);
            let chosen = el
                .select(&OPTION)
                .find(|o| o.value().attr("selected").is_some())
                .or_else(|| options.next())?;
            chosen
                .value()
                .attr("value")
                .map_or_else(|| chosen.text().collect::<String>(), ToString::to_string)
        }
        "textarea" => el.text().collect(),
        _ => return None,
    };
    Some((name.to_string(), field))
}

/// A submission of a form, optionally through a named submit button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSubmit {
    pub form: Form,
    pub submitter: Option<(String, String)>,
}

impl FormSubmit {
    pub fn new(form: Form) -> Self {
        Self {
            form,
            submitter: None,
        }
    }

    #[must_use]
    pub fn with_submitter(mut self, name: &str, value: &str) -> Self {
        self.submitter = Some((name.to_string(), value.to_string()));
        self
    }

    /// Urlencoded payload: fields in order, then the submitter.
    pub fn serialize(&self) -> String {
        self.form
            .fields
            .iter()
            .chain(self.submitter.iter())
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Target of a GET submission; any query on the action is replaced.
    pub fn query_url(&self, action: &str) -> String {
        let base = action.split_once('?').map_or(action, |(base, _)| base);
        format!("{}?{}", base, self.serialize())
    }
}

fn encode(s: &str) -> String {
    urlencoding::encode(s).replace("%20", "+")
}
