//! Engine settings loaded from `~/.config/pronto/settings.toml`.
//!
//! Every option mirrors a switch of the navigation engine. Options that take
//! either a boolean or a list of hints (`memoryoff = "search, cart"`) are
//! modelled with [`Toggle`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default trigger selector for link interception.
pub const DEFAULT_SELECTOR: &str = "a:not(.no-ajaxy)";
/// Default selector for forms that get ajaxified.
pub const DEFAULT_FORMS: &str = "form:not(.no-ajaxy)";

/// A setting that is either a plain switch or a comma-separated hint list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Toggle {
    Flag(bool),
    Text(String),
}

impl Toggle {
    pub fn is_true(&self) -> bool {
        matches!(self, Self::Flag(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Self::Flag(false))
    }
}

/// What happens to the scroll position after a page swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "Toggle")]
pub enum ScrollPolicy {
    /// Restore the offset recorded for the target URL (`"s"`).
    #[default]
    Smart,
    /// Always jump to the top (`true`).
    Top,
    /// Leave the scroll bar alone (`false`).
    Keep,
}

impl From<Toggle> for ScrollPolicy {
    fn from(value: Toggle) -> Self {
        match value {
            Toggle::Flag(true) => Self::Top,
            Toggle::Flag(false) => Self::Keep,
            Toggle::Text(_) => Self::Smart,
        }
    }
}

/// How external scripts and stylesheets of a new page are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "Toggle")]
pub enum DeltaMode {
    /// Insert only resources not loaded yet (`true`).
    #[default]
    Delta,
    /// Insert every resource on every pass (`false`).
    All,
    /// Leave scripts and stylesheets alone (`"n"`).
    Off,
}

impl From<Toggle> for DeltaMode {
    fn from(value: Toggle) -> Self {
        match value {
            Toggle::Flag(true) => Self::Delta,
            Toggle::Flag(false) => Self::All,
            Toggle::Text(s) if s == "n" => Self::Off,
            Toggle::Text(_) => Self::Delta,
        }
    }
}

/// All recognized engine options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Ids of the content containers swapped on every navigation.
    pub containers: Vec<String>,
    /// Selector a link must match for clicks to be intercepted.
    pub selector: String,
    /// Selector for ajaxified forms, `false` to disable.
    pub forms: Toggle,
    /// Use the target page's canonical link for the history entry.
    pub canonical: bool,
    /// Re-request the page even when the link points at the current URL.
    pub refresh: bool,
    /// Debounce between fetch completion and rendering, in milliseconds.
    #[serde(alias = "requestDelay")]
    pub request_delay: u64,
    pub previewoff: Toggle,
    pub scrolltop: ScrollPolicy,
    #[serde(alias = "bodyClasses")]
    pub body_classes: bool,
    pub deltas: DeltaMode,
    pub asyncdef: bool,
    pub alwayshints: Toggle,
    pub inline: bool,
    pub inlinehints: Toggle,
    pub inlineskip: Toggle,
    pub inlineappend: bool,
    pub style: bool,
    pub prefetchoff: Toggle,
    pub verbosity: u8,
    pub memoryoff: Toggle,
    pub pluginon: bool,
    /// Id of an element that receives `Pass: <n>` after every render.
    #[serde(alias = "passCount")]
    pub pass_count: Option<String>,
    /// Hints for admin areas that are never ajaxified.
    pub excluded_paths: String,
    /// Override for the root URL used by the internal-link check.
    pub root_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            containers: Vec::new(),
            selector: DEFAULT_SELECTOR.to_string(),
            forms: Toggle::Text(DEFAULT_FORMS.to_string()),
            canonical: false,
            refresh: false,
            request_delay: 0,
            previewoff: Toggle::Flag(true),
            scrolltop: ScrollPolicy::Smart,
            body_classes: false,
            deltas: DeltaMode::Delta,
            asyncdef: false,
            alwayshints: Toggle::Flag(false),
            inline: true,
            inlinehints: Toggle::Flag(false),
            inlineskip: Toggle::Text("adsbygoogle".to_string()),
            inlineappend: true,
            style: true,
            prefetchoff: Toggle::Flag(false),
            verbosity: 0,
            memoryoff: Toggle::Flag(false),
            pluginon: true,
            pass_count: None,
            excluded_paths: "wp-login, wp-admin".to_string(),
            root_url: None,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid settings TOML")
    }

    /// Selector for ajaxified forms, `None` when forms are switched off.
    pub fn forms_selector(&self) -> Option<&str> {
        match &self.forms {
            Toggle::Flag(false) => None,
            Toggle::Flag(true) => Some(DEFAULT_FORMS),
            Toggle::Text(selector) => Some(selector.as_str()),
        }
    }
}

/// Load settings from `path`, or from the default location when `None`.
///
/// Returns defaults if the file doesn't exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
}

/// Return the path to the settings file.
fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pronto")
        .join("settings.toml")
}
