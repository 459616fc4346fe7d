//! Inline script evaluation (rquickjs)
//!
//! Inline scripts of a swapped-in page run in one persistent `QuickJS`
//! context, so globals defined by one page survive into the next the way they
//! would in a browser tab. A small browser shim provides `window`,
//! `document` and `location`.

use anyhow::Result;
use rquickjs::{Context, Function, Runtime, Type};
use tracing::{debug, warn};

use crate::delta::ScriptRunner;

const BROWSER_SHIM: &str = r"
    var __noop = function() {};
    var console = {
        log: __noop, error: __noop, warn: __noop, info: __noop, debug: __noop
    };
    var document = {
        title: '',
        _elements: {},
        getElementById: function(id) { return this._elements[id] || null; },
        querySelector: function() { return null; },
        querySelectorAll: function() { return []; },
        addEventListener: __noop,
        removeEventListener: __noop,
        createElement: function(tag) {
            return {
                tagName: tag.toUpperCase(),
                attributes: {},
                style: {},
                setAttribute: function(k, v) { this.attributes[k] = String(v); },
                getAttribute: function(k) { return this.attributes[k]; },
                appendChild: function(c) { return c; },
                addEventListener: __noop
            };
        }
    };
    var location = { href: '', pathname: '/', search: '', hash: '' };
    var window = {
        document: document,
        location: location,
        console: console,
        addEventListener: __noop,
        removeEventListener: __noop,
        setTimeout: function() { return 0; },
        clearTimeout: __noop
    };
    var setTimeout = window.setTimeout;
    var clearTimeout = window.clearTimeout;
";

/// Persistent JavaScript context for inline scripts.
pub struct JsEngine {
    #[allow(dead_code)]
    runtime: Runtime,
    context: Context,
}

impl JsEngine {
    /// Create an engine with the browser shim installed.
    pub fn new() -> Result<Self> {
        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;

        runtime.set_memory_limit(32 * 1024 * 1024);
        runtime.set_max_stack_size(1024 * 1024);

        let engine = Self { runtime, context };
        engine.context.with(|ctx| ctx.eval::<(), _>(BROWSER_SHIM))?;
        Ok(engine)
    }

    /// Point `location` at the page being rendered.
    pub fn set_location(&self, href: &str) -> Result<()> {
        let (path, hash) = href.split_once('#').unwrap_or((href, ""));
        let (path, search) = path.split_once('?').unwrap_or((path, ""));
        let pathname = match path.find("://") {
            Some(i) => path[i + 3..].find('/').map_or("/", |j| &path[i + 3 + j..]),
            None => path,
        };

        self.context.with(|ctx| {
            let location: rquickjs::Object = ctx.globals().get("location")?;
            location.set("href", href)?;
            location.set("pathname", pathname)?;
            location.set("search", prefixed('?', search))?;
            location.set("hash", prefixed('#', hash))?;
            Ok(())
        })
    }

    /// Evaluate code and render the result as a string.
    pub fn eval(&self, code: &str) -> Result<String> {
        debug!("Evaluating JS: {} chars", code.len());

        self.context.with(|ctx| {
            let result: rquickjs::Value = ctx.eval(code)?;

            let rendered = match result.type_of() {
                Type::Undefined => "undefined".to_string(),
                Type::Null => "null".to_string(),
                Type::Bool => result.get::<bool>()?.to_string(),
                Type::Int => result.get::<i32>()?.to_string(),
                Type::Float => result.get::<f64>()?.to_string(),
                Type::String => result.get::<String>()?,
                Type::Object | Type::Array => {
                    let json: rquickjs::Object = ctx.globals().get("JSON")?;
                    let stringify: Function = json.get("stringify")?;
                    stringify.call((result,))?
                }
                _ => format!("{result:?}"),
            };
            Ok(rendered)
        })
    }
}

impl ScriptRunner for JsEngine {
    fn run(&mut self, source: &str) -> Result<()> {
        self.context.with(|ctx| {
            ctx.eval::<(), _>(source)?;
            Ok(())
        })
    }

    fn enter_page(&mut self, href: &str) {
        if let Err(e) = self.set_location(href) {
            warn!(error = %e, "Cannot update script location");
        }
    }
}

fn prefixed(marker: char, part: &str) -> String {
    if part.is_empty() {
        String::new()
    } else {
        format!("{marker}{part}")
    }
}
