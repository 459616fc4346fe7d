//! `pronto` CLI - drive the page-transition engine from the terminal

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::TryRecvError;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pronto::pronto::root_url;
use pronto::{
    load_settings, normalize_html, Dispatch, Document, HttpTransport, JsEngine, LifecycleKind,
    LinkEvent, MemoryHistory, NavEvent, Page, PageRequest, Pronto, Settings, Transport,
    VirtualDocument,
};

#[derive(Parser)]
#[command(name = "pronto")]
#[command(about = "Headless Ajax page-transition engine")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite an HTML document into its inert fragment form
    Normalize {
        /// HTML file to read ("-" for stdin)
        file: PathBuf,

        /// Print only the element with this id from the parsed fragment
        #[arg(short, long)]
        element: Option<String>,
    },

    /// Load a page, then follow links through the engine
    Navigate {
        /// Start URL
        url: String,

        /// Links to follow, in order
        #[arg(short, long = "to", required = true)]
        to: Vec<String>,

        /// Content container ids (overrides the settings file)
        #[arg(short, long = "container")]
        containers: Vec<String>,

        /// Settings file (default: ~/.config/pronto/settings.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print container contents after every swap
        #[arg(long)]
        show_html: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Navigate { config, .. } => config.clone(),
        Commands::Normalize { .. } => None,
    };
    let settings = load_settings(config.as_deref())?;

    let level = match cli.verbose.max(settings.verbosity) {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match cli.command {
        Commands::Normalize { file, element } => {
            cmd_normalize(&file, element.as_deref())?;
        }
        Commands::Navigate {
            url,
            to,
            containers,
            show_html,
            ..
        } => {
            cmd_navigate(settings, &url, &to, containers, show_html).await?;
        }
    }

    Ok(())
}

fn cmd_normalize(file: &Path, element: Option<&str>) -> Result<()> {
    let html = if file.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?
    };

    match element {
        None => println!("{}", normalize_html(&html)),
        Some(id) => {
            let page = Page::parse(&html);
            let found = page
                .element_by_id(id)
                .with_context(|| format!("no element with id '{id}'"))?;
            println!("{}", found.inner_html);
        }
    }
    Ok(())
}

async fn cmd_navigate(
    mut settings: Settings,
    url: &str,
    targets: &[String],
    containers: Vec<String>,
    show_html: bool,
) -> Result<()> {
    if !containers.is_empty() {
        settings.containers = containers;
    }
    if settings.containers.is_empty() {
        anyhow::bail!("no content containers configured (use --container)");
    }

    let transport = Arc::new(HttpTransport::new(&root_url(url))?);

    println!("🌐 Loading: {url}");
    let start = Instant::now();
    let response = transport.send(PageRequest::get(url)).await?;
    if !response.is_success() {
        anyhow::bail!("HTTP {} for {url}", response.status);
    }
    println!(
        "📄 {} bytes in {:.0}ms",
        response.body.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    let document = VirtualDocument::parse(&response.body);
    let history = MemoryHistory::new(url);
    let container_ids = settings.containers.clone();

    let mut pronto = Pronto::new(settings, transport, document, history)?;
    match JsEngine::new() {
        Ok(engine) => pronto = pronto.with_script_runner(engine),
        Err(e) => println!("⚠️  Inline scripts disabled: {e}"),
    }
    let mut events = pronto.subscribe();

    for target in targets {
        let start = Instant::now();
        let escapes = pronto.history().assigned().len();
        let dispatch = pronto.dispatch(NavEvent::Click(LinkEvent::new(target.clone())));
        pronto.settle().await;

        loop {
            match events.try_recv() {
                Ok(event) => {
                    let icon = match event.kind {
                        LifecycleKind::Error => "❌",
                        LifecycleKind::Render => "✅",
                        _ => "→",
                    };
                    match &event.error {
                        Some(e) => {
                            println!("   {icon} {} {} ({e})", event.kind.as_str(), event.url);
                        }
                        None => println!("   {icon} {} {}", event.kind.as_str(), event.url),
                    }
                }
                Err(TryRecvError::Lagged(n)) => println!("   ⚠️  {n} events dropped"),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        if dispatch == Dispatch::Ignored {
            println!("⏭️  {target}: not handled by the engine");
            continue;
        }
        if let Some(assigned) = pronto.history().assigned().get(escapes) {
            println!("↪️  {target}: full page load required ({assigned})");
            continue;
        }

        println!(
            "🔗 {} [{}] in {:.0}ms (pass {})",
            pronto.current_url(),
            pronto.document().title().unwrap_or_default(),
            start.elapsed().as_secs_f64() * 1000.0,
            pronto.session().pass
        );
        if show_html {
            for id in &container_ids {
                match pronto.document().element_html(id) {
                    Some(html) => println!("   #{id}: {}", html.trim()),
                    None => println!("   #{id}: (missing)"),
                }
            }
        }
    }

    println!("📚 History: {} entries", pronto.history().len());
    Ok(())
}
