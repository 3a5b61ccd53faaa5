//! stencil-worker: keeps a template directory compiled and hot-reloaded.
//!
//! Every template under the directory is compiled at startup and again
//! whenever its file changes. With `--data`, each compiled template is
//! checked against the sample data and missing structure is logged, which
//! makes the worker usable as a live linter while editing templates.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use stencil_core::config::{load_dotenv, Config};
use stencil_core::{PrepareOptions, TemplateData};
use stencil_templates::{
    prepare_template, DirectoryWatcher, PlainTemplate, PlainTextEngine, PreparedTemplate, TemplateCache,
    WatcherConfig,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Template worker: compile, validate and hot-reload a template directory.
#[derive(Parser, Debug)]
#[command(name = "stencil-worker", version, about)]
struct Cli {
    /// Template directory to watch. Overrides STENCIL_TEMPLATES_DIR.
    #[arg(long)]
    templates_dir: Option<PathBuf>,

    /// Debounce window in milliseconds. Overrides STENCIL_DEBOUNCE_MS.
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// JSON object every template is validated against after compiling.
    #[arg(long, env = "STENCIL_SAMPLE_DATA")]
    data: Option<PathBuf>,
}

fn load_data(path: &Path) -> anyhow::Result<TemplateData> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    TemplateData::from_json_str(&text).map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))
}

fn report(template: &PreparedTemplate<PlainTemplate>, data: Option<&TemplateData>) {
    let Some(data) = data else {
        return;
    };
    match template.validate(data) {
        Ok(errors) if errors.is_empty() => {
            info!(path = %template.path().display(), "sample data satisfies template");
        }
        Ok(errors) => {
            for error in errors {
                warn!(path = %template.path().display(), %error, "sample data is missing structure");
            }
        }
        Err(e) => warn!(path = %template.path().display(), error = %e, "template closed before validation"),
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = cli.templates_dir {
        config.templates.dir = dir;
    }
    if let Some(ms) = cli.debounce_ms {
        config.watch.debounce_ms = ms;
    }
    config.log_summary();

    let mut options = PrepareOptions::new();
    if let Some(temp) = &config.templates.temp_dir {
        options = options
            .with_temporary_directory(temp)
            .map_err(|e| anyhow::anyhow!(e))?;
    }

    let data = cli.data.as_deref().map(load_data).transpose()?.map(Arc::new);

    let engine = PlainTextEngine::new();
    let cache: Arc<TemplateCache<PlainTemplate>> = Arc::new(TemplateCache::new());

    let watcher = DirectoryWatcher::new(&config.templates.dir, WatcherConfig::from(&config.watch))
        .with_context(|| format!("watching {}", config.templates.dir.display()))?;

    let sink = Arc::clone(&cache);
    let summary = watcher.start(
        move |path| prepare_template(&engine, path, &options).map(Arc::new),
        move |template| {
            report(&template, data.as_deref());
            sink.insert(template);
        },
    )?;
    info!(
        compiled = summary.compiled,
        failed = summary.failed,
        cached = cache.len(),
        "stencil-worker ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    watcher.stop()?;
    cache.clear();
    info!("stencil-worker exited cleanly");
    Ok(())
}
