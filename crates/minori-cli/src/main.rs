//! `minori` — cross-catalog rating enrichment for a scraped anime catalog.
//!
//! Reads the raw catalog, resolves each record against the offline
//! reference corpus (falling back to the remote services), and merges the
//! results into the enriched output file. Safe to interrupt and re-run:
//! completed records are skipped and partial progress is flushed in
//! batches.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use minori_api::douban::DoubanClient;
use minori_api::imdb::ImdbClient;
use minori_api::jikan::JikanClient;
use minori_core::config::AppConfig;
use minori_core::index::ReferenceIndex;
use minori_core::orchestrator::Enricher;
use minori_core::overrides::ManualOverrides;
use minori_core::storage::{self, CatalogStore};

#[derive(Debug, Parser)]
#[command(name = "minori", about = "Enrich a scraped anime catalog with cross-platform ratings")]
struct Args {
    /// Config file; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Primary catalog JSON (overrides config).
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Enriched output / merge base (overrides config).
    #[arg(long)]
    enriched: Option<PathBuf>,

    /// Reference corpus JSONL (overrides config).
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Manual override table (overrides config).
    #[arg(long)]
    overrides: Option<PathBuf>,

    /// Verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = AppConfig::load(args.config.as_deref()).context("loading config")?;
    if let Some(path) = args.catalog {
        config.paths.catalog = path;
    }
    if let Some(path) = args.enriched {
        config.paths.enriched = path;
    }
    if let Some(path) = args.reference {
        config.paths.reference = path;
    }
    if let Some(path) = args.overrides {
        config.paths.overrides = path;
    }

    // The primary catalog is the one input whose absence aborts the run.
    let input = storage::load_input(&config.paths.catalog)
        .with_context(|| format!("reading {}", config.paths.catalog.display()))?;
    info!(records = input.len(), "loaded primary catalog");

    let index = ReferenceIndex::new(&config.paths.reference);
    index.load();
    let overrides = ManualOverrides::load(&config.paths.overrides);

    let timeout = Duration::from_secs(config.api.request_timeout_secs);
    let backoff = Duration::from_secs(config.api.retry_backoff_secs);
    let mal = JikanClient::new(
        timeout,
        Duration::from_millis(config.api.mal_interval_ms),
        backoff,
    )
    .context("building jikan client")?;
    let imdb = ImdbClient::new(
        timeout,
        Duration::from_millis(config.api.imdb_interval_ms),
        backoff,
    )
    .context("building imdb client")?;
    let douban = DoubanClient::new(
        timeout,
        Duration::from_millis(config.api.douban_interval_ms),
        backoff,
    )
    .context("building douban client")?;

    let mut store = CatalogStore::open(&config.paths.enriched);
    let enricher = Enricher::new(
        &index,
        &overrides,
        &mal,
        &imdb,
        &douban,
        config.enrichment.parsed_sources()?,
        config.enrichment.batch_size,
    );

    let summary = enricher.run(input, &mut store).await?;
    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        updated = summary.updated,
        failed = summary.failed,
        output = %config.paths.enriched.display(),
        "done"
    );
    Ok(())
}
