//! # DevPrep News
//!
//! Aggregates programming and interview-preparation news from RSS/Atom feeds
//! and HTML listing pages, keeps only articles that match a keyword profile,
//! finds a thumbnail for each one and serves the merged result from a
//! time-bounded cache.
//!
//! ## Features
//!
//! - Six built-in sources (TechCrunch, Hacker News, Dev.to, LeetCode Blog,
//!   GeeksforGeeks, Stack Overflow Blog), replaceable through a YAML config
//! - Concurrent fan-out; a failing source is logged and skipped
//! - Thumbnail discovery from feed media, inline HTML and article pages, with
//!   a placeholder fallback
//! - Latest, search, trending, per-source and summary queries
//! - JSON output to stdout or a dated directory
//!
//! ## Usage
//!
//! ```sh
//! devprep_news latest --category interview --limit 10
//! devprep_news -j ./json trending
//! ```
//!
//! ## Architecture
//!
//! 1. **Sources**: each configured source becomes an adapter that downloads
//!    and parses its page (with retries)
//! 2. **Filtering**: entries are kept when they mention a coding or interview
//!    keyword
//! 3. **Images**: each kept entry gets an image URL, resolved a few at a time
//! 4. **Aggregation**: adapters run concurrently and results are merged,
//!    sorted newest first and sliced per query
//! 5. **Service**: queries are validated and answered through the cache

use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;

use cli::{Cli, Command};
use devprep_news::config::NewsConfig;
use devprep_news::fetch::{HttpFetcher, PageFetch};
use devprep_news::outputs::json;
use devprep_news::service::{LatestQuery, NewsService, parse_category};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("devprep_news starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.json_output_dir, command = ?args.command, "Parsed CLI arguments");

    // Early check: a bad output dir should fail before any fetching
    if let Some(dir) = &args.json_output_dir {
        json::ensure_writable_dir(dir).await?;
    }

    let config = NewsConfig::load(args.config.as_deref().map(Path::new))?;
    info!(
        sources = config.sources.len(),
        config_path = args.config.as_deref().unwrap_or("<defaults>"),
        "Loaded configuration"
    );

    let fetcher = HttpFetcher::new(&config.user_agent)?;
    let service = NewsService::new(&config, fetcher);
    let sweeper = service.spawn_sweeper(Duration::from_secs(config.cache.sweep_interval_secs));

    let output_dir = args.json_output_dir.as_deref();
    let name = args.command.output_name();
    let result = run(&service, args.command, output_dir, name).await;
    sweeper.abort();

    let elapsed = start_time.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        "Run finished"
    );
    result
}

async fn run<F: PageFetch + 'static>(
    service: &NewsService<F>,
    command: Command,
    output_dir: Option<&str>,
    name: &str,
) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Latest {
            category,
            limit,
            source,
            no_cache,
        } => {
            let query = LatestQuery {
                category: parse_category(category.as_deref())?,
                limit,
                source,
                use_cache: !no_cache,
            };
            emit(&*service.latest(&query).await?, output_dir, name).await
        }
        Command::Search {
            query,
            category,
            limit,
        } => {
            let category = parse_category(category.as_deref())?;
            emit(&*service.search(&query, category, limit).await?, output_dir, name).await
        }
        Command::Trending { limit } => emit(&*service.trending(limit).await?, output_dir, name).await,
        Command::Sources => emit(&*service.all_sources(true).await, output_dir, name).await,
        Command::Source { key, limit } => {
            emit(&service.by_source(&key, limit).await?, output_dir, name).await
        }
        Command::Summary => emit(&service.summary().await, output_dir, name).await,
        Command::Watch { interval_secs } => {
            watch(service, interval_secs, output_dir, name, tokio::signal::ctrl_c()).await
        }
    }
}

/// Refresh every category each `interval_secs` until `shutdown` completes.
///
/// `shutdown` is pinned once and polled across iterations, so a signal that
/// arrives mid-refresh still stops the loop.
async fn watch<F, S>(
    service: &NewsService<F>,
    interval_secs: u64,
    output_dir: Option<&str>,
    name: &str,
    shutdown: S,
) -> Result<(), Box<dyn Error>>
where
    F: PageFetch + 'static,
    S: Future,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    info!(interval_secs, "Watching sources");
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => break,
        }
        let counts: BTreeMap<_, _> = tokio::select! {
            counts = service.refresh() => counts.into_iter().collect(),
            _ = &mut shutdown => break,
        };
        let stats = service.cache_stats();
        info!(
            cache_entries = stats.total_entries,
            expired = stats.expired_entries,
            "Refresh finished"
        );
        if let Err(e) = emit(&counts, output_dir, name).await {
            warn!(error = %e, "Failed to write refresh counts");
        }
    }
    info!("Interrupted; stopping watch");
    Ok(())
}

/// Print `value` as JSON, or write it under `output_dir` when one is set.
async fn emit<T: Serialize>(
    value: &T,
    output_dir: Option<&str>,
    name: &str,
) -> Result<(), Box<dyn Error>> {
    match output_dir {
        Some(dir) => {
            json::write_value(value, dir, name).await?;
        }
        None => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
