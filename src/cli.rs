//! Command-line interface definitions for DevPrep News.
//!
//! Global options can come from flags or environment variables. Every
//! subcommand prints its result as JSON, or writes it to the JSON output
//! directory when one is given.

use clap::{Parser, Subcommand};

/// Aggregate programming and interview-prep news from feeds and listings.
///
/// # Examples
///
/// ```sh
/// # Newest interview articles, printed to stdout
/// devprep_news latest --category interview --limit 10
///
/// # Keyword search, written to ./json/<date>/search.json
/// devprep_news -j ./json search "system design"
///
/// # Keep the cache warm every 30 minutes
/// devprep_news watch --interval-secs 1800
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, env = "DEVPREP_NEWS_CONFIG")]
    pub config: Option<String>,

    /// Write results under this directory instead of printing them
    #[arg(short, long, env = "DEVPREP_NEWS_JSON_DIR")]
    pub json_output_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Newest articles across sources
    Latest {
        /// tech, programming or interview
        #[arg(long)]
        category: Option<String>,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        /// Only articles from this source key
        #[arg(long)]
        source: Option<String>,
        /// Fetch fresh results instead of reading the cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Articles whose title or description contains a phrase
    Search {
        query: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Articles ranked by keyword score
    Trending {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Every source's articles, keyed by source
    Sources,
    /// Articles from a single source
    Source {
        key: String,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Article counts per source and category
    Summary,
    /// Refresh every category on a fixed interval until interrupted
    Watch {
        #[arg(long, default_value_t = 1800)]
        interval_secs: u64,
    },
}

impl Command {
    /// File stem used when writing this command's result.
    pub fn output_name(&self) -> &'static str {
        match self {
            Command::Latest { .. } => "latest",
            Command::Search { .. } => "search",
            Command::Trending { .. } => "trending",
            Command::Sources => "sources",
            Command::Source { .. } => "source",
            Command::Summary => "summary",
            Command::Watch { .. } => "refresh",
        }
    }
}
