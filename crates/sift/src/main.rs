//! sift CLI - interactive terminal fuzzy finder
//!
//! The non-interactive surface over `sift-core`: drain stdin to EOF, run one
//! matching pass, print the ranked results (or the bare matched lines with
//! `--plain`). Exit code 0 when something matched, 1 when nothing did, 2 on
//! usage or configuration errors.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use sift_core::config::Config;
use sift_core::engine::{MatchOptions, MatchingEngine};
use sift_core::ingest::ingest_reader;
use sift_core::logging::{LogConfig, init_logging};
use sift_core::rank::{MatchedItem, Scheme, unpack_points};
use sift_core::score::{MatcherScratch, PreparedPattern, score_with_positions};
use sift_core::store::CandidateStore;

/// Secondary ordering policy.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchemeArg {
    /// No secondary preference
    Default,
    /// Prefer shallow path matches
    Path,
    /// History lists (index already encodes recency)
    History,
}

impl From<SchemeArg> for Scheme {
    fn from(value: SchemeArg) -> Self {
        match value {
            SchemeArg::Default => Self::Default,
            SchemeArg::Path => Self::Path,
            SchemeArg::History => Self::History,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "sift",
    version,
    about = "Fuzzy-filter lines from standard input"
)]
struct Cli {
    /// Query to match against input lines (tokens are AND-ed)
    #[arg(value_name = "QUERY", default_value = "")]
    query: String,

    /// Disable ASCII case folding
    #[arg(long)]
    case_sensitive: bool,

    /// Secondary ordering policy
    #[arg(long, value_enum)]
    scheme: Option<SchemeArg>,

    /// Maximum number of results to print
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Print matched lines only, in input order
    #[arg(long)]
    plain: bool,

    /// Path to a sift.toml config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("sift: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => Config::default(),
    };

    let log_config = LogConfig {
        level: cli
            .log_level
            .clone()
            .unwrap_or_else(|| config.general.log_level.clone()),
        format: config.general.log_format,
        file: None,
    };
    init_logging(&log_config).context("initialize logging")?;

    let mut options = config.match_options();
    if cli.case_sensitive {
        options.case_sensitive = true;
    }
    if let Some(scheme) = cli.scheme {
        options.scheme = scheme.into();
    }
    if let Some(limit) = cli.limit {
        anyhow::ensure!(limit > 0, "--limit must be greater than 0");
        options.top_k = limit;
    }

    let store = CandidateStore::new();
    let stats =
        ingest_reader(std::io::stdin().lock(), &store).context("read standard input")?;
    tracing::debug!(lines = stats.lines, truncated = stats.truncated, "input drained");

    let engine = MatchingEngine::new();
    let cancel = AtomicBool::new(false);
    let snapshot = store.snapshot();
    let matches = engine
        .run(&cli.query, &snapshot, store.arena(), &options, &cancel)
        .ok_or_else(|| anyhow::anyhow!("matching pass was cancelled"))?;

    let mut stdout = std::io::stdout().lock();
    if cli.plain {
        print_plain(&mut stdout, &store, &matches)?;
    } else {
        print_ranked(&mut stdout, &store, &matches, &cli.query, &options)?;
    }
    Ok(!matches.is_empty())
}

/// Selection-style output: matched texts, one per line, in ingestion order.
fn print_plain(
    out: &mut impl Write,
    store: &CandidateStore,
    matches: &[MatchedItem],
) -> anyhow::Result<()> {
    let mut by_index: Vec<&MatchedItem> = matches.iter().collect();
    by_index.sort_by_key(|m| m.item.index);
    for m in by_index {
        writeln!(out, "{}", store.arena().string_of(m.item.window()))?;
    }
    Ok(())
}

/// Tooling output: `#<rank> score=<S> pts=(k3,k2,k1,k0) pos=[..] <text>`.
fn print_ranked(
    out: &mut impl Write,
    store: &CandidateStore,
    matches: &[MatchedItem],
    query: &str,
    options: &MatchOptions,
) -> anyhow::Result<()> {
    let mut scratch = MatcherScratch::new();
    let patterns: Vec<PreparedPattern> = query
        .split_ascii_whitespace()
        .map(|token| PreparedPattern::new(token, options.case_sensitive))
        .collect();

    for (rank, m) in matches.iter().enumerate() {
        let text = store.arena().string_of(m.item.window());
        let positions = store.arena().read_with(m.item.window(), |bytes| {
            highlight_positions(&patterns, bytes, &mut scratch)
        });
        let [k3, k2, k1, k0] = unpack_points(m.points);
        let pos: Vec<String> = positions.iter().map(ToString::to_string).collect();
        writeln!(
            out,
            "#{} score={} pts=({k3},{k2},{k1},{k0}) pos=[{}] {}",
            rank + 1,
            m.score,
            pos.join(","),
            text
        )?;
    }
    Ok(())
}

/// Union of every token's matched byte offsets, ascending.
fn highlight_positions(
    patterns: &[PreparedPattern],
    text: &[u8],
    scratch: &mut MatcherScratch,
) -> Vec<u16> {
    let mut all = BTreeSet::new();
    for pattern in patterns {
        if let Some((_, positions)) = score_with_positions(pattern, text, scratch) {
            all.extend(positions);
        }
    }
    all.into_iter().collect()
}
