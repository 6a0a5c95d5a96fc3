//! mdrag command line: ingest markdown, query, delete and inspect the index.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use mdrag_core::config::{Config, Settings};
use mdrag_core::types::{DeleteReport, EngineStats, IngestReport, QueryHit};
use mdrag_hybrid::{QueryRequest, RetrievalEngine};

#[derive(Parser)]
#[command(name = "mdrag", version, about = "Markdown chunking and hybrid retrieval")]
struct Cli {
    /// Configuration file (defaults to config.toml + config.<RUST_ENV>.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest markdown files; directories are searched for .md files
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },
    /// Query the index
    Query {
        text: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Minimum similarity (1 - distance)
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Only search this document
        #[arg(short, long)]
        document: Option<String>,
    },
    /// Delete every chunk of the given documents
    Delete {
        #[arg(required = true)]
        documents: Vec<String>,
    },
    /// Show index size and query latency
    Stats,
    /// Remove everything from the index
    Clear {
        #[arg(long)]
        confirm: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = load_settings(cli.config.as_ref())?;
    tracing::debug!(data_dir = %settings.data_dir, mode = ?settings.retrieval.mode, "settings loaded");
    let engine = RetrievalEngine::open(settings).context("failed to open the index")?;

    match cli.command {
        Commands::Ingest { paths, progress } => {
            let engine = engine.with_progress(progress);
            let report = engine.ingest(&paths);
            engine.persist().context("failed to save the index")?;
            emit(cli.json, &report, print_ingest)?;
        }
        Commands::Query { text, top_k, threshold, document } => {
            let request = QueryRequest { text, top_k, score_threshold: threshold, document };
            let hits = engine.query(&request)?;
            emit(cli.json, &hits, |hits| print_hits(hits))?;
        }
        Commands::Delete { documents } => {
            let report = engine.delete(&documents)?;
            engine.persist().context("failed to save the index")?;
            emit(cli.json, &report, print_delete)?;
        }
        Commands::Stats => {
            let stats = engine.stats()?;
            emit(cli.json, &stats, print_stats)?;
        }
        Commands::Clear { confirm } => {
            if !confirm {
                bail!("refusing to clear the index without --confirm");
            }
            engine.clear()?;
            engine.persist().context("failed to save the index")?;
            println!("Index cleared");
        }
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    let config = match path {
        Some(path) => Config::load_file(path).with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::load()?,
    };
    Ok(config.settings().context("invalid configuration")?)
}

fn emit<T: Serialize + ?Sized>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn print_ingest(report: &IngestReport) {
    println!(
        "Ingested {} document(s), {} chunk(s); {} failed",
        report.ingested_count, report.chunk_count, report.failed_count
    );
    if report.dropped_chunks > 0 {
        println!("{} chunk(s) could not be embedded and were skipped", report.dropped_chunks);
    }
    for failure in &report.failed_files {
        println!("  failed: {failure}");
    }
}

fn print_hits(hits: &[QueryHit]) {
    if hits.is_empty() {
        println!("No results");
        return;
    }
    for (rank, hit) in hits.iter().enumerate() {
        let path: Vec<&str> = hit.metadata.headers.iter().map(|h| h.text.as_str()).collect();
        println!("{}. {} (score {:.3})", rank + 1, hit.id, hit.score);
        if !path.is_empty() {
            println!("   {}", path.join(" > "));
        }
        let preview: String = hit.text.chars().take(200).collect();
        println!("   {}", preview.replace('\n', " "));
    }
}

fn print_delete(report: &DeleteReport) {
    println!("Deleted {} document(s)", report.deleted_count);
    for id in &report.not_found_ids {
        println!("  not found: {id}");
    }
}

fn print_stats(stats: &EngineStats) {
    let perf = &stats.performance;
    println!("Chunks:               {}", stats.total_chunks);
    println!("Embedding dimension:  {}", stats.embedding_dimension);
    println!("Queries:              {}", perf.query_count);
    println!("Avg query time:       {:.1} ms", perf.avg_query_time_ms);
    println!("Last query time:      {:.1} ms", perf.last_query_time_ms);
    println!("Meets latency target: {}", perf.meets_latency_target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_query_options() {
        let cli = Cli::try_parse_from(["mdrag", "-vv", "query", "borrow checker", "-k", "3", "--document", "notes/rust.md"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Query { text, top_k, threshold, document } => {
                assert_eq!(text, "borrow checker");
                assert_eq!(top_k, Some(3));
                assert_eq!(threshold, None);
                assert_eq!(document.as_deref(), Some("notes/rust.md"));
            }
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn clear_flag_defaults_off() {
        let cli = Cli::try_parse_from(["mdrag", "clear"]).unwrap();
        assert!(matches!(cli.command, Commands::Clear { confirm: false }));
    }
}
