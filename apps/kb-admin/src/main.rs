//! Knowledge base administration binary
//!
//! Ingests knowledge facts into the corpus snapshot and lets an operator try
//! retrieval and answer verification against it.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use grounding_core::search::RetrievalMode;
use grounding_core::verifier::render_report;
use grounding_core::{EngineConfig, KnowledgeBase};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "kb-admin")]
#[command(version, about = "Build and query the grounding knowledge base")]
struct Args {
    /// Snapshot file (overrides GROUNDING_SNAPSHOT_PATH)
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace the corpus with the facts in FILE, one per line
    Ingest { file: PathBuf },

    /// Retrieve the documents closest to QUERY
    Search {
        query: String,

        /// Number of results
        #[arg(short)]
        k: Option<usize>,

        /// hybrid, lexical (tfidf) or semantic
        #[arg(long, default_value = "hybrid")]
        mode: RetrievalMode,
    },

    /// Retrieve sources for QUERY and classify ANSWER against them
    Verify {
        query: String,

        #[arg(long)]
        answer: String,

        /// Number of sources
        #[arg(short)]
        k: Option<usize>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries command output only
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = EngineConfig::from_env()?;
    if let Some(path) = args.snapshot {
        config = config.with_snapshot_path(path);
    }
    tracing::info!(
        "Starting kb-admin v{} (snapshot: {:?})",
        env!("CARGO_PKG_VERSION"),
        config.snapshot_path
    );

    let kb = KnowledgeBase::new(&config);

    match args.command {
        Command::Ingest { file } => {
            let documents = read_facts(&file)?;
            let stats = kb.rebuild(documents);
            println!("documents:  {}", stats.documents);
            println!("vocabulary: {}", stats.vocabulary);
            match stats.semantic_dimension {
                Some(dim) => println!("semantic:   {} dimensions", dim),
                None => println!("semantic:   unavailable (lexical only)"),
            }
            println!("persisted:  {}", stats.persisted);
        }
        Command::Search { query, k, mode } => {
            let k = k.unwrap_or(kb.default_k());
            let results = kb.retrieve_with(mode, &query, k);
            if results.is_empty() {
                println!("No documents found.");
            }
            for (rank, result) in results.iter().enumerate() {
                println!(
                    "{}. [{} #{} {:.3}] {}",
                    rank + 1,
                    result.source,
                    result.index,
                    result.similarity_score,
                    result.document
                );
            }
        }
        Command::Verify { query, answer, k } => {
            let k = k.unwrap_or(kb.default_k());
            let results = kb.retrieve(&query, k);
            let outcome = kb.classify(&results, &answer);
            println!("{}", render_report(&answer, &outcome, Local::now()));
        }
    }

    Ok(())
}

/// One fact per non-blank line, trimmed
fn read_facts(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(parse_facts(&text))
}

fn parse_facts(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
