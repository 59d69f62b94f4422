//! `councildb`: ingest council documents and run questions through the
//! retrieval pipeline from the command line.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use councildb_core::config::Config;

#[derive(Parser)]
#[command(name = "councildb", version, about = "Retrieval over council minutes, agendas and resolutions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process, embed and persist every document under DIR.
    Ingest {
        /// Defaults to `data.docs_dir`.
        dir: Option<PathBuf>,
        /// Make the ingested documents private to this user.
        #[arg(long)]
        owner: Option<String>,
    },
    /// Run a question through the retrieval pipeline.
    Ask {
        question: String,
        #[arg(long)]
        user: Option<String>,
        /// Skip the LLM rewrite and hypothetical-answer stages.
        #[arg(long)]
        no_llm: bool,
    },
    /// Document, chunk and cache counts.
    Stats,
    /// Re-embed the persisted corpus with the configured provider.
    Reprocess,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let settings = Config::load()?.settings()?;
    match cli.command {
        Command::Ingest { dir, owner } => commands::ingest(&settings, dir, owner).await,
        Command::Ask { question, user, no_llm } => commands::ask(&settings, &question, user.as_deref(), no_llm).await,
        Command::Stats => commands::stats(&settings).await,
        Command::Reprocess => commands::reprocess(&settings).await,
    }
}
