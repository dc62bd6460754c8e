//! CLI parser and command dispatch.

mod check;
mod import;
mod ingest;
mod status;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "pagemill")]
#[command(about = "Catalog-driven page-text ingestion for scanned documents")]
#[command(version)]
pub struct Cli {
    /// Data directory or database file (overrides PAGEMILL_DB)
    #[arg(long, short = 't', global = true)]
    data: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest pending catalog documents
    Ingest(IngestArgs),

    /// Seed the catalog from a JSON-lines file
    Import {
        /// File with one JSON object per line
        file: PathBuf,
    },

    /// Show ingestion status counts
    Status,

    /// Check external tool availability
    Check,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Limit number of documents to process (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub limit: usize,

    /// Resume the catalog scan after this row id
    #[arg(long = "start-at")]
    pub start_at: Option<i64>,

    /// Number of concurrent document workers
    #[arg(long, default_value = "4")]
    pub concurrency: usize,

    /// Number of concurrent page workers within one document
    #[arg(long = "page-concurrency", default_value = "1")]
    pub page_concurrency: usize,

    /// Restrict to one catalog collection
    #[arg(long)]
    pub collection: Option<String>,

    /// Re-run documents that already processed successfully
    #[arg(long)]
    pub reprocess: bool,

    /// Rasterization DPI for OCR
    #[arg(long, env = "OCR_DPI", default_value = "300")]
    pub dpi: u32,

    /// OCR language set, e.g. guj+hin
    #[arg(long, env = "OCR_LANGS", default_value = "guj+hin")]
    pub langs: String,

    /// Compute and report the work set without processing anything
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

/// Parse arguments and dispatch to the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.data.as_deref());

    match cli.command {
        Commands::Ingest(args) => ingest::cmd_ingest(&settings, &args).await,
        Commands::Import { file } => import::cmd_import(&settings, &file).await,
        Commands::Status => status::cmd_status(&settings).await,
        Commands::Check => check::cmd_check().await,
    }
}
