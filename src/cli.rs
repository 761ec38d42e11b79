//! CLI argument definitions using clap derive macros.

use clap::{Args as ClapArgs, Parser, Subcommand};

use ctgov_ingest::ConfigOverrides;

/// Ingest clinical-trial study records into the raw warehouse table.
///
/// Configuration comes from environment variables (a `.env` file is read
/// when present); flags on `ingest` override them for one run.
#[derive(Parser, Debug)]
#[command(name = "ctgov-ingest")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch studies from the registry and store them
    Ingest(IngestArgs),

    /// Check warehouse connectivity and report the raw table row count
    Ping,
}

#[derive(ClapArgs, Debug, Default)]
pub struct IngestArgs {
    /// Output sink: file or warehouse
    #[arg(long)]
    pub sink: Option<String>,

    /// Studies per page (1-1000)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub page_size: Option<u32>,

    /// Maximum pages to fetch (0 for unlimited)
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Maximum records to keep (0 for unlimited)
    #[arg(long)]
    pub max_records: Option<usize>,

    /// Earliest first-submission date (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: Option<String>,

    /// Latest first-submission date (YYYY-MM-DD or MAX)
    #[arg(long)]
    pub end_date: Option<String>,

    /// Per-request timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout_secs: Option<u64>,

    /// Rows per committed warehouse chunk
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Print the invocation status JSON after a successful run
    #[arg(long)]
    pub emit_status: bool,
}

impl IngestArgs {
    /// Converts the flags into configuration overrides.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            page_size: self.page_size,
            max_pages: self.max_pages,
            max_records: self.max_records,
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            timeout_secs: self.timeout_secs,
            sink: self.sink.clone(),
            insert_chunk: self.chunk_size,
        }
    }
}
