//! msav: scan host files for malware through a running ClamAV daemon.
//!
//! # Usage
//!
//! ```text
//! msav version [--socket <path|host:port>]
//! msav scan [PATH]... [--no-file-names] [--json] [--socket <path|host:port>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{scan::ScanArgs, version::VersionArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "msav",
    version,
    about = "Scan files for viruses using a ClamAV daemon",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan files and directories for viruses.
    Scan(ScanArgs),

    /// Show detection engine and database revision.
    Version(VersionArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Scan(args) => args.run(),
        Commands::Version(args) => args.run(),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
