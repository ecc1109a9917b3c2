use af_core::Mode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "archiveforge")]
#[command(author, version, about = "Batch derivation of archival masters and sharing proxies")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate masters and proxies for every entry in a catalog
    Derive {
        /// Catalog file (CSV, or TSV by extension)
        #[arg(required = true)]
        catalog: PathBuf,

        /// Which derivatives to produce (masters-only, proxies-only, both)
        #[arg(long)]
        mode: Option<Mode>,

        /// Number of concurrent workers (0 = number of CPUs)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Failure log path
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Stamp provenance metadata onto existing masters and proxies
    Stamp {
        /// Directory to search for derivatives
        #[arg(required = true)]
        dir: PathBuf,

        /// Number of concurrent workers (0 = number of CPUs)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Failure log path
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Show the derivatives a catalog would produce without running anything
    Plan {
        /// Catalog file (CSV, or TSV by extension)
        #[arg(required = true)]
        catalog: PathBuf,

        /// Which derivatives to plan (masters-only, proxies-only, both)
        #[arg(long)]
        mode: Option<Mode>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
