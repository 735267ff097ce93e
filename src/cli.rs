use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "otf2-convert")]
#[command(about = "Convert recorded MPI call streams into an OTF2-style trace archive", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert per-rank call streams into a trace archive
    Convert {
        /// Archive directory to create
        #[arg(short, long)]
        output: std::path::PathBuf,

        /// Clock resolution in ticks per second
        #[arg(short = 'r', long, default_value = "1000000000")]
        clock_resolution: u64,

        /// Number of ranks in the run (defaults to the number of inputs)
        #[arg(short, long)]
        world_size: Option<u32>,

        /// Log threshold
        #[arg(short, long, value_enum, default_value_t = Verbosity::Warn)]
        verbosity: Verbosity,

        /// Abort on the first recoverable error instead of logging it
        #[arg(long)]
        strict: bool,

        /// Convert into memory without writing an archive
        #[arg(long)]
        dry_run: bool,

        /// Output the conversion summary as JSON
        #[arg(long)]
        json: bool,

        /// Suppress human-readable output (useful with --json)
        #[arg(long)]
        quiet: bool,

        /// Per-rank trace files, or directories containing them
        #[arg(required = true)]
        inputs: Vec<std::path::PathBuf>,
    },
}

/// Severity threshold for diagnostic output, lowest to highest verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Verbosity {
    /// Print nothing
    None,
    /// Only unrecoverable inconsistencies
    Abort,
    /// Errors that were skipped over
    Error,
    /// Degraded results such as unknown datatypes
    Warn,
    /// Progress of the conversion
    Info,
}
