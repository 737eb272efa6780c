use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "vidcache", version, about = "Remote video asset cache")]
pub struct Args {
    /// Cache directory (defaults to a vidcache folder under the system
    /// temp dir)
    #[arg(long, env = "VIDCACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Overall download timeout in seconds
    #[arg(long, default_value_t = 60, global = true)]
    pub timeout_secs: u64,

    /// Increase log verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Silence all log output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a remote asset into the cache and print its local path
    Get {
        /// Remote asset URL
        url: String,
    },
    /// Show whether an asset is cached and where it resolves to
    Status {
        /// Remote asset URL
        url: String,
    },
    /// Remove entries older than the given age
    Sweep {
        /// Maximum entry age in seconds
        #[arg(long)]
        max_age_secs: u64,
    },
    /// Remove every cached entry
    Clear,
    /// Print entry count and total cache size
    Stats,
}
