use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments for the `racebench` binary.
#[derive(Debug, Parser)]
#[command(name = "racebench", version, about = "LLM provider race engine")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "RACEBENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter string, e.g. "info" or "server=debug,race=debug".
    #[arg(long, env = "RACEBENCH_LOG", default_value = "info")]
    pub log_filter: String,
}
