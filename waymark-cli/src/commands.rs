use std::path::PathBuf;

use clap::Subcommand;

use crate::args::*;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute a playbook, resuming from its checkpoint when one exists.
    Run {
        path: PathBuf,
        /// Start fresh, discarding any saved checkpoint first.
        #[arg(long)]
        no_resume: bool,
        /// Checkpoint backend: `file:<dir>`, `postgres:<url>`, or `none`.
        #[arg(long, default_value = "file:.waymark")]
        checkpoint: String,
        #[arg(long, default_value = "stdout")]
        events: String,
        /// Cap on concurrently executing requests (default 8).
        #[arg(long)]
        max_parallel: Option<usize>,
        /// Seed a variable before the run; VALUE is parsed as JSON when it
        /// is valid JSON, otherwise taken as a string.
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
        #[arg(long)]
        run_id: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Parse a playbook and report every validation violation.
    Validate {
        path: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
}
