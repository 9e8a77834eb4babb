//! CLI command definitions

use clap::Args;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to the pipeline YAML file
    pub file: String,

    /// Maximum number of jobs to run concurrently
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Validate and print the execution plan without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Directory for the dependency cache (defaults to the data dir)
    #[arg(long)]
    pub cache_dir: Option<String>,

    /// Don't save this run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the pipeline YAML file
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run by ID
    #[arg(long)]
    pub run_id: Option<String>,
}
