use clap::{Args, ValueEnum};
use std::path::PathBuf;

#[derive(Args)]
pub struct RunArgs {
    /// Job to run (see `homeflow list`)
    #[arg(value_name = "JOB")]
    pub job: String,

    /// Flow parameter as NAME=VALUE; VALUE is read as JSON when it parses (repeatable)
    #[arg(long = "param", short = 'p', value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// Configuration file (default: ./homeflow.toml when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override runner.parallel_limit for this run
    #[arg(long, value_name = "N")]
    pub parallel: Option<usize>,

    /// Print the full run result as JSON instead of the task table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Job to serve on its schedule
    #[arg(value_name = "JOB")]
    pub job: String,

    /// Cron expression overriding the configured or default schedule
    #[arg(long, value_name = "EXPR")]
    pub cron: Option<String>,

    /// Stop after this many runs (default: run until interrupted)
    #[arg(long, value_name = "N")]
    pub max_runs: Option<usize>,

    /// Flow parameter as NAME=VALUE, applied to every run (repeatable)
    #[arg(long = "param", short = 'p', value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// Configuration file (default: ./homeflow.toml when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct ListArgs {
    /// Configuration file, used to show schedule overrides
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ExplainFormat {
    #[default]
    Text,
    Dot,
    Json,
}

#[derive(Args)]
pub struct ExplainArgs {
    /// Job whose flow should be described
    #[arg(value_name = "JOB")]
    pub job: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = ExplainFormat::Text)]
    pub format: ExplainFormat,

    /// Configuration file (default: ./homeflow.toml when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct NextArgs {
    /// Five-field cron expression, quoted
    #[arg(value_name = "EXPR")]
    pub expr: String,

    /// Number of fire times to print
    #[arg(long, default_value = "5", value_name = "N")]
    pub count: usize,
}
