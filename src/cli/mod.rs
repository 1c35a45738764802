pub mod args;
pub mod commands;

pub use args::{ExplainArgs, ExplainFormat, ListArgs, NextArgs, RunArgs, ServeArgs};
use clap::{Parser, Subcommand};
use std::process::ExitCode;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
JOB COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "homeflow")]
#[command(version = crate::VERSION)]
#[command(about = "Scheduled home automation jobs on a small task-graph runner")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: list the jobs, explain one, run it once by hand, then serve it on its schedule."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Run a job once",
        long_about = "Run builds the job's flow, resolves parameters, and executes every task once. The exit code is non-zero when any task failed.",
        after_help = "Example:\n    homeflow run price-watcher -p url=https://shop.example/item -p price_point=120 -p email=me@example.com"
    )]
    Run(RunArgs),
    #[command(
        about = "Run a job on its cron schedule",
        long_about = "Serve waits for each tick of the job's schedule and runs the flow, one run at a time. Ticks that pass while a run is in progress are skipped.",
        after_help = "Example:\n    homeflow serve git-push --cron \"0 4 * * *\""
    )]
    Serve(ServeArgs),
    #[command(
        about = "List available jobs and their schedules",
        after_help = "Example:\n    homeflow list"
    )]
    List(ListArgs),
    #[command(
        about = "Show a job's execution order",
        long_about = "Explain prints the task order, inputs, triggers, and branches of a job without running it, or a Graphviz rendering with --format dot.",
        after_help = "Example:\n    homeflow explain stock-summary --format dot | dot -Tsvg > flow.svg"
    )]
    Explain(ExplainArgs),
    #[command(
        about = "Print upcoming fire times of a cron expression",
        after_help = "Example:\n    homeflow next \"0 21 * * 5\" --count 3"
    )]
    Next(NextArgs),
}

/// Result of a command that completed without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    /// At least one task failed in at least one run.
    TasksFailed,
}

impl CommandOutcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            CommandOutcome::Success => ExitCode::SUCCESS,
            CommandOutcome::TasksFailed => ExitCode::from(1),
        }
    }
}

pub async fn run(args: Args) -> crate::Result<CommandOutcome> {
    match args.command {
        Command::Run(run_args) => commands::run(run_args).await,
        Command::Serve(serve_args) => commands::serve(serve_args).await,
        Command::List(list_args) => commands::list(list_args),
        Command::Explain(explain_args) => commands::explain(explain_args),
        Command::Next(next_args) => commands::next(next_args),
    }
}
