use crate::cli::Command;
use std::path::Path;

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Long-running `serve` loop.
    Scheduled,
    /// A single `run` from the terminal.
    Interactive,
    /// Read-only commands (`list`, `explain`, `next`) whose stdout is the product.
    Inspect,
}

impl ExecutionContext {
    /// Inspect commands leave no log file behind.
    pub fn writes_log_file(self) -> bool {
        !matches!(self, ExecutionContext::Inspect)
    }
}

/// Derive the active execution context from a parsed CLI command.
pub fn detect_context(command: &Command) -> ExecutionContext {
    match command {
        Command::Serve(_) => ExecutionContext::Scheduled,
        Command::Run(_) => ExecutionContext::Interactive,
        Command::List(_) | Command::Explain(_) | Command::Next(_) => ExecutionContext::Inspect,
    }
}

/// The `--config` file a command was given, if any.
pub fn config_path(command: &Command) -> Option<&Path> {
    let path = match command {
        Command::Run(args) => &args.config,
        Command::Serve(args) => &args.config,
        Command::List(args) => &args.config,
        Command::Explain(args) => &args.config,
        Command::Next(_) => return None,
    };
    path.as_deref()
}
