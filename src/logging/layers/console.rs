use crate::logging::context::ExecutionContext;
use crate::logging::layers::BoxedLayer;
use serde::Deserialize;
use std::fmt;
use std::io::{self, IsTerminal};
use std::str::FromStr;
use tracing_subscriber::Layer;

/// Where console logs should be emitted.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleOutput {
    Stdout,
    #[default]
    Stderr,
    None,
}

impl fmt::Display for ConsoleOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsoleOutput::Stdout => "stdout",
            ConsoleOutput::Stderr => "stderr",
            ConsoleOutput::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for ConsoleOutput {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "stdout" => Ok(ConsoleOutput::Stdout),
            "stderr" => Ok(ConsoleOutput::Stderr),
            "none" => Ok(ConsoleOutput::None),
            _ => Err(format!(
                "invalid logging.console '{}'; expected stdout, stderr or none",
                value
            )),
        }
    }
}

/// `run` and `serve` log to stderr; inspection commands print only their result.
pub fn select_console_output(
    context: ExecutionContext,
    configured: Option<ConsoleOutput>,
) -> ConsoleOutput {
    match context {
        ExecutionContext::Scheduled | ExecutionContext::Interactive => {
            configured.unwrap_or(ConsoleOutput::Stderr)
        }
        ExecutionContext::Inspect => configured.unwrap_or(ConsoleOutput::None),
    }
}

/// Console layer, or `None` when console logging is off.
///
/// The scheduler keeps timestamps since its output is usually captured by a
/// service manager; a one-shot `run` prints compact lines.
pub fn console_layer(output: ConsoleOutput, context: ExecutionContext) -> Option<BoxedLayer> {
    let to_stdout = match output {
        ConsoleOutput::None => return None,
        ConsoleOutput::Stdout => true,
        ConsoleOutput::Stderr => false,
    };
    let ansi = if to_stdout {
        io::stdout().is_terminal()
    } else {
        io::stderr().is_terminal()
    };
    let base = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(ansi);

    let layer = match (context == ExecutionContext::Scheduled, to_stdout) {
        (true, true) => base.with_writer(io::stdout).boxed(),
        (true, false) => base.with_writer(io::stderr).boxed(),
        (false, true) => base.compact().without_time().with_writer(io::stdout).boxed(),
        (false, false) => base.compact().without_time().with_writer(io::stderr).boxed(),
    };
    Some(layer)
}
