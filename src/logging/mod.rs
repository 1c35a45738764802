pub mod config;
pub mod context;
pub mod layers;

pub use config::{LogFormat, LoggingConfig};
pub use context::{config_path, detect_context, ExecutionContext};
pub use layers::console::ConsoleOutput;

use crate::cli::Command;
use crate::logging::layers::file::Rotation;
use crate::logging::layers::{console, file, BoxedLayer};
use crate::Result;
use anyhow::{anyhow, Context};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Keeps the non-blocking file writer flushing for the duration of the command.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Initialize logging for the provided CLI command.
///
/// `RUST_LOG` wins over `logging.level`. Errors when invoked more than once
/// per process.
pub fn init(command: &Command) -> Result<LoggingGuard> {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let context = detect_context(command);
    let workspace_root = env::current_dir().ok();
    let config = LoggingConfig::load(config_path(command), workspace_root.as_deref())?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("failed to configure tracing level")?;

    let mut sinks: Vec<BoxedLayer> = Vec::new();
    let mut file_guard = None;
    let mut log_dir = None;
    if config.file && context.writes_log_file() {
        let dir = file::log_dir(&config, workspace_root.as_deref())?;
        let (layer, guard) = file::file_layer(&dir, Rotation::for_context(context), config.format)?;
        sinks.push(layer);
        file_guard = Some(guard);
        log_dir = Some(dir);
    }
    let console_output = console::select_console_output(context, config.console);
    if let Some(layer) = console::console_layer(console_output, context) {
        sinks.push(layer);
    }

    tracing_subscriber::registry()
        .with(sinks)
        .with(env_filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    tracing::debug!(
        context = ?context,
        console = %console_output,
        log_dir = ?log_dir,
        "logging initialized"
    );
    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
