use crate::logging::config::{LogFormat, LoggingConfig};
use crate::logging::context::ExecutionContext;
use crate::logging::layers::BoxedLayer;
use crate::Result;
use anyhow::{anyhow, Context};
use dirs_next::home_dir;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::Layer;

pub const LOG_FILE_PREFIX: &str = "homeflow.log";

/// How the log file is split over time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    /// One file, appended to by every one-shot command.
    Never,
    /// `homeflow.log.YYYY-MM-DD`, for the long-running scheduler.
    Daily,
}

impl Rotation {
    pub fn for_context(context: ExecutionContext) -> Self {
        match context {
            ExecutionContext::Scheduled => Rotation::Daily,
            ExecutionContext::Interactive | ExecutionContext::Inspect => Rotation::Never,
        }
    }
}

/// `<workspace>/.homeflow/logs` unless `log_dir` says otherwise; relative
/// overrides are taken from the workspace, or from `$HOME` without one.
pub fn log_dir(config: &LoggingConfig, workspace_root: Option<&Path>) -> Result<PathBuf> {
    let dir = match (&config.log_dir, workspace_root) {
        (Some(custom), _) if custom.is_absolute() => custom.clone(),
        (Some(custom), Some(workspace)) => workspace.join(custom),
        (Some(custom), None) => home()?.join(custom),
        (None, Some(workspace)) => workspace.join(".homeflow").join("logs"),
        (None, None) => home()?.join(".homeflow").join("logs"),
    };
    Ok(dir)
}

/// Non-blocking file layer; the guard must outlive the command so buffered
/// lines are flushed.
pub fn file_layer(
    dir: &Path,
    rotation: Rotation,
    format: LogFormat,
) -> Result<(BoxedLayer, WorkerGuard)> {
    create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let appender = match rotation {
        Rotation::Never => RollingFileAppender::new(
            tracing_appender::rolling::Rotation::NEVER,
            dir,
            LOG_FILE_PREFIX,
        ),
        Rotation::Daily => tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX),
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);
    let layer = match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
    };
    Ok((layer, guard))
}

fn home() -> Result<PathBuf> {
    home_dir().ok_or_else(|| anyhow!("$HOME directory unavailable"))
}
