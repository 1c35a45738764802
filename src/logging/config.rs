use crate::core::config::loader::DEFAULT_CONFIG_FILE;
use crate::logging::layers::console::ConsoleOutput;
use crate::Result;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::filter::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

/// Line format of the log file. The console is always human-readable.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!(
                "invalid logging.format '{}'; expected text or json",
                value
            )),
        }
    }
}

/// The `[logging]` table of homeflow.toml after environment overrides.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    pub level: String,
    pub file: bool,
    pub format: LogFormat,
    pub console: Option<ConsoleOutput>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            level: DEFAULT_LEVEL.to_string(),
            file: true,
            format: LogFormat::default(),
            console: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoggingFile {
    logging: Option<LoggingSection>,
}

#[derive(Debug, Deserialize)]
struct LoggingSection {
    log_dir: Option<PathBuf>,
    level: Option<String>,
    file: Option<bool>,
    format: Option<LogFormat>,
    console: Option<ConsoleOutput>,
}

impl LoggingConfig {
    /// Read `[logging]` from the command's config file (else `./homeflow.toml`),
    /// then apply `HOMEFLOW_LOG_*` overrides. A missing file means defaults;
    /// the job configuration loader reports it if it was required.
    pub fn load(config_file: Option<&Path>, workspace_root: Option<&Path>) -> Result<Self> {
        let path = match (config_file, workspace_root) {
            (Some(path), _) => Some(path.to_path_buf()),
            (None, Some(root)) => Some(root.join(DEFAULT_CONFIG_FILE)),
            (None, None) => None,
        };

        let mut config = LoggingConfig::default();
        if let Some(section) = path.as_deref().map(read_section).transpose()?.flatten() {
            config.merge(section);
        }
        config.apply_env_overrides()?;
        EnvFilter::try_new(&config.level)
            .map_err(|err| anyhow!("logging.level '{}': {}", config.level, err))?;
        Ok(config)
    }

    fn merge(&mut self, section: LoggingSection) {
        self.log_dir = section.log_dir.or(self.log_dir.take());
        if let Some(level) = section.level {
            self.level = level;
        }
        self.file = section.file.unwrap_or(self.file);
        self.format = section.format.unwrap_or(self.format);
        self.console = section.console.or(self.console);
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(dir) = non_empty_env("HOMEFLOW_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = non_empty_env("HOMEFLOW_CONSOLE_OUTPUT") {
            self.console = Some(raw.parse().map_err(|err: String| anyhow!(err))?);
        }
        if let Some(raw) = non_empty_env("HOMEFLOW_LOG_FORMAT") {
            self.format = raw.parse().map_err(|err: String| anyhow!(err))?;
        }
        Ok(())
    }
}

fn read_section(path: &Path) -> Result<Option<LoggingSection>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: LoggingFile = toml::from_str(&content)
        .with_context(|| format!("failed to parse [logging] in {}", path.display()))?;
    Ok(parsed.logging)
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
