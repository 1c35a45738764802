use super::HomeflowConfig;
use crate::core::error::ConfigError;
use crate::core::schedule::CronSchedule;
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "homeflow.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration, apply environment overrides, and validate.
    ///
    /// An explicit `path` must exist; the default `homeflow.toml` in the working
    /// directory may be absent, in which case defaults are used.
    pub fn load(path: Option<&Path>) -> Result<HomeflowConfig, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?.ok_or_else(|| ConfigError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            })?,
            None => Self::load_from_file(&PathBuf::from(DEFAULT_CONFIG_FILE))?.unwrap_or_default(),
        };

        Self::apply_env_overrides(&mut config);
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Load config from a specific file path.
    /// Returns Ok(None) if the file doesn't exist.
    pub fn load_from_file(path: &Path) -> Result<Option<HomeflowConfig>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: HomeflowConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::debug!(path = %path.display(), "configuration file loaded");
        Ok(Some(config))
    }

    /// Environment variables take precedence over config file values.
    /// Unparseable numbers are ignored with a warning.
    pub fn apply_env_overrides(config: &mut HomeflowConfig) {
        if let Some(limit) = env_usize("HOMEFLOW_PARALLEL_LIMIT") {
            config.runner.parallel_limit = limit;
        }

        if let Some(concurrency) = env_usize("HOMEFLOW_MAP_CONCURRENCY") {
            config.runner.map_concurrency = concurrency;
        }

        if let Ok(url) = env::var("HOMEFLOW_NOTIFY_WEBHOOK_URL") {
            config.notify.webhook_url = Some(url).filter(|url| !url.trim().is_empty());
        }

        if let Ok(prefix) = env::var("HOMEFLOW_SECRETS_PREFIX") {
            config.secrets.prefix = prefix;
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "HOMEFLOW_PARALLEL_LIMIT - Override tasks launched per tick (default: 4)",
            "HOMEFLOW_MAP_CONCURRENCY - Override concurrent children of a mapped task (default: 4)",
            "HOMEFLOW_NOTIFY_WEBHOOK_URL - Override the notification relay URL (empty disables it)",
            "HOMEFLOW_SECRETS_PREFIX - Prefix for secret environment variables (default: none)",
            "HOMEFLOW_LOG_DIR - Override the log directory (default: .homeflow/logs)",
            "HOMEFLOW_CONSOLE_OUTPUT - Console log target: stdout, stderr or none",
            "HOMEFLOW_LOG_FORMAT - Log file format: text or json (default: text)",
        ]
    }

    /// Validate configuration values
    pub fn validate_config(config: &HomeflowConfig) -> Result<(), ConfigError> {
        if config.runner.parallel_limit == 0 {
            return Err(ConfigError::Invalid(
                "runner.parallel_limit must be at least 1".to_string(),
            ));
        }

        if config.runner.map_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "runner.map_concurrency must be at least 1".to_string(),
            ));
        }

        if let Some(url) = &config.notify.webhook_url {
            url::Url::parse(url).map_err(|err| {
                ConfigError::Invalid(format!("notify.webhook_url '{}': {}", url, err))
            })?;
        }

        for (job, schedule) in config.jobs.schedules() {
            if let Some(expr) = schedule {
                CronSchedule::parse(expr)?;
                tracing::debug!(job, schedule = expr, "schedule override accepted");
            }
        }

        let jobs = &config.jobs;
        for (key, value) in [
            ("jobs.blog-tweeter.twitter_api_url", &jobs.blog_tweeter.twitter_api_url),
            ("jobs.stock-summary.quotes_api_url", &jobs.stock_summary.quotes_api_url),
            ("jobs.liked-tweets.twitter_api_url", &jobs.liked_tweets.twitter_api_url),
            ("jobs.liked-tweets.search_url", &jobs.liked_tweets.search_url),
        ] {
            url::Url::parse(value)
                .map_err(|err| ConfigError::Invalid(format!("{} '{}': {}", key, value, err)))?;
        }

        if jobs.stock_summary.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "jobs.stock-summary.batch_size must be at least 1".to_string(),
            ));
        }
        jobs.stock_summary.batch_pause()?;

        Ok(())
    }
}

fn env_usize(name: &str) -> Option<usize> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring non-numeric override");
            None
        }
    }
}
