//! The shipped automation jobs, each a flow definition over injectable collaborators.

pub mod blog_tweeter;
pub mod git_push;
pub mod liked_tweets;
pub mod price_watcher;
pub mod search;
pub mod stock_summary;
pub mod table;
pub mod twitter;

use crate::core::collab::{
    CommandRunner, EnvSecrets, LogSink, NotificationSink, SecretsProvider, TokioCommandRunner,
    WebhookSink,
};
use crate::core::config::HomeflowConfig;
use crate::core::error::{ConfigError, FlowError, TaskError};
use crate::core::flow::FlowGraph;
use std::sync::Arc;
use std::time::Duration;

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Collaborators handed to job builders.
#[derive(Clone)]
pub struct JobDeps {
    pub secrets: Arc<dyn SecretsProvider>,
    pub notifier: Arc<dyn NotificationSink>,
    pub commands: Arc<dyn CommandRunner>,
    pub http: reqwest::Client,
}

impl JobDeps {
    /// Production collaborators derived from configuration.
    pub fn from_config(config: &HomeflowConfig) -> Result<Self, ConfigError> {
        let notifier: Arc<dyn NotificationSink> = match &config.notify.webhook_url {
            Some(raw) => {
                let url = reqwest::Url::parse(raw).map_err(|err| {
                    ConfigError::Invalid(format!("notify.webhook_url '{}': {}", raw, err))
                })?;
                let sink = WebhookSink::new(url, config.notify.from.clone())
                    .map_err(|err| ConfigError::Invalid(err.to_string()))?;
                Arc::new(sink)
            }
            None => {
                tracing::warn!(
                    "notify.webhook_url is not set; notifications are only logged, not delivered"
                );
                Arc::new(LogSink)
            }
        };

        Ok(Self {
            secrets: Arc::new(EnvSecrets::new(config.secrets.prefix.clone())),
            notifier,
            commands: Arc::new(TokioCommandRunner),
            http: http_client().map_err(|err| ConfigError::Invalid(err.to_string()))?,
        })
    }
}

/// Shared HTTP client with the timeout every job relies on.
pub fn http_client() -> Result<reqwest::Client, TaskError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(concat!("homeflow/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

type BuildFn = fn(&HomeflowConfig, &JobDeps) -> Result<FlowGraph, FlowError>;

/// A named job: its flow builder and the schedule it runs on by default.
pub struct JobDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub default_schedule: Option<&'static str>,
    build: BuildFn,
}

impl JobDefinition {
    pub fn build(&self, config: &HomeflowConfig, deps: &JobDeps) -> Result<FlowGraph, FlowError> {
        (self.build)(config, deps)
    }
}

static JOBS: [JobDefinition; 5] = [
    JobDefinition {
        name: "blog-tweeter",
        description: "Tweet the most recent blog post",
        default_schedule: Some("0 0 * * 3"),
        build: blog_tweeter::build,
    },
    JobDefinition {
        name: "git-push",
        description: "Commit and push every configured repository",
        default_schedule: Some("0 4 * * *"),
        build: git_push::build,
    },
    JobDefinition {
        name: "price-watcher",
        description: "Email when a product price moves away from a price point",
        default_schedule: None,
        build: price_watcher::build,
    },
    JobDefinition {
        name: "stock-summary",
        description: "Email a weekly gain/loss table for held stocks",
        default_schedule: Some("0 21 * * 5"),
        build: stock_summary::build,
    },
    JobDefinition {
        name: "liked-tweets",
        description: "Re-index liked tweets into the search cluster",
        default_schedule: None,
        build: liked_tweets::build,
    },
];

pub fn registry() -> &'static [JobDefinition] {
    &JOBS
}

pub fn find(name: &str) -> Option<&'static JobDefinition> {
    JOBS.iter().find(|job| job.name == name)
}
