pub mod loader;

pub use loader::ConfigLoader;

use crate::core::error::ConfigError;
use crate::core::flow::RunnerConfig;
use crate::core::schedule::CronSchedule;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration loaded from homeflow.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HomeflowConfig {
    #[serde(default)]
    pub runner: RunnerSection,

    /// Where notifications go
    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Per-job settings
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Runner limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSection {
    #[serde(default = "default_parallel_limit")]
    pub parallel_limit: usize,

    #[serde(default = "default_map_concurrency")]
    pub map_concurrency: usize,
}

/// Notification relay. Without a webhook URL notifications are only logged.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Sender address passed to the relay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// Prefix prepended to secret names when reading the environment
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobsConfig {
    #[serde(default, rename = "blog-tweeter")]
    pub blog_tweeter: BlogTweeterConfig,

    #[serde(default, rename = "git-push")]
    pub git_push: GitPushConfig,

    #[serde(default, rename = "price-watcher")]
    pub price_watcher: PriceWatcherConfig,

    #[serde(default, rename = "stock-summary")]
    pub stock_summary: StockSummaryConfig,

    #[serde(default, rename = "liked-tweets")]
    pub liked_tweets: LikedTweetsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogTweeterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    /// CSV with columns Title, MediumLink, BlogLink, Hashtags, Ats
    #[serde(default = "default_blogs_csv")]
    pub csv_path: PathBuf,

    #[serde(default = "default_twitter_api_url")]
    pub twitter_api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BranchRule {
    /// Substring matched against the project path
    pub contains: String,
    pub branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitPushConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    #[serde(default)]
    pub base_path: PathBuf,

    /// Repository directories relative to base_path
    #[serde(default)]
    pub repos: Vec<String>,

    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_branch")]
    pub default_branch: String,

    /// First matching rule wins
    #[serde(default = "default_branch_rules")]
    pub branch_rules: Vec<BranchRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceWatcherConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    #[serde(default = "default_price_subject")]
    pub subject: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSummaryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    /// CSV with columns stock, initial_value
    #[serde(default = "default_stocks_csv")]
    pub csv_path: PathBuf,

    #[serde(default)]
    pub email_to: String,

    #[serde(default = "default_stock_subject")]
    pub subject: String,

    /// Tickers per quote batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause after each batch, humantime format ("70s", "1m 10s")
    #[serde(default = "default_batch_pause")]
    pub batch_pause: String,

    #[serde(default = "default_quotes_api_url")]
    pub quotes_api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikedTweetsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    #[serde(default = "default_twitter_api_url")]
    pub twitter_api_url: String,

    /// Elasticsearch-compatible endpoint
    #[serde(default = "default_search_url")]
    pub search_url: String,
}

// Default functions
fn default_parallel_limit() -> usize {
    RunnerConfig::default().parallel_limit
}

fn default_map_concurrency() -> usize {
    RunnerConfig::default().map_concurrency
}

fn default_blogs_csv() -> PathBuf {
    PathBuf::from("/mnt/shared/blogs.csv")
}

fn default_twitter_api_url() -> String {
    "https://api.twitter.com".to_string()
}

fn default_commit_message() -> String {
    "Automatic commit done by homeflow.".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "develop".to_string()
}

fn default_branch_rules() -> Vec<BranchRule> {
    vec![BranchRule {
        contains: "blog".to_string(),
        branch: "master".to_string(),
    }]
}

fn default_price_subject() -> String {
    "Price Check".to_string()
}

fn default_stocks_csv() -> PathBuf {
    PathBuf::from("./stocks.csv")
}

fn default_stock_subject() -> String {
    "Weekly Holdings Update".to_string()
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_pause() -> String {
    "70s".to_string()
}

fn default_quotes_api_url() -> String {
    "https://www.alphavantage.co".to_string()
}

fn default_search_url() -> String {
    "http://dev.lan:9200".to_string()
}

impl Default for RunnerSection {
    fn default() -> Self {
        RunnerSection {
            parallel_limit: default_parallel_limit(),
            map_concurrency: default_map_concurrency(),
        }
    }
}

impl Default for BlogTweeterConfig {
    fn default() -> Self {
        BlogTweeterConfig {
            schedule: None,
            csv_path: default_blogs_csv(),
            twitter_api_url: default_twitter_api_url(),
        }
    }
}

impl Default for GitPushConfig {
    fn default() -> Self {
        GitPushConfig {
            schedule: None,
            base_path: PathBuf::new(),
            repos: Vec::new(),
            commit_message: default_commit_message(),
            remote: default_remote(),
            default_branch: default_branch(),
            branch_rules: default_branch_rules(),
        }
    }
}

impl Default for PriceWatcherConfig {
    fn default() -> Self {
        PriceWatcherConfig {
            schedule: None,
            subject: default_price_subject(),
        }
    }
}

impl Default for StockSummaryConfig {
    fn default() -> Self {
        StockSummaryConfig {
            schedule: None,
            csv_path: default_stocks_csv(),
            email_to: String::new(),
            subject: default_stock_subject(),
            batch_size: default_batch_size(),
            batch_pause: default_batch_pause(),
            quotes_api_url: default_quotes_api_url(),
        }
    }
}

impl Default for LikedTweetsConfig {
    fn default() -> Self {
        LikedTweetsConfig {
            schedule: None,
            twitter_api_url: default_twitter_api_url(),
            search_url: default_search_url(),
        }
    }
}

impl RunnerSection {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            parallel_limit: self.parallel_limit,
            map_concurrency: self.map_concurrency,
        }
    }
}

impl GitPushConfig {
    /// Branch pushed for a project path.
    pub fn branch_for(&self, project: &str) -> &str {
        self.branch_rules
            .iter()
            .find(|rule| project.contains(&rule.contains))
            .map(|rule| rule.branch.as_str())
            .unwrap_or(&self.default_branch)
    }
}

impl StockSummaryConfig {
    pub fn batch_pause(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(&self.batch_pause).map_err(|err| {
            ConfigError::Invalid(format!(
                "jobs.stock-summary.batch_pause '{}': {}",
                self.batch_pause, err
            ))
        })
    }
}

impl JobsConfig {
    /// Schedule override configured for a job, if any.
    pub fn schedule_override(&self, job: &str) -> Option<&str> {
        let schedule = match job {
            "blog-tweeter" => &self.blog_tweeter.schedule,
            "git-push" => &self.git_push.schedule,
            "price-watcher" => &self.price_watcher.schedule,
            "stock-summary" => &self.stock_summary.schedule,
            "liked-tweets" => &self.liked_tweets.schedule,
            _ => return None,
        };
        schedule.as_deref()
    }

    /// Parsed schedule overrides, for validation.
    pub(crate) fn schedules(&self) -> Vec<(&'static str, Option<&str>)> {
        vec![
            ("blog-tweeter", self.blog_tweeter.schedule.as_deref()),
            ("git-push", self.git_push.schedule.as_deref()),
            ("price-watcher", self.price_watcher.schedule.as_deref()),
            ("stock-summary", self.stock_summary.schedule.as_deref()),
            ("liked-tweets", self.liked_tweets.schedule.as_deref()),
        ]
    }
}

/// Resolve the schedule for a job: configured override, else the job's default.
pub fn effective_schedule(
    config: &HomeflowConfig,
    job: &str,
    default: Option<&str>,
) -> Result<Option<CronSchedule>, ConfigError> {
    config
        .jobs
        .schedule_override(job)
        .or(default)
        .map(CronSchedule::parse)
        .transpose()
        .map_err(ConfigError::from)
}
