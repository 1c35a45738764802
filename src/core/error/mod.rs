//! Error taxonomy for flow construction, scheduling, parameters, and task bodies.
//!
//! Every error carries a stable code so log lines and CLI output can be grepped
//! without depending on message wording.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed topology, detected by [`crate::core::flow::FlowBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("task '{0}' is registered more than once")]
    DuplicateTask(String),
    #[error("task '{task}' references unknown upstream '{upstream}'")]
    UnknownUpstream { task: String, upstream: String },
    #[error("task '{task}' references undeclared parameter '{parameter}'")]
    UnknownParameter { task: String, parameter: String },
    #[error("parameter '{0}' is declared more than once")]
    DuplicateParameter(String),
    #[error("cycle detected between tasks: {}", .0.join(", "))]
    Cycle(Vec<String>),
    #[error("conditional branch guarded by '{0}' was never closed")]
    UnclosedBranch(String),
    #[error("end_case called without an open conditional branch")]
    NoOpenBranch,
    #[error("mapped task '{0}' maps over a constant that is not a list")]
    EmptyMap(String),
    #[error("edge references unknown task '{0}'")]
    UnknownTask(String),
}

impl GraphError {
    pub fn code(&self) -> &'static str {
        match self {
            GraphError::DuplicateTask(_) => "FLOW-GRAPH-001",
            GraphError::UnknownUpstream { .. } => "FLOW-GRAPH-002",
            GraphError::UnknownParameter { .. } => "FLOW-GRAPH-003",
            GraphError::DuplicateParameter(_) => "FLOW-GRAPH-004",
            GraphError::Cycle(_) => "FLOW-GRAPH-005",
            GraphError::UnclosedBranch(_) => "FLOW-GRAPH-006",
            GraphError::NoOpenBranch => "FLOW-GRAPH-007",
            GraphError::EmptyMap(_) => "FLOW-GRAPH-008",
            GraphError::UnknownTask(_) => "FLOW-GRAPH-009",
        }
    }
}

/// Malformed or unsatisfiable recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("cron expression '{expr}' must have 5 fields, found {found}")]
    FieldCount { expr: String, found: usize },
    #[error("cron {field} field '{value}' must be '*' or a number")]
    InvalidField { field: &'static str, value: String },
    #[error("cron {field} value {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("cron expression '{0}' can never fire")]
    ImpossibleDate(String),
    #[error("cron expression '{0}' has no upcoming fire time")]
    NoUpcoming(String),
}

impl ScheduleError {
    pub fn code(&self) -> &'static str {
        match self {
            ScheduleError::FieldCount { .. } => "FLOW-SCHED-001",
            ScheduleError::InvalidField { .. } => "FLOW-SCHED-002",
            ScheduleError::OutOfRange { .. } => "FLOW-SCHED-003",
            ScheduleError::ImpossibleDate(_) => "FLOW-SCHED-004",
            ScheduleError::NoUpcoming(_) => "FLOW-SCHED-005",
        }
    }
}

/// Run-start parameter resolution failure. No task has executed when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("missing required parameters: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("unexpected parameters: {}", .0.join(", "))]
    Unknown(Vec<String>),
    #[error("invalid parameter '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

impl ParameterError {
    pub fn code(&self) -> &'static str {
        match self {
            ParameterError::Missing(_) => "FLOW-PARAM-001",
            ParameterError::Unknown(_) => "FLOW-PARAM-002",
            ParameterError::Invalid { .. } => "FLOW-PARAM-003",
        }
    }
}

/// Error raised by a task body. Recorded on the task, never propagated out of the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskError {
    pub code: String,
    pub message: String,
    pub context: BTreeMap<String, String>,
}

impl TaskError {
    pub fn new<T: Into<String>>(message: T) -> Self {
        TaskError {
            code: "TASK-001".to_string(),
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn add_context(&mut self, key: &str, value: &str) {
        self.context.insert(key.to_string(), value.to_string());
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if !self.context.is_empty() {
            write!(f, " (Context: {:?})", self.context)?;
        }
        Ok(())
    }
}

impl std::error::Error for TaskError {}

impl From<anyhow::Error> for TaskError {
    fn from(e: anyhow::Error) -> Self {
        TaskError::new(format!("{:#}", e)).with_code("TASK-ANYHOW")
    }
}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> Self {
        TaskError::new(e.to_string()).with_code("TASK-IO")
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(e: serde_json::Error) -> Self {
        TaskError::new(e.to_string()).with_code("TASK-JSON")
    }
}

impl From<reqwest::Error> for TaskError {
    fn from(e: reqwest::Error) -> Self {
        let mut error = TaskError::new(e.to_string()).with_code("TASK-HTTP");
        if let Some(status) = e.status() {
            error.add_context("status", status.as_str());
        }
        if let Some(url) = e.url() {
            error.add_context("url", url.as_str());
        }
        error
    }
}

/// Configuration file or environment problem, fatal at process start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Umbrella error for callers that want a single type.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl FlowError {
    pub fn code(&self) -> &str {
        match self {
            FlowError::Graph(err) => err.code(),
            FlowError::Schedule(err) => err.code(),
            FlowError::Parameter(err) => err.code(),
            FlowError::Task(err) => &err.code,
            FlowError::Config(_) => "FLOW-CONFIG-001",
        }
    }
}
