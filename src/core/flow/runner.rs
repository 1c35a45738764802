use crate::core::collab::secrets::{EnvSecrets, SecretsProvider};
use crate::core::error::{ParameterError, TaskError};
use crate::core::flow::graph::FlowGraph;
use crate::core::flow::parameter::{resolve_parameters, ParameterValues};
use crate::core::flow::task::{Input, TaskContext, TaskFn, TaskInputs, Trigger};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const DEFAULT_PARALLEL_LIMIT: usize = 4;
const DEFAULT_MAP_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Skipped,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Skipped | TaskState::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::Skipped => "skipped",
            TaskState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task was not invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The guard succeeded with a value other than the expected boolean.
    BranchNotTaken { guard: String, expected: bool },
    /// The guard itself failed or was skipped.
    GuardUnavailable { guard: String, state: TaskState },
    /// An upstream failed or was skipped.
    Upstream { upstream: String, state: TaskState },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    /// Per-element states of a mapped task.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskState>,
}

impl TaskRecord {
    fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            output: None,
            error: None,
            skip_reason: None,
            started_at: None,
            duration_ms: 0,
            children: Vec::new(),
        }
    }

    fn skip(&mut self, reason: SkipReason) {
        self.state = TaskState::Skipped;
        self.skip_reason = Some(reason);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

/// Outcome of one run of a flow.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub flow: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Records in execution order.
    pub tasks: IndexMap<String, TaskRecord>,
}

impl RunResult {
    pub fn status(&self) -> RunStatus {
        if self.failed_tasks().is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Failed
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == RunStatus::Success
    }

    /// Failed tasks in execution order.
    pub fn failed_tasks(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|(_, record)| record.state == TaskState::Failed)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn first_error(&self) -> Option<(&str, &TaskError)> {
        self.tasks.iter().find_map(|(name, record)| {
            record
                .error
                .as_ref()
                .map(|error| (name.as_str(), error))
        })
    }

    pub fn record(&self, task: &str) -> Option<&TaskRecord> {
        self.tasks.get(task)
    }

    pub fn state(&self, task: &str) -> Option<TaskState> {
        self.record(task).map(|record| record.state)
    }

    pub fn output(&self, task: &str) -> Option<&Value> {
        self.record(task).and_then(|record| record.output.as_ref())
    }

    pub fn count(&self, state: TaskState) -> usize {
        self.tasks
            .values()
            .filter(|record| record.state == state)
            .count()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Tasks launched per tick.
    pub parallel_limit: usize,
    /// Concurrent children of a single mapped task.
    pub map_concurrency: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallel_limit: DEFAULT_PARALLEL_LIMIT,
            map_concurrency: DEFAULT_MAP_CONCURRENCY,
        }
    }
}

/// Executes a [`FlowGraph`] once per call. Holds no per-run state.
#[derive(Clone)]
pub struct FlowRunner {
    config: RunnerConfig,
    secrets: Arc<dyn SecretsProvider>,
}

impl Default for FlowRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

impl FlowRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config: RunnerConfig {
                parallel_limit: config.parallel_limit.max(1),
                map_concurrency: config.map_concurrency.max(1),
            },
            secrets: Arc::new(EnvSecrets::default()),
        }
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretsProvider>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn config(&self) -> RunnerConfig {
        self.config
    }

    pub async fn run(
        &self,
        graph: &FlowGraph,
        parameters: ParameterValues,
    ) -> Result<RunResult, ParameterError> {
        self.run_scheduled(graph, parameters, None).await
    }

    /// Run the flow to completion. Only parameter resolution can fail the call;
    /// task failures are recorded in the result.
    pub async fn run_scheduled(
        &self,
        graph: &FlowGraph,
        parameters: ParameterValues,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> Result<RunResult, ParameterError> {
        let parameters = resolve_parameters(graph.parameters(), parameters)?;
        let run = RunState {
            graph,
            parameters,
            records: vec![TaskRecord::pending(); graph.len()],
            run_id: Uuid::new_v4(),
        };
        Ok(run.execute(self, scheduled_for).await)
    }
}

struct RunState<'g> {
    graph: &'g FlowGraph,
    parameters: ParameterValues,
    records: Vec<TaskRecord>,
    run_id: Uuid,
}

/// Inputs with their map markers, resolved against the current run state.
struct PreparedCall {
    idx: usize,
    args: Vec<(Value, bool)>,
    kwargs: IndexMap<String, (Value, bool)>,
    mapped: bool,
}

struct CallOutcome {
    idx: usize,
    result: Result<Value, TaskError>,
    children: Vec<TaskState>,
    started_at: DateTime<Utc>,
    duration_ms: u64,
}

impl<'g> RunState<'g> {
    async fn execute(
        mut self,
        runner: &FlowRunner,
        scheduled_for: Option<DateTime<Utc>>,
    ) -> RunResult {
        let started_at = Utc::now();
        tracing::info!(
            flow = %self.graph.name(),
            run_id = %self.run_id,
            tasks = self.graph.len(),
            "flow run started"
        );

        loop {
            let ready = self.settle();
            if ready.is_empty() {
                break;
            }

            let mut calls = Vec::new();
            for idx in ready.into_iter().take(runner.config.parallel_limit) {
                self.records[idx].state = TaskState::Running;
                tracing::debug!(task = %self.graph.spec_at(idx).name(), "task running");
                let call = self.prepare(idx);
                let spec = self.graph.spec_at(idx);
                let ctx = TaskContext::new(
                    self.run_id,
                    self.graph.name(),
                    spec.name(),
                    Arc::clone(&runner.secrets),
                );
                calls.push(invoke(
                    Arc::clone(&spec.func),
                    call,
                    ctx,
                    runner.config.map_concurrency,
                ));
            }

            for outcome in join_all(calls).await {
                self.record(outcome);
            }
        }

        let completed_at = Utc::now();
        let mut tasks = IndexMap::with_capacity(self.graph.len());
        for &idx in self.graph.order_indices() {
            let record = std::mem::replace(&mut self.records[idx], TaskRecord::pending());
            tasks.insert(self.graph.spec_at(idx).name().to_string(), record);
        }
        let result = RunResult {
            run_id: self.run_id,
            flow: self.graph.name().to_string(),
            scheduled_for,
            started_at,
            completed_at,
            tasks,
        };

        match result.first_error() {
            None => tracing::info!(
                flow = %result.flow,
                run_id = %result.run_id,
                succeeded = result.count(TaskState::Success),
                skipped = result.count(TaskState::Skipped),
                duration_ms = result.duration_ms(),
                "flow run finished"
            ),
            Some((task, error)) => tracing::warn!(
                flow = %result.flow,
                run_id = %result.run_id,
                failed = ?result.failed_tasks(),
                first_failed = %task,
                error = %error,
                "flow run finished with failures"
            ),
        }
        result
    }

    /// Resolve gates for every pending task whose upstreams are terminal.
    /// Gated-off tasks become Skipped in place; the rest are returned in execution order.
    fn settle(&mut self) -> Vec<usize> {
        let mut ready = Vec::new();
        for &idx in self.graph.order_indices() {
            if self.records[idx].state != TaskState::Pending {
                continue;
            }
            let upstreams = self.graph.upstream_indices(idx);
            if !upstreams
                .iter()
                .all(|&up| self.records[up].state.is_terminal())
            {
                continue;
            }
            match self.gate(idx) {
                Some(reason) => {
                    tracing::debug!(
                        task = %self.graph.spec_at(idx).name(),
                        reason = ?reason,
                        "task skipped"
                    );
                    self.records[idx].skip(reason);
                }
                None => ready.push(idx),
            }
        }
        ready
    }

    fn gate(&self, idx: usize) -> Option<SkipReason> {
        for &branch in self.graph.branch_indices(idx) {
            let branch = self.graph.branch_at(branch);
            let guard = self.graph.index_of(&branch.guard)?;
            let record = &self.records[guard];
            if record.state != TaskState::Success {
                return Some(SkipReason::GuardUnavailable {
                    guard: branch.guard.clone(),
                    state: record.state,
                });
            }
            if record.output != Some(Value::Bool(branch.expected)) {
                return Some(SkipReason::BranchNotTaken {
                    guard: branch.guard.clone(),
                    expected: branch.expected,
                });
            }
        }

        if self.graph.spec_at(idx).trigger_kind() == Trigger::Always {
            return None;
        }
        self.graph
            .upstream_indices(idx)
            .iter()
            .find(|&&up| self.records[up].state != TaskState::Success)
            .map(|&up| SkipReason::Upstream {
                upstream: self.graph.spec_at(up).name().to_string(),
                state: self.records[up].state,
            })
    }

    fn prepare(&self, idx: usize) -> PreparedCall {
        let spec = self.graph.spec_at(idx);
        let args = spec
            .args
            .iter()
            .map(|arg| (self.resolve(&arg.input), arg.mapped))
            .collect();
        let kwargs = spec
            .kwargs
            .iter()
            .map(|(name, arg)| (name.clone(), (self.resolve(&arg.input), arg.mapped)))
            .collect();
        PreparedCall {
            idx,
            args,
            kwargs,
            mapped: spec.is_mapped(),
        }
    }

    /// Unavailable upstream outputs (only reachable by `Always` tasks) resolve to null.
    fn resolve(&self, input: &Input) -> Value {
        match input {
            Input::Task(name) => self
                .graph
                .index_of(name)
                .and_then(|up| self.records[up].output.clone())
                .unwrap_or(Value::Null),
            Input::Param(name) => self.parameters.get(name).cloned().unwrap_or(Value::Null),
            Input::Value(value) => value.clone(),
        }
    }

    fn record(&mut self, outcome: CallOutcome) {
        let name = self.graph.spec_at(outcome.idx).name();
        let record = &mut self.records[outcome.idx];
        record.started_at = Some(outcome.started_at);
        record.duration_ms = outcome.duration_ms;
        record.children = outcome.children;
        match outcome.result {
            Ok(output) => {
                tracing::debug!(task = %name, duration_ms = outcome.duration_ms, "task succeeded");
                record.state = TaskState::Success;
                record.output = Some(output);
            }
            Err(error) => {
                tracing::warn!(task = %name, error = %error, "task failed");
                record.state = TaskState::Failed;
                record.error = Some(error);
            }
        }
    }
}

async fn invoke(
    func: Arc<dyn TaskFn>,
    call: PreparedCall,
    ctx: TaskContext,
    map_concurrency: usize,
) -> CallOutcome {
    let started_at = Utc::now();
    let clock = Instant::now();
    let idx = call.idx;
    let (result, children) = if call.mapped {
        invoke_mapped(func, call, ctx, map_concurrency).await
    } else {
        let inputs = TaskInputs {
            args: call.args.into_iter().map(|(value, _)| value).collect(),
            kwargs: call
                .kwargs
                .into_iter()
                .map(|(name, (value, _))| (name, value))
                .collect(),
        };
        (func.call(inputs, ctx).await, Vec::new())
    };
    CallOutcome {
        idx,
        result,
        children,
        started_at,
        duration_ms: clock.elapsed().as_millis() as u64,
    }
}

/// One child per element of the mapped inputs, results kept in input order.
async fn invoke_mapped(
    func: Arc<dyn TaskFn>,
    call: PreparedCall,
    ctx: TaskContext,
    map_concurrency: usize,
) -> (Result<Value, TaskError>, Vec<TaskState>) {
    let width = match mapped_width(&call, &ctx.task_name) {
        Ok(width) => width,
        Err(error) => return (Err(error), Vec::new()),
    };

    let children: Vec<Result<Value, TaskError>> = stream::iter(0..width)
        .map(|index| {
            let inputs = TaskInputs {
                args: call
                    .args
                    .iter()
                    .map(|(value, mapped)| element(value, *mapped, index))
                    .collect(),
                kwargs: call
                    .kwargs
                    .iter()
                    .map(|(name, (value, mapped))| (name.clone(), element(value, *mapped, index)))
                    .collect(),
            };
            let func = Arc::clone(&func);
            let ctx = ctx.for_child(index);
            async move { func.call(inputs, ctx).await }
        })
        .buffered(map_concurrency)
        .collect()
        .await;

    let states: Vec<TaskState> = children
        .iter()
        .map(|child| match child {
            Ok(_) => TaskState::Success,
            Err(_) => TaskState::Failed,
        })
        .collect();

    let mut outputs = Vec::with_capacity(width);
    for (index, child) in children.into_iter().enumerate() {
        match child {
            Ok(value) => outputs.push(value),
            Err(error) => {
                return (
                    Err(error.with_context("map_index", index.to_string())),
                    states,
                )
            }
        }
    }
    (Ok(Value::Array(outputs)), states)
}

fn mapped_width(call: &PreparedCall, task: &str) -> Result<usize, TaskError> {
    let mut width: Option<usize> = None;
    let mapped = call
        .args
        .iter()
        .map(|(value, mapped)| (value, *mapped))
        .chain(call.kwargs.values().map(|(value, mapped)| (value, *mapped)));
    for (value, is_mapped) in mapped {
        if !is_mapped {
            continue;
        }
        let len = value.as_array().map(Vec::len).ok_or_else(|| {
            TaskError::new(format!("mapped input of '{}' is not a list", task))
                .with_code("FLOW-MAP-001")
        })?;
        match width {
            Some(expected) if expected != len => {
                return Err(TaskError::new(format!(
                    "mapped inputs of '{}' have different lengths ({} vs {})",
                    task, expected, len
                ))
                .with_code("FLOW-MAP-002"));
            }
            _ => width = Some(len),
        }
    }
    Ok(width.unwrap_or(0))
}

fn element(value: &Value, mapped: bool, index: usize) -> Value {
    if mapped {
        value.get(index).cloned().unwrap_or(Value::Null)
    } else {
        value.clone()
    }
}
