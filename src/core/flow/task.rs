use crate::core::collab::secrets::SecretsProvider;
use crate::core::error::TaskError;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Where a task input comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Output of another task; adds a data edge.
    Task(String),
    /// A declared flow parameter.
    Param(String),
    /// A constant.
    Value(Value),
}

impl Input {
    pub fn task(name: impl Into<String>) -> Self {
        Input::Task(name.into())
    }

    pub fn param(name: impl Into<String>) -> Self {
        Input::Param(name.into())
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Input::Value(value.into())
    }

    pub fn upstream(&self) -> Option<&str> {
        match self {
            Input::Task(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

/// When a task may run relative to its upstream states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Trigger {
    /// Run only when every upstream succeeded.
    #[default]
    AllSuccessful,
    /// Run once upstreams are terminal, whatever their state.
    Always,
}

#[derive(Debug, Clone)]
pub(crate) struct Arg {
    pub input: Input,
    pub mapped: bool,
}

/// Resolved inputs handed to a task function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskInputs {
    pub args: Vec<Value>,
    pub kwargs: IndexMap<String, Value>,
}

impl TaskInputs {
    pub fn arg(&self, index: usize) -> Result<&Value, TaskError> {
        self.args.get(index).ok_or_else(|| {
            TaskError::new(format!("missing positional input {}", index)).with_code("TASK-INPUT-001")
        })
    }

    pub fn kwarg(&self, name: &str) -> Result<&Value, TaskError> {
        self.kwargs.get(name).ok_or_else(|| {
            TaskError::new(format!("missing named input '{}'", name)).with_code("TASK-INPUT-001")
        })
    }

    pub fn arg_as<T: DeserializeOwned>(&self, index: usize) -> Result<T, TaskError> {
        decode(self.arg(index)?, &index.to_string())
    }

    pub fn kwarg_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, TaskError> {
        decode(self.kwarg(name)?, name)
    }

    pub fn kwarg_str(&self, name: &str) -> Result<&str, TaskError> {
        self.kwarg(name)?.as_str().ok_or_else(|| {
            TaskError::new(format!("input '{}' must be a string", name)).with_code("TASK-INPUT-002")
        })
    }

    /// Numeric input; numeric strings (e.g. from the command line) are accepted too.
    pub fn kwarg_f64(&self, name: &str) -> Result<f64, TaskError> {
        let value = self.kwarg(name)?;
        value
            .as_f64()
            .or_else(|| value.as_str().and_then(|raw| raw.trim().parse().ok()))
            .ok_or_else(|| {
                TaskError::new(format!("input '{}' must be a number, got {}", name, value))
                    .with_code("TASK-INPUT-002")
            })
    }
}

fn decode<T: DeserializeOwned>(value: &Value, label: &str) -> Result<T, TaskError> {
    serde_json::from_value(value.clone()).map_err(|err| {
        TaskError::new(format!("input '{}' has unexpected shape: {}", label, err))
            .with_code("TASK-INPUT-002")
    })
}

/// Per-invocation context. Mapped children get their own copy with `map_index` set.
#[derive(Clone)]
pub struct TaskContext {
    pub run_id: Uuid,
    pub flow_name: String,
    pub task_name: String,
    pub map_index: Option<usize>,
    secrets: Arc<dyn SecretsProvider>,
}

impl TaskContext {
    pub fn new(
        run_id: Uuid,
        flow_name: impl Into<String>,
        task_name: impl Into<String>,
        secrets: Arc<dyn SecretsProvider>,
    ) -> Self {
        Self {
            run_id,
            flow_name: flow_name.into(),
            task_name: task_name.into(),
            map_index: None,
            secrets,
        }
    }

    pub(crate) fn for_child(&self, index: usize) -> Self {
        let mut ctx = self.clone();
        ctx.map_index = Some(index);
        ctx
    }

    pub fn secret(&self, name: &str) -> Option<String> {
        self.secrets.get(name)
    }

    pub fn require_secret(&self, name: &str) -> Result<String, TaskError> {
        self.secret(name).ok_or_else(|| {
            TaskError::new(format!("secret {} is not set", name))
                .with_code("TASK-SECRET-001")
                .with_context("task", self.task_name.clone())
        })
    }
}

/// Body of a task.
#[async_trait]
pub trait TaskFn: Send + Sync + 'static {
    async fn call(&self, inputs: TaskInputs, ctx: TaskContext) -> Result<Value, TaskError>;
}

/// Adapter for synchronous closures.
pub struct SyncFn<F>(F);

#[async_trait]
impl<F> TaskFn for SyncFn<F>
where
    F: Fn(TaskInputs) -> Result<Value, TaskError> + Send + Sync + 'static,
{
    async fn call(&self, inputs: TaskInputs, _ctx: TaskContext) -> Result<Value, TaskError> {
        (self.0)(inputs)
    }
}

/// Adapter for closures returning a future.
pub struct AsyncFn<F>(F);

#[async_trait]
impl<F, Fut> TaskFn for AsyncFn<F>
where
    F: Fn(TaskInputs, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
{
    async fn call(&self, inputs: TaskInputs, ctx: TaskContext) -> Result<Value, TaskError> {
        (self.0)(inputs, ctx).await
    }
}

/// Concatenates a list of lists, outer then inner order.
struct FlattenFn;

#[async_trait]
impl TaskFn for FlattenFn {
    async fn call(&self, inputs: TaskInputs, _ctx: TaskContext) -> Result<Value, TaskError> {
        flatten_value(inputs.arg(0)?)
    }
}

pub(crate) fn flatten_value(value: &Value) -> Result<Value, TaskError> {
    let outer = value.as_array().ok_or_else(|| {
        TaskError::new("flatten expects a list of lists").with_code("FLOW-MAP-003")
    })?;
    let mut flat = Vec::new();
    for (index, inner) in outer.iter().enumerate() {
        let items = inner.as_array().ok_or_else(|| {
            TaskError::new(format!("flatten element {} is not a list", index))
                .with_code("FLOW-MAP-003")
        })?;
        flat.extend(items.iter().cloned());
    }
    Ok(Value::Array(flat))
}

/// A named unit of work with explicit inputs. Immutable once added to a graph.
#[derive(Clone)]
pub struct TaskSpec {
    pub(crate) name: String,
    pub(crate) func: Arc<dyn TaskFn>,
    pub(crate) args: Vec<Arg>,
    pub(crate) kwargs: IndexMap<String, Arg>,
    pub(crate) trigger: Trigger,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, func: impl TaskFn) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
            args: Vec::new(),
            kwargs: IndexMap::new(),
            trigger: Trigger::default(),
        }
    }

    pub fn from_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(TaskInputs) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        Self::new(name, SyncFn(func))
    }

    pub fn from_async<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(TaskInputs, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        Self::new(name, AsyncFn(func))
    }

    /// Built-in task concatenating the list of lists produced by `input`.
    pub fn flatten(name: impl Into<String>, input: Input) -> Self {
        Self::new(name, FlattenFn).arg(input)
    }

    pub fn arg(mut self, input: Input) -> Self {
        self.args.push(Arg {
            input,
            mapped: false,
        });
        self
    }

    /// Positional input iterated element-wise; one child invocation per element.
    pub fn map_arg(mut self, input: Input) -> Self {
        self.args.push(Arg {
            input,
            mapped: true,
        });
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, input: Input) -> Self {
        self.kwargs.insert(
            name.into(),
            Arg {
                input,
                mapped: false,
            },
        );
        self
    }

    pub fn map_kwarg(mut self, name: impl Into<String>, input: Input) -> Self {
        self.kwargs.insert(
            name.into(),
            Arg {
                input,
                mapped: true,
            },
        );
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Shorthand for `Trigger::Always`, used by cleanup and notification tasks.
    pub fn always_run(self) -> Self {
        self.trigger(Trigger::Always)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger_kind(&self) -> Trigger {
        self.trigger
    }

    pub fn is_mapped(&self) -> bool {
        self.inputs().any(|arg| arg.mapped)
    }

    pub(crate) fn inputs(&self) -> impl Iterator<Item = &Arg> {
        self.args.iter().chain(self.kwargs.values())
    }

    /// Upstream task names referenced by inputs, in declaration order.
    pub fn data_upstreams(&self) -> impl Iterator<Item = &str> {
        self.inputs().filter_map(|arg| arg.input.upstream())
    }

    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.inputs().filter_map(|arg| match &arg.input {
            Input::Param(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl std::fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .field("trigger", &self.trigger)
            .finish()
    }
}
