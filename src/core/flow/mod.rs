//! Task-graph construction and execution.

pub mod dot;
pub mod explain;
pub mod graph;
pub mod parameter;
pub mod runner;
pub mod task;

pub use dot::flow_to_dot;
pub use explain::{build_explain_output, ExplainOutput};
pub use graph::{Branch, EdgeKind, FlowBuilder, FlowGraph};
pub use parameter::{
    parse_assignment, parse_assignment_for, resolve_parameters, ParameterKind, ParameterSpec,
    ParameterValues,
};
pub use runner::{
    FlowRunner, RunResult, RunStatus, RunnerConfig, SkipReason, TaskRecord, TaskState,
};
pub use task::{Input, TaskContext, TaskFn, TaskInputs, TaskSpec, Trigger};
