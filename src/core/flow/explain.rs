use crate::core::flow::graph::FlowGraph;
use crate::core::flow::parameter::ParameterKind;
use crate::core::flow::task::Trigger;
use serde::Serialize;
use std::fmt::Write;

/// Static description of a flow, as printed by `homeflow explain`.
#[derive(Debug, Clone, Serialize)]
pub struct ExplainOutput {
    pub flow: String,
    pub parameters: Vec<ParameterExplain>,
    pub tasks: Vec<TaskExplain>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterExplain {
    pub name: String,
    pub required: bool,
    pub kind: ParameterKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskExplain {
    pub name: String,
    pub upstreams: Vec<String>,
    pub mapped: bool,
    pub always_run: bool,
    pub when: Vec<String>,
}

/// Build the explain snapshot; tasks are listed in execution order.
pub fn build_explain_output(flow: &FlowGraph) -> ExplainOutput {
    let parameters = flow
        .parameters()
        .iter()
        .map(|param| ParameterExplain {
            name: param.name.clone(),
            required: param.required,
            kind: param.kind,
            default: param.default.clone(),
        })
        .collect();

    let tasks = flow
        .execution_order()
        .into_iter()
        .filter_map(|name| flow.task(name))
        .map(|task| TaskExplain {
            name: task.name().to_string(),
            upstreams: flow
                .upstreams_of(task.name())
                .into_iter()
                .map(str::to_string)
                .collect(),
            mapped: task.is_mapped(),
            always_run: task.trigger_kind() == Trigger::Always,
            when: flow
                .branches_of(task.name())
                .into_iter()
                .map(|branch| format!("{} == {}", branch.guard, branch.expected))
                .collect(),
        })
        .collect();

    ExplainOutput {
        flow: flow.name().to_string(),
        parameters,
        tasks,
    }
}

impl ExplainOutput {
    /// Human-readable listing, one task per line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "flow: {}", self.flow);
        for param in &self.parameters {
            match (&param.default, param.required) {
                (_, true) => {
                    let _ = writeln!(out, "param {} (required)", param.name);
                }
                (Some(default), false) => {
                    let _ = writeln!(out, "param {} = {}", param.name, default);
                }
                (None, false) => {
                    let _ = writeln!(out, "param {}", param.name);
                }
            }
        }
        for (position, task) in self.tasks.iter().enumerate() {
            let _ = write!(out, "{:>2}. {}", position + 1, task.name);
            if task.mapped {
                out.push_str(" [map]");
            }
            if task.always_run {
                out.push_str(" [always]");
            }
            if !task.upstreams.is_empty() {
                let _ = write!(out, " <- {}", task.upstreams.join(", "));
            }
            if !task.when.is_empty() {
                let _ = write!(out, " when {}", task.when.join(" and "));
            }
            out.push('\n');
        }
        out
    }
}
