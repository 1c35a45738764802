use crate::core::flow::graph::{EdgeKind, FlowGraph};
use crate::core::flow::task::Trigger;
use petgraph::dot::Dot;
use std::fmt;

/// Node weight carrying task display information.
struct TaskNode {
    name: String,
    kind: &'static str,
}

impl fmt::Display for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}\\n{}", self.name, self.kind)
        }
    }
}

/// Render the flow as a Graphviz DOT string using petgraph.
pub fn flow_to_dot(flow: &FlowGraph) -> String {
    let display = flow.graph().map(
        |_, name| TaskNode {
            name: name.clone(),
            kind: node_kind(flow, name),
        },
        |_, kind: &EdgeKind| *kind,
    );
    format!("{}", Dot::new(&display))
}

fn node_kind(flow: &FlowGraph, name: &str) -> &'static str {
    match flow.task(name) {
        Some(task) if task.is_mapped() => "map",
        Some(task) if task.trigger_kind() == Trigger::Always => "always",
        _ => "",
    }
}
