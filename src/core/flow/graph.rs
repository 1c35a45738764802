use crate::core::error::GraphError;
use crate::core::flow::parameter::ParameterSpec;
use crate::core::flow::task::{Input, TaskSpec};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;

/// A conditional branch: members run only when `guard` produced exactly `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub guard: String,
    pub expected: bool,
    pub members: Vec<String>,
}

/// Why one task depends on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Data,
    Control,
    Guard(bool),
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Data => write!(f, "data"),
            EdgeKind::Control => write!(f, "after"),
            EdgeKind::Guard(expected) => write!(f, "when={}", expected),
        }
    }
}

/// Incrementally declares a flow. Validation happens in [`FlowBuilder::build`].
pub struct FlowBuilder {
    name: String,
    parameters: Vec<ParameterSpec>,
    tasks: Vec<TaskSpec>,
    task_branches: Vec<Vec<usize>>,
    edges: Vec<(String, String)>,
    branches: Vec<Branch>,
    open: Vec<usize>,
    deferred: Option<GraphError>,
}

impl FlowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            tasks: Vec::new(),
            task_branches: Vec::new(),
            edges: Vec::new(),
            branches: Vec::new(),
            open: Vec::new(),
            deferred: None,
        }
    }

    /// Declare a required parameter and return a reference usable as a task input.
    pub fn parameter(&mut self, name: impl Into<String>) -> Input {
        self.declare(ParameterSpec::required(name))
    }

    pub fn parameter_with_default(
        &mut self,
        name: impl Into<String>,
        default: impl Into<Value>,
    ) -> Input {
        self.declare(ParameterSpec::optional(name, default))
    }

    /// Declare a parameter from a full spec, e.g. one with a declared kind.
    pub fn declare(&mut self, spec: ParameterSpec) -> Input {
        let input = Input::param(spec.name.clone());
        self.parameters.push(spec);
        input
    }

    /// Register a task inside every currently open branch. Returns its output reference.
    pub fn add_task(&mut self, spec: TaskSpec) -> Input {
        let name = spec.name.clone();
        for &branch in &self.open {
            self.branches[branch].members.push(name.clone());
        }
        self.task_branches.push(self.open.clone());
        self.tasks.push(spec);
        Input::task(name)
    }

    /// Ordering-only dependency: `downstream` starts after `upstream` is terminal.
    pub fn add_edge(&mut self, upstream: &Input, downstream: &Input) -> &mut Self {
        match (upstream, downstream) {
            (Input::Task(up), Input::Task(down)) => self.edges.push((up.clone(), down.clone())),
            (Input::Task(_), other) | (other, _) => {
                self.defer(GraphError::UnknownTask(describe(other)));
            }
        }
        self
    }

    /// Open a branch gated on `guard`; tasks added until [`FlowBuilder::end_case`] are members.
    pub fn begin_case(&mut self, guard: &Input, expected: bool) -> &mut Self {
        let guard = match guard {
            Input::Task(name) => name.clone(),
            other => {
                self.defer(GraphError::UnknownUpstream {
                    task: format!("case({})", expected),
                    upstream: describe(other),
                });
                describe(other)
            }
        };
        self.branches.push(Branch {
            guard,
            expected,
            members: Vec::new(),
        });
        self.open.push(self.branches.len() - 1);
        self
    }

    pub fn end_case(&mut self) -> &mut Self {
        if self.open.pop().is_none() {
            self.defer(GraphError::NoOpenBranch);
        }
        self
    }

    /// Scoped form of `begin_case`/`end_case`.
    pub fn case<F>(&mut self, guard: &Input, expected: bool, body: F) -> &mut Self
    where
        F: FnOnce(&mut FlowBuilder),
    {
        self.begin_case(guard, expected);
        body(self);
        self.end_case()
    }

    fn defer(&mut self, err: GraphError) {
        if self.deferred.is_none() {
            self.deferred = Some(err);
        }
    }

    /// Validate the declaration and freeze it into an executable graph.
    pub fn build(self) -> Result<FlowGraph, GraphError> {
        if let Some(err) = self.deferred {
            return Err(err);
        }
        if let Some(&branch) = self.open.first() {
            return Err(GraphError::UnclosedBranch(
                self.branches[branch].guard.clone(),
            ));
        }

        let mut declared = HashSet::new();
        for param in &self.parameters {
            if !declared.insert(param.name.as_str()) {
                return Err(GraphError::DuplicateParameter(param.name.clone()));
            }
        }

        let mut index: HashMap<String, usize> = HashMap::new();
        for (position, task) in self.tasks.iter().enumerate() {
            if index.insert(task.name.clone(), position).is_some() {
                return Err(GraphError::DuplicateTask(task.name.clone()));
            }
        }

        for task in &self.tasks {
            for upstream in task.data_upstreams() {
                if !index.contains_key(upstream) {
                    return Err(GraphError::UnknownUpstream {
                        task: task.name.clone(),
                        upstream: upstream.to_string(),
                    });
                }
            }
            for parameter in task.parameters() {
                if !declared.contains(parameter) {
                    return Err(GraphError::UnknownParameter {
                        task: task.name.clone(),
                        parameter: parameter.to_string(),
                    });
                }
            }
            let constant_non_list = task
                .inputs()
                .any(|arg| arg.mapped && matches!(&arg.input, Input::Value(v) if !v.is_array()));
            if constant_non_list {
                return Err(GraphError::EmptyMap(task.name.clone()));
            }
        }

        for (up, down) in &self.edges {
            for endpoint in [up, down] {
                if !index.contains_key(endpoint) {
                    return Err(GraphError::UnknownTask(endpoint.clone()));
                }
            }
        }

        for branch in &self.branches {
            if !index.contains_key(&branch.guard) {
                return Err(GraphError::UnknownUpstream {
                    task: branch
                        .members
                        .first()
                        .cloned()
                        .unwrap_or_else(|| format!("case({})", branch.expected)),
                    upstream: branch.guard.clone(),
                });
            }
        }

        let mut graph: DiGraph<String, EdgeKind> = DiGraph::new();
        for task in &self.tasks {
            graph.add_node(task.name.clone());
        }

        let mut upstreams: Vec<Vec<usize>> = vec![Vec::new(); self.tasks.len()];
        let mut link = |graph: &mut DiGraph<String, EdgeKind>, from: usize, to: usize, kind| {
            if !upstreams[to].contains(&from) {
                upstreams[to].push(from);
            }
            let (from, to) = (NodeIndex::new(from), NodeIndex::new(to));
            if !graph.edges_connecting(from, to).any(|edge| *edge.weight() == kind) {
                graph.add_edge(from, to, kind);
            }
        };

        for (position, task) in self.tasks.iter().enumerate() {
            for upstream in task.data_upstreams() {
                link(&mut graph, index[upstream], position, EdgeKind::Data);
            }
        }
        for (up, down) in &self.edges {
            link(&mut graph, index[up], index[down], EdgeKind::Control);
        }
        for (position, branches) in self.task_branches.iter().enumerate() {
            for &branch in branches {
                let branch = &self.branches[branch];
                link(
                    &mut graph,
                    index[&branch.guard],
                    position,
                    EdgeKind::Guard(branch.expected),
                );
            }
        }

        if let Some(cycle) = find_cycle(&graph) {
            return Err(GraphError::Cycle(cycle));
        }

        let order = topological_order(&upstreams);
        tracing::debug!(flow = %self.name, tasks = self.tasks.len(), "flow graph built");

        Ok(FlowGraph {
            name: self.name,
            parameters: self.parameters,
            tasks: self.tasks,
            index,
            upstreams,
            task_branches: self.task_branches,
            branches: self.branches,
            order,
            graph,
        })
    }
}

fn describe(input: &Input) -> String {
    match input {
        Input::Task(name) => name.clone(),
        Input::Param(name) => format!("parameter {}", name),
        Input::Value(value) => format!("constant {}", value),
    }
}

/// Tasks of the cycle containing the earliest-registered task, in registration order.
fn find_cycle(graph: &DiGraph<String, EdgeKind>) -> Option<Vec<String>> {
    let mut cycles: Vec<Vec<NodeIndex>> = tarjan_scc(graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || graph.find_edge(component[0], component[0]).is_some()
        })
        .collect();
    for component in &mut cycles {
        component.sort();
    }
    cycles.sort();
    cycles
        .into_iter()
        .next()
        .map(|component| component.into_iter().map(|idx| graph[idx].clone()).collect())
}

/// Kahn's algorithm; among ready tasks the earliest registered goes first.
fn topological_order(upstreams: &[Vec<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = upstreams.iter().map(Vec::len).collect();
    let mut downstreams: Vec<Vec<usize>> = vec![Vec::new(); upstreams.len()];
    for (task, ups) in upstreams.iter().enumerate() {
        for &up in ups {
            downstreams[up].push(task);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = remaining
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(task, _)| Reverse(task))
        .collect();
    let mut order = Vec::with_capacity(upstreams.len());
    while let Some(Reverse(task)) = ready.pop() {
        order.push(task);
        for &down in &downstreams[task] {
            remaining[down] -= 1;
            if remaining[down] == 0 {
                ready.push(Reverse(down));
            }
        }
    }
    order
}

/// A validated, immutable DAG of tasks. Shared across runs.
pub struct FlowGraph {
    name: String,
    parameters: Vec<ParameterSpec>,
    tasks: Vec<TaskSpec>,
    index: HashMap<String, usize>,
    upstreams: Vec<Vec<usize>>,
    task_branches: Vec<Vec<usize>>,
    branches: Vec<Branch>,
    order: Vec<usize>,
    graph: DiGraph<String, EdgeKind>,
}

impl FlowGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task names in registration order.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|task| task.name.as_str()).collect()
    }

    /// Deterministic topological order; ties broken by registration order.
    pub fn execution_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&idx| self.tasks[idx].name.as_str())
            .collect()
    }

    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.index.get(name).map(|&idx| &self.tasks[idx])
    }

    /// Data, control and guard upstreams of `name`, deduplicated.
    pub fn upstreams_of(&self, name: &str) -> Vec<&str> {
        self.index
            .get(name)
            .map(|&idx| {
                self.upstreams[idx]
                    .iter()
                    .map(|&up| self.tasks[up].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// Branches enclosing `name`, outermost first.
    pub fn branches_of(&self, name: &str) -> Vec<&Branch> {
        self.index
            .get(name)
            .map(|&idx| {
                self.task_branches[idx]
                    .iter()
                    .map(|&b| &self.branches[b])
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn graph(&self) -> &DiGraph<String, EdgeKind> {
        &self.graph
    }

    pub(crate) fn order_indices(&self) -> &[usize] {
        &self.order
    }

    pub(crate) fn spec_at(&self, idx: usize) -> &TaskSpec {
        &self.tasks[idx]
    }

    pub(crate) fn upstream_indices(&self, idx: usize) -> &[usize] {
        &self.upstreams[idx]
    }

    pub(crate) fn branch_indices(&self, idx: usize) -> &[usize] {
        &self.task_branches[idx]
    }

    pub(crate) fn branch_at(&self, branch: usize) -> &Branch {
        &self.branches[branch]
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

impl fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowGraph")
            .field("name", &self.name)
            .field("order", &self.execution_order())
            .finish()
    }
}
