use homeflow::core::error::GraphError;
use homeflow::core::flow::{FlowBuilder, Input, TaskSpec};
use serde_json::Value;

fn noop(name: &str) -> TaskSpec {
    TaskSpec::from_fn(name, |_| Ok(Value::Null))
}

#[test]
fn linear_chain_orders_upstreams_first() {
    let mut flow = FlowBuilder::new("chain");
    let url = flow.parameter("url");
    let fetch = flow.add_task(noop("fetch").kwarg("url", url));
    let parse = flow.add_task(noop("parse").arg(fetch.clone()));
    flow.add_task(noop("store").arg(parse).kwarg("raw", fetch));
    let graph = flow.build().expect("valid flow");

    assert_eq!(graph.execution_order(), vec!["fetch", "parse", "store"]);
    assert_eq!(graph.upstreams_of("store"), vec!["parse", "fetch"]);
    assert_eq!(graph.len(), 3);
    assert_eq!(graph.parameters()[0].name, "url");
}

#[test]
fn forward_references_resolve_at_build() {
    let mut flow = FlowBuilder::new("forward");
    flow.add_task(noop("report").arg(Input::task("collect")));
    flow.add_task(noop("collect"));
    let graph = flow.build().expect("valid flow");
    assert_eq!(graph.execution_order(), vec!["collect", "report"]);
}

#[test]
fn cycle_is_rejected_before_anything_runs() {
    let mut flow = FlowBuilder::new("cycle");
    flow.add_task(noop("a").arg(Input::task("b")));
    flow.add_task(noop("b").arg(Input::task("a")));
    flow.add_task(noop("c"));
    let err = flow.build().expect_err("cycle must fail");
    assert_eq!(err, GraphError::Cycle(vec!["a".to_string(), "b".to_string()]));
    assert_eq!(err.code(), "FLOW-GRAPH-005");
}

#[test]
fn control_edges_can_close_a_cycle() {
    let mut flow = FlowBuilder::new("control-cycle");
    let a = flow.add_task(noop("a"));
    let b = flow.add_task(noop("b").arg(a.clone()));
    flow.add_edge(&b, &a);
    assert!(matches!(flow.build(), Err(GraphError::Cycle(_))));
}

#[test]
fn duplicate_task_names_are_rejected() {
    let mut flow = FlowBuilder::new("dup");
    flow.add_task(noop("fetch"));
    flow.add_task(noop("fetch"));
    assert_eq!(
        flow.build().expect_err("duplicate"),
        GraphError::DuplicateTask("fetch".to_string())
    );
}

#[test]
fn unknown_upstream_is_rejected() {
    let mut flow = FlowBuilder::new("unknown");
    flow.add_task(noop("compare").kwarg("price", Input::task("fetch")));
    assert_eq!(
        flow.build().expect_err("unknown upstream"),
        GraphError::UnknownUpstream {
            task: "compare".to_string(),
            upstream: "fetch".to_string(),
        }
    );
}

#[test]
fn undeclared_parameter_is_rejected() {
    let mut flow = FlowBuilder::new("params");
    flow.add_task(noop("fetch").kwarg("url", Input::param("url")));
    let err = flow.build().expect_err("undeclared parameter");
    assert_eq!(err.code(), "FLOW-GRAPH-003");
}

#[test]
fn duplicate_parameter_is_rejected() {
    let mut flow = FlowBuilder::new("params");
    flow.parameter("url");
    flow.parameter_with_default("url", "https://example.com");
    assert_eq!(
        flow.build().expect_err("duplicate parameter"),
        GraphError::DuplicateParameter("url".to_string())
    );
}

#[test]
fn unbalanced_branches_are_rejected() {
    let mut flow = FlowBuilder::new("open");
    let guard = flow.add_task(noop("guard"));
    flow.begin_case(&guard, true);
    flow.add_task(noop("member"));
    assert_eq!(
        flow.build().expect_err("unclosed"),
        GraphError::UnclosedBranch("guard".to_string())
    );

    let mut flow = FlowBuilder::new("closed-twice");
    flow.add_task(noop("guard"));
    flow.end_case();
    assert_eq!(flow.build().expect_err("no open branch"), GraphError::NoOpenBranch);
}

#[test]
fn mapping_over_a_scalar_constant_is_rejected() {
    let mut flow = FlowBuilder::new("map");
    flow.add_task(noop("each").map_arg(Input::value(3)));
    assert_eq!(
        flow.build().expect_err("scalar map"),
        GraphError::EmptyMap("each".to_string())
    );
}

#[test]
fn edge_to_unknown_task_is_rejected() {
    let mut flow = FlowBuilder::new("edges");
    let a = flow.add_task(noop("a"));
    flow.add_edge(&a, &Input::task("ghost"));
    assert_eq!(
        flow.build().expect_err("unknown edge target"),
        GraphError::UnknownTask("ghost".to_string())
    );

    let mut flow = FlowBuilder::new("edges");
    let a = flow.add_task(noop("a"));
    flow.add_edge(&Input::value(1), &a);
    assert!(matches!(flow.build(), Err(GraphError::UnknownTask(_))));
}

#[test]
fn branch_membership_is_recorded() {
    let mut flow = FlowBuilder::new("branches");
    let guard = flow.add_task(noop("guard"));
    flow.case(&guard, false, |flow| {
        flow.add_task(noop("fallback"));
    });
    flow.add_task(noop("after"));
    let graph = flow.build().expect("valid flow");

    let branches = graph.branches_of("fallback");
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0].guard, "guard");
    assert!(!branches[0].expected);
    assert!(graph.branches_of("after").is_empty());
    assert_eq!(graph.upstreams_of("fallback"), vec!["guard"]);
}
