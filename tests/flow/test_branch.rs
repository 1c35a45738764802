use homeflow::core::error::TaskError;
use homeflow::core::flow::{
    FlowBuilder, FlowGraph, FlowRunner, ParameterValues, SkipReason, TaskSpec, TaskState,
};
use serde_json::{json, Value};

/// guard -> case(true) { on_true } / case(false) { on_false }, then `join` after both.
fn two_way(guard_output: Result<Value, &'static str>) -> FlowGraph {
    let mut flow = FlowBuilder::new("two-way");
    let guard = flow.add_task(TaskSpec::from_fn("guard", move |_| match &guard_output {
        Ok(value) => Ok(value.clone()),
        Err(message) => Err(TaskError::new(*message)),
    }));
    let mut on_true = None;
    flow.case(&guard, true, |flow| {
        on_true = Some(flow.add_task(TaskSpec::from_fn("on_true", |_| Ok(json!("yes")))));
    });
    let mut on_false = None;
    flow.case(&guard, false, |flow| {
        on_false = Some(flow.add_task(TaskSpec::from_fn("on_false", |_| Ok(json!("no")))));
    });
    let (Some(on_true), Some(on_false)) = (on_true, on_false) else {
        panic!("branch bodies did not run");
    };
    flow.add_task(
        TaskSpec::from_fn("join", |inputs| Ok(json!([inputs.arg(0)?, inputs.arg(1)?])))
            .arg(on_true)
            .arg(on_false)
            .always_run(),
    );
    flow.build().expect("valid flow")
}

async fn run(graph: &FlowGraph) -> homeflow::core::flow::RunResult {
    FlowRunner::default()
        .run(graph, ParameterValues::new())
        .await
        .expect("run")
}

#[tokio::test]
async fn true_guard_runs_only_the_true_branch() {
    let result = run(&two_way(Ok(json!(true)))).await;
    assert_eq!(result.state("on_true"), Some(TaskState::Success));
    assert_eq!(result.state("on_false"), Some(TaskState::Skipped));
    assert_eq!(
        result.record("on_false").and_then(|r| r.skip_reason.clone()),
        Some(SkipReason::BranchNotTaken {
            guard: "guard".to_string(),
            expected: false,
        })
    );
    assert_eq!(result.output("join"), Some(&json!(["yes", null])));
    assert!(result.is_success());
}

#[tokio::test]
async fn false_guard_runs_only_the_false_branch() {
    let result = run(&two_way(Ok(json!(false)))).await;
    assert_eq!(result.state("on_true"), Some(TaskState::Skipped));
    assert_eq!(result.state("on_false"), Some(TaskState::Success));
}

#[tokio::test]
async fn non_boolean_guard_takes_neither_branch() {
    let result = run(&two_way(Ok(json!("true")))).await;
    assert_eq!(result.state("on_true"), Some(TaskState::Skipped));
    assert_eq!(result.state("on_false"), Some(TaskState::Skipped));
    assert!(result.is_success());
}

#[tokio::test]
async fn failed_guard_skips_both_branches() {
    let result = run(&two_way(Err("guard broke"))).await;
    assert_eq!(result.failed_tasks(), vec!["guard"]);
    for member in ["on_true", "on_false"] {
        assert_eq!(
            result.record(member).and_then(|r| r.skip_reason.clone()),
            Some(SkipReason::GuardUnavailable {
                guard: "guard".to_string(),
                state: TaskState::Failed,
            })
        );
    }
    assert_eq!(result.state("join"), Some(TaskState::Success));
}

#[tokio::test]
async fn always_member_is_still_gated_by_its_branch() {
    let mut flow = FlowBuilder::new("gated-always");
    let guard = flow.add_task(TaskSpec::from_fn("guard", |_| Ok(json!(false))));
    flow.case(&guard, true, |flow| {
        flow.add_task(TaskSpec::from_fn("cleanup", |_| Ok(Value::Null)).always_run());
    });
    let graph = flow.build().expect("valid flow");
    let result = run(&graph).await;
    assert_eq!(result.state("cleanup"), Some(TaskState::Skipped));
}

#[tokio::test]
async fn nested_branches_require_every_guard() {
    let mut flow = FlowBuilder::new("nested");
    let outer = flow.add_task(TaskSpec::from_fn("outer", |_| Ok(json!(true))));
    let inner = flow.add_task(TaskSpec::from_fn("inner", |_| Ok(json!(false))));
    flow.case(&outer, true, |flow| {
        flow.add_task(TaskSpec::from_fn("outer_only", |_| Ok(Value::Null)));
        flow.case(&inner, true, |flow| {
            flow.add_task(TaskSpec::from_fn("both", |_| Ok(Value::Null)));
        });
    });
    let graph = flow.build().expect("valid flow");
    assert_eq!(graph.branches_of("both").len(), 2);

    let result = run(&graph).await;
    assert_eq!(result.state("outer_only"), Some(TaskState::Success));
    assert_eq!(result.state("both"), Some(TaskState::Skipped));
}

#[tokio::test]
async fn downstream_of_skipped_member_is_skipped() {
    let mut flow = FlowBuilder::new("chain");
    let guard = flow.add_task(TaskSpec::from_fn("guard", |_| Ok(json!(false))));
    let mut message = None;
    flow.case(&guard, true, |flow| {
        message = Some(flow.add_task(TaskSpec::from_fn("message", |_| Ok(json!("hi")))));
    });
    let Some(message) = message else {
        panic!("branch body did not run");
    };
    flow.add_task(TaskSpec::from_fn("send", |_| Ok(Value::Null)).arg(message));
    let graph = flow.build().expect("valid flow");

    let result = run(&graph).await;
    assert_eq!(result.state("send"), Some(TaskState::Skipped));
    assert_eq!(
        result.record("send").and_then(|r| r.skip_reason.clone()),
        Some(SkipReason::Upstream {
            upstream: "message".to_string(),
            state: TaskState::Skipped,
        })
    );
}
