use homeflow::core::error::TaskError;
use homeflow::core::flow::{
    FlowBuilder, FlowGraph, FlowRunner, Input, ParameterValues, RunStatus, RunnerConfig,
    SkipReason, TaskSpec, TaskState,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// fetch -> compare -> case(compare == true) { notify }
fn price_flow(fetched: Result<f64, &'static str>, notified: Arc<AtomicUsize>) -> FlowGraph {
    let mut flow = FlowBuilder::new("price");
    let fetch = flow.add_task(
        TaskSpec::from_fn("fetch", move |_| match fetched {
            Ok(price) => Ok(json!(price)),
            Err(message) => Err(TaskError::new(message).with_code("PRICE-001")),
        })
        .kwarg("url", Input::value("x")),
    );
    let compare = flow.add_task(
        TaskSpec::from_fn("compare", |inputs| {
            Ok(Value::Bool(
                inputs.kwarg_f64("baseline")? != inputs.kwarg_f64("price")?,
            ))
        })
        .kwarg("baseline", Input::value(12.0))
        .kwarg("price", fetch),
    );
    flow.case(&compare, true, |flow| {
        flow.add_task(TaskSpec::from_fn("notify", move |_| {
            notified.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        }));
    });
    flow.build().expect("valid flow")
}

#[tokio::test]
async fn changed_price_notifies_once() {
    let notified = Arc::new(AtomicUsize::new(0));
    let graph = price_flow(Ok(10.0), notified.clone());
    let result = FlowRunner::default()
        .run(&graph, ParameterValues::new())
        .await
        .expect("no parameters needed");

    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert!(result.failed_tasks().is_empty());
    assert_eq!(result.status(), RunStatus::Success);
    assert_eq!(result.output("fetch"), Some(&json!(10.0)));
    assert_eq!(result.output("compare"), Some(&json!(true)));
    assert_eq!(result.state("notify"), Some(TaskState::Success));
}

#[tokio::test]
async fn failed_fetch_skips_dependents() {
    let notified = Arc::new(AtomicUsize::new(0));
    let graph = price_flow(Err("page unreachable"), notified.clone());
    let result = FlowRunner::default()
        .run(&graph, ParameterValues::new())
        .await
        .expect("no parameters needed");

    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert_eq!(result.failed_tasks(), vec!["fetch"]);
    assert_eq!(result.status(), RunStatus::Failed);
    assert_eq!(result.state("compare"), Some(TaskState::Skipped));
    assert_eq!(result.state("notify"), Some(TaskState::Skipped));

    let (task, error) = result.first_error().expect("fetch failed");
    assert_eq!(task, "fetch");
    assert_eq!(error.code, "PRICE-001");
    assert!(result.output("fetch").is_none());
    assert_eq!(
        result.record("compare").and_then(|r| r.skip_reason.clone()),
        Some(SkipReason::Upstream {
            upstream: "fetch".to_string(),
            state: TaskState::Failed,
        })
    );
}

#[tokio::test]
async fn every_task_is_terminal_after_a_run() {
    let mut flow = FlowBuilder::new("mixed");
    let ok = flow.add_task(TaskSpec::from_fn("ok", |_| Ok(json!(1))));
    let bad = flow.add_task(TaskSpec::from_fn("bad", |_| Err(TaskError::new("boom"))));
    flow.add_task(TaskSpec::from_fn("needs_both", |_| Ok(Value::Null)).arg(ok).arg(bad.clone()));
    flow.add_task(TaskSpec::from_fn("cleanup", |_| Ok(json!("cleaned"))).always_run().arg(bad));
    let graph = flow.build().expect("valid flow");

    let result = FlowRunner::default()
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");
    assert!(result.tasks.values().all(|record| record.state.is_terminal()));
    assert_eq!(result.count(TaskState::Success), 2);
    assert_eq!(result.count(TaskState::Failed), 1);
    assert_eq!(result.count(TaskState::Skipped), 1);
}

#[tokio::test]
async fn always_task_sees_null_for_failed_upstream() {
    let mut flow = FlowBuilder::new("always");
    let bad = flow.add_task(TaskSpec::from_fn("bad", |_| Err(TaskError::new("boom"))));
    flow.add_task(
        TaskSpec::from_fn("report", |inputs| Ok(json!({ "saw": inputs.arg(0)?.clone() })))
            .arg(bad)
            .always_run(),
    );
    let graph = flow.build().expect("valid flow");

    let result = FlowRunner::default()
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");
    assert_eq!(result.state("report"), Some(TaskState::Success));
    assert_eq!(result.output("report"), Some(&json!({ "saw": null })));
    assert_eq!(result.status(), RunStatus::Failed);
}

#[tokio::test]
async fn control_edge_orders_without_passing_data() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut flow = FlowBuilder::new("control");
    let first_log = log.clone();
    let first = flow.add_task(TaskSpec::from_async("first", move |_, _| {
        let log = first_log.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            log.lock().expect("lock").push("first");
            Ok(json!("ignored"))
        }
    }));
    let second_log = log.clone();
    let second = flow.add_task(TaskSpec::from_fn("second", move |inputs| {
        assert!(inputs.args.is_empty());
        second_log.lock().expect("lock").push("second");
        Ok(Value::Null)
    }));
    flow.add_edge(&first, &second);
    let graph = flow.build().expect("valid flow");

    let result = FlowRunner::default()
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");
    assert!(result.is_success());
    assert_eq!(*log.lock().expect("lock"), vec!["first", "second"]);
}

#[tokio::test]
async fn parallel_limit_caps_concurrent_tasks() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut flow = FlowBuilder::new("wide");
    for i in 0..6 {
        let active = active.clone();
        let peak = peak.clone();
        flow.add_task(TaskSpec::from_async(format!("t{}", i), move |_, _| {
            let active = active.clone();
            let peak = peak.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
        }));
    }
    let graph = flow.build().expect("valid flow");

    let runner = FlowRunner::new(RunnerConfig {
        parallel_limit: 2,
        map_concurrency: 1,
    });
    let result = runner.run(&graph, ParameterValues::new()).await.expect("run");
    assert!(result.is_success());
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn zero_limits_are_clamped() {
    let runner = FlowRunner::new(RunnerConfig {
        parallel_limit: 0,
        map_concurrency: 0,
    });
    assert_eq!(runner.config().parallel_limit, 1);
    assert_eq!(runner.config().map_concurrency, 1);

    let mut flow = FlowBuilder::new("single");
    flow.add_task(TaskSpec::from_fn("only", |_| Ok(json!(true))));
    let graph = flow.build().expect("valid flow");
    let result = runner.run(&graph, ParameterValues::new()).await.expect("run");
    assert!(result.is_success());
}

#[tokio::test]
async fn results_follow_execution_order() {
    let mut flow = FlowBuilder::new("ordered");
    flow.add_task(TaskSpec::from_fn("late", |_| Ok(Value::Null)).arg(Input::task("early")));
    flow.add_task(TaskSpec::from_fn("early", |_| Ok(Value::Null)));
    let graph = flow.build().expect("valid flow");
    let result = FlowRunner::default()
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");
    let names: Vec<&str> = result.tasks.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["early", "late"]);
    assert_eq!(result.flow, "ordered");
    assert!(result.completed_at >= result.started_at);
}
