use homeflow::core::error::TaskError;
use homeflow::core::flow::{
    FlowBuilder, FlowRunner, Input, ParameterValues, RunnerConfig, TaskSpec, TaskState,
};
use serde_json::{json, Value};
use std::time::Duration;

fn runner(map_concurrency: usize) -> FlowRunner {
    FlowRunner::new(RunnerConfig {
        parallel_limit: 4,
        map_concurrency,
    })
}

#[tokio::test]
async fn map_preserves_input_order() {
    let mut flow = FlowBuilder::new("squares");
    let numbers = flow.add_task(TaskSpec::from_fn("numbers", |_| Ok(json!([3, 1, 2]))));
    flow.add_task(
        TaskSpec::from_async("square", |inputs, ctx| async move {
            let n: u64 = inputs.arg_as(0)?;
            // Earlier elements finish last.
            tokio::time::sleep(Duration::from_millis(5 * n)).await;
            Ok(json!({ "index": ctx.map_index, "square": n * n }))
        })
        .map_arg(numbers),
    );
    let graph = flow.build().expect("valid flow");

    let result = runner(3)
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");
    assert_eq!(
        result.output("square"),
        Some(&json!([
            { "index": 0, "square": 9 },
            { "index": 1, "square": 1 },
            { "index": 2, "square": 4 }
        ]))
    );
    let record = result.record("square").expect("record");
    assert_eq!(record.children, vec![TaskState::Success; 3]);
}

#[tokio::test]
async fn unmapped_inputs_are_broadcast() {
    let mut flow = FlowBuilder::new("broadcast");
    flow.add_task(
        TaskSpec::from_fn("scale", |inputs| {
            Ok(json!(inputs.kwarg_f64("n")? * inputs.kwarg_f64("factor")?))
        })
        .map_kwarg("n", Input::value(json!([1, 2, 3])))
        .kwarg("factor", Input::value(10)),
    );
    let graph = flow.build().expect("valid flow");
    let result = runner(2)
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");
    assert_eq!(result.output("scale"), Some(&json!([10.0, 20.0, 30.0])));
}

#[tokio::test]
async fn empty_list_maps_to_empty_output() {
    let mut flow = FlowBuilder::new("empty");
    let items = flow.add_task(TaskSpec::from_fn("items", |_| Ok(json!([]))));
    let each = flow.add_task(
        TaskSpec::from_fn("each", |_| Err(TaskError::new("never called"))).map_arg(items),
    );
    flow.add_task(TaskSpec::from_fn("after", |inputs| Ok(inputs.arg(0)?.clone())).arg(each));
    let graph = flow.build().expect("valid flow");

    let result = runner(2)
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");
    assert_eq!(result.output("each"), Some(&json!([])));
    assert_eq!(result.output("after"), Some(&json!([])));
}

#[tokio::test]
async fn failing_child_fails_the_mapped_task() {
    let mut flow = FlowBuilder::new("partial");
    let items = flow.add_task(TaskSpec::from_fn("items", |_| Ok(json!([1, 0, 2, 0]))));
    let inverse = flow.add_task(
        TaskSpec::from_fn("inverse", |inputs| {
            let n = inputs.arg(0)?.as_f64().unwrap_or_default();
            if n == 0.0 {
                return Err(TaskError::new("division by zero").with_code("MATH-001"));
            }
            Ok(json!(1.0 / n))
        })
        .map_arg(items),
    );
    flow.add_task(TaskSpec::from_fn("sum", |_| Ok(Value::Null)).arg(inverse));
    let graph = flow.build().expect("valid flow");

    let result = runner(4)
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");
    assert_eq!(result.failed_tasks(), vec!["inverse"]);
    assert_eq!(result.state("sum"), Some(TaskState::Skipped));

    let record = result.record("inverse").expect("record");
    assert_eq!(
        record.children,
        vec![
            TaskState::Success,
            TaskState::Failed,
            TaskState::Success,
            TaskState::Failed
        ]
    );
    let error = record.error.as_ref().expect("error");
    assert_eq!(error.code, "MATH-001");
    assert_eq!(error.context.get("map_index"), Some(&"1".to_string()));
    assert!(record.output.is_none());
}

#[tokio::test]
async fn non_list_upstream_fails_at_run_time() {
    let mut flow = FlowBuilder::new("scalar");
    let one = flow.add_task(TaskSpec::from_fn("one", |_| Ok(json!(1))));
    flow.add_task(TaskSpec::from_fn("each", |_| Ok(Value::Null)).map_arg(one));
    let graph = flow.build().expect("valid flow");
    let result = runner(1)
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");
    let error = result.first_error().expect("failure").1;
    assert_eq!(error.code, "FLOW-MAP-001");
}

#[tokio::test]
async fn unequal_mapped_lengths_fail() {
    let mut flow = FlowBuilder::new("zip");
    flow.add_task(
        TaskSpec::from_fn("pair", |_| Ok(Value::Null))
            .map_arg(Input::value(json!([1, 2])))
            .map_arg(Input::value(json!([1, 2, 3]))),
    );
    let graph = flow.build().expect("valid flow");
    let result = runner(1)
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");
    assert_eq!(result.first_error().expect("failure").1.code, "FLOW-MAP-002");
}

#[tokio::test]
async fn map_then_flatten_concatenates_batches() {
    let mut flow = FlowBuilder::new("batches");
    let batches = flow.add_task(TaskSpec::from_fn("batches", |_| {
        Ok(json!([["a", "b"], ["c"], []]))
    }));
    let tagged = flow.add_task(
        TaskSpec::from_fn("tag", |inputs| {
            let batch: Vec<String> = inputs.arg_as(0)?;
            Ok(json!(batch
                .into_iter()
                .map(|item| format!("{}!", item))
                .collect::<Vec<_>>()))
        })
        .map_arg(batches),
    );
    flow.add_task(TaskSpec::flatten("flat", tagged));
    let graph = flow.build().expect("valid flow");

    let result = runner(2)
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");
    assert_eq!(result.output("flat"), Some(&json!(["a!", "b!", "c!"])));
}

#[tokio::test]
async fn flatten_rejects_non_nested_input() {
    let mut flow = FlowBuilder::new("flat");
    let items = flow.add_task(TaskSpec::from_fn("items", |_| Ok(json!([1, 2]))));
    flow.add_task(TaskSpec::flatten("flat", items));
    let graph = flow.build().expect("valid flow");
    let result = runner(1)
        .run(&graph, ParameterValues::new())
        .await
        .expect("run");
    assert_eq!(result.state("flat"), Some(TaskState::Failed));
    assert_eq!(result.first_error().expect("failure").1.code, "FLOW-MAP-003");
}
