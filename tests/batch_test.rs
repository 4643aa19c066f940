use std::sync::Arc;

use serde_json::{Value, json};

use parallel_flow::error::Error;
use parallel_flow::host::{Connector, Request, SearchOperation, TaskOperation, parse_requests, run_batch};
use parallel_flow::request::{OutputMode, SearchParams, TaskParams};
use parallel_flow::runner::{RunnerConfig, TaskRunner};
use parallel_flow::transport::mock::MockTransport;

fn build_connector(responses: Vec<Result<Value, Error>>) -> (Arc<MockTransport>, Connector) {
    let transport = Arc::new(MockTransport::new(responses));
    let runner = TaskRunner::new(transport.clone(), RunnerConfig::default());
    (transport, Connector::new(runner))
}

fn task(input: &str) -> Request {
    Request::Task(TaskOperation::Execute(TaskParams {
        input: input.to_string(),
        output_mode: Some(OutputMode::Auto),
        ..TaskParams::default()
    }))
}

fn bad_schema_task() -> Request {
    Request::Task(TaskOperation::Execute(TaskParams {
        input: "x".to_string(),
        output_schema: Some("{oops".to_string()),
        ..TaskParams::default()
    }))
}

fn search(objective: &str) -> Request {
    Request::Search(SearchOperation::Search(SearchParams {
        objective: Some(objective.to_string()),
        ..SearchParams::default()
    }))
}

fn text_result(content: &str) -> Result<Value, Error> {
    Ok(json!({"output": {"type": "text", "content": content, "basis": []}}))
}

#[tokio::test]
async fn items_run_in_order() {
    let (transport, connector) = build_connector(vec![
        Ok(json!({"run_id": "run_a"})),
        text_result("first"),
        Ok(json!({"results": []})),
    ]);

    let outputs = run_batch(&connector, &[task("one"), search("two")], false)
        .await
        .unwrap();

    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].json["output"], json!("first"));
    assert_eq!(outputs[0].paired_item, 0);
    assert!(outputs[0].error.is_none());
    assert_eq!(outputs[1].json, json!({"results": []}));
    assert_eq!(outputs[1].paired_item, 1);

    let endpoints: Vec<String> = transport.calls().into_iter().map(|c| c.endpoint).collect();
    assert_eq!(
        endpoints,
        [
            "/v1/tasks/runs",
            "/v1/tasks/runs/run_a/result?timeout=570",
            "/v1beta/search"
        ]
    );
}

#[tokio::test]
async fn continue_on_fail_records_error_and_moves_on() {
    let (transport, connector) = build_connector(vec![Ok(json!({"results": []}))]);

    let outputs = run_batch(&connector, &[bad_schema_task(), search("after")], true)
        .await
        .unwrap();

    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].json, json!({}));
    assert_eq!(outputs[0].paired_item, 0);
    assert!(
        outputs[0]
            .error
            .as_deref()
            .unwrap()
            .contains("Invalid JSON in output schema")
    );
    assert!(outputs[1].error.is_none());
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn first_failure_aborts_without_continue() {
    let (transport, connector) = build_connector(vec![
        Ok(json!({"results": []})),
        Ok(json!({"results": []})),
    ]);

    let err = run_batch(
        &connector,
        &[search("ok"), bad_schema_task(), search("never")],
        false,
    )
    .await
    .unwrap_err();

    match err {
        Error::Item { item_index, source } => {
            assert_eq!(item_index, 1);
            assert!(matches!(*source, Error::SchemaParse { item_index: 1, .. }));
        }
        other => panic!("expected Item, got {other:?}"),
    }
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn exhausted_item_is_captured() {
    let mut responses = vec![Ok(json!({"run_id": "run_slow"}))];
    responses.extend((0..8).map(|_| Err(Error::PollTimeout)));
    responses.push(Ok(json!({"results": []})));
    let (_, connector) = build_connector(responses);

    let outputs = run_batch(&connector, &[task("slow"), search("next")], true)
        .await
        .unwrap();

    assert_eq!(
        outputs[0].error.as_deref(),
        Some("Task execution timed out after 8 attempts (approximately 80 minutes)")
    );
    assert!(outputs[1].error.is_none());
}

#[tokio::test]
async fn requests_parsed_from_ndjson() {
    let text = r#"
{"resource": "task", "operation": "execute", "input": "{\"a\": 1}", "output_mode": "auto"}
{"resource": "search", "operation": "search", "objective": "news"}
"#;
    let requests = parse_requests(text).unwrap();
    let (transport, connector) = build_connector(vec![
        Ok(json!({"run_id": "run_n"})),
        text_result("done"),
        Ok(json!({"results": [1]})),
    ]);

    let outputs = run_batch(&connector, &requests, false).await.unwrap();
    assert_eq!(outputs.len(), 2);
    assert_eq!(
        transport.calls()[0].body.as_ref().unwrap()["input"],
        json!({"a": 1})
    );
}

#[tokio::test]
async fn empty_batch() {
    let (transport, connector) = build_connector(vec![]);
    let outputs = run_batch(&connector, &[], false).await.unwrap();
    assert!(outputs.is_empty());
    assert_eq!(transport.call_count(), 0);
}
