mod common;

use common::{engine_with, node, workflow, ScriptedHandler};
use flowrun::config::Config;
use flowrun::{EngineError, NodeErrorKind, NodeState, NodeType, ValidationError};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn linear_workflow_passes_output_downstream() {
    let handler = ScriptedHandler::new();
    let engine = engine_with(&Config::default(), &handler);

    let response = engine
        .execute_workflow(workflow(vec![
            node("A", &[], json!({ "output": { "emails": ["x"] } })),
            node("B", &["A"], json!({ "output": "summary" })),
        ]))
        .await
        .unwrap();

    assert!(response.success);
    assert!(response.errors.is_empty());
    assert_eq!(response.result["A"], json!({ "emails": ["x"] }));
    assert_eq!(response.result["B"], json!("summary"));
    assert_eq!(handler.calls_for("B")[0].inputs, vec![json!({ "emails": ["x"] })]);
    assert!(response.status.values().all(|s| *s == NodeState::Completed));
}

#[tokio::test]
async fn failure_skips_every_descendant() {
    let handler = ScriptedHandler::new();
    let engine = engine_with(&Config::default(), &handler);

    let response = engine
        .execute_workflow(workflow(vec![
            node("A", &[], json!({ "fail": "HTTP 502 from provider" })),
            node("B", &["A"], json!({})),
            node("C", &["B"], json!({})),
        ]))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].node_id, "A");
    assert_eq!(response.errors[0].kind, NodeErrorKind::Execution);
    assert!(response.errors[0].message.contains("502"));
    assert_eq!(response.status["A"], NodeState::Failed);
    assert_eq!(response.status["B"], NodeState::Skipped);
    assert_eq!(response.status["C"], NodeState::Skipped);
    assert!(response.result.is_empty());
    assert!(handler.calls_for("B").is_empty());
    assert!(handler.calls_for("C").is_empty());
}

#[tokio::test]
async fn independent_branch_survives_sibling_failure() {
    let handler = ScriptedHandler::new();
    let engine = engine_with(&Config::default(), &handler);

    let response = engine
        .execute_workflow(workflow(vec![
            node("A", &[], json!({ "fail": "boom" })),
            node("B", &["A"], json!({})),
            node("X", &[], json!({ "delay_ms": 50 })),
            node("Y", &["X"], json!({})),
        ]))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.status["B"], NodeState::Skipped);
    assert_eq!(response.result["X"], json!("X"));
    assert_eq!(response.result["Y"], json!("Y"));
    assert_eq!(response.skipped_nodes(), vec!["B"]);
}

#[tokio::test]
async fn dangling_reference_rejects_before_dispatch() {
    let handler = ScriptedHandler::new();
    let engine = engine_with(&Config::default(), &handler);

    let err = engine
        .execute_workflow(workflow(vec![
            node("A", &[], json!({})),
            node("B", &["Z"], json!({})),
        ]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::DanglingReference { ref node, ref missing })
            if node == "B" && missing == "Z"
    ));
    assert!(handler.calls().is_empty());
}

#[tokio::test]
async fn cycle_rejects_before_dispatch() {
    let handler = ScriptedHandler::new();
    let engine = engine_with(&Config::default(), &handler);

    let err = engine
        .execute_workflow(workflow(vec![
            node("A", &["B"], json!({})),
            node("B", &["A"], json!({})),
            node("C", &[], json!({})),
        ]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::CyclicDependency { .. })
    ));
    assert!(handler.calls().is_empty());
}

#[tokio::test]
async fn unknown_node_type_is_rejected() {
    let handler = ScriptedHandler::new();
    let engine = engine_with(&Config::default(), &handler);

    let err = engine
        .execute_workflow(json!({
            "nodes": [ { "id": "A", "type": "slack" } ]
        }))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::UnsupportedNodeType { .. })
    ));
    assert!(!engine.registry().supports(NodeType::Llm));
}

#[tokio::test]
async fn diamond_dispatches_each_node_once_with_ordered_inputs() {
    let handler = ScriptedHandler::new();
    let engine = engine_with(&Config::default(), &handler);

    let response = engine
        .execute_workflow(json!({
            "nodes": [
                node("A", &[], json!({})),
                node("B", &[], json!({ "delay_ms": 80 })),
                node("C", &[], json!({})),
                node("D", &["C", "B"], json!({})),
            ],
            "edges": [
                { "source": "A", "target": "B" },
                { "source": "A", "target": "C" },
                { "source": "C", "target": "D" }
            ]
        }))
        .await
        .unwrap();

    assert!(response.success);
    for tag in ["A", "B", "C", "D"] {
        assert_eq!(handler.calls_for(tag).len(), 1, "node {} dispatched once", tag);
    }
    // inputRefs order, not completion order
    assert_eq!(handler.calls_for("D")[0].inputs, vec![json!("C"), json!("B")]);
    assert_eq!(handler.calls_for("B")[0].inputs, vec![json!("A")]);
}

#[tokio::test]
async fn independent_roots_run_concurrently() {
    let handler = ScriptedHandler::new();
    let engine = engine_with(&Config::default(), &handler);

    let started = Instant::now();
    let response = engine
        .execute_workflow(workflow(vec![
            node("A", &[], json!({ "delay_ms": 200 })),
            node("B", &[], json!({ "delay_ms": 200 })),
            node("C", &[], json!({ "delay_ms": 200 })),
        ]))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(handler.peak_concurrency(), 3);
    assert!(started.elapsed() < Duration::from_millis(550));
}

#[tokio::test]
async fn concurrency_limit_bounds_in_flight_nodes() {
    let handler = ScriptedHandler::new();
    let mut config = Config::default();
    config.engine.max_concurrent_nodes = 2;
    let engine = engine_with(&config, &handler);

    let nodes = (0..5)
        .map(|i| node(&format!("N{}", i), &[], json!({ "delay_ms": 40 })))
        .collect();
    let response = engine.execute_workflow(workflow(nodes)).await.unwrap();

    assert!(response.success);
    assert_eq!(response.result.len(), 5);
    assert!(handler.peak_concurrency() <= 2);
}

#[tokio::test]
async fn node_timeout_fails_node_and_skips_dependents() {
    let handler = ScriptedHandler::new();
    let mut config = Config::default();
    config.engine.node_timeout_secs = Some(1);
    let engine = engine_with(&config, &handler);

    let response = engine
        .execute_workflow(workflow(vec![
            node("A", &[], json!({ "delay_ms": 5_000 })),
            node("B", &["A"], json!({})),
        ]))
        .await
        .unwrap();

    assert_eq!(response.errors[0].kind, NodeErrorKind::Timeout);
    assert_eq!(response.status["A"], NodeState::Failed);
    assert_eq!(response.status["B"], NodeState::Skipped);
}

#[tokio::test]
async fn handler_panic_is_recorded_as_node_failure() {
    let handler = ScriptedHandler::new();
    let engine = engine_with(&Config::default(), &handler);

    let response = engine
        .execute_workflow(workflow(vec![
            node("A", &[], json!({ "panic": true })),
            node("X", &[], json!({})),
        ]))
        .await
        .unwrap();

    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].kind, NodeErrorKind::Execution);
    assert!(response.errors[0].message.contains("panicked"));
    assert_eq!(response.status["X"], NodeState::Completed);
}

#[tokio::test]
async fn cancellation_lets_running_nodes_finish_and_skips_the_rest() {
    let handler = ScriptedHandler::new();
    let engine = engine_with(&Config::default(), &handler);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let response = engine
        .execute_workflow_with_cancel(
            workflow(vec![
                node("A", &[], json!({ "delay_ms": 300 })),
                node("B", &["A"], json!({})),
            ]),
            cancel,
        )
        .await
        .unwrap();

    assert!(response.cancelled);
    assert!(!response.success);
    assert_eq!(response.status["A"], NodeState::Completed);
    assert_eq!(response.status["B"], NodeState::Skipped);
    assert!(handler.calls_for("B").is_empty());
}

#[tokio::test]
async fn cancellation_skips_ready_nodes_waiting_for_a_slot() {
    let handler = ScriptedHandler::new();
    let mut config = Config::default();
    config.engine.max_concurrent_nodes = 1;
    let engine = engine_with(&config, &handler);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let response = engine
        .execute_workflow_with_cancel(
            workflow(vec![
                node("A", &[], json!({ "delay_ms": 200 })),
                node("B", &[], json!({ "delay_ms": 200 })),
                node("C", &[], json!({ "delay_ms": 200 })),
            ]),
            cancel,
        )
        .await
        .unwrap();

    assert!(response.cancelled);
    assert_eq!(handler.calls().len(), 1);
    let completed = response
        .status
        .values()
        .filter(|s| **s == NodeState::Completed)
        .count();
    assert_eq!(completed, 1);
    assert_eq!(response.skipped_nodes().len(), 2);
    assert_eq!(response.result.len(), 1);
}

fn credentialed_node(id: &str, auth_header: Option<&str>) -> serde_json::Value {
    json!({
        "id": id,
        "type": "gmail",
        "config": { "tag": id },
        "credentials": {
            "credentials": {
                "access_token": "ya29.old",
                "refresh_token": "1//refresh",
                "token_type": "Bearer",
                "client_id": "client.apps"
            },
            "execution_context": { "auth_header": auth_header }
        }
    })
}

async fn config_with_token_endpoint(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.credentials.token_endpoint = format!("{}/token", server.uri());
    config.credentials.client_secret = Some("shh".to_string());
    config
}

#[tokio::test]
async fn refreshed_token_is_handed_to_the_handler() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("client_id=client.apps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.fresh",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;

    let handler = ScriptedHandler::new();
    let engine = engine_with(&config_with_token_endpoint(&server).await, &handler);

    let response = engine
        .execute_workflow(workflow(vec![credentialed_node("A", Some("Bearer ya29.old"))]))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(
        handler.calls_for("A")[0].auth_header.as_deref(),
        Some("Bearer ya29.fresh")
    );
}

#[tokio::test]
async fn failed_refresh_falls_back_to_supplied_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .mount(&server)
        .await;

    let handler = ScriptedHandler::new();
    let engine = engine_with(&config_with_token_endpoint(&server).await, &handler);

    let response = engine
        .execute_workflow(workflow(vec![credentialed_node("A", Some("Bearer ya29.old"))]))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(
        handler.calls_for("A")[0].auth_header.as_deref(),
        Some("Bearer ya29.old")
    );
}

#[tokio::test]
async fn hung_token_endpoint_falls_back_without_failing_the_node() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "ya29.late" }))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let handler = ScriptedHandler::new();
    let mut config = config_with_token_endpoint(&server).await;
    config.credentials.refresh_timeout_ms = 300;
    let engine = engine_with(&config, &handler);

    let response = tokio::time::timeout(
        Duration::from_secs(10),
        engine.execute_workflow(workflow(vec![
            credentialed_node("A", Some("Bearer ya29.old")),
            node("B", &["A"], json!({})),
        ])),
    )
    .await
    .expect("run must not wait on the token endpoint")
    .unwrap();

    assert!(response.success);
    assert_eq!(
        handler.calls_for("A")[0].auth_header.as_deref(),
        Some("Bearer ya29.old")
    );
    assert_eq!(response.status["B"], NodeState::Completed);
}

#[tokio::test]
async fn no_usable_credential_fails_only_that_node() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let handler = ScriptedHandler::new();
    let engine = engine_with(&config_with_token_endpoint(&server).await, &handler);

    let response = engine
        .execute_workflow(workflow(vec![
            credentialed_node("A", None),
            node("X", &[], json!({})),
        ]))
        .await
        .unwrap();

    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].node_id, "A");
    assert_eq!(response.errors[0].kind, NodeErrorKind::Credential);
    assert!(handler.calls_for("A").is_empty());
    assert_eq!(response.status["X"], NodeState::Completed);
}

#[tokio::test]
async fn gmail_node_without_credentials_fails() {
    let handler = ScriptedHandler::new();
    let engine = engine_with(&Config::default(), &handler);

    let response = engine
        .execute_workflow(json!({
            "nodes": [ { "id": "A", "type": "gmail", "config": { "tag": "A" } } ]
        }))
        .await
        .unwrap();

    assert_eq!(response.errors[0].kind, NodeErrorKind::Credential);
    assert!(handler.calls().is_empty());
}

#[tokio::test]
async fn concurrent_runs_do_not_share_state() {
    let handler = ScriptedHandler::new();
    let engine = std::sync::Arc::new(engine_with(&Config::default(), &handler));

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .execute_workflow(workflow(vec![node("A", &[], json!({ "output": 1, "delay_ms": 30 }))]))
                .await
        })
    };
    let second = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .execute_workflow(workflow(vec![node("A", &[], json!({ "output": 2, "delay_ms": 30 }))]))
                .await
        })
    };

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.result["A"], json!(1));
    assert_eq!(second.result["A"], json!(2));
}
