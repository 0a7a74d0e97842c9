//! Workflow execution REST endpoint
//!
//! Accepts a raw workflow definition, runs it to completion and returns the
//! aggregated response. Node failures still produce a 200; only definitions
//! that cannot run at all are rejected.

use crate::{
    error::EngineError,
    runtime::{engine::ExecutionEngine, result::WorkflowResponse},
};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Engine shared by every request; runs never share mutable state
    pub engine: Arc<ExecutionEngine>,
}

/// Create workflow execution routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new().route("/api/workflow/execute", post(execute_workflow))
}

/// Execute a workflow definition
///
/// POST /api/workflow/execute
/// Body: { "nodes": [...], "edges": [...] }
async fn execute_workflow(State(state): State<AppState>, body: Bytes) -> Response {
    tracing::info!("📥 Workflow execution request received");
    tracing::debug!("📄 Request body: {} bytes", body.len());

    // Parse JSON body manually to return a structured 400
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("❌ Invalid JSON payload: {}", e);
            return rejection(StatusCode::BAD_REQUEST, "validation", format!("invalid JSON: {}", e));
        }
    };

    match state.engine.execute_workflow(raw).await {
        Ok(response) => ok(response),
        Err(EngineError::Validation(e)) => rejection(StatusCode::BAD_REQUEST, "validation", e.to_string()),
        Err(EngineError::Scheduling(e)) => {
            tracing::error!("💥 Scheduler defect: {}", e);
            rejection(StatusCode::INTERNAL_SERVER_ERROR, "scheduling", e.to_string())
        }
    }
}

fn ok(response: WorkflowResponse) -> Response {
    (StatusCode::OK, Json(response)).into_response()
}

pub(crate) fn rejection(status: StatusCode, kind: &str, message: String) -> Response {
    let body = json!({
        "success": false,
        "result": {},
        "errors": [ { "kind": kind, "message": message } ]
    });
    (status, Json(body)).into_response()
}
