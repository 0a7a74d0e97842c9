//! Scheduled trigger REST endpoints
//!
//! Register, list, remove and manually run cron triggers.

use crate::{
    api::workflows::rejection,
    error::{EngineError, TriggerError},
    runtime::triggers::{TriggerDefinition, TriggerService},
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct TriggerState {
    pub triggers: Arc<TriggerService>,
}

/// Create trigger management routes
pub fn create_trigger_routes() -> Router<TriggerState> {
    Router::new()
        .route("/api/triggers", post(register_trigger).get(list_triggers))
        .route("/api/triggers/{id}", get(get_trigger).delete(delete_trigger))
        .route("/api/triggers/{id}/run", post(run_trigger))
}

/// Register (or replace) a trigger
///
/// POST /api/triggers
/// Body: { "id": "...", "schedule_type": "daily", "time": "09:00", "workflow": {...} }
async fn register_trigger(State(state): State<TriggerState>, body: Bytes) -> Response {
    let definition: TriggerDefinition = match serde_json::from_slice(&body) {
        Ok(definition) => definition,
        Err(e) => {
            tracing::warn!("❌ Invalid trigger payload: {}", e);
            return rejection(StatusCode::BAD_REQUEST, "validation", format!("invalid trigger: {}", e));
        }
    };

    match state.triggers.register(definition).await {
        Ok(info) => (StatusCode::CREATED, Json(info)).into_response(),
        Err(e) => trigger_failure(e),
    }
}

/// GET /api/triggers
async fn list_triggers(State(state): State<TriggerState>) -> Response {
    Json(state.triggers.list().await).into_response()
}

/// GET /api/triggers/{id}
async fn get_trigger(State(state): State<TriggerState>, Path(id): Path<String>) -> Response {
    match state.triggers.get(&id).await {
        Some(info) => Json(info).into_response(),
        None => trigger_failure(TriggerError::NotFound(id)),
    }
}

/// DELETE /api/triggers/{id}
async fn delete_trigger(State(state): State<TriggerState>, Path(id): Path<String>) -> Response {
    if state.triggers.unregister(&id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        trigger_failure(TriggerError::NotFound(id))
    }
}

/// Run a trigger's workflow now and return the run's response
///
/// POST /api/triggers/{id}/run
async fn run_trigger(State(state): State<TriggerState>, Path(id): Path<String>) -> Response {
    match state.triggers.run_now(&id).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => trigger_failure(e),
    }
}

fn trigger_failure(error: TriggerError) -> Response {
    let (status, kind) = match &error {
        TriggerError::InvalidTrigger(_)
        | TriggerError::InvalidSchedule(_)
        | TriggerError::Workflow(_)
        | TriggerError::Engine(EngineError::Validation(_)) => (StatusCode::BAD_REQUEST, "validation"),
        TriggerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        TriggerError::Engine(EngineError::Scheduling(_)) | TriggerError::Scheduler(_) => {
            tracing::error!("💥 Trigger failure: {}", error);
            (StatusCode::INTERNAL_SERVER_ERROR, "scheduling")
        }
    };
    rejection(status, kind, error.to_string())
}
