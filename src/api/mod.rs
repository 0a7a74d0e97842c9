//! HTTP API Layer
//!
//! Exposes the execution engine over REST:
//! - Workflow execution with the raw definition as request body
//! - Cron trigger registration and manual runs

// Workflow execution endpoint (POST)
pub mod workflows;

// Trigger management endpoints
pub mod triggers;

// Re-export router builders
pub use triggers::{create_trigger_routes, TriggerState};
pub use workflows::{create_workflow_routes, AppState};
