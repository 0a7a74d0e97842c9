//! Result aggregation
//!
//! Collapses a finished `ExecutionContext` into the payload returned to the
//! caller. Pure: reads the context, never touches anything else.

use crate::error::NodeError;
use crate::runtime::context::{ExecutionContext, NodeState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Response of one workflow run
///
/// `success` is true only when every node Completed. `result` holds the
/// outputs of Completed nodes even when the run failed, so callers can use
/// partial progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResponse {
    pub run_id: Uuid,
    pub success: bool,
    pub result: BTreeMap<String, Value>,
    pub errors: Vec<NodeError>,
    /// Terminal state of every node
    pub status: BTreeMap<String, NodeState>,
    #[serde(default)]
    pub cancelled: bool,
}

impl WorkflowResponse {
    pub fn skipped_nodes(&self) -> Vec<&str> {
        self.status
            .iter()
            .filter(|(_, state)| **state == NodeState::Skipped)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Build the response for a finished run
pub fn aggregate(context: &ExecutionContext) -> WorkflowResponse {
    let all_completed = context
        .node_status
        .values()
        .all(|state| *state == NodeState::Completed);

    WorkflowResponse {
        run_id: context.run_id,
        success: all_completed && !context.cancelled,
        result: context
            .node_outputs
            .iter()
            .map(|(id, output)| (id.clone(), output.clone()))
            .collect(),
        errors: context.errors.clone(),
        status: context
            .node_status
            .iter()
            .map(|(id, state)| (id.clone(), *state))
            .collect(),
        cancelled: context.cancelled,
    }
}
