//! Per-run execution state
//!
//! Created when a validated graph starts running, mutated only by the
//! scheduler loop, and handed to the result aggregator when the run ends.

use crate::error::{NodeError, SchedulingError};
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::types::Node;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle of a node within one run
///
/// `Pending → Ready → Running → {Completed | Failed}`, plus `Pending → Skipped`
/// when an ancestor fails and `Ready → Skipped` when the run is cancelled
/// before the node starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Completed | NodeState::Failed | NodeState::Skipped)
    }

    fn can_transition_to(self, next: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Ready, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Pending, Skipped)
                | (Ready, Skipped)
        )
    }
}

/// Mutable state of a single workflow run
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub workflow_id: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Outputs of Completed nodes
    pub node_outputs: HashMap<String, Value>,
    pub node_status: HashMap<String, NodeState>,
    /// Node failures in the order they were observed
    pub errors: Vec<NodeError>,
    /// Set once external cancellation has been observed
    pub cancelled: bool,
}

impl ExecutionContext {
    /// Fresh context with every node of the graph Pending
    pub fn new(run_id: Uuid, graph: &WorkflowGraph) -> Self {
        let node_status = graph
            .topological_order()
            .iter()
            .map(|&index| (graph.node(index).id.clone(), NodeState::Pending))
            .collect();

        Self {
            run_id,
            workflow_id: graph.workflow_id().map(str::to_string),
            started_at: Utc::now(),
            node_outputs: HashMap::new(),
            node_status,
            errors: Vec::new(),
            cancelled: false,
        }
    }

    pub fn state(&self, node_id: &str) -> Option<NodeState> {
        self.node_status.get(node_id).copied()
    }

    /// Apply a state transition, rejecting anything outside the state machine
    pub fn transition(&mut self, node_id: &str, next: NodeState) -> Result<(), SchedulingError> {
        let current = self
            .node_status
            .get_mut(node_id)
            .ok_or_else(|| SchedulingError::UnknownNode(node_id.to_string()))?;

        if !current.can_transition_to(next) {
            return Err(SchedulingError::InvalidTransition {
                node: node_id.to_string(),
                from: *current,
                to: next,
            });
        }

        *current = next;
        Ok(())
    }

    pub fn complete(&mut self, node_id: &str, output: Value) -> Result<(), SchedulingError> {
        self.transition(node_id, NodeState::Completed)?;
        self.node_outputs.insert(node_id.to_string(), output);
        Ok(())
    }

    pub fn fail(&mut self, error: NodeError) -> Result<(), SchedulingError> {
        self.transition(&error.node_id, NodeState::Failed)?;
        self.errors.push(error);
        Ok(())
    }

    /// Outputs of the node's upstreams, in `input_refs` order
    ///
    /// Every upstream must already be Completed; anything else is a scheduler
    /// defect rather than a node failure.
    pub fn resolved_inputs(&self, node: &Node) -> Result<Vec<Value>, SchedulingError> {
        node.input_refs
            .iter()
            .map(|upstream| {
                match (self.state(upstream), self.node_outputs.get(upstream)) {
                    (Some(NodeState::Completed), Some(output)) => Ok(output.clone()),
                    _ => Err(SchedulingError::InputNotReady {
                        node: node.id.clone(),
                        upstream: upstream.clone(),
                    }),
                }
            })
            .collect()
    }

    /// Ids of nodes that have not reached a terminal state
    pub fn unfinished(&self) -> Vec<String> {
        let mut pending: Vec<String> = self
            .node_status
            .iter()
            .filter(|(_, state)| !state.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        pending.sort();
        pending
    }

    pub fn is_finished(&self) -> bool {
        self.node_status.values().all(|state| state.is_terminal())
    }
}
