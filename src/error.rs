//! Error taxonomy for workflow execution
//!
//! Errors are split by how far they reach:
//! - `ValidationError` rejects a whole definition before anything runs
//! - `CredentialError` and `NodeExecutionError` fail a single node; the scheduler
//!   records them as `NodeError` entries and keeps the rest of the run going
//! - `SchedulingError` is an internal invariant violation and fails the run
//! - `TriggerError` rejects a scheduled trigger registration or manual run

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::runtime::context::NodeState;

/// Rejection of a raw workflow definition by the graph builder
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Definition is not shaped like a workflow at all
    #[error("malformed workflow definition: {0}")]
    Malformed(String),

    /// Two nodes share the same id
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    /// A node (or edge) refers to a node id that is not declared
    #[error("dangling reference: node '{node}' references undeclared node '{missing}'")]
    DanglingReference { node: String, missing: String },

    /// The dependency graph contains a cycle going through `node`
    #[error("cyclic dependency involving node '{node}'")]
    CyclicDependency { node: String },

    /// Node type is unknown or has no bound handler
    #[error("unsupported node type '{node_type}' on node '{node}'")]
    UnsupportedNodeType { node: String, node_type: String },
}

/// Failure to produce any usable credential for a node
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// Refresh was impossible or failed and no fallback header was supplied
    #[error("no usable credential: refresh unavailable and no fallback authorization header")]
    NoUsableCredential,

    /// Node type needs credentials but the node declares none
    #[error("node type '{node_type}' requires credentials but none were supplied")]
    Missing { node_type: String },
}

/// Fault raised while dispatching a single node
#[derive(Debug, Error)]
pub enum NodeExecutionError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Handler returned an error (network, non-2xx, malformed response, bad config)
    #[error("{0:#}")]
    Handler(anyhow::Error),

    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Per-node deadline expired
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl NodeExecutionError {
    pub fn kind(&self) -> NodeErrorKind {
        match self {
            Self::Credential(_) => NodeErrorKind::Credential,
            Self::Handler(_) | Self::Panicked(_) => NodeErrorKind::Execution,
            Self::Timeout(_) => NodeErrorKind::Timeout,
        }
    }
}

/// Category of a recorded node failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeErrorKind {
    Credential,
    Execution,
    Timeout,
}

/// Node failure as it appears in the execution context and the final response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeError {
    pub node_id: String,
    pub kind: NodeErrorKind,
    pub message: String,
}

impl NodeError {
    pub fn new(node_id: impl Into<String>, error: &NodeExecutionError) -> Self {
        Self {
            node_id: node_id.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Internal defect detected by the scheduler
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulingError {
    /// No task is running, nothing is ready, yet some nodes never finished
    #[error("scheduler stalled with unfinished nodes: {pending:?}")]
    Stalled { pending: Vec<String> },

    #[error("illegal state transition for node '{node}': {from:?} -> {to:?}")]
    InvalidTransition {
        node: String,
        from: NodeState,
        to: NodeState,
    },

    /// A node was about to run while one of its inputs had no completed output
    #[error("node '{node}' dispatched before upstream '{upstream}' completed")]
    InputNotReady { node: String, upstream: String },

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("dispatch task failed: {0}")]
    TaskJoin(String),
}

/// Run-level failure of `execute_workflow`
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
}

/// Failure to register or run a scheduled trigger
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),

    /// Schedule cannot be turned into a cron expression the scheduler accepts
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error(transparent)]
    Workflow(#[from] ValidationError),

    #[error("unknown trigger '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("job scheduler error: {0}")]
    Scheduler(String),
}
