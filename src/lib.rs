//! Flowrun: concurrent workflow execution engine
//!
//! Validates workflow definitions into petgraph DAGs, runs independent nodes
//! concurrently as soon as their upstreams complete, resolves OAuth
//! credentials per node and aggregates outputs and errors into one response.
//! Workflows can also be registered against a cron schedule.

// Core configuration and setup
pub mod config;

// Error taxonomy shared by every layer
pub mod error;

// OAuth credential refresh with fallback
pub mod credentials;

// Workflow definitions and graph validation
pub mod workflow;

// Runtime execution engine - scheduling, dispatch, aggregation
pub mod runtime;

// Built-in Gmail, LLM and HTTP handlers
pub mod integrations;

// HTTP API layer
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::{EngineError, NodeError, NodeErrorKind, TriggerError, ValidationError};
pub use runtime::{
    ExecutionEngine, HandlerRegistry, NodeHandler, NodeState, Schedule, TriggerDefinition, TriggerService,
    WorkflowResponse,
};
pub use server::start_server;
pub use workflow::{Node, NodeType, WorkflowGraph};
