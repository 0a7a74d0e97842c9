//! Workflow Definition Layer
//!
//! This module turns raw workflow definitions into validated graphs:
//! - Type definitions (WorkflowDefinition, Node, NodeType)
//! - Graph building and validation with petgraph

// Core workflow type definitions
pub mod types;

// Validation and DAG construction
pub mod graph;

// Re-export commonly used types
pub use graph::WorkflowGraph;
pub use types::{EdgeDefinition, Node, NodeDefinition, NodeType, WorkflowDefinition};
