//! Runtime Execution Engine
//!
//! This module runs validated workflow graphs. It handles:
//! - Dependency-driven concurrent scheduling of nodes
//! - Dispatch of nodes to their integration handlers
//! - Per-run execution state and result aggregation
//! - Cron-scheduled triggers that start runs

// Entry point: validate, schedule, aggregate
pub mod engine;

// Handler registry and per-node dispatch
pub mod executor;

// Concurrent Kahn-style graph scheduler
pub mod scheduler;

// Per-run mutable state
pub mod context;

// Final response assembly
pub mod result;

// Cron-scheduled workflow triggers
pub mod triggers;

pub use context::{ExecutionContext, NodeState};
pub use engine::ExecutionEngine;
pub use executor::{HandlerRegistry, NodeExecutor, NodeHandler};
pub use result::{aggregate, WorkflowResponse};
pub use scheduler::GraphScheduler;
pub use triggers::{Schedule, TriggerDefinition, TriggerInfo, TriggerRun, TriggerService};
