//! Workflow execution engine
//!
//! Entry point used by callers: validates a raw definition into a petgraph
//! DAG, runs it through the graph scheduler and aggregates the result.

use crate::config::Config;
use crate::credentials::CredentialResolver;
use crate::error::{EngineError, ValidationError};
use crate::runtime::executor::{HandlerRegistry, NodeExecutor};
use crate::runtime::result::{aggregate, WorkflowResponse};
use crate::runtime::scheduler::GraphScheduler;
use crate::workflow::graph::WorkflowGraph;
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Executes workflow definitions end to end
///
/// Holds only immutable, shareable state (handler registry, credential
/// resolver, limits), so one engine serves any number of concurrent runs.
#[derive(Debug)]
pub struct ExecutionEngine {
    registry: Arc<HandlerRegistry>,
    scheduler: GraphScheduler,
}

impl ExecutionEngine {
    /// Engine with an explicit handler registry
    pub fn new(config: &Config, registry: HandlerRegistry, http: reqwest::Client) -> Self {
        let registry = Arc::new(registry);
        let resolver = Arc::new(CredentialResolver::new(http, &config.credentials));
        let executor = Arc::new(NodeExecutor::new(
            Arc::clone(&registry),
            resolver,
            config.engine.node_timeout(),
        ));

        tracing::info!(
            "⚙️ Execution engine ready (node types: {:?}, max concurrent nodes: {}, node timeout: {:?})",
            registry.node_types(),
            config.engine.max_concurrent_nodes,
            config.engine.node_timeout()
        );

        Self {
            scheduler: GraphScheduler::new(executor, config.engine.max_concurrent_nodes),
            registry,
        }
    }

    /// Engine with the built-in integration handlers
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("flowrun/", env!("CARGO_PKG_VERSION")))
            .timeout(config.integrations.http_timeout())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        let registry = HandlerRegistry::builtin(config, http.clone());
        Ok(Self::new(config, registry, http))
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Validate a raw definition without running it
    pub fn validate(&self, raw: Value) -> Result<WorkflowGraph, ValidationError> {
        WorkflowGraph::build(raw, &self.registry)
    }

    /// Execute a raw workflow definition
    ///
    /// Validation errors fail fast before anything is dispatched. Node
    /// failures are reported inside the returned `WorkflowResponse`.
    pub async fn execute_workflow(&self, raw: Value) -> Result<WorkflowResponse, EngineError> {
        self.execute_workflow_with_cancel(raw, CancellationToken::new()).await
    }

    /// Execute with an external cancellation token
    ///
    /// Cancelling stops further dispatches; nodes already running finish and
    /// everything not yet started ends Skipped.
    pub async fn execute_workflow_with_cancel(
        &self,
        raw: Value,
        cancel: CancellationToken,
    ) -> Result<WorkflowResponse, EngineError> {
        let workflow_start_time = std::time::Instant::now();

        let graph = match self.validate(raw) {
            Ok(graph) => Arc::new(graph),
            Err(e) => {
                tracing::warn!("❌ Workflow rejected: {}", e);
                return Err(e.into());
            }
        };

        let run_id = Uuid::new_v4();
        tracing::info!(
            "🚀 Starting workflow run {} ({} nodes, workflow: {})",
            run_id,
            graph.len(),
            graph.workflow_id().unwrap_or("unnamed")
        );

        let context = self.scheduler.run(graph, run_id, cancel).await?;
        let response = aggregate(&context);

        let workflow_duration = workflow_start_time.elapsed();
        if response.success {
            tracing::info!("🎉 Workflow run {} completed successfully in {:?}", run_id, workflow_duration);
        } else {
            tracing::warn!(
                "⚠️ Workflow run {} finished with {} failed and {} skipped node(s) in {:?}",
                run_id,
                response.errors.len(),
                response.skipped_nodes().len(),
                workflow_duration
            );
        }

        Ok(response)
    }
}
