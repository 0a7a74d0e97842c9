//! Graph scheduler
//!
//! Drives one run of a validated `WorkflowGraph` with a concurrent variant of
//! Kahn's algorithm: nodes whose upstreams have all Completed are dispatched
//! as independent tokio tasks, and every completion unlocks its dependents.
//!
//! The scheduler loop is the only writer of the `ExecutionContext`. Dispatch
//! tasks never touch it; they hand back `(node, result)` through the JoinSet.

use crate::error::{NodeError, NodeExecutionError, SchedulingError};
use crate::runtime::context::{ExecutionContext, NodeState};
use crate::runtime::executor::NodeExecutor;
use crate::workflow::graph::WorkflowGraph;
use petgraph::graph::NodeIndex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type DispatchResult = (NodeIndex, Result<Value, NodeExecutionError>);

/// Dependency-driven scheduler for a single workflow run
#[derive(Debug, Clone)]
pub struct GraphScheduler {
    executor: Arc<NodeExecutor>,
    /// Maximum number of nodes running at once
    max_concurrent: usize,
}

impl GraphScheduler {
    pub fn new(executor: Arc<NodeExecutor>, max_concurrent: usize) -> Self {
        Self {
            executor,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Run every node of `graph` to a terminal state
    ///
    /// Node failures are recorded in the returned context and cascade
    /// `Skipped` to their descendants; independent branches keep running.
    /// Only scheduler defects are returned as `Err`.
    pub async fn run(
        &self,
        graph: Arc<WorkflowGraph>,
        run_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<ExecutionContext, SchedulingError> {
        let mut context = ExecutionContext::new(run_id, &graph);

        let mut in_degree: HashMap<NodeIndex, usize> = graph
            .topological_order()
            .iter()
            .map(|&index| (index, graph.in_degree(index)))
            .collect();

        let mut ready = VecDeque::new();
        for &index in graph.topological_order() {
            if in_degree[&index] == 0 {
                context.transition(&graph.node(index).id, NodeState::Ready)?;
                ready.push_back(index);
            }
        }

        tracing::debug!("🎯 {} node(s) ready at start", ready.len());

        let mut tasks: JoinSet<DispatchResult> = JoinSet::new();

        loop {
            if cancel.is_cancelled() && !context.cancelled {
                tracing::warn!("🛑 Run {} cancelled, skipping nodes that have not started", run_id);
                context.cancelled = true;
                ready.clear();
                skip_unstarted(&mut context, &graph)?;
            }

            while tasks.len() < self.max_concurrent {
                let Some(index) = ready.pop_front() else {
                    break;
                };
                self.spawn_node(&mut tasks, &mut context, &graph, index)?;
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { continue };
                    let (index, result) = joined.map_err(|e| SchedulingError::TaskJoin(e.to_string()))?;
                    match result {
                        Ok(output) => {
                            self.on_completed(&mut context, &graph, &mut in_degree, &mut ready, index, output)?
                        }
                        Err(error) => self.on_failed(&mut context, &graph, index, &error)?,
                    }
                }
                _ = cancel.cancelled(), if !context.cancelled => {}
            }
        }

        if !context.is_finished() {
            let pending = context.unfinished();
            tracing::error!("❌ Scheduler stalled with unfinished nodes: {:?}", pending);
            return Err(SchedulingError::Stalled { pending });
        }

        Ok(context)
    }

    fn spawn_node(
        &self,
        tasks: &mut JoinSet<DispatchResult>,
        context: &mut ExecutionContext,
        graph: &Arc<WorkflowGraph>,
        index: NodeIndex,
    ) -> Result<(), SchedulingError> {
        let node = graph.node(index);
        let inputs = context.resolved_inputs(node)?;
        context.transition(&node.id, NodeState::Running)?;

        tracing::info!("📍 Dispatching node '{}' (type: {})", node.id, node.node_type);

        let executor = Arc::clone(&self.executor);
        let graph = Arc::clone(graph);
        tasks.spawn(async move {
            let node = graph.node(index);
            (index, executor.execute_node(node, inputs).await)
        });

        Ok(())
    }

    fn on_completed(
        &self,
        context: &mut ExecutionContext,
        graph: &WorkflowGraph,
        in_degree: &mut HashMap<NodeIndex, usize>,
        ready: &mut VecDeque<NodeIndex>,
        index: NodeIndex,
        output: Value,
    ) -> Result<(), SchedulingError> {
        context.complete(&graph.node(index).id, output)?;

        for dependent in graph.dependents(index) {
            let remaining = in_degree
                .get_mut(&dependent)
                .ok_or_else(|| SchedulingError::UnknownNode(graph.node(dependent).id.clone()))?;
            *remaining = remaining.saturating_sub(1);

            let id = &graph.node(dependent).id;
            if *remaining == 0 && context.state(id) == Some(NodeState::Pending) {
                context.transition(id, NodeState::Ready)?;
                ready.push_back(dependent);
            }
        }

        Ok(())
    }

    fn on_failed(
        &self,
        context: &mut ExecutionContext,
        graph: &WorkflowGraph,
        index: NodeIndex,
        error: &NodeExecutionError,
    ) -> Result<(), SchedulingError> {
        let node_id = &graph.node(index).id;
        context.fail(NodeError::new(node_id.clone(), error))?;

        let mut skipped = Vec::new();
        for descendant in graph.descendants(index) {
            let id = &graph.node(descendant).id;
            if context.state(id) == Some(NodeState::Pending) {
                context.transition(id, NodeState::Skipped)?;
                skipped.push(id.as_str());
            }
        }

        if !skipped.is_empty() {
            tracing::warn!("⏭️ Skipping descendants of failed node '{}': {:?}", node_id, skipped);
        }

        Ok(())
    }
}

/// Mark every Pending or Ready node Skipped
fn skip_unstarted(context: &mut ExecutionContext, graph: &WorkflowGraph) -> Result<(), SchedulingError> {
    for &index in graph.topological_order() {
        let id = &graph.node(index).id;
        if matches!(context.state(id), Some(NodeState::Pending | NodeState::Ready)) {
            context.transition(id, NodeState::Skipped)?;
        }
    }
    Ok(())
}
