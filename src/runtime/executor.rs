//! Node handler registry and dispatcher
//!
//! Every `NodeType` is bound at startup to one `NodeHandler`. The
//! `NodeExecutor` resolves a node's credential, looks up its handler and runs
//! it, turning every fault into a `NodeExecutionError` so the scheduler can
//! apply one failure policy to all of them.

use crate::{
    config::Config,
    credentials::{Credential, CredentialResolver},
    error::{CredentialError, NodeExecutionError},
    integrations::{GmailHandler, HttpRequestHandler, LlmHandler},
    workflow::types::{Node, NodeType},
};
use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc, time::Duration};

/// Integration-specific implementation of a node type
///
/// `inputs` are the outputs of the node's upstreams in `inputRefs` order.
/// Handlers that merge inputs must keep that order.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        credential: Option<&Credential>,
        inputs: &[Value],
    ) -> Result<Value>;
}

/// Closed mapping from node type to handler, read-only once built
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in Gmail, LLM and HTTP handlers
    pub fn builtin(config: &Config, http: reqwest::Client) -> Self {
        let integrations = &config.integrations;
        Self::new()
            .with_handler(
                NodeType::Gmail,
                Arc::new(GmailHandler::new(
                    http.clone(),
                    integrations.gmail_base_url.clone(),
                    integrations.gmail_max_messages,
                )),
            )
            .with_handler(
                NodeType::Llm,
                Arc::new(LlmHandler::new(
                    http.clone(),
                    integrations.openai_base_url.clone(),
                    integrations.llm_default_model.clone(),
                    integrations.llm_temperature,
                )),
            )
            .with_handler(NodeType::HttpRequest, Arc::new(HttpRequestHandler::new(http)))
    }

    /// Bind `handler` to `node_type`, replacing any previous binding
    pub fn with_handler(mut self, node_type: NodeType, handler: Arc<dyn NodeHandler>) -> Self {
        self.handlers.insert(node_type, handler);
        self
    }

    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(&node_type).cloned()
    }

    pub fn supports(&self, node_type: NodeType) -> bool {
        self.handlers.contains_key(&node_type)
    }

    pub fn node_types(&self) -> Vec<NodeType> {
        let mut types: Vec<NodeType> = self.handlers.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("node_types", &self.node_types())
            .finish()
    }
}

/// Dispatches single nodes: credential resolution, handler lookup, deadline
#[derive(Debug)]
pub struct NodeExecutor {
    registry: Arc<HandlerRegistry>,
    resolver: Arc<CredentialResolver>,
    node_timeout: Option<Duration>,
}

impl NodeExecutor {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        resolver: Arc<CredentialResolver>,
        node_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            resolver,
            node_timeout,
        }
    }

    /// Resolve credentials and dispatch the node under the configured deadline
    pub async fn execute_node(&self, node: &Node, inputs: Vec<Value>) -> Result<Value, NodeExecutionError> {
        tracing::info!("🚀 Starting node execution: {} (type: {})", node.id, node.node_type);
        let start_time = std::time::Instant::now();

        let work = async {
            let credential = self.resolve_credential(node).await?;
            self.dispatch(node, credential.as_ref(), &inputs).await
        };

        let result = match self.node_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => Err(NodeExecutionError::Timeout(limit)),
            },
            None => work.await,
        };

        let duration = start_time.elapsed();
        match &result {
            Ok(output) => {
                tracing::info!("✅ Node execution completed: {} in {:?}", node.id, duration);
                tracing::debug!(
                    "📤 Output data: {}",
                    serde_json::to_string(output).unwrap_or_else(|_| "invalid_json".to_string())
                );
            }
            Err(e) => {
                tracing::error!("❌ Node execution failed: {} in {:?} - Error: {}", node.id, duration, e);
            }
        }

        result
    }

    /// Run the handler bound to the node's type
    ///
    /// Handler errors and panics come back as `NodeExecutionError`; nothing
    /// unwinds past this call.
    pub async fn dispatch(
        &self,
        node: &Node,
        credential: Option<&Credential>,
        inputs: &[Value],
    ) -> Result<Value, NodeExecutionError> {
        let handler = self.registry.get(node.node_type).ok_or_else(|| {
            NodeExecutionError::Handler(anyhow::anyhow!(
                "no handler bound for node type '{}'",
                node.node_type
            ))
        })?;

        tracing::debug!("📥 Dispatching '{}' with {} input(s)", node.id, inputs.len());

        match AssertUnwindSafe(handler.execute(&node.config, credential, inputs))
            .catch_unwind()
            .await
        {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(NodeExecutionError::Handler(e)),
            Err(panic) => Err(NodeExecutionError::Panicked(panic_message(panic))),
        }
    }

    async fn resolve_credential(&self, node: &Node) -> Result<Option<Credential>, NodeExecutionError> {
        match &node.credentials {
            Some(spec) => {
                tracing::debug!("🔐 Resolving credentials for node '{}'", node.id);
                Ok(Some(self.resolver.resolve(spec).await?))
            }
            None if node.node_type.requires_credentials() => Err(CredentialError::Missing {
                node_type: node.node_type.to_string(),
            }
            .into()),
            None => Ok(None),
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
