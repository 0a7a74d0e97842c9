//! Shared helpers for engine integration tests
//!
//! `ScriptedHandler` behaves according to each node's config:
//! - `tag`: name recorded for the call (defaults to "anonymous")
//! - `output`: value returned on success (defaults to the tag)
//! - `fail`: error message to fail with
//! - `delay_ms`: sleep before answering
//! - `panic`: panic instead of answering

#![allow(dead_code)]

use async_trait::async_trait;
use flowrun::config::Config;
use flowrun::credentials::Credential;
use flowrun::{ExecutionEngine, HandlerRegistry, NodeHandler, NodeType};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub tag: String,
    pub inputs: Vec<Value>,
    pub auth_header: Option<String>,
}

#[derive(Debug, Default)]
pub struct ScriptedHandler {
    calls: Mutex<Vec<Call>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, tag: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.tag == tag).collect()
    }

    /// Highest number of handler invocations observed in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even when the call is dropped by a timeout
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeHandler for ScriptedHandler {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        credential: Option<&Credential>,
        inputs: &[Value],
    ) -> anyhow::Result<Value> {
        let tag = config
            .get("tag")
            .and_then(Value::as_str)
            .unwrap_or("anonymous")
            .to_string();

        self.calls.lock().unwrap().push(Call {
            tag: tag.clone(),
            inputs: inputs.to_vec(),
            auth_header: credential.map(|c| c.auth_header().to_string()),
        });

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.running);

        if let Some(ms) = config.get("delay_ms").and_then(Value::as_u64) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if config.get("panic").and_then(Value::as_bool).unwrap_or(false) {
            panic!("scripted panic in {}", tag);
        }
        if let Some(message) = config.get("fail").and_then(Value::as_str) {
            anyhow::bail!("{}", message);
        }

        Ok(config.get("output").cloned().unwrap_or(Value::String(tag)))
    }
}

/// Engine whose `http_request` and `gmail` types both run `handler`
pub fn engine_with(config: &Config, handler: &Arc<ScriptedHandler>) -> ExecutionEngine {
    let registry = HandlerRegistry::new()
        .with_handler(NodeType::HttpRequest, handler.clone())
        .with_handler(NodeType::Gmail, handler.clone());
    ExecutionEngine::new(config, registry, reqwest::Client::new())
}

/// Scripted node without credentials; `tag` defaults to the node id
pub fn node(id: &str, inputs: &[&str], config: Value) -> Value {
    let mut config = config.as_object().cloned().unwrap_or_default();
    config.entry("tag").or_insert_with(|| json!(id));
    json!({
        "id": id,
        "type": "http_request",
        "config": config,
        "inputRefs": inputs,
    })
}

pub fn workflow(nodes: Vec<Value>) -> Value {
    json!({ "nodes": nodes })
}
