//! Core workflow type definitions
//!
//! Defines the raw definition accepted from callers (`WorkflowDefinition`) and
//! the validated node type (`Node`) stored inside a `WorkflowGraph`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, str::FromStr};

use crate::credentials::CredentialSpec;

/// A workflow definition as submitted for execution
///
/// Dependencies may be declared inline on each node (`inputRefs`), as a list of
/// `edges`, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Optional caller-side workflow identifier, echoed in logs
    #[serde(default)]
    pub id: Option<String>,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

/// A node as it appears in the raw definition, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    /// Node type tag, checked against `NodeType` and the handler registry
    #[serde(rename = "type")]
    pub node_type: String,
    /// Handler-specific configuration (`data` in builder exports)
    #[serde(default, alias = "data")]
    pub config: Map<String, Value>,
    /// Upstream node ids, in the order their outputs are handed to the handler
    #[serde(default, rename = "inputRefs", alias = "input_refs")]
    pub input_refs: Vec<String>,
    #[serde(default)]
    pub credentials: Option<CredentialSpec>,
}

/// Explicit connection between two nodes
///
/// `source` output flows into `target`. Equivalent to listing `source` in the
/// target's `inputRefs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    #[serde(alias = "from")]
    pub source: String,
    #[serde(alias = "to")]
    pub target: String,
}

/// Supported node kinds
///
/// Closed set: every variant is bound to exactly one handler at startup, and
/// unknown tags are rejected while building the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Fetch recent messages from a Gmail mailbox
    /// Expected config: { "query": "is:unread newer_than:1d", "maxResults": 10 }
    /// Requires credentials
    Gmail,

    /// Chat completion against an OpenAI-compatible API
    /// Expected config: { "modelProvider": "OpenAI", "modelName": "gpt-4o", "apiKey": "...", "systemPrompt": "..." }
    /// Upstream outputs are joined into the user prompt in `inputRefs` order
    Llm,

    /// Generic HTTP call
    /// Expected config: { "url": "https://api.example.com/data", "method": "POST", "headers": {...} }
    /// First upstream output becomes the request body for POST/PUT/PATCH
    HttpRequest,
}

impl NodeType {
    pub const ALL: [NodeType; 3] = [NodeType::Gmail, NodeType::Llm, NodeType::HttpRequest];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Gmail => "gmail",
            NodeType::Llm => "llm",
            NodeType::HttpRequest => "http_request",
        }
    }

    /// Whether a node of this type cannot run without a resolved credential
    pub fn requires_credentials(&self) -> bool {
        matches!(self, NodeType::Gmail)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gmail" => Ok(NodeType::Gmail),
            "llm" => Ok(NodeType::Llm),
            "http_request" | "http" => Ok(NodeType::HttpRequest),
            other => Err(format!("unknown node type: {}", other)),
        }
    }
}

/// A validated node inside a `WorkflowGraph`
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub node_type: NodeType,
    pub config: Map<String, Value>,
    /// Upstream ids in declared order (inline refs first, then edges)
    pub input_refs: Vec<String>,
    pub credentials: Option<CredentialSpec>,
}
