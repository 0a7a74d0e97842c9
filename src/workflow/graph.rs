//! Workflow graph builder
//!
//! Converts a raw workflow definition into an immutable petgraph DAG. All
//! structural problems (dangling references, cycles, unsupported node types)
//! are reported here, before any node is dispatched.

use crate::error::ValidationError;
use crate::runtime::executor::HandlerRegistry;
use crate::workflow::types::{Node, NodeType, WorkflowDefinition};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

/// Validated, immutable dependency graph of one workflow
///
/// Edge `u -> v` means `v` consumes the output of `u`. Parallel references
/// (`inputRefs: ["A", "A"]`) collapse into a single edge.
#[derive(Debug)]
pub struct WorkflowGraph {
    workflow_id: Option<String>,
    graph: DiGraph<Node, ()>,
    node_id_to_index: HashMap<String, NodeIndex>,
    topo_order: Vec<NodeIndex>,
}

impl WorkflowGraph {
    /// Parse and validate a raw JSON definition
    pub fn build(raw: Value, registry: &HandlerRegistry) -> Result<Self, ValidationError> {
        if !raw.is_object() {
            return Err(ValidationError::Malformed(
                "workflow definition must be a JSON object".to_string(),
            ));
        }
        let definition: WorkflowDefinition = serde_json::from_value(raw)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        Self::from_definition(definition, registry)
    }

    /// Validate an already-deserialized definition
    pub fn from_definition(
        definition: WorkflowDefinition,
        registry: &HandlerRegistry,
    ) -> Result<Self, ValidationError> {
        tracing::debug!(
            "🏗️ Building workflow graph with {} nodes and {} edges",
            definition.nodes.len(),
            definition.edges.len()
        );

        let mut declared = HashSet::new();
        for node in &definition.nodes {
            if node.id.trim().is_empty() {
                return Err(ValidationError::Malformed("node id must not be empty".to_string()));
            }
            if !declared.insert(node.id.as_str()) {
                return Err(ValidationError::DuplicateNode(node.id.clone()));
            }
        }

        // Fold explicit edges into the target's input refs, after inline refs
        let mut edge_refs: HashMap<&str, Vec<String>> = HashMap::new();
        for edge in &definition.edges {
            if !declared.contains(edge.source.as_str()) {
                return Err(ValidationError::DanglingReference {
                    node: edge.target.clone(),
                    missing: edge.source.clone(),
                });
            }
            if !declared.contains(edge.target.as_str()) {
                return Err(ValidationError::DanglingReference {
                    node: edge.source.clone(),
                    missing: edge.target.clone(),
                });
            }
            edge_refs
                .entry(edge.target.as_str())
                .or_default()
                .push(edge.source.clone());
        }

        let mut nodes = Vec::with_capacity(definition.nodes.len());
        for raw_node in &definition.nodes {
            let node_type = raw_node
                .node_type
                .parse::<NodeType>()
                .ok()
                .filter(|t| registry.supports(*t))
                .ok_or_else(|| ValidationError::UnsupportedNodeType {
                    node: raw_node.id.clone(),
                    node_type: raw_node.node_type.clone(),
                })?;

            let mut input_refs = raw_node.input_refs.clone();
            if let Some(extra) = edge_refs.get(raw_node.id.as_str()) {
                for source in extra {
                    if !input_refs.contains(source) {
                        input_refs.push(source.clone());
                    }
                }
            }

            for upstream in &input_refs {
                if !declared.contains(upstream.as_str()) {
                    return Err(ValidationError::DanglingReference {
                        node: raw_node.id.clone(),
                        missing: upstream.clone(),
                    });
                }
            }

            nodes.push(Node {
                id: raw_node.id.clone(),
                node_type,
                config: raw_node.config.clone(),
                input_refs,
                credentials: raw_node.credentials.clone(),
            });
        }

        let mut graph = DiGraph::new();
        let mut node_id_to_index = HashMap::new();
        for node in nodes {
            let id = node.id.clone();
            let index = graph.add_node(node);
            node_id_to_index.insert(id, index);
        }

        for target in graph.node_indices().collect::<Vec<_>>() {
            let mut seen = HashSet::new();
            for upstream in graph[target].input_refs.clone() {
                if seen.insert(upstream.clone()) {
                    let source = node_id_to_index[&upstream];
                    graph.add_edge(source, target, ());
                    tracing::debug!("  🔗 Added edge: '{}' → '{}'", upstream, graph[target].id);
                }
            }
        }

        let topo_order = toposort(&graph, None).map_err(|cycle| {
            let node = graph[cycle.node_id()].id.clone();
            tracing::error!("❌ Workflow contains a cycle through node '{}'", node);
            ValidationError::CyclicDependency { node }
        })?;

        tracing::debug!("✅ DAG validation successful - no cycles detected");

        Ok(Self {
            workflow_id: definition.id,
            graph,
            node_id_to_index,
            topo_order,
        })
    }

    pub fn workflow_id(&self) -> Option<&str> {
        self.workflow_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.graph[index]
    }

    pub fn index_of(&self, node_id: &str) -> Option<NodeIndex> {
        self.node_id_to_index.get(node_id).copied()
    }

    /// Node indices in a valid topological order
    pub fn topological_order(&self) -> &[NodeIndex] {
        &self.topo_order
    }

    /// Number of distinct upstream nodes
    pub fn in_degree(&self, index: NodeIndex) -> usize {
        self.graph
            .neighbors_directed(index, Direction::Incoming)
            .count()
    }

    /// Direct consumers of this node's output
    pub fn dependents(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect()
    }

    /// Every node transitively reachable from `start`, excluding `start`
    pub fn descendants(&self, start: NodeIndex) -> Vec<NodeIndex> {
        let mut reachable = HashSet::new();
        let mut queue = VecDeque::new();
        let mut ordered = Vec::new();

        queue.push_back(start);
        reachable.insert(start);

        while let Some(current) = queue.pop_front() {
            for target in self.graph.neighbors_directed(current, Direction::Outgoing) {
                if reachable.insert(target) {
                    ordered.push(target);
                    queue.push_back(target);
                }
            }
        }

        ordered
    }
}
