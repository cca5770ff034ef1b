// graph.rs — The Loom graph container
//
// A `LoomGraph` owns its nodes by value in an id-keyed map and is optionally
// bound to a shared `Environment`. All cross references between nodes are
// ids resolved through the graph.
//
// Preconditions: none.
// Postconditions: every node in `nodes` has `graph_id == Some(self.id)`.
// Failure modes: id collisions, foreign nodes, missing environment, and
//                malformed documents → `GraphError`.
// Side effects: none.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::diag::ValidationIssueCollector;
use crate::env::Environment;
use crate::error::GraphError;
use crate::node::{ApplicationNode, LoomNode, OperationNode, ShardIndex, TensorNode};

/// Serialized form: `{"id": ..., "nodes": [...]}`.
#[derive(Serialize, Deserialize)]
struct GraphDocument {
    id: Uuid,
    #[serde(default)]
    nodes: Vec<LoomNode>,
}

#[derive(Debug, Clone)]
pub struct LoomGraph {
    id: Uuid,
    nodes: BTreeMap<Uuid, LoomNode>,
    env: Option<Arc<Environment>>,
    shard_index: OnceLock<ShardIndex>,
}

impl Default for LoomGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl LoomGraph {
    /// An empty graph with a fresh id and no environment.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            nodes: BTreeMap::new(),
            env: None,
            shard_index: OnceLock::new(),
        }
    }

    pub fn with_env(env: Arc<Environment>) -> Self {
        Self {
            env: Some(env),
            ..Self::new()
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn env(&self) -> Option<&Arc<Environment>> {
        self.env.as_ref()
    }

    pub fn set_env(&mut self, env: Option<Arc<Environment>>) {
        self.env = env;
    }

    pub fn assert_env(&self) -> Result<&Environment, GraphError> {
        self.env.as_deref().ok_or(GraphError::MissingEnvironment)
    }

    /// A deep copy with the same id and environment.
    pub fn copy(&self) -> LoomGraph {
        self.clone()
    }

    // ── Node access ──────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &LoomNode> {
        self.nodes.values()
    }

    pub fn has_node(&self, id: Uuid) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: Uuid) -> Option<&LoomNode> {
        self.nodes.get(&id)
    }

    /// Mutable access for label and tag edits.
    pub fn node_mut(&mut self, id: Uuid) -> Option<&mut LoomNode> {
        self.shard_index.take();
        self.nodes.get_mut(&id)
    }

    pub fn assert_node(&self, id: Uuid) -> Result<&LoomNode, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn assert_node_type(&self, id: Uuid, node_type: &str) -> Result<&LoomNode, GraphError> {
        self.assert_node(id)?.assert_type(node_type)
    }

    pub fn by_type<'a>(&'a self, node_type: &'a str) -> impl Iterator<Item = &'a LoomNode> + 'a {
        self.nodes.values().filter(move |n| n.node_type() == node_type)
    }

    pub fn tensors(&self) -> impl Iterator<Item = TensorNode<'_>> {
        self.nodes.values().filter_map(|n| TensorNode::wrap(n).ok())
    }

    pub fn operations(&self) -> impl Iterator<Item = OperationNode<'_>> {
        self.nodes.values().filter_map(|n| OperationNode::wrap(n).ok())
    }

    pub fn applications(&self) -> impl Iterator<Item = ApplicationNode<'_>> {
        self.nodes.values().filter_map(|n| ApplicationNode::wrap(n).ok())
    }

    /// Applications grouped by operation, built on first use and dropped by
    /// any mutation.
    pub fn shard_index(&self) -> &ShardIndex {
        self.shard_index.get_or_init(|| ShardIndex::build(self))
    }

    // ── Mutation ─────────────────────────────────────────────────────────

    /// A random id not yet used in this graph.
    pub fn gen_node_id(&self) -> Uuid {
        loop {
            let id = Uuid::new_v4();
            if !self.nodes.contains_key(&id) {
                return id;
            }
        }
    }

    /// Insert `node`.
    ///
    /// Re-adding a node equal to the stored one is a no-op. A different node
    /// with the same id, or a node owned by another graph, is rejected.
    pub fn add_node(&mut self, mut node: LoomNode) -> Result<Uuid, GraphError> {
        if let Some(owner) = node.graph_id() {
            if owner != self.id {
                return Err(GraphError::ForeignNode {
                    node: node.id(),
                    graph: owner,
                });
            }
        }
        let id = node.id();
        if let Some(existing) = self.nodes.get(&id) {
            if *existing != node {
                return Err(GraphError::DuplicateNode(id));
            }
        }
        node.set_graph_id(Some(self.id));
        self.shard_index.take();
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Create and insert a node with a fresh id.
    pub fn create_node(
        &mut self,
        node_type: impl Into<String>,
        label: Option<&str>,
        body: Value,
    ) -> Result<Uuid, GraphError> {
        let mut node = LoomNode::new(self.gen_node_id(), node_type, body);
        node.set_label(label.map(str::to_string));
        self.add_node(node)
    }

    /// Remove a node; the returned node no longer belongs to any graph.
    pub fn remove_node(&mut self, id: Uuid) -> Option<LoomNode> {
        let mut node = self.nodes.remove(&id)?;
        self.shard_index.take();
        node.set_graph_id(None);
        Some(node)
    }

    // ── Validation ───────────────────────────────────────────────────────

    /// Validate against the bound environment, failing with every issue found.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut collector = ValidationIssueCollector::new();
        self.validate_into(&mut collector)?;
        collector.check()?;
        Ok(())
    }

    /// Validate into `collector`. Only a missing environment is an error.
    pub fn validate_into(&self, collector: &mut ValidationIssueCollector) -> Result<(), GraphError> {
        let env = self.assert_env()?;
        env.validate_graph(self, collector);
        Ok(())
    }

    // ── Serialization ────────────────────────────────────────────────────

    /// Load a graph document, binding it to `env`.
    pub fn from_json(json: &str, env: Option<Arc<Environment>>) -> Result<LoomGraph, GraphError> {
        let doc: GraphDocument = serde_json::from_str(json)?;
        Self::from_document(doc, env)
    }

    pub fn from_value(value: Value, env: Option<Arc<Environment>>) -> Result<LoomGraph, GraphError> {
        let doc: GraphDocument = serde_json::from_value(value)?;
        Self::from_document(doc, env)
    }

    fn from_document(doc: GraphDocument, env: Option<Arc<Environment>>) -> Result<LoomGraph, GraphError> {
        let mut graph = LoomGraph {
            id: doc.id,
            nodes: BTreeMap::new(),
            env,
            shard_index: OnceLock::new(),
        };
        for node in doc.nodes {
            let id = node.id();
            if graph.nodes.contains_key(&id) {
                return Err(GraphError::DuplicateNode(id));
            }
            graph.add_node(node)?;
        }
        Ok(graph)
    }

    fn document(&self) -> GraphDocument {
        GraphDocument {
            id: self.id,
            nodes: self.nodes.values().cloned().collect(),
        }
    }

    pub fn to_value(&self) -> Result<Value, GraphError> {
        Ok(serde_json::to_value(self.document())?)
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(&self.document())?)
    }

    /// SHA-256 of the canonical (compact, id-ordered, key-sorted) document,
    /// as lowercase hex.
    pub fn fingerprint(&self) -> Result<String, GraphError> {
        let canonical = serde_json::to_vec(&self.document())?;
        let digest = Sha256::digest(&canonical);
        Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
