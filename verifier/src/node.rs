// node.rs — Loom nodes, bodies, and typed views
//
// A `LoomNode` is `(id, type, label?, body, tags)` where the body and tag
// values are raw JSON. Typed access goes through `view_body_as` /
// `view_tag_as`, or through the typed views (`TensorNode`, `OperationNode`,
// `ApplicationNode`, `NoteNode`) which check the type discriminant when
// they are constructed.
//
// Preconditions: none.
// Postconditions: a typed view always wraps a node of the matching type.
// Failure modes: type mismatch or malformed JSON → `GraphError`.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::diag::Context;
use crate::error::GraphError;
use crate::graph::LoomGraph;
use crate::ipf::IpfSignature;
use crate::zrange::ZRange;

// ── Type names ───────────────────────────────────────────────────────────

pub const NODE_TYPES_URL: &str = "http://tensortapestry.org/schemas/loom/2024-01/node_types.jsd";
pub const ANNOTATION_TYPES_URL: &str =
    "http://tensortapestry.org/schemas/loom/2024-01/annotation_types.jsd";

pub const TENSOR_TYPE: &str =
    "http://tensortapestry.org/schemas/loom/2024-01/node_types.jsd#/$defs/Tensor";
pub const OPERATION_TYPE: &str =
    "http://tensortapestry.org/schemas/loom/2024-01/node_types.jsd#/$defs/Operation";
pub const APPLICATION_TYPE: &str =
    "http://tensortapestry.org/schemas/loom/2024-01/node_types.jsd#/$defs/Application";
pub const NOTE_TYPE: &str =
    "http://tensortapestry.org/schemas/loom/2024-01/node_types.jsd#/$defs/Note";

pub const IPF_SIGNATURE_TAG: &str =
    "http://tensortapestry.org/schemas/loom/2024-01/annotation_types.jsd#/$defs/IPFSignature";
pub const IPF_INDEX_TAG: &str =
    "http://tensortapestry.org/schemas/loom/2024-01/annotation_types.jsd#/$defs/IPFIndex";

/// The closed set of node kinds the verifier understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Tensor,
    Operation,
    Application,
    Note,
    Generic,
}

impl NodeKind {
    pub fn of(node_type: &str) -> NodeKind {
        match node_type {
            TENSOR_TYPE => NodeKind::Tensor,
            OPERATION_TYPE => NodeKind::Operation,
            APPLICATION_TYPE => NodeKind::Application,
            NOTE_TYPE => NodeKind::Note,
            _ => NodeKind::Generic,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Tensor => "Tensor",
            NodeKind::Operation => "Operation",
            NodeKind::Application => "Application",
            NodeKind::Note => "Note",
            NodeKind::Generic => "Generic",
        }
    }
}

// ── Bodies ───────────────────────────────────────────────────────────────

/// A reference to a sub-range of a tensor node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TensorSelection {
    pub tensor_id: Uuid,
    pub range: ZRange,
}

impl TensorSelection {
    pub fn new(tensor_id: Uuid, range: ZRange) -> Self {
        Self { tensor_id, range }
    }

    pub fn ndim(&self) -> usize {
        self.range.ndim()
    }
}

/// Named lists of selections, as used by operation and application bodies.
pub type SelectionMap = BTreeMap<String, Vec<TensorSelection>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TensorBody {
    pub dtype: String,
    pub range: ZRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OperationBody {
    pub kernel: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    #[serde(default)]
    pub inputs: SelectionMap,
    #[serde(default)]
    pub outputs: SelectionMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApplicationBody {
    pub operation_id: Uuid,
    #[serde(default)]
    pub inputs: SelectionMap,
    #[serde(default)]
    pub outputs: SelectionMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NoteBody {
    pub message: String,
}

// ── LoomNode ─────────────────────────────────────────────────────────────

/// A node of a Loom graph.
///
/// Equality compares content only; the owning graph is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoomNode {
    id: Uuid,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default)]
    body: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<String, Value>,
    #[serde(skip)]
    graph_id: Option<Uuid>,
}

impl PartialEq for LoomNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.node_type == other.node_type
            && self.label == other.label
            && self.body == other.body
            && self.tags == other.tags
    }
}

impl LoomNode {
    pub fn new(id: Uuid, node_type: impl Into<String>, body: Value) -> Self {
        Self {
            id,
            node_type: node_type.into(),
            label: None,
            body,
            tags: BTreeMap::new(),
            graph_id: None,
        }
    }

    /// Build a node whose body is serialized from `body`.
    pub fn from_body<T: Serialize>(
        id: Uuid,
        node_type: impl Into<String>,
        body: &T,
    ) -> Result<Self, GraphError> {
        Ok(Self::new(id, node_type, serde_json::to_value(body)?))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_tag(mut self, tag_type: impl Into<String>, value: Value) -> Self {
        self.tags.insert(tag_type.into(), value);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::of(&self.node_type)
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn tags(&self) -> &BTreeMap<String, Value> {
        &self.tags
    }

    pub fn tag(&self, tag_type: &str) -> Option<&Value> {
        self.tags.get(tag_type)
    }

    pub fn has_tag(&self, tag_type: &str) -> bool {
        self.tags.contains_key(tag_type)
    }

    pub fn set_tag<T: Serialize>(
        &mut self,
        tag_type: impl Into<String>,
        value: &T,
    ) -> Result<(), GraphError> {
        self.tags
            .insert(tag_type.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn remove_tag(&mut self, tag_type: &str) -> Option<Value> {
        self.tags.remove(tag_type)
    }

    /// Id of the graph this node was added to, if any.
    pub fn graph_id(&self) -> Option<Uuid> {
        self.graph_id
    }

    pub(crate) fn set_graph_id(&mut self, graph_id: Option<Uuid>) {
        self.graph_id = graph_id;
    }

    pub fn assert_type(&self, node_type: &str) -> Result<&Self, GraphError> {
        if self.node_type != node_type {
            return Err(GraphError::TypeMismatch {
                id: self.id,
                expected: node_type.to_string(),
                actual: self.node_type.clone(),
            });
        }
        Ok(self)
    }

    /// Deserialize the body into `T`.
    pub fn view_body_as<T: DeserializeOwned>(&self) -> Result<T, GraphError> {
        T::deserialize(&self.body).map_err(|source| GraphError::Body {
            id: self.id,
            type_name: self.node_type.clone(),
            source,
        })
    }

    /// Deserialize the tag `tag_type` into `T`.
    pub fn view_tag_as<T: DeserializeOwned>(&self, tag_type: &str) -> Result<T, GraphError> {
        let value = self.tags.get(tag_type).ok_or_else(|| GraphError::MissingTag {
            id: self.id,
            tag: tag_type.to_string(),
        })?;
        T::deserialize(value).map_err(|source| GraphError::Tag {
            id: self.id,
            tag: tag_type.to_string(),
            source,
        })
    }

    /// JSONPath of this node inside its graph document.
    pub fn json_path(&self) -> String {
        format!("$.nodes[@.id=='{}']", self.id)
    }

    /// A diagnostic context carrying this node.
    pub fn as_context(&self, name: &str) -> Context {
        Context::new(name)
            .with_jsonpath(self.json_path())
            .with_data(self)
    }
}

// ── Typed views ──────────────────────────────────────────────────────────

macro_rules! typed_view {
    ($(#[$meta:meta])* $view:ident, $type_name:expr, $body:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $view<'a> {
            node: &'a LoomNode,
        }

        impl<'a> $view<'a> {
            pub const TYPE: &'static str = $type_name;

            /// Wrap `node`, failing if it has a different type.
            pub fn wrap(node: &'a LoomNode) -> Result<Self, GraphError> {
                node.assert_type(Self::TYPE)?;
                Ok(Self { node })
            }

            pub fn node(&self) -> &'a LoomNode {
                self.node
            }

            pub fn id(&self) -> Uuid {
                self.node.id()
            }

            pub fn label(&self) -> Option<&'a str> {
                self.node.label()
            }

            pub fn body(&self) -> Result<$body, GraphError> {
                self.node.view_body_as()
            }
        }
    };
}

typed_view!(
    /// A tensor: a dtype and the range of its coordinates.
    TensorNode,
    TENSOR_TYPE,
    TensorBody
);
typed_view!(
    /// An operation signature: kernel, params, and its full selections.
    OperationNode,
    OPERATION_TYPE,
    OperationBody
);
typed_view!(
    /// One shard of an operation.
    ApplicationNode,
    APPLICATION_TYPE,
    ApplicationBody
);
typed_view!(NoteNode, NOTE_TYPE, NoteBody);

impl<'a> TensorNode<'a> {
    pub fn range(&self) -> Result<ZRange, GraphError> {
        Ok(self.body()?.range)
    }

    /// The selection covering the whole tensor.
    pub fn selection(&self) -> Result<TensorSelection, GraphError> {
        Ok(TensorSelection::new(self.id(), self.range()?))
    }

    /// Operations listing this tensor among their outputs.
    pub fn source_operations(&self, graph: &'a LoomGraph) -> Vec<OperationNode<'a>> {
        let id = self.id();
        graph
            .operations()
            .filter(|op| op.body().is_ok_and(|b| references(&b.outputs, id)))
            .collect()
    }

    /// Operations listing this tensor among their inputs.
    pub fn consumer_operations(&self, graph: &'a LoomGraph) -> Vec<OperationNode<'a>> {
        let id = self.id();
        graph
            .operations()
            .filter(|op| op.body().is_ok_and(|b| references(&b.inputs, id)))
            .collect()
    }
}

impl<'a> OperationNode<'a> {
    /// Applications whose `operationId` names this operation.
    pub fn application_nodes(&self, graph: &'a LoomGraph) -> Vec<ApplicationNode<'a>> {
        self.shards(graph).into_iter().map(|(app, _)| app).collect()
    }

    /// Parsed shards of this operation, in id order.
    pub fn shards(
        &self,
        graph: &'a LoomGraph,
    ) -> Vec<(ApplicationNode<'a>, &'a ApplicationBody)> {
        graph
            .shard_index()
            .shards(self.id())
            .filter_map(|(id, body)| {
                let app = graph.node(id).and_then(|n| ApplicationNode::wrap(n).ok())?;
                Some((app, body))
            })
            .collect()
    }

    pub fn ipf_signature(&self) -> Result<IpfSignature, GraphError> {
        self.node.view_tag_as(IPF_SIGNATURE_TAG)
    }

    pub fn ipf_index(&self) -> Result<ZRange, GraphError> {
        self.node.view_tag_as(IPF_INDEX_TAG)
    }
}

impl<'a> ApplicationNode<'a> {
    pub fn ipf_index(&self) -> Result<ZRange, GraphError> {
        self.node.view_tag_as(IPF_INDEX_TAG)
    }
}

fn references(map: &SelectionMap, tensor_id: Uuid) -> bool {
    map.values().flatten().any(|s| s.tensor_id == tensor_id)
}

// ── Shard index ──────────────────────────────────────────────────────────

/// Application bodies of one graph, parsed once and grouped by the
/// `operationId` they name.
#[derive(Debug, Clone, Default)]
pub struct ShardIndex {
    bodies: BTreeMap<Uuid, ApplicationBody>,
    by_operation: BTreeMap<Uuid, Vec<Uuid>>,
    unparsed: BTreeSet<Uuid>,
}

impl ShardIndex {
    pub fn build(graph: &LoomGraph) -> Self {
        let mut index = Self::default();
        for app in graph.applications() {
            match app.body() {
                Ok(body) => {
                    index
                        .by_operation
                        .entry(body.operation_id)
                        .or_default()
                        .push(app.id());
                    index.bodies.insert(app.id(), body);
                }
                Err(_) => {
                    if let Some(op) = raw_operation_id(app.node()) {
                        index.unparsed.insert(op);
                    }
                }
            }
        }
        index
    }

    /// Every parsed Application body, in application id order.
    pub fn bodies(&self) -> impl Iterator<Item = (Uuid, &ApplicationBody)> {
        self.bodies.iter().map(|(id, body)| (*id, body))
    }

    /// Parsed Applications naming `operation_id`.
    pub fn shards(&self, operation_id: Uuid) -> impl Iterator<Item = (Uuid, &ApplicationBody)> {
        self.by_operation
            .get(&operation_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.bodies.get(id).map(|body| (*id, body)))
    }

    /// Whether an Application with a malformed body still names `operation_id`.
    pub fn has_unparsed_shards(&self, operation_id: Uuid) -> bool {
        self.unparsed.contains(&operation_id)
    }
}

fn raw_operation_id(node: &LoomNode) -> Option<Uuid> {
    let raw = node.body().get("operationId")?.as_str()?;
    Uuid::parse_str(raw).ok()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zpoint;
    use serde_json::json;

    fn tensor(dtype: &str) -> LoomNode {
        LoomNode::new(
            Uuid::new_v4(),
            TENSOR_TYPE,
            json!({"dtype": dtype, "range": {"start": [0, 0], "end": [3, 4]}}),
        )
    }

    #[test]
    fn kinds() {
        assert_eq!(NodeKind::of(TENSOR_TYPE), NodeKind::Tensor);
        assert_eq!(NodeKind::of(NOTE_TYPE).name(), "Note");
        assert_eq!(NodeKind::of("urn:other"), NodeKind::Generic);
    }

    #[test]
    fn typed_view_checks_type() {
        let node = tensor("int32");
        let view = TensorNode::wrap(&node).unwrap();
        assert_eq!(view.range().unwrap(), ZRange::from_shape(zpoint![3, 4]).unwrap());
        assert!(matches!(
            NoteNode::wrap(&node),
            Err(GraphError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn body_errors_name_the_node() {
        let node = LoomNode::new(Uuid::new_v4(), TENSOR_TYPE, json!({"dtype": 3}));
        let err = node.view_body_as::<TensorBody>().unwrap_err();
        assert!(matches!(err, GraphError::Body { id, .. } if id == node.id()));
    }

    #[test]
    fn tags() {
        let mut node = tensor("int32");
        assert!(matches!(
            node.view_tag_as::<ZRange>(IPF_INDEX_TAG),
            Err(GraphError::MissingTag { .. })
        ));
        node.set_tag(IPF_INDEX_TAG, &ZRange::from_shape(zpoint![2]).unwrap())
            .unwrap();
        assert!(node.has_tag(IPF_INDEX_TAG));
        let index: ZRange = node.view_tag_as(IPF_INDEX_TAG).unwrap();
        assert_eq!(index.size().unwrap(), 2);
        assert!(node.remove_tag(IPF_INDEX_TAG).is_some());
    }

    #[test]
    fn json_path_and_context() {
        let node = tensor("int32").with_label("A");
        let ctx = node.as_context("Tensor Node");
        assert_eq!(ctx.jsonpath.as_deref(), Some(node.json_path().as_str()));
        assert_eq!(ctx.data.as_ref().unwrap()["label"], json!("A"));
    }

    #[test]
    fn node_json_shape() {
        let id = Uuid::nil();
        let node = LoomNode::new(id, NOTE_TYPE, json!({"message": "hi"}));
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({"id": id, "type": NOTE_TYPE, "body": {"message": "hi"}})
        );
    }

    #[test]
    fn equality_ignores_owner() {
        let a = tensor("int32");
        let mut b = a.clone();
        b.set_graph_id(Some(Uuid::new_v4()));
        assert_eq!(a, b);
    }
}
