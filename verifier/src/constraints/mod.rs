// constraints/mod.rs — Built-in constraints and shared reference checks
//
// Every constraint here implements `env::Constraint`. Structural checks
// (types, schemas, dtypes, selection bounds) come first in the presets;
// tiling checks (shard agreement, coverage, IPF agreement, cycles) depend on
// them and are registered after.

pub mod body_schema;
pub mod coverage;
pub mod cycles;
pub mod dtypes;
pub mod ipf_agreement;
pub mod operation_application;
pub mod tensor_operation;
pub mod type_restriction;

pub use body_schema::NodeBodySchemaConstraint;
pub use coverage::ApplicationOutputRangeCoverageIsExact;
pub use cycles::NoTensorOperationCycles;
pub use dtypes::TensorDTypesAreValid;
pub use ipf_agreement::IpfSignatureAgreement;
pub use operation_application::OperationApplicationAgreement;
pub use tensor_operation::TensorOperationAgreement;
pub use type_restriction::TypeRestrictionConstraint;

use uuid::Uuid;

use crate::diag::{Context, IssueType, ValidationIssue, ValidationIssueCollector};
use crate::graph::LoomGraph;
use crate::node::{LoomNode, SelectionMap};

/// JSONPath of `selections[key][idx]` in `node`'s body.
pub(crate) fn selection_path(node: &LoomNode, map_name: &str, key: &str, idx: usize) -> String {
    format!("{}.body.{}.{}[{}]", node.json_path(), map_name, key, idx)
}

/// The `("inputs", ..)` and `("outputs", ..)` pair of a body.
pub(crate) fn io_maps<'a>(
    inputs: &'a SelectionMap,
    outputs: &'a SelectionMap,
) -> [(&'static str, &'a SelectionMap); 2] {
    [("inputs", inputs), ("outputs", outputs)]
}

/// Resolve `node_id` to a node of `node_type`.
///
/// A missing node or a node of another type is reported as a
/// `NodeReferenceError` carrying a "Reference" context at `field_path`
/// followed by `contexts()`; the result is then `None`.
pub(crate) fn validate_node_reference<'g, C>(
    graph: &'g LoomGraph,
    node_id: Uuid,
    node_type: &str,
    field_path: &str,
    collector: &mut ValidationIssueCollector,
    contexts: C,
) -> Option<&'g LoomNode>
where
    C: FnOnce() -> Vec<Context>,
{
    let reference = || {
        let mut all = vec![Context::new("Reference")
            .with_jsonpath(field_path)
            .with_data(&node_id)];
        all.extend(contexts());
        all
    };

    let Some(node) = graph.node(node_id) else {
        collector.add_issue_with(
            ValidationIssue::new(IssueType::NodeReferenceError, "Referenced node does not exist")
                .with_param("nodeId", node_id)
                .with_param("nodeType", node_type),
            reference,
        );
        return None;
    };
    if node.node_type() != node_type {
        collector.add_issue_with(
            ValidationIssue::new(
                IssueType::NodeReferenceError,
                "Referenced node has the wrong type",
            )
            .with_param("nodeId", node_id)
            .with_param("expectedType", node_type)
            .with_param("actualType", node.node_type()),
            reference,
        );
        return None;
    }
    Some(node)
}
