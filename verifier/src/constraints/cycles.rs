// cycles.rs — Data-flow cycle detection

use serde::Serialize;
use uuid::Uuid;

use super::TensorOperationAgreement;
use crate::diag::{Context, IssueType, ValidationIssue, ValidationIssueCollector};
use crate::env::{Constraint, Environment};
use crate::error::EnvError;
use crate::graph::LoomGraph;
use crate::node::{LoomNode, OPERATION_TYPE, TENSOR_TYPE};
use crate::traversal::find_operation_simple_cycles;

/// No tensor may (transitively) feed the operation that produces it.
///
/// Each simple cycle of the tensor/operation data-flow graph is reported as
/// one `ReferenceCycleError` whose "Cycle" context lists the nodes in
/// data-flow order, starting from an operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTensorOperationCycles;

impl NoTensorOperationCycles {
    pub const NAME: &'static str = "NoTensorOperationCycles";
}

#[derive(Serialize)]
struct CycleEntry<'a> {
    id: Uuid,
    #[serde(rename = "type")]
    node_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<&'a str>,
}

impl<'a> From<&'a LoomNode> for CycleEntry<'a> {
    fn from(node: &'a LoomNode) -> Self {
        Self {
            id: node.id(),
            node_type: node.node_type(),
            label: node.label(),
        }
    }
}

impl Constraint for NoTensorOperationCycles {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check_requirements(&self, env: &Environment) -> Result<(), EnvError> {
        env.assert_supports_node_type(Self::NAME, TENSOR_TYPE)?;
        env.assert_supports_node_type(Self::NAME, OPERATION_TYPE)?;
        env.assert_constraint(Self::NAME, TensorOperationAgreement::NAME)
    }

    fn validate_constraint(
        &self,
        _env: &Environment,
        graph: &LoomGraph,
        collector: &mut ValidationIssueCollector,
    ) {
        for cycle in find_operation_simple_cycles(graph) {
            collector.add_issue_with(
                ValidationIssue::new(IssueType::ReferenceCycleError, "Reference Cycle detected")
                    .with_param("length", cycle.len()),
                || {
                    let entries: Vec<CycleEntry<'_>> =
                        cycle.iter().map(|n| CycleEntry::from(*n)).collect();
                    vec![Context::new("Cycle").with_data(&entries)]
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn read_write_cycle_is_reported_in_flow_order() {
        let env = Arc::new(
            Environment::builder()
                .node_type(TENSOR_TYPE)
                .node_type(OPERATION_TYPE)
                .constraint(TensorOperationAgreement)
                .constraint(NoTensorOperationCycles)
                .build()
                .unwrap(),
        );
        let mut g = env.new_graph();
        let a = g
            .create_node(
                TENSOR_TYPE,
                Some("A"),
                json!({"dtype": "int32", "range": {"start": [0], "end": [2]}}),
            )
            .unwrap();
        let sel = json!([{"tensorId": a, "range": {"start": [0], "end": [2]}}]);
        let add = g
            .create_node(
                OPERATION_TYPE,
                Some("Add"),
                json!({"kernel": "add", "inputs": {"x": sel}, "outputs": {"y": sel}}),
            )
            .unwrap();

        let mut c = ValidationIssueCollector::new();
        g.validate_into(&mut c).unwrap();
        assert_eq!(c.len(), 1);
        let issue = &c.issues()[0];
        assert_eq!(issue.issue_type, IssueType::ReferenceCycleError);
        assert_eq!(issue.summary, "Reference Cycle detected");
        assert_eq!(
            issue.contexts[0].data,
            Some(json!([
                {"id": add, "type": OPERATION_TYPE, "label": "Add"},
                {"id": a, "type": TENSOR_TYPE, "label": "A"}
            ]))
        );
    }

    #[test]
    fn requires_reference_checks() {
        let err = Environment::builder()
            .node_type(TENSOR_TYPE)
            .node_type(OPERATION_TYPE)
            .constraint(NoTensorOperationCycles)
            .build()
            .unwrap_err();
        assert!(matches!(err, EnvError::MissingDependency { .. }));
    }
}
