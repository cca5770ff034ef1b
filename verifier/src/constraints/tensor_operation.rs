// tensor_operation.rs — Selection bounds and rank checks
//
// Every selection in an Operation or Application body must name an existing
// Tensor, have the tensor's rank, and lie inside the tensor's range. A
// failed reference skips only that selection.

use tracing::debug;

use super::{io_maps, selection_path, validate_node_reference};
use crate::diag::{Context, IssueType, ValidationIssue, ValidationIssueCollector};
use crate::env::{Constraint, Environment};
use crate::error::EnvError;
use crate::graph::LoomGraph;
use crate::node::{LoomNode, SelectionMap, TensorBody, OPERATION_TYPE, TENSOR_TYPE};

#[derive(Debug, Clone, Copy, Default)]
pub struct TensorOperationAgreement;

impl TensorOperationAgreement {
    pub const NAME: &'static str = "TensorOperationAgreement";
}

impl Constraint for TensorOperationAgreement {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check_requirements(&self, env: &Environment) -> Result<(), EnvError> {
        env.assert_supports_node_type(Self::NAME, TENSOR_TYPE)?;
        env.assert_supports_node_type(Self::NAME, OPERATION_TYPE)
    }

    fn validate_constraint(
        &self,
        _env: &Environment,
        graph: &LoomGraph,
        collector: &mut ValidationIssueCollector,
    ) {
        for op in graph.operations() {
            match op.body() {
                Ok(body) => check_selections(
                    graph,
                    op.node(),
                    "Operation Node",
                    &body.inputs,
                    &body.outputs,
                    collector,
                ),
                Err(e) => {
                    debug!(node = %op.id(), error = %e, "skipping operation with malformed body")
                }
            }
        }
        for (id, body) in graph.shard_index().bodies() {
            if let Some(app) = graph.node(id) {
                check_selections(
                    graph,
                    app,
                    "Application Node",
                    &body.inputs,
                    &body.outputs,
                    collector,
                );
            }
        }
    }
}

fn check_selections(
    graph: &LoomGraph,
    owner: &LoomNode,
    owner_context: &str,
    inputs: &SelectionMap,
    outputs: &SelectionMap,
    collector: &mut ValidationIssueCollector,
) {
    for (map_name, map) in io_maps(inputs, outputs) {
        for (key, selections) in map {
            for (idx, selection) in selections.iter().enumerate() {
                let path = selection_path(owner, map_name, key, idx);
                let Some(tensor_node) = validate_node_reference(
                    graph,
                    selection.tensor_id,
                    TENSOR_TYPE,
                    &path,
                    collector,
                    || vec![owner.as_context(owner_context)],
                ) else {
                    continue;
                };
                let Ok(tensor) = tensor_node.view_body_as::<TensorBody>() else {
                    continue;
                };

                let contexts = || {
                    vec![
                        Context::new("Selection Range")
                            .with_jsonpath(path.as_str())
                            .with_data(&selection.range),
                        tensor_node.as_context("Tensor Node"),
                        owner.as_context(owner_context),
                    ]
                };

                if selection.range.ndim() != tensor.range.ndim() {
                    collector.add_issue_with(
                        ValidationIssue::new(
                            IssueType::NodeValidationError,
                            "Tensor selection has the wrong number of dimensions",
                        )
                        .with_param("nodeType", owner.node_type())
                        .with_param("expectedDimensions", tensor.range.ndim())
                        .with_param("actualDimensions", selection.range.ndim()),
                        contexts,
                    );
                    continue;
                }

                if !tensor.range.contains(&selection.range) {
                    collector.add_issue_with(
                        ValidationIssue::new(
                            IssueType::NodeValidationError,
                            "Tensor selection is out of bounds",
                        )
                        .with_param("nodeType", owner.node_type())
                        .with_message(format!(
                            "selection {} is not within tensor range {}",
                            selection.range, tensor.range
                        )),
                        contexts,
                    );
                }
            }
        }
    }
}
