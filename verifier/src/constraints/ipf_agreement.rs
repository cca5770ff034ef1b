// ipf_agreement.rs — IPF signature agreement
//
// An operation tagged with an IPF signature must also carry an IPF index.
// Every selection of the operation must then equal the projection of the
// operation index, and every selection of each shard must equal the
// projection of the shard's own index, which must lie inside the
// operation's index.
//
// Preconditions: `OperationApplicationAgreement` registered before this.
// Postconditions: none (read-only).
// Failure modes: none; disagreements become issues.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt::Display;

use tracing::debug;

use super::OperationApplicationAgreement;
use crate::diag::{Context, IssueType, ValidationIssue, ValidationIssueCollector};
use crate::env::{Constraint, Environment};
use crate::error::EnvError;
use crate::graph::LoomGraph;
use crate::ipf::{IndexProjectionFunction, IpfSignature};
use crate::node::{
    OperationNode, SelectionMap, APPLICATION_TYPE, IPF_INDEX_TAG, IPF_SIGNATURE_TAG,
    OPERATION_TYPE,
};
use crate::zrange::ZRange;

#[derive(Debug, Clone, Copy, Default)]
pub struct IpfSignatureAgreement;

impl IpfSignatureAgreement {
    pub const NAME: &'static str = "IpfSignatureAgreement";
}

type ProjectionMap = BTreeMap<String, Vec<IndexProjectionFunction>>;

impl Constraint for IpfSignatureAgreement {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check_requirements(&self, env: &Environment) -> Result<(), EnvError> {
        env.assert_supports_node_type(Self::NAME, OPERATION_TYPE)?;
        env.assert_supports_node_type(Self::NAME, APPLICATION_TYPE)?;
        env.assert_supports_tag_type(Self::NAME, IPF_SIGNATURE_TAG)?;
        env.assert_supports_tag_type(Self::NAME, IPF_INDEX_TAG)?;
        env.assert_constraint(Self::NAME, OperationApplicationAgreement::NAME)
    }

    fn validate_constraint(
        &self,
        _env: &Environment,
        graph: &LoomGraph,
        collector: &mut ValidationIssueCollector,
    ) {
        for op in graph.operations() {
            if op.node().has_tag(IPF_SIGNATURE_TAG) {
                check_operation(graph, op, collector);
            }
        }
    }
}

fn check_operation(graph: &LoomGraph, op: OperationNode<'_>, collector: &mut ValidationIssueCollector) {
    let (body, signature) = match (op.body(), op.ipf_signature()) {
        (Ok(body), Ok(signature)) => (body, signature),
        (Err(e), _) | (_, Err(e)) => {
            debug!(node = %op.id(), error = %e, "skipping operation with malformed body or signature");
            return;
        }
    };
    let node = op.node();
    let op_contexts = || {
        vec![
            Context::new("Operation Node")
                .with_jsonpath(format!("{}.body", node.json_path()))
                .with_data(&node.id()),
            Context::new("Operation Signature")
                .with_jsonpath(node.json_path())
                .with_data(&node.id()),
        ]
    };

    if !node.has_tag(IPF_INDEX_TAG) {
        collector.add_issue_with(
            ValidationIssue::new(
                IssueType::NodeValidationError,
                "Operation signature does not have an IPF index",
            )
            .with_param("opSigId", node.id()),
            || {
                let mut contexts = vec![node.as_context("Operation Signature")];
                contexts.extend(op_contexts());
                contexts
            },
        );
        return;
    }
    let op_index = match op.ipf_index() {
        Ok(index) => index,
        Err(e) => {
            debug!(node = %op.id(), error = %e, "skipping operation with malformed IPF index");
            return;
        }
    };

    check_projections(&op_index, &signature, &body.inputs, &body.outputs, collector, op_contexts);

    for (app, app_body) in op.shards(graph) {
        let app_node = app.node();
        let shard_contexts = || {
            let mut contexts = vec![app_node.as_context("Application Node")];
            contexts.extend(op_contexts());
            contexts
        };

        if !app_node.has_tag(IPF_INDEX_TAG) {
            collector.add_issue_with(
                ValidationIssue::new(
                    IssueType::NodeValidationError,
                    "Application node does not have an IPF index",
                )
                .with_param("appNodeId", app.id())
                .with_param("opSigId", node.id()),
                shard_contexts,
            );
            continue;
        }
        let app_index = match app.ipf_index() {
            Ok(index) => index,
            Err(e) => {
                debug!(node = %app.id(), error = %e, "skipping application with malformed IPF index");
                continue;
            }
        };
        if !op_index.contains(&app_index) {
            collector.add_issue_with(
                ValidationIssue::new(
                    IssueType::NodeValidationError,
                    "Application IPF index is outside the operation IPF index",
                )
                .with_param("appNodeId", app.id())
                .with_param("opSigId", node.id())
                .with_message(format!(
                    "shard index {app_index} is not within operation index {op_index}"
                )),
                shard_contexts,
            );
            continue;
        }

        check_projections(
            &app_index,
            &signature,
            &app_body.inputs,
            &app_body.outputs,
            collector,
            shard_contexts,
        );
    }
}

fn check_projections<C>(
    index: &ZRange,
    signature: &IpfSignature,
    inputs: &SelectionMap,
    outputs: &SelectionMap,
    collector: &mut ValidationIssueCollector,
    contexts: C,
) where
    C: Fn() -> Vec<Context> + Copy,
{
    check_projection_map(index, "inputs", inputs, &signature.inputs, collector, contexts);
    check_projection_map(index, "outputs", outputs, &signature.outputs, collector, contexts);
}

fn check_projection_map<C>(
    index: &ZRange,
    map_name: &str,
    selections: &SelectionMap,
    projections: &ProjectionMap,
    collector: &mut ValidationIssueCollector,
    contexts: C,
) where
    C: Fn() -> Vec<Context> + Copy,
{
    if !selections.keys().eq(projections.keys()) {
        collector.add_issue_with(
            ValidationIssue::new(
                IssueType::NodeValidationError,
                "Selection map and projection map have different keys",
            )
            .with_param("selectionMapName", map_name)
            .with_param("selectionMapKeys", list(selections.keys()))
            .with_param("projectionMapKeys", list(projections.keys())),
            contexts,
        );
        return;
    }

    for ((io_name, sels), projs) in selections.iter().zip(projections.values()) {
        if sels.len() != projs.len() {
            collector.add_issue_with(
                ValidationIssue::new(
                    IssueType::NodeValidationError,
                    "Selection map and projection map have different sizes",
                )
                .with_param("selectionMapName", map_name)
                .with_param("ioName", io_name)
                .with_param("selections", list(sels.iter().map(|s| &s.range)))
                .with_param("projections", list(projs)),
                contexts,
            );
            continue;
        }

        for (selection, projection) in sels.iter().zip(projs) {
            let expected = match projection.apply(index) {
                Ok(expected) => expected,
                Err(e) => {
                    collector.add_issue_with(
                        ValidationIssue::new(
                            IssueType::NodeValidationError,
                            "Projection cannot be applied to the IPF index",
                        )
                        .with_param("selectionMapName", map_name)
                        .with_param("ioName", io_name)
                        .with_param("projection", projection)
                        .with_param("index", index)
                        .with_message(e.to_string()),
                        contexts,
                    );
                    continue;
                }
            };
            if selection.range != expected {
                collector.add_issue_with(
                    ValidationIssue::new(
                        IssueType::NodeValidationError,
                        "Selection map and projection map have different ranges",
                    )
                    .with_param("selectionMapName", map_name)
                    .with_param("ioName", io_name)
                    .with_param("selection", &selection.range)
                    .with_param("projection", projection)
                    .with_param("expected", &expected),
                    contexts,
                );
            }
        }
    }
}

fn list<T: Display>(items: impl IntoIterator<Item = T>) -> String {
    let items: Vec<String> = items.into_iter().map(|i| i.to_string()).collect();
    format!("[{}]", items.join(", "))
}
