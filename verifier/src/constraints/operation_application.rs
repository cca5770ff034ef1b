// operation_application.rs — Operation / shard agreement
//
// Each Operation is the signature of a sharded computation; its Applications
// are the shards. Per shard, the selection maps must mirror the operation's
// (same keys, same list lengths, same tensors) with every shard range inside
// the operation range. When all shards agree, each operation range must
// equal the bounding range of the matching shard ranges.
//
// Preconditions: `TensorOperationAgreement` registered before this.
// Postconditions: none (read-only).
// Failure modes: none; disagreements become issues.
// Side effects: none.

use std::collections::BTreeMap;

use tracing::debug;
use uuid::Uuid;

use super::{io_maps, selection_path, validate_node_reference, TensorOperationAgreement};
use crate::diag::{Context, IssueType, ValidationIssue, ValidationIssueCollector};
use crate::env::{Constraint, Environment};
use crate::error::EnvError;
use crate::graph::LoomGraph;
use crate::node::{
    ApplicationBody, LoomNode, OperationBody, OperationNode, SelectionMap, APPLICATION_TYPE,
    OPERATION_TYPE, TENSOR_TYPE,
};
use crate::zrange::ZRange;

#[derive(Debug, Clone, Copy, Default)]
pub struct OperationApplicationAgreement;

impl OperationApplicationAgreement {
    pub const NAME: &'static str = "OperationApplicationAgreement";
}

/// An operation together with its parsed shards.
pub(crate) struct ShardedOperation<'g> {
    pub node: &'g LoomNode,
    pub body: OperationBody,
    pub shards: Vec<(&'g LoomNode, &'g ApplicationBody)>,
}

impl<'g> ShardedOperation<'g> {
    /// `None` when the operation body does not parse, or when one of its
    /// Applications has a malformed body and the shard set is unknown.
    pub fn collect(graph: &'g LoomGraph, op: OperationNode<'g>) -> Option<Self> {
        let body = match op.body() {
            Ok(body) => body,
            Err(e) => {
                debug!(node = %op.id(), error = %e, "skipping operation with malformed body");
                return None;
            }
        };
        if graph.shard_index().has_unparsed_shards(op.id()) {
            debug!(node = %op.id(), "skipping operation with malformed shards");
            return None;
        }
        let shards = op
            .shards(graph)
            .into_iter()
            .map(|(app, body)| (app.node(), body))
            .collect();
        Some(Self {
            node: op.node(),
            body,
            shards,
        })
    }

    pub fn shard_ids(&self) -> Vec<Uuid> {
        self.shards.iter().map(|(n, _)| n.id()).collect()
    }

    /// Ranges of `map_name[key][idx]` across all shards, or `None` if any
    /// shard lacks that selection.
    pub fn shard_ranges(&self, map_name: &str, key: &str, idx: usize) -> Option<Vec<ZRange>> {
        self.shards
            .iter()
            .map(|(_, body)| {
                let map = if map_name == "inputs" {
                    &body.inputs
                } else {
                    &body.outputs
                };
                map.get(key)?.get(idx).map(|s| s.range.clone())
            })
            .collect()
    }
}

/// `shard id -> range` data for the "Application Shard Ranges" context.
pub(crate) fn range_map(ids: &[Uuid], ranges: &[ZRange]) -> BTreeMap<Uuid, ZRange> {
    ids.iter().copied().zip(ranges.iter().cloned()).collect()
}

impl Constraint for OperationApplicationAgreement {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check_requirements(&self, env: &Environment) -> Result<(), EnvError> {
        env.assert_supports_node_type(Self::NAME, TENSOR_TYPE)?;
        env.assert_supports_node_type(Self::NAME, OPERATION_TYPE)?;
        env.assert_supports_node_type(Self::NAME, APPLICATION_TYPE)?;
        env.assert_constraint(Self::NAME, TensorOperationAgreement::NAME)
    }

    fn validate_constraint(
        &self,
        _env: &Environment,
        graph: &LoomGraph,
        collector: &mut ValidationIssueCollector,
    ) {
        for (id, body) in graph.shard_index().bodies() {
            let Some(app) = graph.node(id) else {
                continue;
            };
            validate_node_reference(
                graph,
                body.operation_id,
                OPERATION_TYPE,
                &format!("{}.body.operationId", app.json_path()),
                collector,
                || vec![app.as_context("Application Node")],
            );
        }

        for op in graph.operations() {
            if let Some(sharded) = ShardedOperation::collect(graph, op) {
                validate_operation(&sharded, collector);
            }
        }
    }
}

fn validate_operation(op: &ShardedOperation<'_>, collector: &mut ValidationIssueCollector) {
    let op_context = || vec![op.node.as_context("Operation Node")];

    if op.shards.is_empty() {
        collector.add_issue_with(
            ValidationIssue::new(
                IssueType::NodeValidationError,
                "Operation Signature has no Application shards",
            ),
            op_context,
        );
        return;
    }

    let mut valid = true;
    for (shard, body) in &op.shards {
        for ((map_name, app_map), (_, sig_map)) in io_maps(&body.inputs, &body.outputs)
            .into_iter()
            .zip(io_maps(&op.body.inputs, &op.body.outputs))
        {
            valid &= selection_maps_agree(shard, op.node, map_name, app_map, sig_map, collector);
        }
    }
    if !valid {
        return;
    }

    let shard_ids = op.shard_ids();
    for (map_name, sig_map) in io_maps(&op.body.inputs, &op.body.outputs) {
        for (key, selections) in sig_map {
            for (idx, selection) in selections.iter().enumerate() {
                let Some(shard_ranges) = op.shard_ranges(map_name, key, idx) else {
                    continue;
                };
                let Ok(bounding) = ZRange::bounding_range(&shard_ranges) else {
                    continue;
                };
                if bounding == selection.range {
                    continue;
                }
                collector.add_issue_with(
                    ValidationIssue::new(
                        IssueType::NodeValidationError,
                        format!(
                            "Operation Signature {map_name} key \"{key}[{idx}]\" range {} != shard bounding range {bounding}",
                            selection.range
                        ),
                    ),
                    || {
                        let mut contexts = vec![Context::new("Application Shard Ranges")
                            .with_data(&range_map(&shard_ids, &shard_ranges))];
                        contexts.extend(op_context());
                        contexts
                    },
                );
            }
        }
    }
}

/// One shard's selection map against the operation's map of the same name.
fn selection_maps_agree(
    app: &LoomNode,
    op: &LoomNode,
    map_name: &str,
    app_map: &SelectionMap,
    sig_map: &SelectionMap,
    collector: &mut ValidationIssueCollector,
) -> bool {
    let pair_context = || {
        vec![
            app.as_context("Application Node"),
            op.as_context("Operation Node"),
        ]
    };

    if !app_map.keys().eq(sig_map.keys()) {
        collector.add_issue_with(
            ValidationIssue::new(
                IssueType::NodeValidationError,
                format!(
                    "Application Node {map_name} keys {} != Operation Signature {map_name} keys {}",
                    key_list(app_map),
                    key_list(sig_map)
                ),
            ),
            pair_context,
        );
        return false;
    }

    let mut valid = true;
    for ((key, app_selections), sig_selections) in app_map.iter().zip(sig_map.values()) {
        if app_selections.len() != sig_selections.len() {
            collector.add_issue_with(
                ValidationIssue::new(
                    IssueType::NodeValidationError,
                    format!(
                        "Application {map_name} key \"{key}\" selection size ({}) != Signature selection size ({})",
                        app_selections.len(),
                        sig_selections.len()
                    ),
                ),
                pair_context,
            );
            valid = false;
            continue;
        }

        for (idx, (app_sel, sig_sel)) in app_selections.iter().zip(sig_selections).enumerate() {
            let contexts = || {
                let mut contexts = vec![
                    Context::new("Application Tensor Selection")
                        .with_jsonpath(selection_path(app, map_name, key, idx))
                        .with_data(app_sel),
                    Context::new("Operation Tensor Selection")
                        .with_jsonpath(selection_path(op, map_name, key, idx))
                        .with_data(sig_sel),
                ];
                contexts.extend(pair_context());
                contexts
            };

            if app_sel.tensor_id != sig_sel.tensor_id {
                collector.add_issue_with(
                    ValidationIssue::new(
                        IssueType::NodeValidationError,
                        "Application Tensor Selection Tensor Id != Signature Tensor Id",
                    ),
                    contexts,
                );
                valid = false;
            } else if !sig_sel.range.contains(&app_sel.range) {
                collector.add_issue_with(
                    ValidationIssue::new(
                        IssueType::NodeValidationError,
                        format!(
                            "Application Tensor Selection range {} is outside signature range {}",
                            app_sel.range, sig_sel.range
                        ),
                    ),
                    contexts,
                );
                valid = false;
            }
        }
    }
    valid
}

fn key_list(map: &SelectionMap) -> String {
    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
    format!("[{}]", keys.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn env() -> Arc<Environment> {
        Arc::new(
            Environment::builder()
                .node_type(TENSOR_TYPE)
                .node_type(OPERATION_TYPE)
                .node_type(APPLICATION_TYPE)
                .constraint(TensorOperationAgreement)
                .constraint(OperationApplicationAgreement)
                .build()
                .unwrap(),
        )
    }

    fn sel(tensor: Uuid, start: i64, end: i64) -> Value {
        json!({"tensorId": tensor, "range": {"start": [start], "end": [end]}})
    }

    /// A tensor of 10 cells and an operation writing all of it.
    fn base() -> (LoomGraph, Uuid, Uuid) {
        let mut g = env().new_graph();
        let t = g
            .create_node(
                TENSOR_TYPE,
                None,
                json!({"dtype": "int32", "range": {"start": [0], "end": [10]}}),
            )
            .unwrap();
        let op = g
            .create_node(
                OPERATION_TYPE,
                None,
                json!({"kernel": "fill", "outputs": {"y": [sel(t, 0, 10)]}}),
            )
            .unwrap();
        (g, t, op)
    }

    fn shard(g: &mut LoomGraph, op: Uuid, outputs: Value) -> Uuid {
        g.create_node(
            APPLICATION_TYPE,
            None,
            json!({"operationId": op, "outputs": outputs}),
        )
        .unwrap()
    }

    fn summaries(g: &LoomGraph) -> Vec<String> {
        let mut c = ValidationIssueCollector::new();
        g.validate_into(&mut c).unwrap();
        c.into_issues().into_iter().map(|i| i.summary).collect()
    }

    #[test]
    fn exact_shards_pass() {
        let (mut g, t, op) = base();
        shard(&mut g, op, json!({"y": [sel(t, 0, 4)]}));
        shard(&mut g, op, json!({"y": [sel(t, 4, 10)]}));
        assert!(summaries(&g).is_empty());
    }

    #[test]
    fn no_shards() {
        let (g, _, _) = base();
        assert_eq!(summaries(&g), ["Operation Signature has no Application shards"]);
    }

    #[test]
    fn bounding_range_mismatch() {
        let (mut g, t, op) = base();
        shard(&mut g, op, json!({"y": [sel(t, 0, 4)]}));
        shard(&mut g, op, json!({"y": [sel(t, 4, 8)]}));
        let mut c = ValidationIssueCollector::new();
        g.validate_into(&mut c).unwrap();
        assert_eq!(c.len(), 1);
        let issue = &c.issues()[0];
        assert_eq!(
            issue.summary,
            "Operation Signature outputs key \"y[0]\" range zr[0:10] != shard bounding range zr[0:8]"
        );
        assert_eq!(issue.contexts[0].name, "Application Shard Ranges");
        assert_eq!(issue.contexts[0].data.as_ref().unwrap().as_object().unwrap().len(), 2);
    }

    #[test]
    fn key_mismatch_skips_aggregate_checks() {
        let (mut g, t, op) = base();
        shard(&mut g, op, json!({"z": [sel(t, 0, 4)]}));
        assert_eq!(
            summaries(&g),
            ["Application Node outputs keys [z] != Operation Signature outputs keys [y]"]
        );
    }

    #[test]
    fn length_mismatch() {
        let (mut g, t, op) = base();
        shard(&mut g, op, json!({"y": [sel(t, 0, 10), sel(t, 0, 1)]}));
        assert_eq!(
            summaries(&g),
            ["Application outputs key \"y\" selection size (2) != Signature selection size (1)"]
        );
    }

    #[test]
    fn tensor_id_and_range_disagreements() {
        let (mut g, t, op) = base();
        let other = g
            .create_node(
                TENSOR_TYPE,
                None,
                json!({"dtype": "int32", "range": {"start": [0], "end": [10]}}),
            )
            .unwrap();
        shard(&mut g, op, json!({"y": [sel(other, 0, 10)]}));
        shard(&mut g, op, json!({"y": [sel(t, 5, 12)]}));
        let summaries = summaries(&g);
        assert!(summaries.contains(&"Application Tensor Selection Tensor Id != Signature Tensor Id".to_string()));
        assert!(summaries.contains(
            &"Application Tensor Selection range zr[5:12] is outside signature range zr[0:10]".to_string()
        ));
        assert!(!summaries.iter().any(|s| s.contains("bounding")));
    }

    #[test]
    fn dangling_operation_id() {
        let (mut g, t, op) = base();
        shard(&mut g, op, json!({"y": [sel(t, 0, 10)]}));
        shard(&mut g, Uuid::new_v4(), json!({"y": [sel(t, 0, 10)]}));
        let mut c = ValidationIssueCollector::new();
        g.validate_into(&mut c).unwrap();
        assert_eq!(c.len(), 1);
        let issue = &c.issues()[0];
        assert_eq!(issue.issue_type, IssueType::NodeReferenceError);
        assert_eq!(issue.param("nodeType"), Some(OPERATION_TYPE));
        assert!(issue.contexts[0].jsonpath.as_deref().unwrap().ends_with(".body.operationId"));
        assert_eq!(issue.contexts[1].name, "Application Node");
    }

    #[test]
    fn malformed_shard_suppresses_aggregate_checks() {
        let (mut g, t, op) = base();
        shard(&mut g, op, json!({"y": [sel(t, 0, 4)]}));
        g.create_node(
            APPLICATION_TYPE,
            None,
            json!({"operationId": op, "outputs": {"y": [sel(t, 4, 10)]}, "extra": 1}),
        )
        .unwrap();
        assert!(summaries(&g).is_empty());
    }

    #[test]
    fn malformed_only_shard_is_not_reported_missing() {
        let (mut g, _, op) = base();
        g.create_node(APPLICATION_TYPE, None, json!({"operationId": op, "outputs": 3}))
            .unwrap();
        assert!(summaries(&g).is_empty());
    }

    #[test]
    fn shard_index_tracks_mutations() {
        let (mut g, t, op) = base();
        assert_eq!(g.shard_index().shards(op).count(), 0);
        let first = shard(&mut g, op, json!({"y": [sel(t, 0, 10)]}));
        let ids: Vec<Uuid> = g.shard_index().shards(op).map(|(id, _)| id).collect();
        assert_eq!(ids, [first]);
        g.remove_node(first);
        assert_eq!(g.shard_index().shards(op).count(), 0);
        assert!(g.shard_index().bodies().next().is_none());
    }

    #[test]
    fn requires_tensor_operation_agreement() {
        let err = Environment::builder()
            .node_type(TENSOR_TYPE)
            .node_type(OPERATION_TYPE)
            .node_type(APPLICATION_TYPE)
            .constraint(OperationApplicationAgreement)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            EnvError::MissingDependency {
                constraint: OperationApplicationAgreement::NAME,
                dependency: TensorOperationAgreement::NAME
            }
        );
    }
}
