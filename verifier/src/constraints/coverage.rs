// coverage.rs — Exact output coverage by shards

use super::operation_application::{range_map, ShardedOperation};
use super::OperationApplicationAgreement;
use crate::diag::{Context, IssueType, ValidationIssue, ValidationIssueCollector};
use crate::env::{Constraint, Environment};
use crate::error::{EnvError, ZSpaceError};
use crate::graph::LoomGraph;
use crate::zrange::ZRange;

/// The shards of an operation must write each output cell exactly once.
///
/// Together with the bounding check in `OperationApplicationAgreement` this
/// makes shard outputs an exact partition: the sizes of the shard ranges for
/// each output selection must sum to the operation's range size. The two
/// checks are independent and may both fire.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationOutputRangeCoverageIsExact;

impl ApplicationOutputRangeCoverageIsExact {
    pub const NAME: &'static str = "ApplicationOutputRangeCoverageIsExact";
}

impl Constraint for ApplicationOutputRangeCoverageIsExact {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check_requirements(&self, env: &Environment) -> Result<(), EnvError> {
        env.assert_constraint(Self::NAME, OperationApplicationAgreement::NAME)
    }

    fn validate_constraint(
        &self,
        _env: &Environment,
        graph: &LoomGraph,
        collector: &mut ValidationIssueCollector,
    ) {
        for op in graph.operations() {
            let Some(sharded) = ShardedOperation::collect(graph, op) else {
                continue;
            };
            if sharded.shards.is_empty() {
                continue;
            }
            let shard_ids = sharded.shard_ids();
            for (key, selections) in &sharded.body.outputs {
                for (idx, selection) in selections.iter().enumerate() {
                    let Some(shard_ranges) = sharded.shard_ranges("outputs", key, idx) else {
                        continue;
                    };
                    let ranges_context = || {
                        vec![
                            Context::new("Application Shard Ranges")
                                .with_data(&range_map(&shard_ids, &shard_ranges)),
                            sharded.node.as_context("Operation Node"),
                        ]
                    };
                    let (total, expected) = match sizes(&shard_ranges, &selection.range) {
                        Ok(sizes) => sizes,
                        Err(e) => {
                            collector.add_issue_with(
                                ValidationIssue::new(
                                    IssueType::NodeValidationError,
                                    format!(
                                        "Application output key \"{key}[{idx}]\" range size is not representable"
                                    ),
                                )
                                .with_message(e.to_string()),
                                ranges_context,
                            );
                            continue;
                        }
                    };
                    if total == expected {
                        continue;
                    }
                    collector.add_issue_with(
                        ValidationIssue::new(
                            IssueType::NodeValidationError,
                            format!("Overlapping Application output key \"{key}[{idx}]\" ranges"),
                        )
                        .with_message(format!(
                            "shard sizes sum to {total}, operation range {} has size {expected}",
                            selection.range
                        )),
                        ranges_context,
                    );
                }
            }
        }
    }
}

/// Summed shard sizes and the operation range size.
fn sizes(shards: &[ZRange], range: &ZRange) -> Result<(i64, i64), ZSpaceError> {
    let total = shards.iter().try_fold(0i64, |acc, r| {
        acc.checked_add(r.size()?).ok_or(ZSpaceError::Overflow { op: "sum" })
    })?;
    Ok((total, range.size()?))
}
