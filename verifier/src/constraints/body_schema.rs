// body_schema.rs — Typed body and tag checks
//
// Runs the environment's schema registry over every node: a body (or known
// tag) that does not deserialize into the registered type is reported as a
// `NodeSchemaError`. Other constraints skip nodes whose bodies fail here.

use crate::diag::{Context, IssueType, ValidationIssue, ValidationIssueCollector};
use crate::env::{Constraint, Environment};
use crate::graph::LoomGraph;

#[derive(Debug, Clone, Copy, Default)]
pub struct NodeBodySchemaConstraint;

impl NodeBodySchemaConstraint {
    pub const NAME: &'static str = "NodeBodySchemaConstraint";
}

impl Constraint for NodeBodySchemaConstraint {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate_constraint(
        &self,
        env: &Environment,
        graph: &LoomGraph,
        collector: &mut ValidationIssueCollector,
    ) {
        for node in graph.nodes() {
            if let Some(check) = env.node_schema(node.node_type()) {
                if let Err(e) = check(node.body()) {
                    collector.add_issue_with(
                        ValidationIssue::new(
                            IssueType::NodeSchemaError,
                            "Body does not match the node type schema",
                        )
                        .with_param("nodeType", node.node_type())
                        .with_message(e.to_string()),
                        || {
                            vec![
                                Context::new("Body")
                                    .with_jsonpath(format!("{}.body", node.json_path()))
                                    .with_data(node.body()),
                                node.as_context("Node"),
                            ]
                        },
                    );
                }
            }

            for (tag_type, value) in node.tags() {
                let Some(check) = env.tag_schema(tag_type) else {
                    continue;
                };
                if let Err(e) = check(value) {
                    collector.add_issue_with(
                        ValidationIssue::new(
                            IssueType::NodeSchemaError,
                            "Tag does not match the tag type schema",
                        )
                        .with_param("nodeType", node.node_type())
                        .with_param("tagType", tag_type)
                        .with_message(e.to_string()),
                        || {
                            vec![
                                Context::new("Tag")
                                    .with_jsonpath(format!("{}.tags['{}']", node.json_path(), tag_type))
                                    .with_data(value),
                                node.as_context("Node"),
                            ]
                        },
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::schema_of;
    use crate::node::{TensorBody, IPF_INDEX_TAG, TENSOR_TYPE};
    use crate::zrange::ZRange;
    use serde_json::json;
    use std::sync::Arc;

    fn env() -> Arc<Environment> {
        Arc::new(
            Environment::builder()
                .node_schema(TENSOR_TYPE, schema_of::<TensorBody>)
                .tag_schema(IPF_INDEX_TAG, schema_of::<ZRange>)
                .constraint(NodeBodySchemaConstraint)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn well_formed_body_passes() {
        let mut g = env().new_graph();
        g.create_node(
            TENSOR_TYPE,
            None,
            json!({"dtype": "int32", "range": {"start": [0], "end": [2]}}),
        )
        .unwrap();
        assert!(g.validate().is_ok());
    }

    #[test]
    fn malformed_body_and_tag_are_reported() {
        let mut g = env().new_graph();
        let id = g
            .create_node(TENSOR_TYPE, None, json!({"dtype": "int32", "range": {"start": [3], "end": [1]}}))
            .unwrap();
        g.node_mut(id)
            .unwrap()
            .set_tag(IPF_INDEX_TAG, &json!({"start": [0]}))
            .unwrap();

        let mut c = crate::diag::ValidationIssueCollector::new();
        g.validate_into(&mut c).unwrap();
        assert_eq!(c.len(), 2);
        assert!(c.issues().iter().all(|i| i.issue_type == IssueType::NodeSchemaError));
        assert_eq!(c.issues()[0].param("nodeType"), Some(TENSOR_TYPE));
        assert_eq!(c.issues()[1].param("tagType"), Some(IPF_INDEX_TAG));
    }
}
