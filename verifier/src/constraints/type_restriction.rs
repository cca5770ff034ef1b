// type_restriction.rs — Allow-lists for node and tag types
//
// The default type-support provider of every environment. It answers
// `supports_node_type` / `supports_tag_type` for requirement checks and, when
// run as a constraint, reports each node or tag whose type is not allowed.

use std::collections::BTreeSet;

use crate::diag::{Context, IssueType, ValidationIssue, ValidationIssueCollector};
use crate::env::{Constraint, Environment, TypeSupportProvider};
use crate::graph::LoomGraph;
use crate::node::LoomNode;

#[derive(Debug, Clone, Default)]
pub struct TypeRestrictionConstraint {
    node_types: BTreeSet<String>,
    tag_types: BTreeSet<String>,
}

impl TypeRestrictionConstraint {
    pub const NAME: &'static str = "TypeRestrictionConstraint";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.add_node_type(node_type);
        self
    }

    pub fn with_tag_type(mut self, tag_type: impl Into<String>) -> Self {
        self.add_tag_type(tag_type);
        self
    }

    pub fn add_node_type(&mut self, node_type: impl Into<String>) {
        self.node_types.insert(node_type.into());
    }

    pub fn add_tag_type(&mut self, tag_type: impl Into<String>) {
        self.tag_types.insert(tag_type.into());
    }

    fn check_type(
        node: &LoomNode,
        kind: &str,
        type_name: &str,
        valid: &BTreeSet<String>,
        collector: &mut ValidationIssueCollector,
    ) {
        if valid.contains(type_name) {
            return;
        }
        collector.add_issue_with(
            ValidationIssue::new(IssueType::NodeValidationError, format!("Illegal {kind} type"))
                .with_param("type", type_name),
            || {
                vec![
                    Context::new("Valid Types").with_data(valid),
                    node.as_context("Node"),
                ]
            },
        );
    }
}

impl Constraint for TypeRestrictionConstraint {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate_constraint(
        &self,
        _env: &Environment,
        graph: &LoomGraph,
        collector: &mut ValidationIssueCollector,
    ) {
        for node in graph.nodes() {
            Self::check_type(node, "node", node.node_type(), &self.node_types, collector);
            for tag_type in node.tags().keys() {
                Self::check_type(node, "tag", tag_type, &self.tag_types, collector);
            }
        }
    }
}

impl TypeSupportProvider for TypeRestrictionConstraint {
    fn supports_node_type(&self, node_type: &str) -> bool {
        self.node_types.contains(node_type)
    }

    fn supports_tag_type(&self, tag_type: &str) -> bool {
        self.tag_types.contains(tag_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{IPF_INDEX_TAG, NOTE_TYPE, TENSOR_TYPE};
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    #[test]
    fn reports_illegal_node_and_tag_types() {
        let env = Arc::new(Environment::builder().node_type(NOTE_TYPE).build().unwrap());
        let mut g = env.new_graph();
        g.create_node(NOTE_TYPE, None, json!({"message": "ok"})).unwrap();
        g.add_node(
            LoomNode::new(Uuid::new_v4(), TENSOR_TYPE, json!({}))
                .with_tag(IPF_INDEX_TAG, json!({"start": [], "end": []})),
        )
        .unwrap();

        let mut c = ValidationIssueCollector::new();
        g.validate_into(&mut c).unwrap();
        let summaries: Vec<&str> = c.issues().iter().map(|i| i.summary.as_str()).collect();
        assert_eq!(summaries, ["Illegal node type", "Illegal tag type"]);
        assert_eq!(c.issues()[0].param("type"), Some(TENSOR_TYPE));
        assert_eq!(c.issues()[1].param("type"), Some(IPF_INDEX_TAG));
    }

    #[test]
    fn supports() {
        let t = TypeRestrictionConstraint::new()
            .with_node_type(TENSOR_TYPE)
            .with_tag_type(IPF_INDEX_TAG);
        assert!(t.supports_node_type(TENSOR_TYPE));
        assert!(!t.supports_node_type(NOTE_TYPE));
        assert!(t.supports_tag_type(IPF_INDEX_TAG));
    }
}
