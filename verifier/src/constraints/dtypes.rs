// dtypes.rs — Tensor dtype allow-list

use std::collections::BTreeSet;

use tracing::debug;

use crate::diag::{IssueType, ValidationIssue, ValidationIssueCollector};
use crate::env::{Constraint, Environment};
use crate::error::EnvError;
use crate::graph::LoomGraph;
use crate::node::TENSOR_TYPE;

/// Every tensor's dtype must be one of a configured set of names.
#[derive(Debug, Clone)]
pub struct TensorDTypesAreValid {
    valid_dtypes: BTreeSet<String>,
}

impl TensorDTypesAreValid {
    pub const NAME: &'static str = "TensorDTypesAreValid";

    pub fn new<I, S>(dtypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            valid_dtypes: dtypes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn valid_dtypes(&self) -> &BTreeSet<String> {
        &self.valid_dtypes
    }
}

impl Default for TensorDTypesAreValid {
    fn default() -> Self {
        Self::new(["int32", "float32"])
    }
}

impl Constraint for TensorDTypesAreValid {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check_requirements(&self, env: &Environment) -> Result<(), EnvError> {
        env.assert_supports_node_type(Self::NAME, TENSOR_TYPE)
    }

    fn validate_constraint(
        &self,
        _env: &Environment,
        graph: &LoomGraph,
        collector: &mut ValidationIssueCollector,
    ) {
        for tensor in graph.tensors() {
            let body = match tensor.body() {
                Ok(body) => body,
                Err(e) => {
                    debug!(node = %tensor.id(), error = %e, "skipping tensor with malformed body");
                    continue;
                }
            };
            if self.valid_dtypes.contains(&body.dtype) {
                continue;
            }
            collector.add_issue_with(
                ValidationIssue::new(
                    IssueType::NodeValidationError,
                    format!("Tensor dtype ({}) not a recognized type", body.dtype),
                )
                .with_param("nodeType", TENSOR_TYPE)
                .with_param("dtype", &body.dtype),
                || vec![tensor.node().as_context("Tensor")],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn graph_with(dtypes: &[&str], constraint: TensorDTypesAreValid) -> LoomGraph {
        let env = Arc::new(
            Environment::builder()
                .node_type(TENSOR_TYPE)
                .constraint(constraint)
                .build()
                .unwrap(),
        );
        let mut g = env.new_graph();
        for dtype in dtypes {
            g.create_node(
                TENSOR_TYPE,
                None,
                json!({"dtype": dtype, "range": {"start": [0], "end": [4]}}),
            )
            .unwrap();
        }
        g
    }

    #[test]
    fn default_set_accepts_int32_and_float32() {
        let g = graph_with(&["int32", "float32"], TensorDTypesAreValid::default());
        assert!(g.validate().is_ok());
    }

    #[test]
    fn unknown_dtype_is_reported() {
        let g = graph_with(&["int32", "complex128"], TensorDTypesAreValid::default());
        let mut c = ValidationIssueCollector::new();
        g.validate_into(&mut c).unwrap();
        assert_eq!(c.len(), 1);
        let issue = &c.issues()[0];
        assert_eq!(issue.summary, "Tensor dtype (complex128) not a recognized type");
        assert_eq!(issue.param("nodeType"), Some(TENSOR_TYPE));
        assert_eq!(issue.contexts[0].name, "Tensor");
    }

    #[test]
    fn custom_set_overrides_default() {
        let g = graph_with(&["bool"], TensorDTypesAreValid::new(["bool"]));
        assert!(g.validate().is_ok());
        let g = graph_with(&["int32"], TensorDTypesAreValid::new(["bool"]));
        assert!(g.validate().is_err());
    }

    #[test]
    fn requires_tensor_type() {
        let err = Environment::builder()
            .constraint(TensorDTypesAreValid::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, EnvError::UnsupportedNodeType { .. }));
    }
}
