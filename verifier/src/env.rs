// env.rs — Validation environment and constraint framework
//
// An `Environment` owns the type-support provider, an ordered list of
// constraints, URL aliases for type names, and a schema registry mapping node
// and tag types to typed deserialization checks. Constraints declare their
// requirements, which are checked when they are registered: a constraint may
// only depend on types the environment supports and on constraints
// registered before it. Registration order is execution order.
//
// Preconditions: none.
// Postconditions: every registered constraint's requirements held at
//                 registration time.
// Failure modes: unmet requirements → `EnvError`.
// Side effects: `validate_graph` emits `tracing` events.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::constraints::type_restriction::TypeRestrictionConstraint;
use crate::diag::ValidationIssueCollector;
use crate::error::{EnvError, GraphError};
use crate::graph::LoomGraph;

// ── Constraint traits ──────────────────────────────────────────────────────

/// A pluggable graph check.
///
/// `validate_constraint` must not fail on bad data: every problem is reported
/// to the collector, and checks that depend on a failed one are skipped.
pub trait Constraint: fmt::Debug + Send + Sync {
    /// Stable name, used for dependency checks and logging.
    fn name(&self) -> &'static str;

    /// Verify that `env` provides everything this constraint relies on.
    fn check_requirements(&self, _env: &Environment) -> Result<(), EnvError> {
        Ok(())
    }

    fn validate_constraint(
        &self,
        env: &Environment,
        graph: &LoomGraph,
        collector: &mut ValidationIssueCollector,
    );
}

/// A constraint that also decides which node and tag types exist.
pub trait TypeSupportProvider: Constraint {
    fn supports_node_type(&self, node_type: &str) -> bool;
    fn supports_tag_type(&self, tag_type: &str) -> bool;
}

/// A typed deserialization check for a node body or tag value.
pub type SchemaCheck = fn(&Value) -> Result<(), serde_json::Error>;

/// The `SchemaCheck` that accepts values deserializable as `T`.
pub fn schema_of<T: DeserializeOwned>(value: &Value) -> Result<(), serde_json::Error> {
    T::deserialize(value).map(|_| ())
}

// ── Environment ────────────────────────────────────────────────────────────

pub struct Environment {
    type_support: Box<dyn TypeSupportProvider>,
    constraints: Vec<Box<dyn Constraint>>,
    url_aliases: BTreeMap<String, String>,
    node_schemas: BTreeMap<String, SchemaCheck>,
    tag_schemas: BTreeMap<String, SchemaCheck>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("type_support", &self.type_support)
            .field("constraints", &self.constraint_names())
            .field("url_aliases", &self.url_aliases)
            .field("node_schemas", &self.node_schemas.keys().collect::<Vec<_>>())
            .field("tag_schemas", &self.tag_schemas.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    // ── Types ──────────────────────────────────────────────────────────────

    pub fn supports_node_type(&self, node_type: &str) -> bool {
        self.type_support.supports_node_type(node_type)
    }

    pub fn supports_tag_type(&self, tag_type: &str) -> bool {
        self.type_support.supports_tag_type(tag_type)
    }

    pub fn assert_supports_node_type(
        &self,
        constraint: &'static str,
        node_type: &str,
    ) -> Result<(), EnvError> {
        if !self.supports_node_type(node_type) {
            return Err(EnvError::UnsupportedNodeType {
                constraint,
                node_type: node_type.to_string(),
            });
        }
        Ok(())
    }

    pub fn assert_supports_tag_type(
        &self,
        constraint: &'static str,
        tag_type: &str,
    ) -> Result<(), EnvError> {
        if !self.supports_tag_type(tag_type) {
            return Err(EnvError::UnsupportedTagType {
                constraint,
                tag_type: tag_type.to_string(),
            });
        }
        Ok(())
    }

    /// Short form of a type name: `loom:Tensor` when the URL part has an alias.
    pub fn url_alias(&self, type_name: &str) -> String {
        if let Some((url, path)) = type_name.split_once('#') {
            if let Some(alias) = self.url_aliases.get(url) {
                let short = path.rsplit('/').next().unwrap_or(path);
                return format!("{alias}:{short}");
            }
        }
        type_name.to_string()
    }

    // ── Schemas ────────────────────────────────────────────────────────────

    pub fn node_schema(&self, node_type: &str) -> Option<SchemaCheck> {
        self.node_schemas.get(node_type).copied()
    }

    pub fn tag_schema(&self, tag_type: &str) -> Option<SchemaCheck> {
        self.tag_schemas.get(tag_type).copied()
    }

    // ── Constraints ────────────────────────────────────────────────────────

    pub fn constraint_names(&self) -> Vec<&'static str> {
        self.constraints.iter().map(|c| c.name()).collect()
    }

    pub fn has_constraint(&self, name: &str) -> bool {
        self.constraints.iter().any(|c| c.name() == name)
    }

    /// Fail unless `dependency` is already registered.
    pub fn assert_constraint(
        &self,
        constraint: &'static str,
        dependency: &'static str,
    ) -> Result<(), EnvError> {
        if !self.has_constraint(dependency) {
            return Err(EnvError::MissingDependency {
                constraint,
                dependency,
            });
        }
        Ok(())
    }

    /// Register `constraint` after checking its requirements against the
    /// constraints registered so far.
    pub fn add_constraint(&mut self, constraint: Box<dyn Constraint>) -> Result<(), EnvError> {
        if self.has_constraint(constraint.name()) {
            return Err(EnvError::DuplicateConstraint(constraint.name()));
        }
        constraint.check_requirements(self)?;
        self.constraints.push(constraint);
        Ok(())
    }

    // ── Graphs ─────────────────────────────────────────────────────────────

    pub fn new_graph(self: &Arc<Self>) -> LoomGraph {
        LoomGraph::with_env(Arc::clone(self))
    }

    pub fn graph_from_json(self: &Arc<Self>, json: &str) -> Result<LoomGraph, GraphError> {
        LoomGraph::from_json(json, Some(Arc::clone(self)))
    }

    /// Run the type-support provider, then every constraint in registration
    /// order, into `collector`.
    pub fn validate_graph(&self, graph: &LoomGraph, collector: &mut ValidationIssueCollector) {
        let start = collector.len();
        self.run(self.type_support.as_ref(), graph, collector);
        for constraint in &self.constraints {
            self.run(constraint.as_ref(), graph, collector);
        }
        info!(
            graph = %graph.id(),
            nodes = graph.len(),
            issues = collector.len() - start,
            "validation finished"
        );
    }

    fn run<C: Constraint + ?Sized>(
        &self,
        constraint: &C,
        graph: &LoomGraph,
        collector: &mut ValidationIssueCollector,
    ) {
        let before = collector.len();
        constraint.validate_constraint(self, graph, collector);
        debug!(
            constraint = constraint.name(),
            issues = collector.len() - before,
            "constraint checked"
        );
    }
}

// ── Builder ────────────────────────────────────────────────────────────────

/// Collects types, aliases, schemas, and constraints, then registers the
/// constraints in order.
#[derive(Default)]
pub struct EnvironmentBuilder {
    type_restriction: TypeRestrictionConstraint,
    constraints: Vec<Box<dyn Constraint>>,
    url_aliases: BTreeMap<String, String>,
    node_schemas: BTreeMap<String, SchemaCheck>,
    tag_schemas: BTreeMap<String, SchemaCheck>,
}

impl EnvironmentBuilder {
    pub fn node_type(mut self, node_type: impl Into<String>) -> Self {
        self.type_restriction.add_node_type(node_type);
        self
    }

    pub fn tag_type(mut self, tag_type: impl Into<String>) -> Self {
        self.type_restriction.add_tag_type(tag_type);
        self
    }

    /// Support `node_type` and check its bodies with `schema`.
    pub fn node_schema(mut self, node_type: impl Into<String>, schema: SchemaCheck) -> Self {
        let node_type = node_type.into();
        self.type_restriction.add_node_type(node_type.clone());
        self.node_schemas.insert(node_type, schema);
        self
    }

    /// Support `tag_type` and check its values with `schema`.
    pub fn tag_schema(mut self, tag_type: impl Into<String>, schema: SchemaCheck) -> Self {
        let tag_type = tag_type.into();
        self.type_restriction.add_tag_type(tag_type.clone());
        self.tag_schemas.insert(tag_type, schema);
        self
    }

    pub fn url_alias(mut self, url: impl Into<String>, alias: impl Into<String>) -> Self {
        self.url_aliases.insert(url.into(), alias.into());
        self
    }

    pub fn constraint(mut self, constraint: impl Constraint + 'static) -> Self {
        self.constraints.push(Box::new(constraint));
        self
    }

    pub fn build(self) -> Result<Environment, EnvError> {
        let mut env = Environment {
            type_support: Box::new(self.type_restriction),
            constraints: Vec::new(),
            url_aliases: self.url_aliases,
            node_schemas: self.node_schemas,
            tag_schemas: self.tag_schemas,
        };
        for constraint in self.constraints {
            env.add_constraint(constraint)?;
        }
        Ok(env)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::{IssueType, ValidationIssue};
    use crate::node::{NODE_TYPES_URL, NOTE_TYPE, TENSOR_TYPE};

    /// Reports one issue named after itself.
    #[derive(Debug)]
    struct Named {
        name: &'static str,
        needs: Option<&'static str>,
    }

    impl Named {
        fn new(name: &'static str, needs: Option<&'static str>) -> Self {
            Self { name, needs }
        }
    }

    impl Constraint for Named {
        fn name(&self) -> &'static str {
            self.name
        }

        fn check_requirements(&self, env: &Environment) -> Result<(), EnvError> {
            env.assert_supports_node_type(self.name, TENSOR_TYPE)?;
            if let Some(dep) = self.needs {
                env.assert_constraint(self.name, dep)?;
            }
            Ok(())
        }

        fn validate_constraint(
            &self,
            _env: &Environment,
            _graph: &LoomGraph,
            collector: &mut ValidationIssueCollector,
        ) {
            collector.add_issue(ValidationIssue::new(IssueType::NodeValidationError, self.name));
        }
    }

    #[test]
    fn requirements_checked_in_registration_order() {
        let err = Environment::builder()
            .node_type(TENSOR_TYPE)
            .constraint(Named::new("second", Some("first")))
            .constraint(Named::new("first", None))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            EnvError::MissingDependency {
                constraint: "second",
                dependency: "first"
            }
        );

        let env = Environment::builder()
            .node_type(TENSOR_TYPE)
            .constraint(Named::new("first", None))
            .constraint(Named::new("second", Some("first")))
            .build()
            .unwrap();
        assert_eq!(env.constraint_names(), ["first", "second"]);
    }

    #[test]
    fn unsupported_node_type_fails_registration() {
        let err = Environment::builder()
            .constraint(Named::new("p", None))
            .build()
            .unwrap_err();
        assert!(matches!(err, EnvError::UnsupportedNodeType { constraint: "p", .. }));
    }

    #[test]
    fn duplicate_constraint_fails() {
        let err = Environment::builder()
            .node_type(TENSOR_TYPE)
            .constraint(Named::new("p", None))
            .constraint(Named::new("p", None))
            .build()
            .unwrap_err();
        assert_eq!(err, EnvError::DuplicateConstraint("p"));
    }

    #[test]
    fn constraints_run_in_order() {
        let env = Arc::new(
            Environment::builder()
                .node_type(TENSOR_TYPE)
                .constraint(Named::new("a", None))
                .constraint(Named::new("b", None))
                .build()
                .unwrap(),
        );
        let graph = env.new_graph();
        let mut collector = ValidationIssueCollector::new();
        graph.validate_into(&mut collector).unwrap();
        let names: Vec<&str> = collector.issues().iter().map(|i| i.summary.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn url_alias() {
        let env = Environment::builder()
            .url_alias(NODE_TYPES_URL, "loom")
            .build()
            .unwrap();
        assert_eq!(env.url_alias(NOTE_TYPE), "loom:Note");
        assert_eq!(env.url_alias("urn:plain"), "urn:plain");
    }

    #[test]
    fn schema_registry() {
        let env = Environment::builder()
            .node_schema(NOTE_TYPE, schema_of::<crate::node::NoteBody>)
            .build()
            .unwrap();
        assert!(env.supports_node_type(NOTE_TYPE));
        let check = env.node_schema(NOTE_TYPE).unwrap();
        assert!(check(&serde_json::json!({"message": "x"})).is_ok());
        assert!(check(&serde_json::json!({"msg": "x"})).is_err());
        assert!(env.node_schema(TENSOR_TYPE).is_none());
    }
}
