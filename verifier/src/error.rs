// error.rs — Setup and programming errors
//
// These errors are returned from the lattice algebra, graph mutation, and
// environment construction. Data problems found while validating a graph
// become `ValidationIssue`s in a collector (see `diag.rs`) and only surface
// here wrapped in `GraphError::Validation`.

use thiserror::Error;
use uuid::Uuid;

use crate::diag::LoomValidationError;

/// Errors from the integer-lattice algebra.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZSpaceError {
    #[error("{op}: rank mismatch ({left} != {right})")]
    RankMismatch {
        op: &'static str,
        left: usize,
        right: usize,
    },
    #[error("range start {start} must be <= end {end}")]
    InvalidRange { start: String, end: String },
    #[error("{op}: division by zero")]
    DivisionByZero { op: &'static str },
    #[error("{op}: integer overflow")]
    Overflow { op: &'static str },
    #[error("empty range has no inclusive end")]
    EmptyRange,
    #[error("dimension {dim} out of bounds for rank {ndim}")]
    DimOutOfBounds { dim: isize, ndim: usize },
    #[error("invalid split: {0}")]
    InvalidSplit(String),
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Errors from graph construction, mutation, and typed node access.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph already has node with id: {0}")]
    DuplicateNode(Uuid),
    #[error("node {node} already belongs to graph {graph}")]
    ForeignNode { node: Uuid, graph: Uuid },
    #[error("node not found: {0}")]
    NodeNotFound(Uuid),
    #[error("node {id} has type {actual}, expected {expected}")]
    TypeMismatch {
        id: Uuid,
        expected: String,
        actual: String,
    },
    #[error("environment not set")]
    MissingEnvironment,
    #[error("node {id}: body is not a valid {type_name}: {source}")]
    Body {
        id: Uuid,
        type_name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("node {id}: missing tag {tag}")]
    MissingTag { id: Uuid, tag: String },
    #[error("node {id}: tag {tag} is malformed: {source}")]
    Tag {
        id: Uuid,
        tag: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("signature mismatch: {0}")]
    Signature(String),
    #[error("invalid graph document: {0}")]
    Document(#[from] serde_json::Error),
    #[error(transparent)]
    ZSpace(#[from] ZSpaceError),
    #[error(transparent)]
    Validation(#[from] LoomValidationError),
}

/// Errors raised while registering constraints with an environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("constraint {constraint} requires unsupported node type: {node_type}")]
    UnsupportedNodeType {
        constraint: &'static str,
        node_type: String,
    },
    #[error("constraint {constraint} requires unsupported tag type: {tag_type}")]
    UnsupportedTagType {
        constraint: &'static str,
        tag_type: String,
    },
    #[error("constraint {constraint} requires {dependency} to be registered before it")]
    MissingDependency {
        constraint: &'static str,
        dependency: &'static str,
    },
    #[error("constraint {0} is already registered")]
    DuplicateConstraint(&'static str),
}
