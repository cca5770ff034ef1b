// loomck — Loom graph checker
//
// Library root. Lattice algebra, graph model, constraint framework, built-in
// constraints, graph analyses, and report rendering.

pub mod affine;
pub mod constraints;
pub mod diag;
pub mod env;
pub mod environments;
pub mod error;
pub mod graph;
pub mod ipf;
pub mod node;
pub mod ops;
pub mod report;
pub mod traversal;
mod zparse;
pub mod zpoint;
pub mod zrange;

pub use affine::ZAffineMap;
pub use diag::{Context, IssueType, LoomValidationError, ValidationIssue, ValidationIssueCollector};
pub use env::{Constraint, Environment, EnvironmentBuilder, TypeSupportProvider};
pub use error::{EnvError, GraphError, ZSpaceError};
pub use graph::LoomGraph;
pub use ipf::{IndexProjectionFunction, IpfSignature};
pub use node::{LoomNode, NodeKind, TensorSelection};
pub use zpoint::ZPoint;
pub use zrange::ZRange;
