// environments.rs — Preset validation environments
//
// `common_environment` accepts plain tensor/operation graphs;
// `expression_environment` adds shards, notes, and the full set of tiling
// checks. Both bind typed schemas for every node and tag type they allow and
// alias the Loom schema URLs to `loom:`.

use std::sync::Arc;

use crate::constraints::{
    ApplicationOutputRangeCoverageIsExact, IpfSignatureAgreement, NoTensorOperationCycles,
    NodeBodySchemaConstraint, OperationApplicationAgreement, TensorDTypesAreValid,
    TensorOperationAgreement,
};
use crate::env::{schema_of, Environment, EnvironmentBuilder};
use crate::error::EnvError;
use crate::ipf::IpfSignature;
use crate::node::{
    ApplicationBody, NoteBody, OperationBody, TensorBody, ANNOTATION_TYPES_URL, APPLICATION_TYPE,
    IPF_INDEX_TAG, IPF_SIGNATURE_TAG, NODE_TYPES_URL, NOTE_TYPE, OPERATION_TYPE, TENSOR_TYPE,
};
use crate::zrange::ZRange;

/// Types, tag schemas, and aliases shared by both presets.
fn base_builder() -> EnvironmentBuilder {
    Environment::builder()
        .node_schema(TENSOR_TYPE, schema_of::<TensorBody>)
        .node_schema(OPERATION_TYPE, schema_of::<OperationBody>)
        .tag_schema(IPF_SIGNATURE_TAG, schema_of::<IpfSignature>)
        .tag_schema(IPF_INDEX_TAG, schema_of::<ZRange>)
        .url_alias(NODE_TYPES_URL, "loom")
        .url_alias(ANNOTATION_TYPES_URL, "loom")
}

/// Tensors and operations, with schema, dtype, reference, and cycle checks.
pub fn common_environment() -> Result<Arc<Environment>, EnvError> {
    common_environment_with(TensorDTypesAreValid::default())
}

pub fn common_environment_with(dtypes: TensorDTypesAreValid) -> Result<Arc<Environment>, EnvError> {
    let env = base_builder()
        .constraint(NodeBodySchemaConstraint)
        .constraint(dtypes)
        .constraint(TensorOperationAgreement)
        .constraint(NoTensorOperationCycles)
        .build()?;
    Ok(Arc::new(env))
}

/// Everything in `common_environment` plus notes, application shards, and
/// the tiling constraints.
pub fn expression_environment() -> Result<Arc<Environment>, EnvError> {
    expression_environment_with(TensorDTypesAreValid::default())
}

pub fn expression_environment_with(
    dtypes: TensorDTypesAreValid,
) -> Result<Arc<Environment>, EnvError> {
    let env = base_builder()
        .node_schema(NOTE_TYPE, schema_of::<NoteBody>)
        .node_schema(APPLICATION_TYPE, schema_of::<ApplicationBody>)
        .constraint(NodeBodySchemaConstraint)
        .constraint(dtypes)
        .constraint(TensorOperationAgreement)
        .constraint(OperationApplicationAgreement)
        .constraint(ApplicationOutputRangeCoverageIsExact)
        .constraint(IpfSignatureAgreement)
        .constraint(NoTensorOperationCycles)
        .build()?;
    Ok(Arc::new(env))
}
