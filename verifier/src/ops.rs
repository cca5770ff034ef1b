// ops.rs — Building IPF-sharded operations
//
// Helpers that add a complete sharded operation to a graph: the operation
// node with its IPF signature and index tags, one output tensor per output
// projection, and one Application shard per index split. Tooling and tests
// use these to produce graphs that `IpfSignatureAgreement` accepts.
//
// Preconditions: input selections equal their projections of the index.
// Postconditions: every created shard's selections are the projections of
//                 its shard index.
// Failure modes: signature/selection disagreement → `GraphError::Signature`;
//                lattice errors → `GraphError::ZSpace`.
// Side effects: inserts nodes into the graph; nothing is inserted when a
//               builder fails.

use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use crate::error::{GraphError, ZSpaceError};
use crate::graph::LoomGraph;
use crate::ipf::{IndexProjectionFunction, IpfSignature};
use crate::node::{
    ApplicationBody, LoomNode, OperationBody, OperationNode, SelectionMap, TensorBody,
    TensorSelection, APPLICATION_TYPE, IPF_INDEX_TAG, IPF_SIGNATURE_TAG, OPERATION_TYPE,
    TENSOR_TYPE,
};
use crate::zrange::ZRange;

/// Add an operation whose input projections are relative to the start of
/// each input selection.
///
/// Each input IPF is shifted by its selection's start, then the result is
/// applied as a fixed signature.
#[allow(clippy::too_many_arguments)]
pub fn apply_relative_signature<I, S>(
    graph: &mut LoomGraph,
    kernel: &str,
    signature: &IpfSignature,
    index_builder: I,
    shard_builder: S,
    inputs: &SelectionMap,
    output_dtypes: &BTreeMap<String, Vec<String>>,
    params: BTreeMap<String, Value>,
) -> Result<Uuid, GraphError>
where
    I: FnOnce(&SelectionMap) -> Result<ZRange, ZSpaceError>,
    S: FnOnce(&ZRange) -> Result<Vec<ZRange>, ZSpaceError>,
{
    let mut relative = IpfSignature {
        inputs: BTreeMap::new(),
        outputs: signature.outputs.clone(),
    };
    for (name, projections) in &signature.inputs {
        let selections = paired(inputs, name, projections.len())?;
        let shifted = projections
            .iter()
            .zip(selections)
            .map(|(p, s)| p.shift(s.range.start()))
            .collect::<Result<Vec<_>, _>>()?;
        relative.inputs.insert(name.clone(), shifted);
    }
    apply_fixed_signature(
        graph,
        kernel,
        &relative,
        index_builder,
        shard_builder,
        inputs,
        output_dtypes,
        params,
    )
}

/// Add an operation, its output tensors, and its shards.
///
/// Output tensors are labelled `{kernel}/{name}[{idx}]` and cover the
/// projection of the full index. Returns the operation id.
#[allow(clippy::too_many_arguments)]
pub fn apply_fixed_signature<I, S>(
    graph: &mut LoomGraph,
    kernel: &str,
    signature: &IpfSignature,
    index_builder: I,
    shard_builder: S,
    inputs: &SelectionMap,
    output_dtypes: &BTreeMap<String, Vec<String>>,
    params: BTreeMap<String, Value>,
) -> Result<Uuid, GraphError>
where
    I: FnOnce(&SelectionMap) -> Result<ZRange, ZSpaceError>,
    S: FnOnce(&ZRange) -> Result<Vec<ZRange>, ZSpaceError>,
{
    let index = index_builder(inputs)?;

    for (name, selections) in inputs {
        let projections = signature
            .inputs
            .get(name)
            .filter(|p| p.len() == selections.len())
            .ok_or_else(|| {
                GraphError::Signature(format!("input \"{name}\" does not match the signature"))
            })?;
        for (idx, (s, p)) in selections.iter().zip(projections).enumerate() {
            let expected = p.apply(&index)?;
            if s.range != expected {
                return Err(GraphError::Signature(format!(
                    "input \"{name}[{idx}]\" range {} != projected range {expected}",
                    s.range
                )));
            }
        }
    }

    let shard_indexes = shard_builder(&index)?;

    let mut staged = Vec::new();
    let mut outputs = SelectionMap::new();
    for (name, dtypes) in output_dtypes {
        let projections = signature
            .outputs
            .get(name)
            .filter(|p| p.len() == dtypes.len())
            .ok_or_else(|| {
                GraphError::Signature(format!("output \"{name}\" does not match the signature"))
            })?;
        let mut selections = Vec::with_capacity(dtypes.len());
        for (idx, (p, dtype)) in projections.iter().zip(dtypes).enumerate() {
            let body = TensorBody {
                dtype: dtype.clone(),
                range: p.apply(&index)?,
            };
            let id = fresh_id(graph, &staged);
            staged.push(
                LoomNode::from_body(id, TENSOR_TYPE, &body)?
                    .with_label(format!("{kernel}/{name}[{idx}]")),
            );
            selections.push(TensorSelection::new(id, body.range));
        }
        outputs.insert(name.clone(), selections);
    }

    let body = OperationBody {
        kernel: kernel.to_string(),
        params,
        inputs: inputs.clone(),
        outputs,
    };
    let op_id = fresh_id(graph, &staged);
    let mut op = LoomNode::from_body(op_id, OPERATION_TYPE, &body)?;
    op.set_tag(IPF_SIGNATURE_TAG, signature)?;
    op.set_tag(IPF_INDEX_TAG, &index)?;
    staged.push(op);

    for shard_index in &shard_indexes {
        let id = fresh_id(graph, &staged);
        staged.push(shard_node(id, op_id, signature, &index, &body, shard_index)?);
    }
    insert_all(graph, staged)?;
    Ok(op_id)
}

/// Add one shard per entry of `shard_indexes`, or none if any is invalid.
pub fn create_ipf_shards(
    graph: &mut LoomGraph,
    op_id: Uuid,
    shard_indexes: &[ZRange],
) -> Result<Vec<Uuid>, GraphError> {
    let op = OperationNode::wrap(graph.assert_node(op_id)?)?;
    let signature = op.ipf_signature()?;
    let index = op.ipf_index()?;
    let body = op.body()?;

    let mut staged = Vec::with_capacity(shard_indexes.len());
    for shard_index in shard_indexes {
        let id = fresh_id(graph, &staged);
        staged.push(shard_node(id, op_id, &signature, &index, &body, shard_index)?);
    }
    insert_all(graph, staged)
}

/// Add a shard of `op_id` covering `shard_index`.
///
/// The shard's selections project `shard_index` through the operation's IPF
/// signature onto the operation's tensors.
pub fn create_ipf_shard(
    graph: &mut LoomGraph,
    op_id: Uuid,
    shard_index: &ZRange,
) -> Result<Uuid, GraphError> {
    let op = OperationNode::wrap(graph.assert_node(op_id)?)?;
    let node = shard_node(
        graph.gen_node_id(),
        op_id,
        &op.ipf_signature()?,
        &op.ipf_index()?,
        &op.body()?,
        shard_index,
    )?;
    graph.add_node(node)
}

fn shard_node(
    id: Uuid,
    op_id: Uuid,
    signature: &IpfSignature,
    index: &ZRange,
    body: &OperationBody,
    shard_index: &ZRange,
) -> Result<LoomNode, GraphError> {
    if !index.contains(shard_index) {
        return Err(GraphError::Signature(format!(
            "shard index {shard_index} is not within operation index {index}"
        )));
    }

    let shard = ApplicationBody {
        operation_id: op_id,
        inputs: project(&signature.inputs, &body.inputs, shard_index)?,
        outputs: project(&signature.outputs, &body.outputs, shard_index)?,
    };
    let mut node = LoomNode::from_body(id, APPLICATION_TYPE, &shard)?;
    node.set_tag(IPF_INDEX_TAG, shard_index)?;
    Ok(node)
}

/// An id unused by the graph and by the not yet inserted `staged` nodes.
fn fresh_id(graph: &LoomGraph, staged: &[LoomNode]) -> Uuid {
    loop {
        let id = graph.gen_node_id();
        if staged.iter().all(|n| n.id() != id) {
            return id;
        }
    }
}

/// Insert every node, or roll back and insert none.
fn insert_all(graph: &mut LoomGraph, nodes: Vec<LoomNode>) -> Result<Vec<Uuid>, GraphError> {
    let mut inserted = Vec::with_capacity(nodes.len());
    for node in nodes {
        match graph.add_node(node) {
            Ok(id) => inserted.push(id),
            Err(e) => {
                for id in inserted {
                    graph.remove_node(id);
                }
                return Err(e);
            }
        }
    }
    Ok(inserted)
}

fn project(
    projections: &BTreeMap<String, Vec<IndexProjectionFunction>>,
    base: &SelectionMap,
    shard_index: &ZRange,
) -> Result<SelectionMap, GraphError> {
    projections
        .iter()
        .map(|(name, ipfs)| -> Result<(String, Vec<TensorSelection>), GraphError> {
            let selections = paired(base, name, ipfs.len())?
                .iter()
                .zip(ipfs)
                .map(|(s, p)| -> Result<TensorSelection, GraphError> {
                    Ok(TensorSelection::new(s.tensor_id, p.apply(shard_index)?))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok((name.clone(), selections))
        })
        .collect()
}

/// `map[name]`, required to have `len` entries.
fn paired<'a>(
    map: &'a SelectionMap,
    name: &str,
    len: usize,
) -> Result<&'a [TensorSelection], GraphError> {
    match map.get(name) {
        Some(selections) if selections.len() == len => Ok(selections.as_slice()),
        _ => Err(GraphError::Signature(format!(
            "selections for \"{name}\" do not match the signature"
        ))),
    }
}
