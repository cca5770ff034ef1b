// ipf.rs — Index projection functions and signatures
//
// An index projection function (IPF) maps a point of an operation's index
// space to the tensor range that point reads or writes: `A·p + b` gives the
// range start, and a fixed `shape` gives its extent. An `IpfSignature` holds
// one IPF per input/output selection of an operation.
//
// Preconditions: none.
// Postconditions: `apply` of a non-empty index range is the bounding range of
//                 the projections of its first and last points.
// Failure modes: rank mismatch → `ZSpaceError`.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::affine::ZAffineMap;
use crate::error::ZSpaceError;
use crate::zpoint::ZPoint;
use crate::zrange::ZRange;

/// `(affineMap, shape)`: projects index points to tensor ranges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "IpfRepr", rename_all = "camelCase")]
pub struct IndexProjectionFunction {
    affine_map: ZAffineMap,
    shape: ZPoint,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpfRepr {
    affine_map: ZAffineMap,
    shape: ZPoint,
}

impl TryFrom<IpfRepr> for IndexProjectionFunction {
    type Error = ZSpaceError;

    fn try_from(repr: IpfRepr) -> Result<Self, Self::Error> {
        IndexProjectionFunction::new(repr.affine_map, repr.shape)
    }
}

impl IndexProjectionFunction {
    pub fn new(affine_map: ZAffineMap, shape: ZPoint) -> Result<Self, ZSpaceError> {
        if affine_map.output_ndim() != shape.ndim() {
            return Err(ZSpaceError::RankMismatch {
                op: "projection shape",
                left: affine_map.output_ndim(),
                right: shape.ndim(),
            });
        }
        if shape.coords().iter().any(|&c| c < 0) {
            return Err(ZSpaceError::ShapeMismatch(format!(
                "projection shape {shape} has negative extents"
            )));
        }
        Ok(Self { affine_map, shape })
    }

    /// An IPF selecting a single cell per index point.
    pub fn unit(affine_map: ZAffineMap) -> Self {
        let shape = ZPoint::ones(affine_map.output_ndim());
        Self { affine_map, shape }
    }

    pub fn affine_map(&self) -> &ZAffineMap {
        &self.affine_map
    }

    pub fn shape(&self) -> &ZPoint {
        &self.shape
    }

    pub fn input_ndim(&self) -> usize {
        self.affine_map.input_ndim()
    }

    pub fn output_ndim(&self) -> usize {
        self.affine_map.output_ndim()
    }

    /// Range selected by a single index point.
    pub fn apply_point(&self, p: &ZPoint) -> Result<ZRange, ZSpaceError> {
        let start = self.affine_map.apply(p)?;
        ZRange::from_start_shape(start, &self.shape)
    }

    /// Range selected by an index range.
    ///
    /// An empty index range selects the empty range at the projection of its
    /// start.
    pub fn apply(&self, index: &ZRange) -> Result<ZRange, ZSpaceError> {
        if index.is_empty() {
            let start = self.affine_map.apply(index.start())?;
            return ZRange::from_start_shape(start, &ZPoint::zeros(self.output_ndim()));
        }
        let first = self.apply_point(index.start())?;
        let last = self.apply_point(&index.inclusive_end()?)?;
        ZRange::bounding_range([&first, &last])
    }

    /// Translate in index space: `self.translate(d).apply(i)` equals
    /// `self.apply(i.translate(d))`.
    pub fn translate(&self, delta: &ZPoint) -> Result<Self, ZSpaceError> {
        Ok(Self {
            affine_map: self.affine_map.translate(delta)?,
            shape: self.shape.clone(),
        })
    }

    /// Translate in tensor space.
    pub fn shift(&self, offset: &ZPoint) -> Result<Self, ZSpaceError> {
        Ok(Self {
            affine_map: self.affine_map.shift(offset)?,
            shape: self.shape.clone(),
        })
    }
}

impl fmt::Display for IndexProjectionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipf({}, shape={})", self.affine_map, self.shape)
    }
}

/// Per-key IPF lists for an operation's inputs and outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpfSignature {
    #[serde(default)]
    pub inputs: BTreeMap<String, Vec<IndexProjectionFunction>>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Vec<IndexProjectionFunction>>,
}

impl IpfSignature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, key: impl Into<String>, ipfs: Vec<IndexProjectionFunction>) -> Self {
        self.inputs.insert(key.into(), ipfs);
        self
    }

    pub fn with_output(
        mut self,
        key: impl Into<String>,
        ipfs: Vec<IndexProjectionFunction>,
    ) -> Self {
        self.outputs.insert(key.into(), ipfs);
        self
    }

    /// Project every input and output IPF over `index`.
    pub fn apply(
        &self,
        index: &ZRange,
    ) -> Result<
        (
            BTreeMap<String, Vec<ZRange>>,
            BTreeMap<String, Vec<ZRange>>,
        ),
        ZSpaceError,
    > {
        Ok((
            project_all(&self.inputs, index)?,
            project_all(&self.outputs, index)?,
        ))
    }
}

fn project_all(
    ipfs: &BTreeMap<String, Vec<IndexProjectionFunction>>,
    index: &ZRange,
) -> Result<BTreeMap<String, Vec<ZRange>>, ZSpaceError> {
    ipfs.iter()
        .map(|(key, list)| {
            let ranges = list
                .iter()
                .map(|ipf| ipf.apply(index))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((key.clone(), ranges))
        })
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zpoint;

    fn row_ipf() -> IndexProjectionFunction {
        // [i, j] -> rows i, all 4 columns
        IndexProjectionFunction::new(
            ZAffineMap::from_matrix(vec![vec![1, 0], vec![0, 0]]).unwrap(),
            zpoint![1, 4],
        )
        .unwrap()
    }

    #[test]
    fn apply_point() {
        let r = row_ipf().apply_point(&zpoint![2, 3]).unwrap();
        assert_eq!(r.to_string(), "zr[2:3, 0:4]");
    }

    #[test]
    fn apply_range_bounds_first_and_last() {
        let index = ZRange::from_shape(zpoint![3, 5]).unwrap();
        let r = row_ipf().apply(&index).unwrap();
        assert_eq!(r.to_string(), "zr[0:3, 0:4]");
    }

    #[test]
    fn apply_empty_range() {
        let index = ZRange::new(zpoint![2, 0], zpoint![2, 5]).unwrap();
        let r = row_ipf().apply(&index).unwrap();
        assert_eq!(r.to_string(), "zr[2:2, 0:0]");
        assert!(r.is_empty());
    }

    #[test]
    fn shape_rank_must_match_output() {
        assert!(IndexProjectionFunction::new(ZAffineMap::identity(2), zpoint![1]).is_err());
        assert!(IndexProjectionFunction::new(ZAffineMap::identity(1), zpoint![-1]).is_err());
    }

    #[test]
    fn translation_law() {
        let ipf = IndexProjectionFunction::new(
            ZAffineMap::from_matrix(vec![vec![2, 1], vec![0, 1]]).unwrap(),
            zpoint![2, 1],
        )
        .unwrap();
        let index = ZRange::new(zpoint![1, 0], zpoint![3, 4]).unwrap();
        let delta = zpoint![5, -2];
        assert_eq!(
            ipf.apply(&index.translate(&delta).unwrap()).unwrap(),
            ipf.translate(&delta).unwrap().apply(&index).unwrap()
        );
    }

    #[test]
    fn shift_moves_output() {
        let shifted = row_ipf().shift(&zpoint![10, 0]).unwrap();
        let r = shifted.apply_point(&zpoint![0, 0]).unwrap();
        assert_eq!(r.to_string(), "zr[10:11, 0:4]");
    }

    #[test]
    fn signature_json() {
        let json = r#"{
            "inputs": {"x": [{"affineMap": {"projection": [[1, 0]], "offset": [0]}, "shape": [1]}]},
            "outputs": {"y": [{"affineMap": {"projection": [[1, 0], [0, 1]]}, "shape": [1, 1]}]}
        }"#;
        let sig: IpfSignature = serde_json::from_str(json).unwrap();
        assert_eq!(sig.inputs["x"].len(), 1);
        assert_eq!(sig.outputs["y"][0].affine_map(), &ZAffineMap::identity(2));

        let (inputs, outputs) = sig.apply(&ZRange::from_shape(zpoint![2, 3]).unwrap()).unwrap();
        assert_eq!(inputs["x"][0].to_string(), "zr[0:2]");
        assert_eq!(outputs["y"][0].to_string(), "zr[0:2, 0:3]");
    }
}
