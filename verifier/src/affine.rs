// affine.rs — Integer affine maps
//
// `ZAffineMap` is `x ↦ A·x + b` over integer vectors, with `A` stored as
// rows (one per output dimension). It is the linear half of an index
// projection function.
//
// Preconditions: none.
// Postconditions: every constructed map has rectangular `A` and
//                 `len(b) == rows(A)`.
// Failure modes: ragged matrices, rank mismatch, i64 overflow → `ZSpaceError`.
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ZSpaceError;
use crate::zpoint::{check_permutation, ZPoint};

/// An integer affine map `A·x + b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "AffineRepr", into = "AffineRepr")]
pub struct ZAffineMap {
    projection: Vec<Vec<i64>>,
    offset: ZPoint,
    input_ndim: usize,
}

#[derive(Serialize, Deserialize)]
struct AffineRepr {
    projection: Vec<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset: Option<ZPoint>,
}

impl TryFrom<AffineRepr> for ZAffineMap {
    type Error = ZSpaceError;

    fn try_from(repr: AffineRepr) -> Result<Self, Self::Error> {
        match repr.offset {
            Some(offset) => ZAffineMap::new(repr.projection, offset),
            None => ZAffineMap::from_matrix(repr.projection),
        }
    }
}

impl From<ZAffineMap> for AffineRepr {
    fn from(map: ZAffineMap) -> Self {
        AffineRepr {
            projection: map.projection,
            offset: Some(map.offset),
        }
    }
}

impl ZAffineMap {
    /// Build a map from a row-major matrix and an offset.
    pub fn new(projection: Vec<Vec<i64>>, offset: ZPoint) -> Result<Self, ZSpaceError> {
        let input_ndim = projection.first().map_or(0, Vec::len);
        if projection.iter().any(|row| row.len() != input_ndim) {
            return Err(ZSpaceError::ShapeMismatch(
                "affine projection rows have different lengths".to_string(),
            ));
        }
        if offset.ndim() != projection.len() {
            return Err(ZSpaceError::ShapeMismatch(format!(
                "affine offset rank {} != projection output rank {}",
                offset.ndim(),
                projection.len()
            )));
        }
        Ok(Self {
            projection,
            offset,
            input_ndim,
        })
    }

    /// Build a map with a zero offset.
    pub fn from_matrix(projection: Vec<Vec<i64>>) -> Result<Self, ZSpaceError> {
        let offset = ZPoint::zeros(projection.len());
        Self::new(projection, offset)
    }

    pub fn identity(ndim: usize) -> Self {
        Self::from_diagonal(&vec![1; ndim])
    }

    /// A square map with the given diagonal and zero offset.
    pub fn from_diagonal(diagonal: &[i64]) -> Self {
        let n = diagonal.len();
        let projection = (0..n)
            .map(|i| {
                let mut row = vec![0; n];
                row[i] = diagonal[i];
                row
            })
            .collect();
        Self {
            projection,
            offset: ZPoint::zeros(n),
            input_ndim: n,
        }
    }

    pub fn input_ndim(&self) -> usize {
        self.input_ndim
    }

    pub fn output_ndim(&self) -> usize {
        self.projection.len()
    }

    pub fn projection(&self) -> &[Vec<i64>] {
        &self.projection
    }

    pub fn offset(&self) -> &ZPoint {
        &self.offset
    }

    /// `A·x + b`.
    pub fn apply(&self, x: &ZPoint) -> Result<ZPoint, ZSpaceError> {
        let linear = self.apply_linear(x)?;
        linear.add(&self.offset)
    }

    /// `A·x`, without the offset.
    fn apply_linear(&self, x: &ZPoint) -> Result<ZPoint, ZSpaceError> {
        if x.ndim() != self.input_ndim {
            return Err(ZSpaceError::RankMismatch {
                op: "affine apply",
                left: self.input_ndim,
                right: x.ndim(),
            });
        }
        let coords = self
            .projection
            .iter()
            .map(|row| {
                row.iter().zip(x.coords()).try_fold(0i64, |acc, (&a, &b)| {
                    a.checked_mul(b)
                        .and_then(|p| acc.checked_add(p))
                        .ok_or(ZSpaceError::Overflow { op: "affine apply" })
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ZPoint::new(coords))
    }

    /// Pre-compose with an input translation: the result maps `x` to
    /// `self.apply(x + delta)`, i.e. `A·delta` is folded into the offset.
    pub fn translate(&self, delta: &ZPoint) -> Result<ZAffineMap, ZSpaceError> {
        let shifted = self.apply_linear(delta)?;
        self.shift(&shifted)
    }

    /// Add `offset` (an output-space vector) to the map's offset.
    pub fn shift(&self, offset: &ZPoint) -> Result<ZAffineMap, ZSpaceError> {
        Ok(Self {
            projection: self.projection.clone(),
            offset: self.offset.add(offset)?,
            input_ndim: self.input_ndim,
        })
    }

    /// Reorder the input dimensions: column `i` of the result is column
    /// `permutation[i]` of this map.
    pub fn permute_input(&self, permutation: &[usize]) -> Result<ZAffineMap, ZSpaceError> {
        check_permutation(permutation, self.input_ndim)?;
        let projection = self
            .projection
            .iter()
            .map(|row| permutation.iter().map(|&j| row[j]).collect())
            .collect();
        Ok(Self {
            projection,
            offset: self.offset.clone(),
            input_ndim: self.input_ndim,
        })
    }

    /// Reorder the output dimensions (rows and offset).
    pub fn permute_output(&self, permutation: &[usize]) -> Result<ZAffineMap, ZSpaceError> {
        check_permutation(permutation, self.output_ndim())?;
        let projection = permutation
            .iter()
            .map(|&i| self.projection[i].clone())
            .collect();
        Ok(Self {
            projection,
            offset: self.offset.permute(permutation)?,
            input_ndim: self.input_ndim,
        })
    }
}

impl fmt::Display for ZAffineMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<String> = self
            .projection
            .iter()
            .map(|row| {
                let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
                format!("[{}]", cells.join(", "))
            })
            .collect();
        write!(
            f,
            "λx.[{}]·x + {}",
            rows.join(", "),
            self.offset
        )
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
