// zrange.rs — Half-open integer boxes
//
// `ZRange` is the `[start, end)` box between two equal-rank `ZPoint`s. It is
// the unit of every selection, shard, and index space in a Loom graph, so
// containment, bounding, and partitioning live here.
//
// Preconditions: none.
// Postconditions: every constructed range satisfies `start <= end`
//                 componentwise with equal ranks.
// Failure modes: malformed bounds, rank mismatch, bad split requests, and
//                extents or sizes beyond i64 → `ZSpaceError`.
// Side effects: none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ZSpaceError;
use crate::zpoint::{check_permutation, ZPoint};

/// An immutable half-open range `[start, end)` in Z-space.
///
/// A rank-0 range is the scalar range: it has size 1 and contains every other
/// rank-0 range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr")]
pub struct ZRange {
    start: ZPoint,
    end: ZPoint,
}

#[derive(Deserialize)]
struct RangeRepr {
    start: ZPoint,
    end: ZPoint,
}

impl TryFrom<RangeRepr> for ZRange {
    type Error = ZSpaceError;

    fn try_from(repr: RangeRepr) -> Result<Self, Self::Error> {
        ZRange::new(repr.start, repr.end)
    }
}

impl ZRange {
    /// Construct `[start, end)`.
    pub fn new(start: ZPoint, end: ZPoint) -> Result<Self, ZSpaceError> {
        start.assert_same_ndim(&end, "range")?;
        if !start.le(&end) {
            return Err(ZSpaceError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Construct `[0, shape)`.
    pub fn from_shape(shape: impl Into<ZPoint>) -> Result<Self, ZSpaceError> {
        let shape = shape.into();
        Self::new(ZPoint::zeros(shape.ndim()), shape)
    }

    /// Construct `[start, start + shape)`.
    pub fn from_start_shape(start: ZPoint, shape: &ZPoint) -> Result<Self, ZSpaceError> {
        let end = start.add(shape)?;
        Self::new(start, end)
    }

    /// The rank-0 range.
    pub fn scalar() -> Self {
        Self {
            start: ZPoint::scalar(),
            end: ZPoint::scalar(),
        }
    }

    pub fn start(&self) -> &ZPoint {
        &self.start
    }

    pub fn end(&self) -> &ZPoint {
        &self.end
    }

    pub fn ndim(&self) -> usize {
        self.start.ndim()
    }

    /// `end - start`.
    pub fn shape(&self) -> Result<ZPoint, ZSpaceError> {
        self.end.sub(&self.start)
    }

    /// Number of points in the range; 0 if any extent is 0.
    pub fn size(&self) -> Result<i64, ZSpaceError> {
        if self.is_empty() {
            return Ok(0);
        }
        self.shape()?.prod()
    }

    /// True when some extent is 0. Never overflows.
    pub fn is_empty(&self) -> bool {
        self.start
            .coords()
            .iter()
            .zip(self.end.coords())
            .any(|(s, e)| s == e)
    }

    /// Extent of `dim`, which must already be resolved.
    fn extent(&self, dim: usize) -> Result<i64, ZSpaceError> {
        self.end.coords()[dim]
            .checked_sub(self.start.coords()[dim])
            .ok_or(ZSpaceError::Overflow { op: "extent" })
    }

    /// Does this range entirely contain `other`?
    ///
    /// Empty ranges may be contained (they describe partition surfaces) but
    /// only contain other empty ranges at their boundary. All rank-0 ranges
    /// contain each other. Ranges of different rank never contain each other.
    pub fn contains(&self, other: &ZRange) -> bool {
        if self.ndim() != other.ndim() {
            return false;
        }
        self.ndim() == 0 || (self.start.le(&other.start) && other.end.le(&self.end))
    }

    /// Does this range contain the point `p`? Empty ranges contain nothing.
    pub fn contains_point(&self, p: &ZPoint) -> bool {
        if self.is_empty() || p.ndim() != self.ndim() {
            return false;
        }
        self.ndim() == 0 || (self.start.le(p) && p.strictly_below(&self.end))
    }

    /// The greatest point in a non-empty range.
    pub fn inclusive_end(&self) -> Result<ZPoint, ZSpaceError> {
        if self.is_empty() {
            return Err(ZSpaceError::EmptyRange);
        }
        self.end.sub_scalar(1)
    }

    /// Shift the whole range by `delta`.
    pub fn translate(&self, delta: &ZPoint) -> Result<ZRange, ZSpaceError> {
        ZRange::new(self.start.add(delta)?, self.end.add(delta)?)
    }

    /// Overlap of two ranges.
    ///
    /// Returns `None` when the ranges are disjoint or of different rank;
    /// ranges that only touch yield an empty range on the shared face.
    pub fn intersection(&self, other: &ZRange) -> Option<ZRange> {
        if self.ndim() != other.ndim() {
            return None;
        }
        let start = self.start.max(&other.start).ok()?;
        let end = self.end.min(&other.end).ok()?;
        ZRange::new(start, end).ok()
    }

    pub fn permute(&self, permutation: &[usize]) -> Result<ZRange, ZSpaceError> {
        check_permutation(permutation, self.ndim())?;
        ZRange::new(
            self.start.permute(permutation)?,
            self.end.permute(permutation)?,
        )
    }

    /// Tightest range containing every range in `ranges`.
    pub fn bounding_range<'a, I>(ranges: I) -> Result<ZRange, ZSpaceError>
    where
        I: IntoIterator<Item = &'a ZRange>,
    {
        let mut iter = ranges.into_iter();
        let first = iter.next().ok_or_else(|| {
            ZSpaceError::ShapeMismatch("bounding range of no ranges".to_string())
        })?;
        let mut start = first.start.clone();
        let mut end = first.end.clone();
        for r in iter {
            start = start.min(&r.start)?;
            end = end.max(&r.end)?;
        }
        ZRange::new(start, end)
    }

    // ── Partitioning ───────────────────────────────────────────────────────

    /// Partition into `count` consecutive sub-ranges along `dim`.
    ///
    /// With `extent = shape[dim]`, every chunk gets `extent / count` and the
    /// first `extent % count` chunks get one more, so chunk sizes never differ
    /// by more than one and larger chunks come first.
    pub fn split(&self, dim: isize, count: usize) -> Result<Vec<ZRange>, ZSpaceError> {
        let dim = self.start.resolve_dim(dim)?;
        let extent = self.extent(dim)?;
        if count == 0 {
            return Err(ZSpaceError::InvalidSplit(
                "chunk count must be > 0".to_string(),
            ));
        }
        if count == 1 {
            return Ok(vec![self.clone()]);
        }
        if count as i64 > extent {
            return Err(ZSpaceError::InvalidSplit(format!(
                "cannot split extent {} of dim {} into {} chunks",
                extent, dim, count
            )));
        }
        let base = extent / count as i64;
        let extra = (extent % count as i64) as usize;
        let chunks: Vec<i64> = (0..count)
            .map(|i| if i < extra { base + 1 } else { base })
            .collect();
        self.split_impl(dim, &chunks)
    }

    /// Split along `dim` into chunks of `chunk_size`; the last may be smaller.
    pub fn split_by_chunk_size(
        &self,
        dim: isize,
        chunk_size: i64,
    ) -> Result<Vec<ZRange>, ZSpaceError> {
        let dim = self.start.resolve_dim(dim)?;
        if chunk_size <= 0 {
            return Err(ZSpaceError::InvalidSplit(format!(
                "chunk size must be > 0: {}",
                chunk_size
            )));
        }
        let extent = self.extent(dim)?;
        if chunk_size >= extent {
            return Ok(vec![self.clone()]);
        }
        let mut chunks = vec![chunk_size; (extent / chunk_size) as usize];
        if extent % chunk_size != 0 {
            chunks.push(extent % chunk_size);
        }
        self.split_impl(dim, &chunks)
    }

    /// Split along `dim` into chunks of the given sizes, which must be positive
    /// and sum to the extent of `dim`.
    pub fn split_into_chunks(&self, dim: isize, chunks: &[i64]) -> Result<Vec<ZRange>, ZSpaceError> {
        let dim = self.start.resolve_dim(dim)?;
        let extent = self.extent(dim)?;
        if chunks.iter().any(|&c| c <= 0) {
            return Err(ZSpaceError::InvalidSplit(format!(
                "chunk sizes must be > 0: {:?}",
                chunks
            )));
        }
        let total = chunks.iter().try_fold(0i64, |acc, &c| {
            acc.checked_add(c).ok_or(ZSpaceError::Overflow { op: "split" })
        })?;
        if total != extent {
            return Err(ZSpaceError::InvalidSplit(format!(
                "total chunk size ({}) must equal dim size ({}): {:?}",
                total, extent, chunks
            )));
        }
        self.split_impl(dim, chunks)
    }

    fn split_impl(&self, dim: usize, chunks: &[i64]) -> Result<Vec<ZRange>, ZSpaceError> {
        if chunks.len() == 1 {
            return Ok(vec![self.clone()]);
        }
        let mut ranges = Vec::with_capacity(chunks.len());
        let mut offset = self.start.coords()[dim];
        for &k in chunks {
            let start = self.start.with(dim, offset)?;
            let end = self.end.with(dim, offset + k)?;
            ranges.push(ZRange::new(start, end)?);
            offset += k;
        }
        Ok(ranges)
    }

    /// Iterate the points of the range in row-major order.
    ///
    /// Empty ranges yield nothing; the scalar range yields one empty point.
    pub fn iter_points(&self) -> impl Iterator<Item = ZPoint> + '_ {
        let mut next = if self.is_empty() {
            None
        } else {
            Some(self.start.clone())
        };
        std::iter::from_fn(move || {
            let current = next.take()?;
            let mut coords = current.coords().to_vec();
            let mut dim = coords.len();
            let mut advanced = false;
            while dim > 0 {
                dim -= 1;
                coords[dim] += 1;
                if coords[dim] < self.end.coords()[dim] {
                    advanced = true;
                    break;
                }
                coords[dim] = self.start.coords()[dim];
            }
            if advanced {
                next = Some(ZPoint::new(coords));
            }
            Some(current)
        })
    }

    /// `zr[0:3, 0:5]` without the `zr` prefix.
    pub fn to_range_string(&self) -> String {
        let parts: Vec<String> = self
            .start
            .coords()
            .iter()
            .zip(self.end.coords())
            .map(|(s, e)| format!("{}:{}", s, e))
            .collect();
        format!("[{}]", parts.join(", "))
    }

    /// `‖3, 5‖`.
    pub fn to_shape_string(&self) -> String {
        let parts: Vec<String> = self
            .start
            .coords()
            .iter()
            .zip(self.end.coords())
            .map(|(&s, &e)| (i128::from(e) - i128::from(s)).to_string())
            .collect();
        format!("‖{}‖", parts.join(", "))
    }

    /// Parse either the JSON form or the `zr[0:3, 0:5]` text form.
    pub fn parse(s: &str) -> Result<ZRange, ZSpaceError> {
        let trimmed = s.trim();
        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed).map_err(|e| ZSpaceError::Parse(e.to_string()));
        }
        crate::zparse::parse_range(trimmed)
    }
}

impl fmt::Display for ZRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zr{}", self.to_range_string())
    }
}

impl std::str::FromStr for ZRange {
    type Err = ZSpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ZRange::parse(s)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
