// zpoint.rs — Integer lattice points
//
// `ZPoint` is an immutable integer vector. Points of the same rank are
// partially ordered by coordinate dominance, which is the ordering used for
// `[start, end)` range bounds.
//
// Preconditions: none.
// Postconditions: every operation returns a fresh point; inputs are untouched.
// Failure modes: rank mismatch, division by zero, i64 overflow, bad
//                dimension index → `ZSpaceError`.
// Side effects: none.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ZSpaceError;

/// An immutable point in Z-space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZPoint {
    coords: Vec<i64>,
}

impl ZPoint {
    pub fn new(coords: Vec<i64>) -> Self {
        Self { coords }
    }

    /// The rank-0 point.
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn zeros(ndim: usize) -> Self {
        Self::full(ndim, 0)
    }

    pub fn ones(ndim: usize) -> Self {
        Self::full(ndim, 1)
    }

    pub fn full(ndim: usize, value: i64) -> Self {
        Self {
            coords: vec![value; ndim],
        }
    }

    pub fn ndim(&self) -> usize {
        self.coords.len()
    }

    pub fn coords(&self) -> &[i64] {
        &self.coords
    }

    pub fn get(&self, dim: usize) -> Option<i64> {
        self.coords.get(dim).copied()
    }

    /// Resolve a possibly-negative dimension index against this point's rank.
    pub fn resolve_dim(&self, dim: isize) -> Result<usize, ZSpaceError> {
        let ndim = self.ndim() as isize;
        let resolved = if dim < 0 { dim + ndim } else { dim };
        if resolved < 0 || resolved >= ndim {
            return Err(ZSpaceError::DimOutOfBounds {
                dim,
                ndim: self.ndim(),
            });
        }
        Ok(resolved as usize)
    }

    /// Product of all coordinates; 1 for the scalar point.
    pub fn prod(&self) -> Result<i64, ZSpaceError> {
        self.coords.iter().try_fold(1i64, |acc, &c| {
            acc.checked_mul(c).ok_or(ZSpaceError::Overflow { op: "prod" })
        })
    }

    pub fn sum(&self) -> Result<i64, ZSpaceError> {
        self.coords.iter().try_fold(0i64, |acc, &c| {
            acc.checked_add(c).ok_or(ZSpaceError::Overflow { op: "sum" })
        })
    }

    /// Return a copy with `dim` replaced by `value`.
    pub fn with(&self, dim: usize, value: i64) -> Result<ZPoint, ZSpaceError> {
        if dim >= self.ndim() {
            return Err(ZSpaceError::DimOutOfBounds {
                dim: dim as isize,
                ndim: self.ndim(),
            });
        }
        let mut coords = self.coords.clone();
        coords[dim] = value;
        Ok(ZPoint::new(coords))
    }

    /// Reorder coordinates: `result[i] = self[permutation[i]]`.
    pub fn permute(&self, permutation: &[usize]) -> Result<ZPoint, ZSpaceError> {
        check_permutation(permutation, self.ndim())?;
        Ok(ZPoint::new(
            permutation.iter().map(|&i| self.coords[i]).collect(),
        ))
    }

    // ── Elementwise arithmetic ─────────────────────────────────────────────

    pub fn add(&self, other: &ZPoint) -> Result<ZPoint, ZSpaceError> {
        self.zip_with(other, "add", |a, b| {
            a.checked_add(b).ok_or(ZSpaceError::Overflow { op: "add" })
        })
    }

    pub fn sub(&self, other: &ZPoint) -> Result<ZPoint, ZSpaceError> {
        self.zip_with(other, "sub", |a, b| {
            a.checked_sub(b).ok_or(ZSpaceError::Overflow { op: "sub" })
        })
    }

    pub fn mul(&self, other: &ZPoint) -> Result<ZPoint, ZSpaceError> {
        self.zip_with(other, "mul", |a, b| {
            a.checked_mul(b).ok_or(ZSpaceError::Overflow { op: "mul" })
        })
    }

    /// Truncating integer division.
    pub fn div(&self, other: &ZPoint) -> Result<ZPoint, ZSpaceError> {
        self.zip_with(other, "div", |a, b| {
            if b == 0 {
                return Err(ZSpaceError::DivisionByZero { op: "div" });
            }
            a.checked_div(b).ok_or(ZSpaceError::Overflow { op: "div" })
        })
    }

    /// Remainder with the sign of the dividend, matching `div`.
    pub fn rem(&self, other: &ZPoint) -> Result<ZPoint, ZSpaceError> {
        self.zip_with(other, "rem", |a, b| {
            if b == 0 {
                return Err(ZSpaceError::DivisionByZero { op: "rem" });
            }
            a.checked_rem(b).ok_or(ZSpaceError::Overflow { op: "rem" })
        })
    }

    pub fn add_scalar(&self, value: i64) -> Result<ZPoint, ZSpaceError> {
        self.map(|a| a.checked_add(value).ok_or(ZSpaceError::Overflow { op: "add" }))
    }

    pub fn sub_scalar(&self, value: i64) -> Result<ZPoint, ZSpaceError> {
        self.map(|a| a.checked_sub(value).ok_or(ZSpaceError::Overflow { op: "sub" }))
    }

    pub fn neg(&self) -> Result<ZPoint, ZSpaceError> {
        self.map(|a| a.checked_neg().ok_or(ZSpaceError::Overflow { op: "neg" }))
    }

    /// Componentwise minimum.
    pub fn min(&self, other: &ZPoint) -> Result<ZPoint, ZSpaceError> {
        self.zip_with(other, "min", |a, b| Ok(a.min(b)))
    }

    /// Componentwise maximum.
    pub fn max(&self, other: &ZPoint) -> Result<ZPoint, ZSpaceError> {
        self.zip_with(other, "max", |a, b| Ok(a.max(b)))
    }

    fn map(&self, f: impl Fn(i64) -> Result<i64, ZSpaceError>) -> Result<ZPoint, ZSpaceError> {
        let coords = self.coords.iter().map(|&a| f(a)).collect::<Result<Vec<_>, _>>()?;
        Ok(ZPoint::new(coords))
    }

    fn zip_with(
        &self,
        other: &ZPoint,
        op: &'static str,
        f: impl Fn(i64, i64) -> Result<i64, ZSpaceError>,
    ) -> Result<ZPoint, ZSpaceError> {
        self.assert_same_ndim(other, op)?;
        let coords = self
            .coords
            .iter()
            .zip(&other.coords)
            .map(|(&a, &b)| f(a, b))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ZPoint::new(coords))
    }

    pub(crate) fn assert_same_ndim(
        &self,
        other: &ZPoint,
        op: &'static str,
    ) -> Result<(), ZSpaceError> {
        if self.ndim() != other.ndim() {
            return Err(ZSpaceError::RankMismatch {
                op,
                left: self.ndim(),
                right: other.ndim(),
            });
        }
        Ok(())
    }

    // ── Dominance ordering ─────────────────────────────────────────────────
    //
    // `partial_cmp` is the dominance order: Less when no coordinate is greater
    // and at least one is smaller. Points of different rank are unordered.

    pub fn lt(&self, other: &ZPoint) -> bool {
        self.partial_cmp(other) == Some(Ordering::Less)
    }

    pub fn le(&self, other: &ZPoint) -> bool {
        matches!(
            self.partial_cmp(other),
            Some(Ordering::Less | Ordering::Equal)
        )
    }

    pub fn gt(&self, other: &ZPoint) -> bool {
        self.partial_cmp(other) == Some(Ordering::Greater)
    }

    pub fn ge(&self, other: &ZPoint) -> bool {
        matches!(
            self.partial_cmp(other),
            Some(Ordering::Greater | Ordering::Equal)
        )
    }

    /// True when every coordinate of `self` is strictly below `other`.
    pub(crate) fn strictly_below(&self, other: &ZPoint) -> bool {
        self.ndim() == other.ndim() && self.coords.iter().zip(&other.coords).all(|(a, b)| a < b)
    }
}

impl PartialOrd for ZPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.ndim() != other.ndim() {
            return None;
        }
        let mut lt = false;
        let mut gt = false;
        for (a, b) in self.coords.iter().zip(&other.coords) {
            match a.cmp(b) {
                Ordering::Less => lt = true,
                Ordering::Greater => gt = true,
                Ordering::Equal => {}
            }
        }
        match (lt, gt) {
            (true, true) => None,
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => Some(Ordering::Equal),
        }
    }
}

impl From<Vec<i64>> for ZPoint {
    fn from(coords: Vec<i64>) -> Self {
        ZPoint::new(coords)
    }
}

impl From<&[i64]> for ZPoint {
    fn from(coords: &[i64]) -> Self {
        ZPoint::new(coords.to_vec())
    }
}

impl<const N: usize> From<[i64; N]> for ZPoint {
    fn from(coords: [i64; N]) -> Self {
        ZPoint::new(coords.to_vec())
    }
}

impl fmt::Display for ZPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z[")?;
        for (i, c) in self.coords.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "]")
    }
}

impl std::str::FromStr for ZPoint {
    type Err = ZSpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::zparse::parse_point(s)
    }
}

pub(crate) fn check_permutation(permutation: &[usize], ndim: usize) -> Result<(), ZSpaceError> {
    let mut seen = vec![false; ndim];
    if permutation.len() != ndim {
        return Err(ZSpaceError::ShapeMismatch(format!(
            "permutation {:?} does not match rank {}",
            permutation, ndim
        )));
    }
    for &i in permutation {
        if i >= ndim || seen[i] {
            return Err(ZSpaceError::ShapeMismatch(format!(
                "invalid permutation {:?}",
                permutation
            )));
        }
        seen[i] = true;
    }
    Ok(())
}

/// Build a `ZPoint` from literal coordinates.
#[macro_export]
macro_rules! zpoint {
    () => {
        $crate::zpoint::ZPoint::scalar()
    };
    ($($x:expr),+ $(,)?) => {
        $crate::zpoint::ZPoint::new(vec![$($x as i64),+])
    };
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(zpoint![1, 2, 3].to_string(), "z[1, 2, 3]");
        assert_eq!(ZPoint::scalar().to_string(), "z[]");
    }

    #[test]
    fn dominance_ordering() {
        let a = zpoint![1, 2];
        let b = zpoint![1, 3];
        let c = zpoint![0, 4];

        assert!(a.lt(&b));
        assert!(a.le(&b));
        assert!(b.gt(&a));
        assert!(a.le(&a) && a.ge(&a));
        assert!(!a.lt(&a));

        // Incomparable, not an error.
        assert_eq!(a.partial_cmp(&c), None);
        assert!(!a.lt(&c) && !a.gt(&c) && !a.le(&c) && !a.ge(&c));
    }

    #[test]
    fn different_rank_is_unordered() {
        assert_eq!(zpoint![1].partial_cmp(&zpoint![1, 2]), None);
        assert_ne!(zpoint![1], zpoint![1, 0]);
    }

    #[test]
    fn scalar_points_are_equal() {
        assert_eq!(
            ZPoint::scalar().partial_cmp(&ZPoint::scalar()),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn arithmetic() {
        let a = zpoint![6, -7];
        let b = zpoint![4, 2];
        assert_eq!(a.add(&b).unwrap(), zpoint![10, -5]);
        assert_eq!(a.sub(&b).unwrap(), zpoint![2, -9]);
        assert_eq!(a.mul(&b).unwrap(), zpoint![24, -14]);
        assert_eq!(a.div(&b).unwrap(), zpoint![1, -3]);
        assert_eq!(a.rem(&b).unwrap(), zpoint![2, -1]);
        assert_eq!(a.add_scalar(1).unwrap(), zpoint![7, -6]);
        assert_eq!(a.neg().unwrap(), zpoint![-6, 7]);
        assert_eq!(a.prod().unwrap(), -42);
        assert_eq!(a.sum().unwrap(), -1);
        assert_eq!(a.min(&b).unwrap(), zpoint![4, -7]);
        assert_eq!(a.max(&b).unwrap(), zpoint![6, 2]);
    }

    #[test]
    fn division_by_zero_fails() {
        let err = zpoint![1, 2].div(&zpoint![1, 0]).unwrap_err();
        assert_eq!(err, ZSpaceError::DivisionByZero { op: "div" });
        assert!(zpoint![1].rem(&zpoint![0]).is_err());
    }

    #[test]
    fn overflow_fails() {
        let big = zpoint![i64::MAX, 1];
        assert_eq!(
            big.add(&zpoint![1, 0]).unwrap_err(),
            ZSpaceError::Overflow { op: "add" }
        );
        assert!(zpoint![i64::MIN].sub(&zpoint![1]).is_err());
        assert!(big.mul(&zpoint![2, 1]).is_err());
        assert!(zpoint![i64::MIN].neg().is_err());
        assert!(zpoint![i64::MIN].div(&zpoint![-1]).is_err());
        assert_eq!(
            zpoint![1i64 << 32, 1i64 << 32].prod().unwrap_err(),
            ZSpaceError::Overflow { op: "prod" }
        );
        assert!(big.sum().is_err());
    }

    #[test]
    fn rank_mismatch_fails() {
        let err = zpoint![1, 2].add(&zpoint![1]).unwrap_err();
        assert_eq!(
            err,
            ZSpaceError::RankMismatch {
                op: "add",
                left: 2,
                right: 1
            }
        );
    }

    #[test]
    fn resolve_dim_negative() {
        let p = zpoint![1, 2, 3];
        assert_eq!(p.resolve_dim(-1).unwrap(), 2);
        assert_eq!(p.resolve_dim(0).unwrap(), 0);
        assert!(p.resolve_dim(3).is_err());
        assert!(p.resolve_dim(-4).is_err());
    }

    #[test]
    fn permute() {
        assert_eq!(zpoint![1, 2, 3].permute(&[2, 0, 1]).unwrap(), zpoint![3, 1, 2]);
        assert!(zpoint![1, 2].permute(&[0, 0]).is_err());
    }

    #[test]
    fn json_is_a_plain_array() {
        let p = zpoint![3, -1];
        assert_eq!(serde_json::to_string(&p).unwrap(), "[3,-1]");
        let back: ZPoint = serde_json::from_str("[3,-1]").unwrap();
        assert_eq!(back, p);
    }
}
