// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors and dimension utilities.

use crate::{DType, TensorError};
use std::fmt;

/// Maximum number of dimensions a shape may carry.
pub const MAX_RANK: usize = 8;

/// Ordered dimension sizes of a tensor.
///
/// Shape inference reads and rebuilds these; a plan never mutates one in
/// place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a shape from the given dimensions without checking the rank.
    ///
    /// Prefer [`Shape::try_new`] for dimensions that come from outside the
    /// program.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(s.rank(), 3);
    /// assert_eq!(s.num_elements(), 24);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Creates a shape, rejecting ranks above [`MAX_RANK`].
    pub fn try_new(dims: Vec<usize>) -> Result<Self, TensorError> {
        if dims.len() > MAX_RANK {
            return Err(TensorError::RankTooLarge {
                rank: dims.len(),
                max: MAX_RANK,
            });
        }
        Ok(Self { dims })
    }

    /// Creates a scalar shape (rank 0).
    pub fn scalar() -> Self {
        Self { dims: vec![] }
    }

    /// Creates a 1-D shape.
    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    /// Creates a 2-D shape (matrix).
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    /// Returns the number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the total number of elements, saturating at `usize::MAX`.
    ///
    /// For a scalar shape (rank 0), returns 1.
    pub fn num_elements(&self) -> usize {
        self.checked_num_elements().unwrap_or(usize::MAX)
    }

    /// Element count, or `None` if it overflows `usize`.
    pub fn checked_num_elements(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Returns the dimensions as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the last dimension, or `None` for a scalar.
    pub fn last_dim(&self) -> Option<usize> {
        self.dims.last().copied()
    }

    /// Memory footprint in bytes for a given [`DType`], saturating at
    /// `usize::MAX`.
    pub fn size_bytes(&self, dtype: DType) -> usize {
        self.checked_size_bytes(dtype).unwrap_or(usize::MAX)
    }

    /// Memory footprint in bytes, or `None` if it overflows `usize`.
    pub fn checked_size_bytes(&self, dtype: DType) -> Option<usize> {
        self.checked_num_elements()?.checked_mul(dtype.size_bytes())
    }

    /// Right-aligned broadcast of two shapes, or `None` if some pair of
    /// dimensions differs and neither is 1.
    pub fn broadcast_with(&self, other: &Shape) -> Option<Shape> {
        let rank = self.rank().max(other.rank());
        let mut out = vec![0usize; rank];
        for i in 0..rank {
            let a = dim_from_right(&self.dims, i);
            let b = dim_from_right(&other.dims, i);
            out[rank - 1 - i] = match (a, b) {
                (a, b) if a == b => a,
                (1, b) => b,
                (a, 1) => a,
                _ => return None,
            };
        }
        Some(Shape::new(out))
    }

    /// The same shape with its last dimension replaced. A scalar becomes
    /// a vector of `last`.
    pub fn with_last_dim(&self, last: usize) -> Shape {
        let mut dims = self.dims.clone();
        match dims.last_mut() {
            Some(d) => *d = last,
            None => dims.push(last),
        }
        Shape::new(dims)
    }

    /// Collapses every leading dimension into one: `[b, s, h]` becomes
    /// `[b * s, h]`. Shapes of rank below two are returned unchanged.
    pub fn flatten_to_matrix(&self) -> Shape {
        match self.dims.split_last() {
            Some((&last, leading)) if !leading.is_empty() => {
                let rows = leading.iter().fold(1usize, |acc, &d| acc.saturating_mul(d));
                Shape::matrix(rows, last)
            }
            _ => self.clone(),
        }
    }
}

fn dim_from_right(dims: &[usize], i: usize) -> usize {
    if i < dims.len() {
        dims[dims.len() - 1 - i]
    } else {
        1
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.num_elements(), 1);
        assert_eq!(s.size_bytes(DType::I32), 4);
    }

    #[test]
    fn test_matrix_shape() {
        let s = Shape::matrix(4, 8);
        assert_eq!(s.num_elements(), 32);
        assert_eq!(s.size_bytes(DType::F32), 128);
        assert_eq!(s.last_dim(), Some(8));
    }

    #[test]
    fn test_checked_sizes() {
        let s = Shape::matrix(4, 8);
        assert_eq!(s.checked_num_elements(), Some(32));
        assert_eq!(s.checked_size_bytes(DType::F32), Some(128));

        let huge = Shape::matrix(1 << 40, 1 << 30);
        assert_eq!(huge.checked_num_elements(), None);
        assert_eq!(huge.checked_size_bytes(DType::F32), None);
        assert_eq!(huge.num_elements(), usize::MAX);
        assert_eq!(huge.size_bytes(DType::F32), usize::MAX);

        // Elements fit, bytes do not.
        let wide = Shape::vector(usize::MAX / 2);
        assert!(wide.checked_num_elements().is_some());
        assert_eq!(wide.checked_size_bytes(DType::F32), None);
    }

    #[test]
    fn test_try_new_rank_limit() {
        assert!(Shape::try_new(vec![1; MAX_RANK]).is_ok());
        let err = Shape::try_new(vec![1; MAX_RANK + 1]).unwrap_err();
        assert!(matches!(err, TensorError::RankTooLarge { rank: 9, max: 8 }));
    }

    #[test]
    fn test_broadcast_with() {
        let rows = Shape::matrix(4, 3);
        assert_eq!(Shape::new(vec![1, 3]).broadcast_with(&rows), Some(rows.clone()));
        assert_eq!(rows.broadcast_with(&Shape::vector(3)), Some(rows.clone()));
        assert_eq!(rows.broadcast_with(&Shape::new(vec![4, 2])), None);
    }

    #[test]
    fn test_with_last_dim() {
        assert_eq!(Shape::new(vec![2, 4, 8]).with_last_dim(16).dims(), &[2, 4, 16]);
        assert_eq!(Shape::scalar().with_last_dim(3), Shape::vector(3));
    }

    #[test]
    fn test_flatten_to_matrix() {
        assert_eq!(Shape::new(vec![2, 4, 8]).flatten_to_matrix(), Shape::matrix(8, 8));
        assert_eq!(Shape::matrix(3, 5).flatten_to_matrix(), Shape::matrix(3, 5));
        assert_eq!(Shape::vector(7).flatten_to_matrix(), Shape::vector(7));
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::new(vec![2, 3, 4]).to_string(), "[2, 3, 4]");
        assert_eq!(Shape::scalar().to_string(), "[]");
    }

    #[test]
    fn test_serde_transparent() {
        let s = Shape::matrix(4, 8);
        assert_eq!(serde_json::to_string(&s).unwrap(), "[4,8]");
    }
}
