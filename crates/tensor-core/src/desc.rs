// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor descriptors: the value type shape inference works on.

use crate::{DType, Layout, Shape};
use std::fmt;

/// Element type, layout tag and shape of a tensor.
///
/// Descriptors carry no data and no behaviour beyond size arithmetic. They
/// are what operations consume and produce during shape inference, and what
/// the plan compares to decide whether a setup can be skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TensorDesc {
    pub dtype: DType,
    #[serde(default)]
    pub layout: Layout,
    pub shape: Shape,
}

impl TensorDesc {
    /// Creates a descriptor with the default `Nd` layout.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{DType, Shape, TensorDesc};
    /// let d = TensorDesc::new(DType::F16, Shape::matrix(4, 8));
    /// assert_eq!(d.size_bytes(), 64);
    /// ```
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self {
            dtype,
            layout: Layout::Nd,
            shape,
        }
    }

    /// Returns a copy with a different layout tag.
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Returns a copy with a different shape.
    pub fn with_shape(&self, shape: Shape) -> Self {
        Self {
            dtype: self.dtype,
            layout: self.layout,
            shape,
        }
    }

    /// Bytes needed to hold the tensor densely, saturating at `usize::MAX`.
    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.dtype)
    }

    /// Bytes needed to hold the tensor, or `None` if that overflows `usize`.
    pub fn checked_size_bytes(&self) -> Option<usize> {
        self.shape.checked_size_bytes(self.dtype)
    }

    /// Number of elements.
    pub fn num_elements(&self) -> usize {
        self.shape.num_elements()
    }
}

impl fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} {}", self.dtype, self.shape, self.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_bytes() {
        let d = TensorDesc::new(DType::F32, Shape::matrix(4, 8));
        assert_eq!(d.size_bytes(), 128);
        assert_eq!(d.num_elements(), 32);
    }

    #[test]
    fn test_display() {
        let d = TensorDesc::new(DType::F16, Shape::matrix(2, 3)).with_layout(Layout::FractalNz);
        assert_eq!(format!("{d}"), "f16[2, 3] fractal_nz");
    }

    #[test]
    fn test_with_shape_keeps_dtype_and_layout() {
        let d = TensorDesc::new(DType::BF16, Shape::matrix(2, 6)).with_layout(Layout::Nhwc);
        let r = d.with_shape(Shape::new(vec![2, 2, 3]));
        assert_eq!(r.dtype, DType::BF16);
        assert_eq!(r.layout, Layout::Nhwc);
        assert_eq!(r.num_elements(), d.num_elements());
    }

    #[test]
    fn test_serde_default_layout() {
        let d: TensorDesc = serde_json::from_str(r#"{"dtype":"F32","shape":[4,8]}"#).unwrap();
        assert_eq!(d.layout, Layout::Nd);
        assert_eq!(d.shape, Shape::matrix(4, 8));
    }
}
