// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use super::same_dtype;
use crate::{check_input_count, KernelError, KernelFactory, Operation, Runner, ShapeError};
use std::sync::Arc;
use tensor_core::{Shape, TensorDesc};

/// Dense projection `y = x · W (+ b)`.
///
/// `x` is `[..., M, K]`; `W` is `[K, N]`, or `[N, K]` when `transpose_b` is
/// set. With a bias the operation takes a third input of shape `[N]`.
#[derive(Debug, Clone)]
pub struct Linear {
    kernel: Arc<dyn KernelFactory>,
    transpose_b: bool,
    bias: bool,
}

impl Linear {
    pub fn new(kernel: Arc<dyn KernelFactory>) -> Self {
        Self {
            kernel,
            transpose_b: false,
            bias: false,
        }
    }

    /// Treat the weight as `[N, K]`.
    pub fn transposed(mut self) -> Self {
        self.transpose_b = true;
        self
    }

    /// Take a bias vector as a third input.
    pub fn with_bias(mut self) -> Self {
        self.bias = true;
        self
    }

    fn rank_error(&self, input: usize, expected: &str, actual: usize) -> ShapeError {
        ShapeError::RankMismatch {
            op: self.name().to_string(),
            input,
            expected: expected.to_string(),
            actual,
        }
    }
}

impl Operation for Linear {
    fn name(&self) -> &str {
        "linear"
    }

    fn input_count(&self) -> usize {
        if self.bias {
            3
        } else {
            2
        }
    }

    fn output_count(&self) -> usize {
        1
    }

    fn infer_shape(&self, inputs: &[TensorDesc]) -> Result<Vec<TensorDesc>, ShapeError> {
        check_input_count(self, inputs)?;
        let (x, w) = (&inputs[0], &inputs[1]);
        same_dtype(self.name(), x, w)?;

        let x_dims = x.shape.dims();
        if x_dims.len() < 2 {
            return Err(self.rank_error(0, ">= 2", x_dims.len()));
        }
        let w_dims = w.shape.dims();
        if w_dims.len() != 2 {
            return Err(self.rank_error(1, "2", w_dims.len()));
        }

        let k = x_dims[x_dims.len() - 1];
        let (w_k, n) = if self.transpose_b {
            (w_dims[1], w_dims[0])
        } else {
            (w_dims[0], w_dims[1])
        };
        if k != w_k {
            return Err(ShapeError::DimMismatch {
                op: self.name().to_string(),
                lhs: x.shape.clone(),
                rhs: w.shape.clone(),
            });
        }

        if self.bias {
            let b = &inputs[2];
            same_dtype(self.name(), x, b)?;
            if b.shape.dims() != [n] {
                return Err(ShapeError::DimMismatch {
                    op: self.name().to_string(),
                    lhs: Shape::vector(n),
                    rhs: b.shape.clone(),
                });
            }
        }

        Ok(vec![x.with_shape(x.shape.with_last_dim(n))])
    }

    fn create_runner(&self) -> Result<Box<dyn Runner>, KernelError> {
        self.kernel.create_runner(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::NullKernel;
    use tensor_core::DType;

    fn desc(dims: &[usize]) -> TensorDesc {
        TensorDesc::new(DType::F32, Shape::new(dims.to_vec()))
    }

    #[test]
    fn test_infer_2d() {
        let op = Linear::new(Arc::new(NullKernel));
        let out = op.infer_shape(&[desc(&[4, 8]), desc(&[8, 16])]).unwrap();
        assert_eq!(out, vec![desc(&[4, 16])]);
    }

    #[test]
    fn test_infer_batched_transposed() {
        let op = Linear::new(Arc::new(NullKernel)).transposed();
        let out = op.infer_shape(&[desc(&[2, 4, 8]), desc(&[32, 8])]).unwrap();
        assert_eq!(out, vec![desc(&[2, 4, 32])]);
    }

    #[test]
    fn test_bias() {
        let op = Linear::new(Arc::new(NullKernel)).with_bias();
        assert_eq!(op.input_count(), 3);
        op.infer_shape(&[desc(&[4, 8]), desc(&[8, 16]), desc(&[16])])
            .unwrap();
        assert!(op
            .infer_shape(&[desc(&[4, 8]), desc(&[8, 16]), desc(&[8])])
            .is_err());
    }

    #[test]
    fn test_contraction_mismatch() {
        let op = Linear::new(Arc::new(NullKernel));
        let err = op.infer_shape(&[desc(&[4, 8]), desc(&[6, 8])]).unwrap_err();
        assert!(matches!(err, ShapeError::DimMismatch { .. }));
    }

    #[test]
    fn test_rank_and_dtype_errors() {
        let op = Linear::new(Arc::new(NullKernel));
        assert!(matches!(
            op.infer_shape(&[desc(&[8]), desc(&[8, 8])]),
            Err(ShapeError::RankMismatch { input: 0, .. })
        ));
        let half = TensorDesc::new(DType::F16, Shape::matrix(8, 8));
        assert!(matches!(
            op.infer_shape(&[desc(&[4, 8]), half]),
            Err(ShapeError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_input_count() {
        let op = Linear::new(Arc::new(NullKernel));
        assert!(matches!(
            op.infer_shape(&[desc(&[4, 8])]),
            Err(ShapeError::InputCount {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }
}
