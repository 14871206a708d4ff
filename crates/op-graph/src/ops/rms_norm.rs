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

/// Root-mean-square normalisation over the last dimension.
///
/// Without a gamma input the scale is held by the kernel.
#[derive(Debug, Clone)]
pub struct RmsNorm {
    kernel: Arc<dyn KernelFactory>,
    gamma: bool,
}

impl RmsNorm {
    pub fn new(kernel: Arc<dyn KernelFactory>) -> Self {
        Self {
            kernel,
            gamma: false,
        }
    }

    /// Take the `[hidden]` scale vector as a second input.
    pub fn with_gamma(kernel: Arc<dyn KernelFactory>) -> Self {
        Self {
            kernel,
            gamma: true,
        }
    }
}

impl Operation for RmsNorm {
    fn name(&self) -> &str {
        "rms_norm"
    }

    fn input_count(&self) -> usize {
        if self.gamma {
            2
        } else {
            1
        }
    }

    fn output_count(&self) -> usize {
        1
    }

    fn infer_shape(&self, inputs: &[TensorDesc]) -> Result<Vec<TensorDesc>, ShapeError> {
        check_input_count(self, inputs)?;
        let x = &inputs[0];
        let hidden = x.shape.last_dim().ok_or_else(|| ShapeError::RankMismatch {
            op: self.name().to_string(),
            input: 0,
            expected: ">= 1".into(),
            actual: 0,
        })?;

        if self.gamma {
            let g = &inputs[1];
            same_dtype(self.name(), x, g)?;
            if g.shape.dims() != [hidden] {
                return Err(ShapeError::DimMismatch {
                    op: self.name().to_string(),
                    lhs: Shape::vector(hidden),
                    rhs: g.shape.clone(),
                });
            }
        }
        Ok(vec![x.clone()])
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

    #[test]
    fn test_preserves_shape() {
        let op = RmsNorm::new(Arc::new(NullKernel));
        let x = TensorDesc::new(DType::BF16, Shape::new(vec![2, 5, 64]));
        assert_eq!(op.infer_shape(&[x.clone()]).unwrap(), vec![x]);
    }

    #[test]
    fn test_gamma_must_match_hidden() {
        let op = RmsNorm::with_gamma(Arc::new(NullKernel));
        let x = TensorDesc::new(DType::F32, Shape::matrix(4, 8));
        let ok = TensorDesc::new(DType::F32, Shape::vector(8));
        let bad = TensorDesc::new(DType::F32, Shape::vector(4));
        assert!(op.infer_shape(&[x.clone(), ok]).is_ok());
        assert!(matches!(
            op.infer_shape(&[x, bad]),
            Err(ShapeError::DimMismatch { .. })
        ));
    }

    #[test]
    fn test_scalar_rejected() {
        let op = RmsNorm::new(Arc::new(NullKernel));
        let s = TensorDesc::new(DType::F32, Shape::scalar());
        assert!(matches!(
            op.infer_shape(&[s]),
            Err(ShapeError::RankMismatch { .. })
        ));
    }
}
