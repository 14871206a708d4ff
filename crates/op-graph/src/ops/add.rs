// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use super::same_dtype;
use crate::{check_input_count, InPlace, KernelError, KernelFactory, Operation, Runner, ShapeError};
use std::sync::Arc;
use tensor_core::TensorDesc;

/// Broadcasting element-wise sum of two tensors.
///
/// The output may overwrite the first input, which is how residual
/// connections avoid an extra activation buffer.
#[derive(Debug, Clone)]
pub struct ElementwiseAdd {
    kernel: Arc<dyn KernelFactory>,
}

impl ElementwiseAdd {
    pub fn new(kernel: Arc<dyn KernelFactory>) -> Self {
        Self { kernel }
    }
}

impl Operation for ElementwiseAdd {
    fn name(&self) -> &str {
        "add"
    }

    fn input_count(&self) -> usize {
        2
    }

    fn output_count(&self) -> usize {
        1
    }

    fn infer_shape(&self, inputs: &[TensorDesc]) -> Result<Vec<TensorDesc>, ShapeError> {
        check_input_count(self, inputs)?;
        let (a, b) = (&inputs[0], &inputs[1]);
        same_dtype(self.name(), a, b)?;
        let shape = a
            .shape
            .broadcast_with(&b.shape)
            .ok_or_else(|| ShapeError::NotBroadcastable {
                op: self.name().to_string(),
                lhs: a.shape.clone(),
                rhs: b.shape.clone(),
            })?;
        Ok(vec![a.with_shape(shape)])
    }

    fn create_runner(&self) -> Result<Box<dyn Runner>, KernelError> {
        self.kernel.create_runner(self.name())
    }

    fn in_place(&self) -> Option<InPlace> {
        Some(InPlace {
            input: 0,
            output: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::NullKernel;
    use tensor_core::{DType, Shape};

    fn desc(dims: &[usize]) -> TensorDesc {
        TensorDesc::new(DType::F16, Shape::new(dims.to_vec()))
    }

    #[test]
    fn test_same_shape() {
        let op = ElementwiseAdd::new(Arc::new(NullKernel));
        let out = op.infer_shape(&[desc(&[4, 8]), desc(&[4, 8])]).unwrap();
        assert_eq!(out, vec![desc(&[4, 8])]);
    }

    #[test]
    fn test_broadcast() {
        let op = ElementwiseAdd::new(Arc::new(NullKernel));
        let out = op.infer_shape(&[desc(&[4, 1]), desc(&[3, 1, 8])]).unwrap();
        assert_eq!(out, vec![desc(&[3, 4, 8])]);
    }

    #[test]
    fn test_not_broadcastable() {
        let op = ElementwiseAdd::new(Arc::new(NullKernel));
        assert!(matches!(
            op.infer_shape(&[desc(&[4, 8]), desc(&[4, 3])]),
            Err(ShapeError::NotBroadcastable { .. })
        ));
    }

    #[test]
    fn test_declares_in_place() {
        let op = ElementwiseAdd::new(Arc::new(NullKernel));
        assert_eq!(op.in_place(), Some(InPlace { input: 0, output: 0 }));
        assert_eq!(op.create_runner().unwrap().name(), "add");
    }
}
