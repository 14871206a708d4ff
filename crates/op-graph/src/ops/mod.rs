// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference leaf operations.
//!
//! Each operation owns its shape rule and delegates runner creation to a
//! [`KernelFactory`], so the same graph can be compiled against a real
//! kernel library or a simulated one.

mod add;
mod linear;
mod rms_norm;

pub use add::ElementwiseAdd;
pub use linear::Linear;
pub use rms_norm::RmsNorm;

use crate::{DispatchContext, KernelError, KernelFactory, Runner, RunnerPack, ShapeError};
use tensor_core::TensorDesc;

/// A kernel library whose runners need no scratch and launch nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullKernel;

impl KernelFactory for NullKernel {
    fn create_runner(&self, op_name: &str) -> Result<Box<dyn Runner>, KernelError> {
        Ok(Box::new(NullRunner {
            name: op_name.to_string(),
        }))
    }
}

#[derive(Debug)]
struct NullRunner {
    name: String,
}

impl Runner for NullRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, _pack: &RunnerPack) -> Result<usize, KernelError> {
        Ok(0)
    }

    fn execute(&mut self, _ctx: &DispatchContext, _pack: &RunnerPack) -> Result<(), KernelError> {
        Ok(())
    }
}

fn same_dtype(op: &str, lhs: &TensorDesc, rhs: &TensorDesc) -> Result<(), ShapeError> {
    if lhs.dtype != rhs.dtype {
        return Err(ShapeError::DTypeMismatch {
            op: op.to_string(),
            lhs: lhs.dtype,
            rhs: rhs.dtype,
        });
    }
    Ok(())
}
