// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The `Operation` abstraction.

use crate::{KernelError, Runner, ShapeError};
use std::fmt;
use std::sync::Arc;
use tensor_core::TensorDesc;

/// A unit of computation with fixed arity.
///
/// Implementations are either leaf operations backed by a kernel library or
/// graph operations that wrap a whole sub-plan. Both look the same to the
/// plan that contains them.
pub trait Operation: Send + Sync + fmt::Debug {
    /// Operation name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Number of input tensors the operation consumes.
    fn input_count(&self) -> usize;

    /// Number of output tensors the operation produces.
    fn output_count(&self) -> usize;

    /// Infers output descriptors from input descriptors.
    ///
    /// Must be pure: the same inputs always give the same outputs, and the
    /// result has exactly [`Operation::output_count`] entries.
    fn infer_shape(&self, inputs: &[TensorDesc]) -> Result<Vec<TensorDesc>, ShapeError>;

    /// Produces a fresh runner for one node instance of this operation.
    fn create_runner(&self) -> Result<Box<dyn Runner>, KernelError>;

    /// Declares that output `output` may reuse the storage of input `input`.
    ///
    /// The plan only honours the hint when the input is an internal tensor
    /// whose last use is this node and the output fits in its region.
    fn in_place(&self) -> Option<InPlace> {
        None
    }
}

/// Shared handle to an operation. Nodes and plans hold these.
pub type OperationRef = Arc<dyn Operation>;

/// An in-place aliasing hint: output index `output` may overwrite input
/// index `input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InPlace {
    pub input: usize,
    pub output: usize,
}

/// Checks the descriptor count against the operation's arity.
pub fn check_input_count(op: &dyn Operation, inputs: &[TensorDesc]) -> Result<(), ShapeError> {
    if inputs.len() != op.input_count() {
        return Err(ShapeError::InputCount {
            op: op.name().to_string(),
            expected: op.input_count(),
            actual: inputs.len(),
        });
    }
    Ok(())
}
