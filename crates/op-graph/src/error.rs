// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph construction, shape inference and kernels.

use std::time::Duration;
use tensor_core::{DType, Shape};

/// Wiring errors detected while constructing or validating a graph.
///
/// These are raised at model-initialisation time and are never expected in
/// steady-state execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The graph has no nodes.
    #[error("graph '{graph}' contains no nodes")]
    EmptyGraph { graph: String },

    /// A node references an ID outside the declared tensor space.
    #[error("graph '{graph}' node {node}: tensor id {id} is out of range (total {total})")]
    TensorIdOutOfRange {
        graph: String,
        node: usize,
        id: usize,
        total: usize,
    },

    /// A node's wiring disagrees with its operation's declared arity.
    #[error("graph '{graph}' node {node} ('{op}'): expected {expected} {side} tensors, got {actual}")]
    ArityMismatch {
        graph: String,
        node: usize,
        op: String,
        side: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A node writes into a graph input.
    #[error("graph '{graph}' node {node}: writes graph input {id}")]
    WritesGraphInput { graph: String, node: usize, id: usize },

    /// A node reads an internal tensor no earlier node produces.
    #[error("graph '{graph}' node {node}: reads internal tensor {id} before any node writes it")]
    DanglingTensor { graph: String, node: usize, id: usize },
}

/// Shape-inference failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    /// Wrong number of input descriptors.
    #[error("{op}: expected {expected} input descriptors, got {actual}")]
    InputCount {
        op: String,
        expected: usize,
        actual: usize,
    },

    /// An input has an unsupported rank.
    #[error("{op}: input {input} has rank {actual}, expected {expected}")]
    RankMismatch {
        op: String,
        input: usize,
        expected: String,
        actual: usize,
    },

    /// A descriptor has more dimensions than [`tensor_core::MAX_RANK`].
    #[error("rank {rank} exceeds the maximum of {max}")]
    RankTooLarge { rank: usize, max: usize },

    /// Two dimensions that must agree do not.
    #[error("{op}: dimension mismatch {lhs} vs {rhs}")]
    DimMismatch { op: String, lhs: Shape, rhs: Shape },

    /// Two inputs that must share an element type do not.
    #[error("{op}: dtype mismatch {lhs} vs {rhs}")]
    DTypeMismatch { op: String, lhs: DType, rhs: DType },

    /// Two shapes cannot be broadcast together.
    #[error("{op}: shapes {lhs} and {rhs} are not broadcastable")]
    NotBroadcastable { op: String, lhs: Shape, rhs: Shape },

    /// A reshape function changed the element count.
    #[error("reshape of input {input} changes element count: {from} -> {to}")]
    ReshapeElementCount { input: usize, from: Shape, to: Shape },

    /// The operation returned the wrong number of output descriptors.
    #[error("{op}: produced {actual} output descriptors, declared {expected}")]
    OutputCount {
        op: String,
        expected: usize,
        actual: usize,
    },

    /// Shape inference failed inside a sub-graph node.
    #[error("node {node} ('{op}'): {source}")]
    InNode {
        node: usize,
        op: String,
        #[source]
        source: Box<ShapeError>,
    },

    /// The input combination is not supported for another reason.
    #[error("{op}: {detail}")]
    Unsupported { op: String, detail: String },
}

/// Failures reported across the kernel boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// The kernel library has no implementation for the operation.
    #[error("no kernel available for operation '{0}'")]
    Unavailable(String),

    /// Kernel-side setup rejected the bound tensors.
    #[error("kernel setup failed: {0}")]
    Setup(String),

    /// The dispatch call failed.
    #[error("kernel launch failed: {0}")]
    Launch(String),

    /// The accelerator runtime reported a timeout.
    #[error("kernel timed out after {0:?}")]
    Timeout(Duration),
}
