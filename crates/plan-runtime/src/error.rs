// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for plan building, setup and execution.

use memory_manager::MemoryError;
use op_graph::{GraphError, KernelError, ShapeError};
use std::fmt;

/// Errors raised while building, setting up or executing a plan.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    /// The graph wiring is invalid.
    #[error("graph construction failed: {0}")]
    Graph(#[from] GraphError),

    /// The variant pack does not match the graph's declared counts.
    #[error(
        "variant pack for '{graph}' has {actual_inputs} inputs / {actual_outputs} outputs, \
         graph declares {expected_inputs} / {expected_outputs}"
    )]
    Arity {
        graph: String,
        expected_inputs: usize,
        actual_inputs: usize,
        expected_outputs: usize,
        actual_outputs: usize,
    },

    /// Shape inference failed at a node.
    #[error("shape inference failed at node {node} ('{op}'): {source}")]
    Shape {
        node: usize,
        op: String,
        #[source]
        source: ShapeError,
    },

    /// A pack descriptor is malformed before any node sees it.
    #[error("variant pack {slot}: {source}")]
    PackShape {
        slot: String,
        #[source]
        source: ShapeError,
    },

    /// The planned workspace exceeds the configured limit.
    #[error("workspace of {required} bytes exceeds the limit of {limit} bytes")]
    Resource { required: usize, limit: usize },

    /// A tensor or workspace size does not fit in `usize`.
    #[error("size of {what} overflows usize")]
    SizeOverflow { what: String },

    /// The workspace pool refused a request, or arena planning failed.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    /// A caller-supplied buffer is too small for its tensor.
    #[error("{what} buffer holds {actual} bytes, {required} required")]
    BufferTooSmall {
        what: String,
        required: usize,
        actual: usize,
    },

    /// An operation was called in the wrong plan state.
    #[error("invalid plan state: {0}")]
    State(String),

    /// An operation could not produce a runner.
    #[error("failed to create runner for node {node} ('{op}'): {source}")]
    RunnerCreation {
        node: usize,
        op: String,
        #[source]
        source: KernelError,
    },

    /// A runner rejected its bound tensors during setup.
    #[error("runner setup failed at node {node} ('{op}'): {source}")]
    RunnerSetup {
        node: usize,
        op: String,
        #[source]
        source: KernelError,
    },

    /// A runner failed to launch.
    #[error("execution failed at node {node} ('{op}'): {source}")]
    Execution {
        node: usize,
        op: String,
        #[source]
        source: KernelError,
    },

    /// The queued dispatcher is gone or could not be started.
    #[error("dispatcher unavailable: {0}")]
    Dispatch(String),

    /// A host tensor binder targets a slot outside the pack.
    #[error("binder '{binder}' targets input slot {slot}, but the pack has {inputs} inputs")]
    BinderMismatch {
        binder: String,
        slot: usize,
        inputs: usize,
    },

    /// Invalid configuration or parameter blob.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse error category, for callers that branch on the class of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    GraphConstruction,
    Arity,
    Shape,
    Resource,
    State,
    Execution,
    Config,
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::Graph(_) => ErrorKind::GraphConstruction,
            RuntimeError::Arity { .. } | RuntimeError::BinderMismatch { .. } => ErrorKind::Arity,
            RuntimeError::Shape { .. } | RuntimeError::PackShape { .. } => ErrorKind::Shape,
            RuntimeError::Memory(MemoryError::InvalidBudget { .. }) => ErrorKind::Config,
            RuntimeError::Resource { .. }
            | RuntimeError::SizeOverflow { .. }
            | RuntimeError::Memory(_)
            | RuntimeError::BufferTooSmall { .. } => ErrorKind::Resource,
            RuntimeError::State(_) => ErrorKind::State,
            RuntimeError::RunnerCreation { .. }
            | RuntimeError::RunnerSetup { .. }
            | RuntimeError::Execution { .. }
            | RuntimeError::Dispatch(_) => ErrorKind::Execution,
            RuntimeError::Config(_) => ErrorKind::Config,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::GraphConstruction => "graph-construction",
            ErrorKind::Arity => "arity",
            ErrorKind::Shape => "shape",
            ErrorKind::Resource => "resource",
            ErrorKind::State => "state",
            ErrorKind::Execution => "execution",
            ErrorKind::Config => "config",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let e = RuntimeError::Graph(GraphError::EmptyGraph { graph: "g".into() });
        assert_eq!(e.kind(), ErrorKind::GraphConstruction);

        let e = RuntimeError::Memory(MemoryError::ZeroSizedAllocation);
        assert_eq!(e.kind(), ErrorKind::Resource);

        let e = RuntimeError::SizeOverflow {
            what: "input 0".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Resource);
        assert_eq!(e.to_string(), "size of input 0 overflows usize");

        let e = RuntimeError::Memory(MemoryError::InvalidBudget {
            input: "x".into(),
            reason: "bad".into(),
        });
        assert_eq!(e.kind(), ErrorKind::Config);

        let e = RuntimeError::Execution {
            node: 2,
            op: "add".into(),
            source: KernelError::Launch("boom".into()),
        };
        assert_eq!(e.kind(), ErrorKind::Execution);
        assert_eq!(e.to_string(), "execution failed at node 2 ('add'): kernel launch failed: boom");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::GraphConstruction.to_string(), "graph-construction");
    }
}
