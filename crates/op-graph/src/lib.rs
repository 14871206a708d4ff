// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # op-graph
//!
//! The dataflow model a plan is compiled from.
//!
//! - [`Operation`]: an arity-fixed unit of computation with a pure shape
//!   inference function and the ability to produce a [`Runner`].
//! - [`Runner`]: the dispatchable object an operation hands to the plan;
//!   the only boundary the engine has with kernel libraries.
//! - [`TensorSpace`] / [`TensorRef`]: the three contiguous tensor-ID regions
//!   (graph inputs, graph outputs, internal tensors) and the explicit
//!   discriminant an ID resolves to.
//! - [`OpGraph`]: an ordered node list with a **type-state pattern**
//!   (`Declared` → `Validated`); only validated graphs can be compiled.
//! - [`GraphBuilder`]: the wiring API model authors use.
//! - [`ops`]: reference leaf operations backed by a [`KernelFactory`].
//!
//! # Example
//! ```
//! use op_graph::{GraphBuilder, OpGraph, Validated, ops::{ElementwiseAdd, NullKernel}};
//! use std::sync::Arc;
//!
//! let kernel = Arc::new(NullKernel);
//! let graph: OpGraph<Validated> = GraphBuilder::new("residual")
//!     .inputs(2)
//!     .outputs(1)
//!     .node(Arc::new(ElementwiseAdd::new(kernel)), [0, 1], [2])
//!     .build()
//!     .unwrap();
//! assert_eq!(graph.num_nodes(), 1);
//! ```

mod builder;
mod error;
pub mod graph;
mod operation;
pub mod ops;
mod runner;
mod tensor_id;

pub use builder::GraphBuilder;
pub use error::{GraphError, KernelError, ShapeError};
pub use graph::{Declared, GraphShapeFn, GraphState, Node, OpGraph, ReshapeFn, Validated};
pub use operation::{check_input_count, InPlace, Operation, OperationRef};
pub use runner::{DispatchContext, KernelFactory, Runner, RunnerPack, RunnerSettings, StreamId};
pub use tensor_id::{TensorId, TensorRef, TensorSpace};
