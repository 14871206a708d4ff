// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # plan-runtime
//!
//! Compiles validated operation graphs into executable plans and runs them.
//!
//! The runtime takes:
//! - An `OpGraph<Validated>` from `op-graph`.
//! - A [`VariantPack`] naming the caller's input and output tensors.
//! - An [`ExecutionContext`] carrying configuration, stream, workspace pool
//!   and, in queued mode, the dispatcher thread.
//!
//! # Lifecycle
//! ```text
//! PlanBuilder::build ──► Plan (unconfigured)
//!                          │ setup(pack)      infer shapes, set up runners,
//!                          ▼                  lay out workspace
//!                        Plan (configured) ──► workspace size
//!                          │ execute(pack, workspace)
//!                          ▼
//!                        Completion ──► ExecReport
//! ```
//! A second Setup with unchanged input descriptors reuses the previous
//! inference and layout.
//!
//! # Workspace
//! Internal tensors share one workspace. A tensor's region is freed after
//! the last node that touches it, so tensors with disjoint lifetimes share
//! bytes. Operations may also declare an output in-place with an input
//! that dies at the same node. Runner scratch follows the tensor arena.
//!
//! # Example
//! ```
//! use op_graph::{GraphBuilder, ops::ElementwiseAdd};
//! use plan_runtime::{sim::SimKernel, ExecutionContext, PlanBuilder, RuntimeConfig, VariantPack};
//! use std::sync::Arc;
//! use tensor_core::{DType, DeviceBuffer, Shape, Tensor, TensorDesc};
//!
//! let kernel = SimKernel::new();
//! let graph = GraphBuilder::new("residual")
//!     .inputs(2)
//!     .outputs(1)
//!     .node(Arc::new(ElementwiseAdd::new(Arc::new(kernel.clone()))), [0, 1], [2])
//!     .build()
//!     .unwrap();
//!
//! let desc = TensorDesc::new(DType::F32, Shape::matrix(4, 8));
//! let pack = VariantPack::new(
//!     vec![
//!         Tensor::on_device(desc.clone(), DeviceBuffer::new(0x1000, 128)),
//!         Tensor::on_device(desc.clone(), DeviceBuffer::new(0x2000, 128)),
//!     ],
//!     vec![Tensor::on_device(desc, DeviceBuffer::new(0x3000, 128))],
//! );
//!
//! let ctx = ExecutionContext::new(RuntimeConfig::default()).unwrap();
//! let mut plan = PlanBuilder::build(&ctx, &pack, &graph).unwrap();
//! let bytes = plan.setup(&ctx, &pack).unwrap();
//! let workspace = ctx.acquire_workspace(bytes).unwrap();
//! let report = plan
//!     .execute(&ctx, &pack, workspace.device_buffer())
//!     .unwrap()
//!     .wait()
//!     .unwrap();
//! assert_eq!(report.nodes_dispatched, 1);
//! ```

mod binder;
mod builder;
mod config;
mod context;
mod dispatch;
mod error;
mod graph_op;
mod layout;
mod lifetimes;
mod metrics;
mod pack;
mod plan;
pub mod sim;

pub use binder::{
    bind_host_tensors, DecoderStepBinder, FieldBinder, FieldKind, FieldSpec, HostTensorBinder,
};
pub use builder::{PlanBuilder, PlanOptions};
pub use config::{DispatchMode, RuntimeConfig};
pub use context::{ExecutionContext, Workspace};
pub use dispatch::{Completion, Dispatcher, SharedRunner};
pub use error::{ErrorKind, RuntimeError};
pub use graph_op::GraphOperation;
pub use layout::{InPlaceReuse, WorkspaceLayout};
pub use lifetimes::TensorLifetimes;
pub use metrics::{ExecReport, NodeTiming, SessionStats, StatsSnapshot};
pub use pack::VariantPack;
pub use plan::{Plan, PlanState};
