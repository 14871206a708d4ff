// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A whole graph used as a single operation inside another graph.

use crate::{Plan, PlanBuilder, PlanOptions, SessionStats, VariantPack};
use op_graph::{
    DispatchContext, KernelError, OpGraph, Operation, Runner, RunnerPack, RunnerSettings,
    ShapeError, Validated,
};
use std::sync::Arc;
use tensor_core::{DeviceBuffer, TensorDesc};

/// Wraps a validated graph so it can be a node of an outer graph.
///
/// Shape inference delegates to the inner graph (its override if present,
/// per-node propagation otherwise). Each node instance gets its own inner
/// plan; the inner workspace is carved from the outer node's scratch.
/// Inner plans take the options of the plan they are built into.
#[derive(Debug, Clone)]
pub struct GraphOperation {
    name: String,
    graph: Arc<OpGraph<Validated>>,
}

impl GraphOperation {
    pub fn new(graph: OpGraph<Validated>) -> Self {
        Self {
            name: graph.name().to_string(),
            graph: Arc::new(graph),
        }
    }

    pub fn graph(&self) -> &OpGraph<Validated> {
        &self.graph
    }
}

impl Operation for GraphOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_count(&self) -> usize {
        self.graph.space().inputs
    }

    fn output_count(&self) -> usize {
        self.graph.space().outputs
    }

    fn infer_shape(&self, inputs: &[TensorDesc]) -> Result<Vec<TensorDesc>, ShapeError> {
        self.graph.infer_shape(inputs)
    }

    /// The inner plan starts with default options until the outer plan
    /// configures the runner.
    fn create_runner(&self) -> Result<Box<dyn Runner>, KernelError> {
        let plan = PlanBuilder::build_detached(&self.graph, PlanOptions::default())
            .map_err(|e| KernelError::Unavailable(e.to_string()))?;
        Ok(Box::new(PlanRunner {
            plan,
            stats: SessionStats::new(),
        }))
    }
}

/// Runs an inner plan as one runner of the outer plan.
struct PlanRunner {
    plan: Plan,
    stats: SessionStats,
}

impl PlanRunner {
    fn variant_pack(pack: &RunnerPack) -> VariantPack {
        VariantPack::new(pack.in_tensors.clone(), pack.out_tensors.clone())
    }
}

impl Runner for PlanRunner {
    fn name(&self) -> &str {
        self.plan.name()
    }

    fn configure(&mut self, settings: &RunnerSettings) {
        self.plan.reconfigure(PlanOptions::from(*settings));
    }

    /// Sets up the inner plan; its workspace becomes this runner's scratch.
    fn setup(&mut self, pack: &RunnerPack) -> Result<usize, KernelError> {
        self.plan
            .setup_with(&self.stats, &Self::variant_pack(pack))
            .map_err(|e| KernelError::Setup(e.to_string()))
    }

    fn execute(&mut self, ctx: &DispatchContext, pack: &RunnerPack) -> Result<(), KernelError> {
        let workspace = pack.workspace.unwrap_or_else(|| DeviceBuffer::new(0, 0));
        let report = self
            .plan
            .execute_inline(&self.stats, ctx.stream, &Self::variant_pack(pack), workspace)
            .map_err(|e| KernelError::Launch(e.to_string()))?;
        tracing::trace!(plan = self.plan.name(), nodes = report.nodes_dispatched, "inner plan ran");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimKernel;
    use crate::{ExecutionContext, RuntimeConfig, RuntimeError};
    use op_graph::ops::{ElementwiseAdd, RmsNorm};
    use op_graph::GraphBuilder;
    use tensor_core::{DType, Shape, Tensor};

    fn desc(rows: usize) -> TensorDesc {
        TensorDesc::new(DType::F32, Shape::matrix(rows, 8))
    }

    /// add(x, y) -> t0; rms_norm(t0) -> out
    fn residual_norm(kernel: &SimKernel) -> OpGraph<Validated> {
        let k = Arc::new(kernel.clone());
        GraphBuilder::new("residual_norm")
            .inputs(2)
            .outputs(1)
            .internals(1)
            .node(Arc::new(ElementwiseAdd::new(k.clone())), [0, 1], [3])
            .node(Arc::new(RmsNorm::new(k)), [3], [2])
            .build()
            .unwrap()
    }

    /// Two 64-byte internals live at once: add(x, y) -> t0, t1; add(t0, t1) -> out
    fn two_branches(kernel: &SimKernel) -> OpGraph<Validated> {
        let add = Arc::new(ElementwiseAdd::new(Arc::new(kernel.clone())));
        GraphBuilder::new("two_branches")
            .inputs(2)
            .outputs(1)
            .internals(2)
            .node(add.clone(), [0, 1], [3])
            .node(add.clone(), [0, 1], [4])
            .node(add, [3, 4], [2])
            .build()
            .unwrap()
    }

    #[test]
    fn test_arity_and_shape_follow_graph() {
        let op = GraphOperation::new(residual_norm(&SimKernel::new()));
        assert_eq!(op.name(), "residual_norm");
        assert_eq!(op.input_count(), 2);
        assert_eq!(op.output_count(), 1);
        assert_eq!(op.infer_shape(&[desc(4), desc(4)]).unwrap(), vec![desc(4)]);
        assert!(op.infer_shape(&[desc(4)]).is_err());
    }

    #[test]
    fn test_nested_plan_runs_inner_nodes() {
        let kernel = SimKernel::new();
        let inner = Arc::new(GraphOperation::new(residual_norm(&kernel)));
        let outer = GraphBuilder::new("outer")
            .inputs(2)
            .outputs(1)
            .internals(1)
            .node(inner, [0, 1], [3])
            .node(Arc::new(RmsNorm::new(Arc::new(kernel.clone()))), [3], [2])
            .build()
            .unwrap();

        let ctx = ExecutionContext::new(RuntimeConfig::default()).unwrap();
        let pack = VariantPack::new(
            vec![
                Tensor::on_device(desc(4), DeviceBuffer::new(0x1000, 128)),
                Tensor::on_device(desc(4), DeviceBuffer::new(0x2000, 128)),
            ],
            vec![Tensor::on_device(desc(4), DeviceBuffer::new(0x3000, 128))],
        );
        let mut plan = PlanBuilder::build(&ctx, &pack, &outer).unwrap();
        let bytes = plan.setup(&ctx, &pack).unwrap();
        // Outer t0 (128) plus the inner plan's workspace as scratch (128).
        assert_eq!(bytes, 256);

        let ws = ctx.acquire_workspace(bytes).unwrap();
        plan.execute(&ctx, &pack, ws.device_buffer())
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(kernel.log().ops(), vec!["add", "rms_norm", "rms_norm"]);
    }

    #[test]
    fn test_inner_plan_uses_outer_alignment() {
        let kernel = SimKernel::new();
        let inner = GraphOperation::new(two_branches(&kernel));
        let outer = GraphBuilder::new("outer")
            .inputs(2)
            .outputs(1)
            .node(Arc::new(inner), [0, 1], [2])
            .build()
            .unwrap();
        let pack = VariantPack::new(
            vec![Tensor::unbound(desc(2)), Tensor::unbound(desc(2))],
            vec![Tensor::unbound(desc(2))],
        );

        // Each inner region is rounded up to the outer alignment.
        let workspace = |alignment: usize| {
            let config = RuntimeConfig {
                alignment,
                ..Default::default()
            };
            let ctx = ExecutionContext::new(config).unwrap();
            let mut plan = PlanBuilder::build(&ctx, &pack, &outer).unwrap();
            plan.setup(&ctx, &pack).unwrap()
        };
        assert_eq!(workspace(64), 128);
        assert_eq!(workspace(256), 512);
    }

    #[test]
    fn test_configure_reaches_doubly_nested_plans() {
        let kernel = SimKernel::new();
        let middle = GraphBuilder::new("middle")
            .inputs(2)
            .outputs(1)
            .node(Arc::new(GraphOperation::new(two_branches(&kernel))), [0, 1], [2])
            .build()
            .unwrap();
        let mut runner = GraphOperation::new(middle).create_runner().unwrap();
        runner.configure(&RunnerSettings {
            alignment: 512,
            workspace_limit: 1 << 20,
            memoize_shapes: true,
            enable_profiling: false,
        });

        let pack = RunnerPack {
            in_tensors: vec![Tensor::unbound(desc(2)), Tensor::unbound(desc(2))],
            out_tensors: vec![Tensor::unbound(desc(2))],
            workspace: None,
        };
        assert_eq!(runner.setup(&pack).unwrap(), 1024);
    }

    #[test]
    fn test_inner_failure_surfaces_as_execution_error() {
        let kernel = SimKernel::new().failing("add");
        let inner = Arc::new(GraphOperation::new(residual_norm(&kernel)));
        let outer = GraphBuilder::new("outer")
            .inputs(2)
            .outputs(1)
            .node(inner, [0, 1], [2])
            .build()
            .unwrap();

        let ctx = ExecutionContext::new(RuntimeConfig::default()).unwrap();
        let pack = VariantPack::new(
            vec![
                Tensor::on_device(desc(2), DeviceBuffer::new(0x1000, 64)),
                Tensor::on_device(desc(2), DeviceBuffer::new(0x2000, 64)),
            ],
            vec![Tensor::on_device(desc(2), DeviceBuffer::new(0x3000, 64))],
        );
        let mut plan = PlanBuilder::build(&ctx, &pack, &outer).unwrap();
        let bytes = plan.setup(&ctx, &pack).unwrap();
        let err = plan
            .execute(&ctx, &pack, DeviceBuffer::new(0x8000, bytes))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Execution { node: 0, .. }));
    }
}
