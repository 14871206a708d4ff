// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Compiling a validated graph into a [`Plan`].

use crate::plan::{Plan, PlanNode};
use crate::{ExecutionContext, RuntimeConfig, RuntimeError, TensorLifetimes, VariantPack};
use memory_manager::MemoryBudget;
use op_graph::{GraphError, OpGraph, RunnerSettings, TensorId, TensorRef, Validated};
use std::sync::{Arc, Mutex};

/// Plan-level settings, normally derived from a [`RuntimeConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    /// Alignment of every workspace region.
    pub alignment: usize,
    /// Largest workspace Setup may plan, in bytes.
    pub workspace_limit: usize,
    /// Skip inference when input descriptors match the previous Setup.
    pub memoize_shapes: bool,
    /// Record per-node timings during Execute.
    pub enable_profiling: bool,
}

impl PlanOptions {
    pub fn from_config(config: &RuntimeConfig, limit: MemoryBudget) -> Self {
        Self {
            alignment: config.alignment,
            workspace_limit: limit.as_bytes(),
            memoize_shapes: config.memoize_shapes,
            enable_profiling: config.enable_profiling,
        }
    }
}

impl From<PlanOptions> for RunnerSettings {
    fn from(o: PlanOptions) -> Self {
        Self {
            alignment: o.alignment,
            workspace_limit: o.workspace_limit,
            memoize_shapes: o.memoize_shapes,
            enable_profiling: o.enable_profiling,
        }
    }
}

impl From<RunnerSettings> for PlanOptions {
    fn from(s: RunnerSettings) -> Self {
        Self {
            alignment: s.alignment,
            workspace_limit: s.workspace_limit,
            memoize_shapes: s.memoize_shapes,
            enable_profiling: s.enable_profiling,
        }
    }
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            alignment: 64,
            workspace_limit: MemoryBudget::from_gb(2).as_bytes(),
            memoize_shapes: true,
            enable_profiling: false,
        }
    }
}

/// Builds plans from validated graphs.
pub struct PlanBuilder;

impl PlanBuilder {
    /// Compiles `graph` for the tensors in `pack`.
    ///
    /// The pack must carry exactly as many inputs and outputs as the graph
    /// declares. Slot descriptors are copied from it; buffers are not kept.
    /// One runner is created per node, in node order, and configured with
    /// the context's plan options.
    ///
    /// # Errors
    /// - [`RuntimeError::Arity`] if the pack does not match the graph.
    /// - [`RuntimeError::PackShape`] if a pack descriptor exceeds
    ///   [`tensor_core::MAX_RANK`].
    /// - [`RuntimeError::SizeOverflow`] if a pack tensor's byte size
    ///   overflows `usize`.
    /// - [`RuntimeError::RunnerCreation`] if an operation cannot provide a
    ///   runner.
    pub fn build(
        ctx: &ExecutionContext,
        pack: &VariantPack,
        graph: &OpGraph<Validated>,
    ) -> Result<Plan, RuntimeError> {
        let space = graph.space();
        if pack.in_tensors.len() != space.inputs || pack.out_tensors.len() != space.outputs {
            tracing::error!(
                graph = graph.name(),
                expected_inputs = space.inputs,
                actual_inputs = pack.in_tensors.len(),
                expected_outputs = space.outputs,
                actual_outputs = pack.out_tensors.len(),
                "variant pack does not match graph"
            );
            return Err(RuntimeError::Arity {
                graph: graph.name().to_string(),
                expected_inputs: space.inputs,
                actual_inputs: pack.in_tensors.len(),
                expected_outputs: space.outputs,
                actual_outputs: pack.out_tensors.len(),
            });
        }

        pack.check_descs()?;
        let mut plan = Self::compile(graph, ctx.plan_options())?;
        plan.copy_slot_descs(pack);
        Ok(plan)
    }

    /// Compiles `graph` without a variant pack.
    ///
    /// Slot descriptors stay placeholders until the first Setup. Used for
    /// graphs nested inside another graph.
    pub fn build_detached(
        graph: &OpGraph<Validated>,
        options: PlanOptions,
    ) -> Result<Plan, RuntimeError> {
        Self::compile(graph, options)
    }

    fn compile(graph: &OpGraph<Validated>, options: PlanOptions) -> Result<Plan, RuntimeError> {
        let space = graph.space();
        let resolve = |node: usize, ids: &[TensorId]| -> Result<Vec<TensorRef>, RuntimeError> {
            ids.iter()
                .map(|&id| {
                    graph.resolve(id).ok_or_else(|| {
                        RuntimeError::from(GraphError::TensorIdOutOfRange {
                            graph: graph.name().to_string(),
                            node,
                            id: id.0,
                            total: space.total(),
                        })
                    })
                })
                .collect()
        };

        let settings = RunnerSettings::from(options);
        let mut nodes = Vec::with_capacity(graph.num_nodes());
        for (idx, node) in graph.nodes().iter().enumerate() {
            let inputs = resolve(idx, &node.inputs)?;
            let outputs = resolve(idx, &node.outputs)?;
            let mut runner = node
                .op
                .create_runner()
                .map_err(|source| RuntimeError::RunnerCreation {
                    node: idx,
                    op: node.op.name().to_string(),
                    source,
                })?;
            runner.configure(&settings);
            tracing::debug!(node = idx, op = node.op.name(), runner = runner.name(), "runner created");
            nodes.push(PlanNode {
                node: node.clone(),
                inputs,
                outputs,
                runner: Arc::new(Mutex::new(runner)),
                scratch: 0,
            });
        }

        let lifetimes = TensorLifetimes::compute(
            space.internals,
            nodes
                .iter()
                .map(|n| (n.inputs.as_slice(), n.outputs.as_slice())),
        );

        let plan = Plan::new(graph.name(), options, space, nodes, lifetimes);
        tracing::info!(plan = graph.name(), nodes = plan.num_nodes(), space = %space, "plan built");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, PlanState};
    use op_graph::ops::{ElementwiseAdd, NullKernel};
    use op_graph::{GraphBuilder, KernelError, KernelFactory, Runner};
    use tensor_core::{DType, Shape, Tensor, TensorDesc};

    fn desc() -> TensorDesc {
        TensorDesc::new(DType::F32, Shape::matrix(2, 4))
    }

    fn two_adds() -> OpGraph<Validated> {
        let add = Arc::new(ElementwiseAdd::new(Arc::new(NullKernel)));
        GraphBuilder::new("adds")
            .inputs(2)
            .outputs(1)
            .internals(1)
            .node(add.clone(), [0, 1], [3])
            .node(add, [3, 1], [2])
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_creates_one_runner_per_node() {
        let ctx = ExecutionContext::new(RuntimeConfig::default()).unwrap();
        let pack = VariantPack::new(
            vec![Tensor::unbound(desc()), Tensor::unbound(desc())],
            vec![Tensor::unbound(desc())],
        );
        let plan = PlanBuilder::build(&ctx, &pack, &two_adds()).unwrap();
        assert_eq!(plan.num_nodes(), 2);
        assert_eq!(plan.state(), PlanState::Unconfigured);
        assert_eq!(plan.in_slots().len(), 2);
        assert_eq!(plan.out_slots().len(), 1);
        assert_eq!(plan.internal_slots().len(), 1);
        assert_eq!(plan.in_slots()[0].desc, desc());
        assert!(!plan.in_slots()[0].has_data());
    }

    #[test]
    fn test_build_rejects_rank_above_max() {
        let ctx = ExecutionContext::new(RuntimeConfig::default()).unwrap();
        let deep = TensorDesc::new(DType::F32, Shape::new(vec![1; tensor_core::MAX_RANK + 1]));
        let pack = VariantPack::new(
            vec![Tensor::unbound(deep), Tensor::unbound(desc())],
            vec![Tensor::unbound(desc())],
        );
        let err = PlanBuilder::build(&ctx, &pack, &two_adds()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Shape);
        assert_eq!(err.to_string(), "variant pack input 0: rank 9 exceeds the maximum of 8");
    }

    #[test]
    fn test_build_rejects_pack_arity() {
        let ctx = ExecutionContext::new(RuntimeConfig::default()).unwrap();
        let pack = VariantPack::new(vec![Tensor::unbound(desc())], vec![Tensor::unbound(desc())]);
        let err = PlanBuilder::build(&ctx, &pack, &two_adds()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Arity);
    }

    #[derive(Debug)]
    struct NoKernels;

    impl KernelFactory for NoKernels {
        fn create_runner(&self, op_name: &str) -> Result<Box<dyn Runner>, KernelError> {
            Err(KernelError::Unavailable(op_name.to_string()))
        }
    }

    #[test]
    fn test_build_reports_runner_creation() {
        let add = Arc::new(ElementwiseAdd::new(Arc::new(NoKernels)));
        let graph = GraphBuilder::new("g")
            .inputs(2)
            .outputs(1)
            .node(add, [0, 1], [2])
            .build()
            .unwrap();
        let err = PlanBuilder::build_detached(&graph, PlanOptions::default()).unwrap_err();
        assert!(matches!(err, RuntimeError::RunnerCreation { node: 0, .. }));
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_options_from_config() {
        let config = RuntimeConfig {
            alignment: 256,
            memoize_shapes: false,
            ..Default::default()
        };
        let opts = PlanOptions::from_config(&config, MemoryBudget::from_mb(1));
        assert_eq!(opts.alignment, 256);
        assert_eq!(opts.workspace_limit, 1024 * 1024);
        assert!(!opts.memoize_shapes);
        assert!(opts.enable_profiling);
    }
}
