// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `graph-rt run` command: drive a template through repeated steps on the
//! simulated kernel.
//!
//! Every step hands the plan fresh device addresses, as a caller recycling
//! buffers would, and re-binds the host tensors from the template's
//! parameter blob.

use crate::template::GraphTemplate;
use plan_runtime::sim::SimKernel;
use plan_runtime::{
    bind_host_tensors, DispatchMode, ExecutionContext, PlanBuilder, RuntimeConfig, VariantPack,
};
use std::path::Path;
use std::sync::Arc;
use tensor_core::{DeviceBuffer, Tensor, TensorDesc};

/// Address stride between consecutive steps.
const STEP_STRIDE: u64 = 0x1000_0000;

pub struct RunArgs<'a> {
    pub graph: &'a Path,
    pub steps: usize,
    pub workspace_limit: Option<String>,
    pub queued: bool,
}

pub fn execute(args: RunArgs<'_>, mut config: RuntimeConfig) -> anyhow::Result<()> {
    super::banner("run");

    if let Some(limit) = args.workspace_limit {
        config.workspace_limit = limit;
    }
    if args.queued {
        config.dispatch = DispatchMode::Queued;
    }

    let template = GraphTemplate::from_file(args.graph)?;
    let kernel = SimKernel::new();
    let graph = template.build(Arc::new(kernel.clone()))?;
    let inputs = template.input_descs()?;
    let outputs = graph.infer_shape(&inputs)?;
    let mut binders = template.binders();
    tracing::info!(
        template = %args.graph.display(),
        steps = args.steps,
        binders = binders.len(),
        "template loaded"
    );

    let ctx = ExecutionContext::new(config)?;
    println!("Graph:    {}", graph.summary());
    println!(
        "Dispatch: {:?}, workspace limit {}",
        ctx.config().dispatch,
        ctx.workspace_limit()
    );
    println!();

    let mut plan = PlanBuilder::build(&ctx, &step_pack(&inputs, &outputs, 0), &graph)?;

    // ── Steps ──────────────────────────────────────────────────────
    for step in 0..args.steps {
        let mut pack = step_pack(&inputs, &outputs, step).with_param(template.param.clone());
        bind_host_tensors(&mut binders, &mut pack)?;

        let bytes = plan.setup(&ctx, &pack)?;
        let workspace = ctx.acquire_workspace(bytes)?;
        let report = plan
            .execute(&ctx, &pack, workspace.device_buffer())?
            .wait()?;
        println!("step {step}: {}", report.summary());
    }
    println!();

    // ── Summary ────────────────────────────────────────────────────
    println!("{}", ctx.stats().snapshot().summary());
    println!("{}", ctx.pool().stats().summary());
    println!("Kernel launches: {}", kernel.log().len());
    Ok(())
}

fn step_pack(inputs: &[TensorDesc], outputs: &[TensorDesc], step: usize) -> VariantPack {
    let mut next = STEP_STRIDE * (step as u64 + 1);
    let mut bind = |desc: &TensorDesc| {
        let size = desc.size_bytes();
        let buffer = DeviceBuffer::new(next, size);
        next += (size as u64).max(1).next_multiple_of(256);
        Tensor::on_device(desc.clone(), buffer)
    };
    let in_tensors = inputs.iter().map(&mut bind).collect();
    let out_tensors = outputs.iter().map(&mut bind).collect();
    VariantPack::new(in_tensors, out_tensors)
}
