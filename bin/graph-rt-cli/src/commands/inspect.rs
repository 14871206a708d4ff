// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `graph-rt inspect` command: show a template's graph, shapes and layout.

use crate::template::GraphTemplate;
use op_graph::ops::NullKernel;
use op_graph::TensorId;
use plan_runtime::{ExecutionContext, PlanBuilder, RuntimeConfig, VariantPack};
use std::path::Path;
use std::sync::Arc;
use tensor_core::Tensor;

pub fn execute(graph_path: &Path, config: RuntimeConfig) -> anyhow::Result<()> {
    super::banner("inspect");

    let template = GraphTemplate::from_file(graph_path)?;
    let graph = template.build(Arc::new(NullKernel))?;
    let inputs = template.input_descs()?;
    tracing::debug!(template = %graph_path.display(), nodes = graph.num_nodes(), "template loaded");

    println!("{}", graph.summary());
    println!();
    print!("{graph}");
    println!();

    // ── Shapes ─────────────────────────────────────────────────────
    println!("Tensor shapes:");
    let table = graph.propagate_shapes(&inputs)?;
    let space = graph.space();
    for (id, desc) in table.iter().enumerate() {
        let label = match space.resolve(TensorId(id)) {
            Some(op_graph::TensorRef::Input(i)) => template.input_label(i),
            Some(r) => r.to_string(),
            None => TensorId(id).to_string(),
        };
        match desc {
            Some(d) => println!("  {label:<20} {d}"),
            None => println!("  {label:<20} (never written)"),
        }
    }
    println!();

    // ── Plan ───────────────────────────────────────────────────────
    let outputs = graph.infer_shape(&inputs)?;
    let pack = VariantPack::new(
        inputs.into_iter().map(Tensor::unbound).collect(),
        outputs.into_iter().map(Tensor::unbound).collect(),
    );
    let ctx = ExecutionContext::new(config)?;
    let mut plan = PlanBuilder::build(&ctx, &pack, &graph)?;
    let bytes = plan.setup(&ctx, &pack)?;

    print!("{}", plan.summary());
    println!();
    println!(
        "Workspace: {bytes} bytes (limit {})",
        ctx.workspace_limit()
    );
    Ok(())
}
