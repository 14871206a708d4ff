// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The executable plan.
//!
//! A plan moves between two states:
//!
//! ```text
//!              setup ok                 execute
//! Unconfigured ────────► Configured ───────────► Configured
//!      ▲                     │
//!      └──── setup failed ───┘
//! ```
//!
//! Setup binds the pack, infers every tensor descriptor, sets up the
//! runners and lays out the workspace. When the input descriptors equal the
//! previous Setup's, the earlier result is reused. Execute binds the
//! workspace and launches each node in order.

use crate::dispatch::{run_pass, Completion, Launch, SharedRunner};
use crate::layout::{plan_workspace, NodeWiring};
use crate::{
    ExecReport, ExecutionContext, PlanOptions, RuntimeError, SessionStats, TensorLifetimes,
    VariantPack, WorkspaceLayout,
};
use op_graph::{
    DispatchContext, Node, RunnerPack, RunnerSettings, ShapeError, StreamId, TensorRef, TensorSpace,
};
use std::fmt;
use tensor_core::{DType, DeviceBuffer, Shape, Tensor, TensorDesc};

/// Lifecycle state of a [`Plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    /// Built, or last Setup failed. Execute is refused.
    Unconfigured,
    /// Descriptors inferred and workspace laid out.
    Configured,
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanState::Unconfigured => f.write_str("unconfigured"),
            PlanState::Configured => f.write_str("configured"),
        }
    }
}

pub(crate) struct PlanNode {
    pub node: Node,
    pub inputs: Vec<TensorRef>,
    pub outputs: Vec<TensorRef>,
    pub runner: SharedRunner,
    /// Scratch bytes requested by the runner at the last Setup.
    pub scratch: usize,
}

#[derive(Debug, Clone)]
struct Slots {
    inputs: Vec<Tensor>,
    outputs: Vec<Tensor>,
    internals: Vec<Tensor>,
}

impl Slots {
    fn new(space: TensorSpace) -> Self {
        let placeholder = || Tensor::unbound(TensorDesc::new(DType::F32, Shape::scalar()));
        Self {
            inputs: (0..space.inputs).map(|_| placeholder()).collect(),
            outputs: (0..space.outputs).map(|_| placeholder()).collect(),
            internals: (0..space.internals).map(|_| placeholder()).collect(),
        }
    }

    fn get(&self, r: TensorRef) -> &Tensor {
        match r {
            TensorRef::Input(i) => &self.inputs[i],
            TensorRef::Output(i) => &self.outputs[i],
            TensorRef::Internal(i) => &self.internals[i],
        }
    }

    fn get_mut(&mut self, r: TensorRef) -> &mut Tensor {
        match r {
            TensorRef::Input(i) => &mut self.inputs[i],
            TensorRef::Output(i) => &mut self.outputs[i],
            TensorRef::Internal(i) => &mut self.internals[i],
        }
    }
}

/// A compiled graph, ready for Setup and Execute.
///
/// Owns one runner per node and a copy of every slot descriptor. It holds
/// caller buffers only for the duration of a Setup or Execute call.
pub struct Plan {
    name: String,
    options: PlanOptions,
    nodes: Vec<PlanNode>,
    slots: Slots,
    lifetimes: TensorLifetimes,
    state: PlanState,
    layout: Option<WorkspaceLayout>,
    /// Input descriptors of the last successful Setup.
    signature: Option<Vec<TensorDesc>>,
}

impl Plan {
    pub(crate) fn new(
        name: &str,
        options: PlanOptions,
        space: TensorSpace,
        nodes: Vec<PlanNode>,
        lifetimes: TensorLifetimes,
    ) -> Self {
        Self {
            name: name.to_string(),
            options,
            nodes,
            slots: Slots::new(space),
            lifetimes,
            state: PlanState::Unconfigured,
            layout: None,
            signature: None,
        }
    }

    pub(crate) fn copy_slot_descs(&mut self, pack: &VariantPack) {
        for (slot, t) in self.slots.inputs.iter_mut().zip(&pack.in_tensors) {
            *slot = Tensor::unbound(t.desc.clone());
        }
        for (slot, t) in self.slots.outputs.iter_mut().zip(&pack.out_tensors) {
            *slot = Tensor::unbound(t.desc.clone());
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    pub fn options(&self) -> &PlanOptions {
        &self.options
    }

    /// Replaces the plan options and passes them on to every runner. The
    /// plan must be set up again afterwards.
    pub(crate) fn reconfigure(&mut self, options: PlanOptions) {
        self.options = options;
        self.state = PlanState::Unconfigured;
        self.layout = None;
        self.signature = None;
        let settings = RunnerSettings::from(options);
        for node in &self.nodes {
            // A poisoned runner is reported by the next Setup.
            if let Ok(mut runner) = node.runner.lock() {
                runner.configure(&settings);
            }
        }
    }

    pub fn in_slots(&self) -> &[Tensor] {
        &self.slots.inputs
    }

    pub fn out_slots(&self) -> &[Tensor] {
        &self.slots.outputs
    }

    pub fn internal_slots(&self) -> &[Tensor] {
        &self.slots.internals
    }

    pub fn lifetimes(&self) -> &TensorLifetimes {
        &self.lifetimes
    }

    /// Layout computed by the last successful Setup.
    pub fn layout(&self) -> Option<&WorkspaceLayout> {
        self.layout.as_ref()
    }

    /// Operation name of each node, in launch order.
    pub fn node_ops(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.node.op.name()).collect()
    }

    /// Workspace bytes required by the current configuration.
    pub fn workspace_size(&self) -> Result<usize, RuntimeError> {
        match (&self.state, &self.layout) {
            (PlanState::Configured, Some(layout)) => Ok(layout.total_bytes()),
            _ => Err(RuntimeError::State(format!(
                "plan '{}' has no workspace size before a successful setup",
                self.name
            ))),
        }
    }

    // ── Setup ──────────────────────────────────────────────────────

    /// Configures the plan for the tensors in `pack` and returns the
    /// workspace size in bytes.
    ///
    /// # Errors
    /// - [`RuntimeError::Arity`] if the pack does not match the plan.
    /// - [`RuntimeError::Shape`] if inference fails at a node.
    /// - [`RuntimeError::RunnerSetup`] if a runner rejects its tensors.
    /// - [`RuntimeError::PackShape`] if a pack descriptor's rank is too large.
    /// - [`RuntimeError::Resource`] if the workspace exceeds the limit.
    /// - [`RuntimeError::SizeOverflow`] if a tensor or the workspace is too
    ///   large to size.
    ///
    /// On error the plan is left unconfigured.
    pub fn setup(&mut self, ctx: &ExecutionContext, pack: &VariantPack) -> Result<usize, RuntimeError> {
        self.setup_with(ctx.stats(), pack)
    }

    pub(crate) fn setup_with(
        &mut self,
        stats: &SessionStats,
        pack: &VariantPack,
    ) -> Result<usize, RuntimeError> {
        let result = self.try_setup(stats, pack);
        self.unbind();
        match result {
            Ok(bytes) => {
                self.state = PlanState::Configured;
                stats.update_peak_workspace(bytes);
                Ok(bytes)
            }
            Err(e) => {
                self.state = PlanState::Unconfigured;
                self.layout = None;
                self.signature = None;
                tracing::warn!(plan = %self.name, error = %e, "setup failed");
                Err(e)
            }
        }
    }

    fn try_setup(&mut self, stats: &SessionStats, pack: &VariantPack) -> Result<usize, RuntimeError> {
        stats.record_setup();
        self.check_arity(pack)?;
        pack.check_descs()?;
        let signature = pack.input_descs();
        self.bind_caller_tensors(pack);

        if self.options.memoize_shapes
            && self.state == PlanState::Configured
            && self.signature.as_ref() == Some(&signature)
        {
            if let Some(total) = self.layout.as_ref().map(WorkspaceLayout::total_bytes) {
                self.check_output_buffers()?;
                stats.record_setup_cache_hit();
                tracing::debug!(plan = %self.name, workspace = total, "setup reused");
                return Ok(total);
            }
        }

        self.state = PlanState::Unconfigured;
        self.layout = None;
        self.signature = None;

        stats.record_shape_inference();
        self.infer_shapes()?;
        self.check_output_buffers()?;
        let max_scratch = self.setup_runners()?;
        let layout = self.plan_layout(max_scratch)?;

        let total = layout.total_bytes();
        if total > self.options.workspace_limit {
            return Err(RuntimeError::Resource {
                required: total,
                limit: self.options.workspace_limit,
            });
        }
        tracing::info!(
            plan = %self.name,
            workspace = total,
            arena = layout.arena_bytes,
            scratch = layout.scratch_bytes,
            in_place = layout.in_place.len(),
            "plan configured"
        );
        self.layout = Some(layout);
        self.signature = Some(signature);
        Ok(total)
    }

    fn check_arity(&self, pack: &VariantPack) -> Result<(), RuntimeError> {
        if pack.in_tensors.len() != self.slots.inputs.len()
            || pack.out_tensors.len() != self.slots.outputs.len()
        {
            return Err(RuntimeError::Arity {
                graph: self.name.clone(),
                expected_inputs: self.slots.inputs.len(),
                actual_inputs: pack.in_tensors.len(),
                expected_outputs: self.slots.outputs.len(),
                actual_outputs: pack.out_tensors.len(),
            });
        }
        Ok(())
    }

    /// Inputs are copied whole. Outputs keep their inferred descriptor and
    /// take only the caller's storage.
    fn bind_caller_tensors(&mut self, pack: &VariantPack) {
        self.slots.inputs.clone_from_slice(&pack.in_tensors);
        for (slot, t) in self.slots.outputs.iter_mut().zip(&pack.out_tensors) {
            slot.device = t.device;
            slot.host = t.host.clone();
        }
    }

    /// Drops every buffer handle the plan holds, keeping descriptors.
    fn unbind(&mut self) {
        let slots = &mut self.slots;
        for t in slots
            .inputs
            .iter_mut()
            .chain(slots.outputs.iter_mut())
            .chain(slots.internals.iter_mut())
        {
            t.device = None;
            t.host = None;
        }
    }

    fn infer_shapes(&mut self) -> Result<(), RuntimeError> {
        for (idx, node) in self.nodes.iter().enumerate() {
            let viewed = view_inputs(&self.slots, idx, node)?;
            let outs = node
                .node
                .infer_outputs(&viewed)
                .map_err(|source| shape_error(idx, node, source))?;
            for (r, desc) in node.outputs.iter().zip(outs) {
                self.slots.get_mut(*r).desc = desc;
            }
        }
        Ok(())
    }

    fn check_output_buffers(&self) -> Result<(), RuntimeError> {
        for (i, t) in self.slots.outputs.iter().enumerate() {
            let required = t
                .desc
                .checked_size_bytes()
                .ok_or_else(|| RuntimeError::SizeOverflow {
                    what: format!("output {i}"),
                })?;
            if let Some(buf) = t.device {
                if buf.size_bytes() < required {
                    return Err(RuntimeError::BufferTooSmall {
                        what: format!("output {i}"),
                        required,
                        actual: buf.size_bytes(),
                    });
                }
            }
        }
        Ok(())
    }

    fn setup_runners(&mut self) -> Result<usize, RuntimeError> {
        let mut max_scratch = 0;
        for (idx, node) in self.nodes.iter_mut().enumerate() {
            let pack = runner_pack(&self.slots, idx, node, None)?;
            let scratch = {
                let mut runner = node.runner.lock().map_err(|_| poisoned(idx))?;
                runner
                    .setup(&pack)
                    .map_err(|source| RuntimeError::RunnerSetup {
                        node: idx,
                        op: node.node.op.name().to_string(),
                        source,
                    })?
            };
            node.scratch = scratch;
            tracing::debug!(node = idx, op = node.node.op.name(), scratch, "runner set up");
            max_scratch = max_scratch.max(scratch);
        }
        Ok(max_scratch)
    }

    fn plan_layout(&self, max_scratch: usize) -> Result<WorkspaceLayout, RuntimeError> {
        let wiring: Vec<NodeWiring<'_>> = self
            .nodes
            .iter()
            .map(|n| NodeWiring {
                inputs: &n.inputs,
                outputs: &n.outputs,
                in_place: n.node.op.in_place(),
            })
            .collect();
        let descs: Vec<TensorDesc> = self.slots.internals.iter().map(|t| t.desc.clone()).collect();
        plan_workspace(
            &wiring,
            &self.lifetimes,
            &descs,
            max_scratch,
            self.options.alignment,
        )
    }

    // ── Execute ────────────────────────────────────────────────────

    /// Launches every node against `workspace`.
    ///
    /// In synchronous mode all launches are made before this returns and
    /// the first failure is returned directly. In queued mode the launches
    /// are handed to the dispatcher and the returned [`Completion`] resolves
    /// once they have been made. Either way the plan holds no caller buffer
    /// after this returns; `pack` and `workspace` must stay valid until the
    /// completion resolves.
    ///
    /// # Errors
    /// - [`RuntimeError::State`] before a successful Setup, or if the input
    ///   descriptors changed since.
    /// - [`RuntimeError::BufferTooSmall`] if the workspace is too small.
    /// - [`RuntimeError::Execution`] if a runner fails (synchronous mode).
    pub fn execute(
        &mut self,
        ctx: &ExecutionContext,
        pack: &VariantPack,
        workspace: DeviceBuffer,
    ) -> Result<Completion, RuntimeError> {
        let (launches, total) = self.prepare_launches(ctx.stats(), ctx.stream(), pack, workspace)?;
        match ctx.dispatcher() {
            Some(dispatcher) => dispatcher.submit(&self.name, total, launches),
            None => run_pass(&self.name, total, launches).map(Completion::Ready),
        }
    }

    /// Runs every launch on the calling thread.
    pub(crate) fn execute_inline(
        &mut self,
        stats: &SessionStats,
        stream: StreamId,
        pack: &VariantPack,
        workspace: DeviceBuffer,
    ) -> Result<ExecReport, RuntimeError> {
        let (launches, total) = self.prepare_launches(stats, stream, pack, workspace)?;
        run_pass(&self.name, total, launches)
    }

    fn prepare_launches(
        &mut self,
        stats: &SessionStats,
        stream: StreamId,
        pack: &VariantPack,
        workspace: DeviceBuffer,
    ) -> Result<(Vec<Launch>, usize), RuntimeError> {
        let layout = match (&self.state, &self.layout) {
            (PlanState::Configured, Some(layout)) => layout.clone(),
            _ => {
                return Err(RuntimeError::State(format!(
                    "plan '{}' must be set up before execute",
                    self.name
                )))
            }
        };
        self.check_arity(pack)?;
        if self.signature.as_deref() != Some(pack.input_descs().as_slice()) {
            return Err(RuntimeError::State(format!(
                "input descriptors of plan '{}' changed since setup",
                self.name
            )));
        }
        let total = layout.total_bytes();
        if workspace.size_bytes() < total {
            return Err(RuntimeError::BufferTooSmall {
                what: "workspace".into(),
                required: total,
                actual: workspace.size_bytes(),
            });
        }

        self.bind_caller_tensors(pack);
        let launches = self.bind_launches(&layout, workspace, stream);
        self.unbind();
        let launches = launches?;

        stats.record_execute(launches.len());
        Ok((launches, total))
    }

    fn bind_launches(
        &mut self,
        layout: &WorkspaceLayout,
        workspace: DeviceBuffer,
        stream: StreamId,
    ) -> Result<Vec<Launch>, RuntimeError> {
        self.check_output_buffers()?;
        let slice = |offset: usize, len: usize| {
            workspace
                .slice(offset, len)
                .map_err(|_| RuntimeError::BufferTooSmall {
                    what: "workspace".into(),
                    required: offset + len,
                    actual: workspace.size_bytes(),
                })
        };

        for (t, slot) in self.slots.internals.iter_mut().enumerate() {
            slot.device = Some(match layout.region(t) {
                Some(r) => slice(r.offset, r.size)?,
                None => slice(0, 0)?,
            });
        }

        let mut launches = Vec::with_capacity(self.nodes.len());
        for (idx, node) in self.nodes.iter().enumerate() {
            let scratch = match node.scratch {
                0 => None,
                bytes => Some(slice(layout.scratch_offset(), bytes)?),
            };
            launches.push(Launch {
                node: idx,
                op: node.node.op.name().to_string(),
                runner: node.runner.clone(),
                ctx: DispatchContext { stream, node: idx },
                pack: runner_pack(&self.slots, idx, node, scratch)?,
                profiling: self.options.enable_profiling,
            });
        }
        Ok(launches)
    }

    /// Returns a multi-line description of the plan.
    pub fn summary(&self) -> String {
        let mut s = format!(
            "Plan '{}' ({}, {} nodes)\n",
            self.name,
            self.state,
            self.nodes.len()
        );
        for (idx, node) in self.nodes.iter().enumerate() {
            let ins: Vec<String> = node.inputs.iter().map(ToString::to_string).collect();
            let outs: Vec<String> = node.outputs.iter().map(ToString::to_string).collect();
            s.push_str(&format!(
                "  [{idx}] {}({}) -> ({})",
                node.node.op.name(),
                ins.join(", "),
                outs.join(", ")
            ));
            if node.scratch > 0 {
                s.push_str(&format!(" scratch {}", node.scratch));
            }
            s.push('\n');
        }
        if let Some(layout) = &self.layout {
            s.push_str(&layout.to_string());
        }
        s
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("nodes", &self.node_ops())
            .field("workspace", &self.layout.as_ref().map(WorkspaceLayout::total_bytes))
            .finish()
    }
}

fn shape_error(idx: usize, node: &PlanNode, source: ShapeError) -> RuntimeError {
    RuntimeError::Shape {
        node: idx,
        op: node.node.op.name().to_string(),
        source,
    }
}

fn poisoned(idx: usize) -> RuntimeError {
    RuntimeError::State(format!("runner of node {idx} was poisoned by a panic"))
}

/// Input descriptors as node `idx` sees them, after its reshapes.
fn view_inputs(slots: &Slots, idx: usize, node: &PlanNode) -> Result<Vec<TensorDesc>, RuntimeError> {
    node.inputs
        .iter()
        .enumerate()
        .map(|(j, r)| {
            node.node
                .view_input(j, &slots.get(*r).desc)
                .map_err(|source| shape_error(idx, node, source))
        })
        .collect()
}

fn runner_pack(
    slots: &Slots,
    idx: usize,
    node: &PlanNode,
    workspace: Option<DeviceBuffer>,
) -> Result<RunnerPack, RuntimeError> {
    let descs = view_inputs(slots, idx, node)?;
    let in_tensors = node
        .inputs
        .iter()
        .zip(descs)
        .map(|(r, desc)| Tensor {
            desc,
            ..slots.get(*r).clone()
        })
        .collect();
    let out_tensors = node.outputs.iter().map(|r| slots.get(*r).clone()).collect();
    Ok(RunnerPack {
        in_tensors,
        out_tensors,
        workspace,
    })
}
