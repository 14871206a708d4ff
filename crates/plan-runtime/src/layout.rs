// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Workspace layout: where each internal tensor lives inside the workspace.
//!
//! ```text
//! workspace
//! ┌──────────────────────────────┬──────────────────┐
//! │ arena (internal tensors)     │ runner scratch   │
//! └──────────────────────────────┴──────────────────┘
//! 0                        arena_bytes        total_bytes
//! ```
//!
//! Nodes are walked in order. Outputs of node *i* are placed first, then
//! every internal tensor whose last use is node *i* returns its region to
//! the arena. An output may take over the region of one of its node's
//! inputs when the operation declares the pair in-place and that input
//! dies at this node.

use crate::{RuntimeError, TensorLifetimes};
use memory_manager::{align_up, ArenaAllocator, MemoryError, Region};
use op_graph::TensorRef;
use std::fmt;
use tensor_core::TensorDesc;

/// An output that reuses its input's region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InPlaceReuse {
    pub node: usize,
    /// Internal tensor giving up its region.
    pub from: usize,
    /// Internal tensor taking it over.
    pub to: usize,
}

/// Result of workspace planning for one set of input shapes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceLayout {
    /// One entry per internal tensor; `None` for unused or empty tensors.
    pub regions: Vec<Option<Region>>,
    /// Arena high-water mark, aligned.
    pub arena_bytes: usize,
    /// Largest runner scratch requirement, aligned.
    pub scratch_bytes: usize,
    pub in_place: Vec<InPlaceReuse>,
}

impl WorkspaceLayout {
    /// Total workspace size the plan needs.
    pub fn total_bytes(&self) -> usize {
        self.arena_bytes.saturating_add(self.scratch_bytes)
    }

    /// Offset of the shared runner scratch region.
    pub fn scratch_offset(&self) -> usize {
        self.arena_bytes
    }

    pub fn region(&self, internal: usize) -> Option<Region> {
        self.regions.get(internal).copied().flatten()
    }
}

impl fmt::Display for WorkspaceLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "workspace {} bytes (arena {}, scratch {})",
            self.total_bytes(),
            self.arena_bytes,
            self.scratch_bytes
        )?;
        for (t, region) in self.regions.iter().enumerate() {
            match region {
                Some(r) => writeln!(f, "  t{t}: {r}")?,
                None => writeln!(f, "  t{t}: -")?,
            }
        }
        for r in &self.in_place {
            writeln!(f, "  node {}: t{} reuses t{}", r.node, r.to, r.from)?;
        }
        Ok(())
    }
}

/// Wiring and in-place hint of one node, as the planner sees it.
pub(crate) struct NodeWiring<'a> {
    pub inputs: &'a [TensorRef],
    pub outputs: &'a [TensorRef],
    pub in_place: Option<op_graph::InPlace>,
}

/// Lays out every internal tensor in node order.
pub(crate) fn plan_workspace(
    nodes: &[NodeWiring<'_>],
    lifetimes: &TensorLifetimes,
    internal_descs: &[TensorDesc],
    max_scratch: usize,
    alignment: usize,
) -> Result<WorkspaceLayout, RuntimeError> {
    let mut arena = ArenaAllocator::new(alignment);
    let mut regions: Vec<Option<Region>> = vec![None; internal_descs.len()];
    // Internal tensors whose region now belongs to another tensor.
    let mut donated = vec![false; internal_descs.len()];
    let mut in_place = Vec::new();

    for (idx, node) in nodes.iter().enumerate() {
        for (j, out) in node.outputs.iter().enumerate() {
            let Some(t) = out.internal() else { continue };
            let what = || format!("internal tensor t{t}");
            let size = internal_descs[t]
                .checked_size_bytes()
                .ok_or_else(|| RuntimeError::SizeOverflow { what: what() })?;
            if size == 0 {
                continue;
            }
            let needed = align_up(size, arena.alignment())
                .ok_or_else(|| RuntimeError::SizeOverflow { what: what() })?;

            if let Some(r) = regions[t] {
                if r.size >= needed {
                    continue;
                }
                arena.release(r)?;
                regions[t] = None;
            }

            let donor = node
                .in_place
                .filter(|hint| hint.output == j)
                .and_then(|hint| node.inputs.get(hint.input))
                .and_then(|r| r.internal())
                .filter(|&d| d != t && !donated[d] && lifetimes.tensor_max_node(d) == Some(idx))
                .and_then(|d| regions[d].filter(|r| r.size >= needed).map(|r| (d, r)));

            match donor {
                Some((d, region)) => {
                    regions[t] = Some(region);
                    donated[d] = true;
                    in_place.push(InPlaceReuse {
                        node: idx,
                        from: d,
                        to: t,
                    });
                }
                None => {
                    let region = arena.allocate(size).map_err(|e| match e {
                        MemoryError::SizeOverflow { .. } => {
                            RuntimeError::SizeOverflow { what: what() }
                        }
                        other => other.into(),
                    })?;
                    regions[t] = Some(region);
                }
            }
        }

        for &t in lifetimes.dies_after(idx) {
            if donated[t] {
                continue;
            }
            if let Some(r) = regions[t] {
                arena.release(r)?;
            }
        }
    }

    let workspace_overflow = || RuntimeError::SizeOverflow {
        what: "workspace".into(),
    };
    let arena_bytes = arena.high_water();
    let scratch_bytes = align_up(max_scratch, arena.alignment()).ok_or_else(workspace_overflow)?;
    arena_bytes
        .checked_add(scratch_bytes)
        .ok_or_else(workspace_overflow)?;

    let layout = WorkspaceLayout {
        regions,
        arena_bytes,
        scratch_bytes,
        in_place,
    };
    tracing::debug!(
        arena = layout.arena_bytes,
        scratch = layout.scratch_bytes,
        in_place = layout.in_place.len(),
        "workspace planned"
    );
    Ok(layout)
}
