// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The kernel boundary.

use crate::KernelError;
use std::fmt;
use tensor_core::{DeviceBuffer, Tensor};

/// Identifies the accelerator stream work is queued on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream:{}", self.0)
    }
}

/// Per-launch context handed to [`Runner::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchContext {
    pub stream: StreamId,
    /// Index of the node being launched within its plan.
    pub node: usize,
}

/// The bound tensors a runner sees for one node.
///
/// `workspace` is the runner's private scratch region, present only when
/// its setup asked for scratch space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunnerPack {
    pub in_tensors: Vec<Tensor>,
    pub out_tensors: Vec<Tensor>,
    pub workspace: Option<DeviceBuffer>,
}

/// Plan-wide settings handed to every runner when its plan is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Alignment of workspace regions.
    pub alignment: usize,
    /// Largest workspace a plan may request, in bytes.
    pub workspace_limit: usize,
    pub memoize_shapes: bool,
    pub enable_profiling: bool,
}

/// An object that can launch an operation on an accelerator stream.
///
/// A runner is created once per node when a plan is built and lives as long
/// as the plan. `setup` is called whenever input shapes change and returns
/// the scratch bytes the runner needs; `execute` is called once per step.
pub trait Runner: Send {
    fn name(&self) -> &str;

    /// Adopts the settings of the plan that owns this runner. Runners that
    /// plan their own workspace override this; kernels ignore it.
    fn configure(&mut self, _settings: &RunnerSettings) {}

    /// Prepares for the bound tensors and returns scratch bytes required.
    fn setup(&mut self, pack: &RunnerPack) -> Result<usize, KernelError>;

    /// Launches the work. Must not block on device completion.
    fn execute(&mut self, ctx: &DispatchContext, pack: &RunnerPack) -> Result<(), KernelError>;
}

impl fmt::Debug for dyn Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner").field("name", &self.name()).finish()
    }
}

/// A kernel library: produces runners for named leaf operations.
pub trait KernelFactory: Send + Sync + fmt::Debug {
    fn create_runner(&self, op_name: &str) -> Result<Box<dyn Runner>, KernelError>;
}
