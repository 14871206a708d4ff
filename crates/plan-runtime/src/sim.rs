// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A simulated kernel library.
//!
//! [`SimKernel`] launches nothing. Its runners check that every tensor they
//! are handed is bound, then append a [`LaunchRecord`] to a shared
//! [`LaunchLog`]. Scratch requests, launch failures and latency can be
//! injected per operation name, which is how the CLI's dry runs and the
//! tests exercise plans without an accelerator.

use op_graph::{DispatchContext, KernelError, KernelFactory, Runner, RunnerPack, StreamId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tensor_core::DeviceBuffer;

/// One launch as seen by a simulated runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    pub op: String,
    pub node: usize,
    pub stream: StreamId,
    pub inputs: Vec<Option<DeviceBuffer>>,
    pub outputs: Vec<Option<DeviceBuffer>>,
    pub scratch: Option<DeviceBuffer>,
}

#[derive(Debug, Default)]
struct LogInner {
    launches: Vec<LaunchRecord>,
    setups: usize,
}

/// Launches and setups recorded by every runner of one [`SimKernel`].
#[derive(Debug, Clone, Default)]
pub struct LaunchLog {
    inner: Arc<Mutex<LogInner>>,
}

impl LaunchLog {
    fn lock(&self) -> MutexGuard<'_, LogInner> {
        // A panicking test thread must not hide the records from the others.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn records(&self) -> Vec<LaunchRecord> {
        self.lock().launches.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().launches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Operation names in launch order.
    pub fn ops(&self) -> Vec<String> {
        self.lock().launches.iter().map(|r| r.op.clone()).collect()
    }

    /// Number of runner setups performed.
    pub fn setups(&self) -> usize {
        self.lock().setups
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.launches.clear();
        inner.setups = 0;
    }
}

/// Kernel factory producing simulated runners.
#[derive(Debug, Clone, Default)]
pub struct SimKernel {
    scratch: HashMap<String, usize>,
    failing: HashSet<String>,
    unavailable: HashSet<String>,
    latency: Option<Duration>,
    log: LaunchLog,
}

impl SimKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runners of `op` request `bytes` of scratch at setup.
    pub fn with_scratch(mut self, op: &str, bytes: usize) -> Self {
        self.scratch.insert(op.to_string(), bytes);
        self
    }

    /// Runners of `op` fail every launch.
    pub fn failing(mut self, op: &str) -> Self {
        self.failing.insert(op.to_string());
        self
    }

    /// No runner can be created for `op`.
    pub fn unavailable(mut self, op: &str) -> Self {
        self.unavailable.insert(op.to_string());
        self
    }

    /// Every launch sleeps for `latency` before returning.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn log(&self) -> &LaunchLog {
        &self.log
    }
}

impl KernelFactory for SimKernel {
    fn create_runner(&self, op_name: &str) -> Result<Box<dyn Runner>, KernelError> {
        if self.unavailable.contains(op_name) {
            return Err(KernelError::Unavailable(format!("no simulated kernel for '{op_name}'")));
        }
        Ok(Box::new(SimRunner {
            op: op_name.to_string(),
            scratch: self.scratch.get(op_name).copied().unwrap_or(0),
            fail: self.failing.contains(op_name),
            latency: self.latency,
            log: self.log.clone(),
        }))
    }
}

struct SimRunner {
    op: String,
    scratch: usize,
    fail: bool,
    latency: Option<Duration>,
    log: LaunchLog,
}

impl Runner for SimRunner {
    fn name(&self) -> &str {
        &self.op
    }

    fn setup(&mut self, _pack: &RunnerPack) -> Result<usize, KernelError> {
        self.log.lock().setups += 1;
        Ok(self.scratch)
    }

    fn execute(&mut self, ctx: &DispatchContext, pack: &RunnerPack) -> Result<(), KernelError> {
        if self.fail {
            return Err(KernelError::Launch(format!("injected failure in '{}'", self.op)));
        }
        if let Some(i) = pack.in_tensors.iter().position(|t| !t.has_data()) {
            return Err(KernelError::Launch(format!("input {i} of '{}' is unbound", self.op)));
        }
        if let Some(i) = pack.out_tensors.iter().position(|t| !t.is_device_bound()) {
            return Err(KernelError::Launch(format!("output {i} of '{}' is unbound", self.op)));
        }
        let scratch_ok = pack.workspace.map_or(0, |w| w.size_bytes()) >= self.scratch;
        if !scratch_ok {
            return Err(KernelError::Launch(format!(
                "'{}' needs {} scratch bytes",
                self.op, self.scratch
            )));
        }

        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        self.log.lock().launches.push(LaunchRecord {
            op: self.op.clone(),
            node: ctx.node,
            stream: ctx.stream,
            inputs: pack.in_tensors.iter().map(|t| t.device).collect(),
            outputs: pack.out_tensors.iter().map(|t| t.device).collect(),
            scratch: pack.workspace,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{DType, Shape, Tensor, TensorDesc};

    fn bound_pack() -> RunnerPack {
        let desc = TensorDesc::new(DType::F32, Shape::vector(4));
        RunnerPack {
            in_tensors: vec![Tensor::on_device(desc.clone(), DeviceBuffer::new(0x100, 16))],
            out_tensors: vec![Tensor::on_device(desc, DeviceBuffer::new(0x200, 16))],
            workspace: None,
        }
    }

    fn ctx() -> DispatchContext {
        DispatchContext {
            stream: StreamId(3),
            node: 1,
        }
    }

    #[test]
    fn test_records_launch() {
        let kernel = SimKernel::new();
        let mut runner = kernel.create_runner("add").unwrap();
        assert_eq!(runner.setup(&bound_pack()).unwrap(), 0);
        runner.execute(&ctx(), &bound_pack()).unwrap();

        let records = kernel.log().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].op, "add");
        assert_eq!(records[0].stream, StreamId(3));
        assert_eq!(records[0].outputs, vec![Some(DeviceBuffer::new(0x200, 16))]);
        assert_eq!(kernel.log().setups(), 1);
    }

    #[test]
    fn test_unbound_output_rejected() {
        let kernel = SimKernel::new();
        let mut runner = kernel.create_runner("add").unwrap();
        let mut pack = bound_pack();
        pack.out_tensors[0].unbind_device();
        assert!(runner.execute(&ctx(), &pack).is_err());
        assert!(kernel.log().is_empty());
    }

    #[test]
    fn test_scratch_required() {
        let kernel = SimKernel::new().with_scratch("norm", 32);
        let mut runner = kernel.create_runner("norm").unwrap();
        assert_eq!(runner.setup(&bound_pack()).unwrap(), 32);
        assert!(runner.execute(&ctx(), &bound_pack()).is_err());

        let mut pack = bound_pack();
        pack.workspace = Some(DeviceBuffer::new(0x400, 32));
        runner.execute(&ctx(), &pack).unwrap();
    }

    #[test]
    fn test_injected_faults() {
        let kernel = SimKernel::new().failing("add").unavailable("matmul");
        assert!(matches!(
            kernel.create_runner("matmul"),
            Err(KernelError::Unavailable(_))
        ));
        let mut runner = kernel.create_runner("add").unwrap();
        let err = runner.execute(&ctx(), &bound_pack()).unwrap_err();
        assert!(matches!(err, KernelError::Launch(_)));
    }

    #[test]
    fn test_clear() {
        let kernel = SimKernel::new();
        let mut runner = kernel.create_runner("add").unwrap();
        runner.setup(&bound_pack()).unwrap();
        runner.execute(&ctx(), &bound_pack()).unwrap();
        kernel.log().clear();
        assert!(kernel.log().is_empty());
        assert_eq!(kernel.log().setups(), 0);
    }
}
