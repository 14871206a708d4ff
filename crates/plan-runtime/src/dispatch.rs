// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Node launches and the queued dispatcher.
//!
//! Execute turns a configured plan into a list of [`Launch`]es. In
//! synchronous mode they run on the caller's thread before Execute returns.
//! In queued mode they are sent to a single dispatcher thread over a bounded
//! channel, in node order, followed by a `Finish` message that closes the
//! pass:
//!
//! ```text
//! caller ── Launch(pass, 0) ─┐
//!        ── Launch(pass, 1) ─┤  flume::bounded(queue_capacity)  ──► dispatcher thread
//!        ── Finish(pass)    ─┘                                     │
//!   Completion::wait() ◄──────────── flume::bounded(1) ──────────────┘
//! ```
//!
//! Once a launch of a pass fails, the remaining launches of that pass are
//! skipped and the pass resolves to the first error.

use crate::{ExecReport, NodeTiming, RuntimeError};
use op_graph::{DispatchContext, Runner, RunnerPack};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

/// A runner shared between its plan and the dispatcher thread.
pub type SharedRunner = Arc<Mutex<Box<dyn Runner>>>;

/// One node launch, fully bound.
pub(crate) struct Launch {
    pub node: usize,
    pub op: String,
    pub runner: SharedRunner,
    pub ctx: DispatchContext,
    pub pack: RunnerPack,
    pub profiling: bool,
}

impl Launch {
    fn run(&self) -> Result<Option<NodeTiming>, RuntimeError> {
        let start = Instant::now();
        let mut runner = self.runner.lock().map_err(|_| {
            RuntimeError::State(format!("runner of node {} was poisoned by a panic", self.node))
        })?;
        runner
            .execute(&self.ctx, &self.pack)
            .map_err(|source| RuntimeError::Execution {
                node: self.node,
                op: self.op.clone(),
                source,
            })?;
        tracing::debug!(node = self.node, op = %self.op, stream = %self.ctx.stream, "dispatched");
        Ok(self.profiling.then(|| NodeTiming {
            node: self.node,
            op: self.op.clone(),
            duration: start.elapsed(),
        }))
    }
}

/// Runs a pass on the calling thread. Stops at the first failing launch.
pub(crate) fn run_pass(
    plan: &str,
    workspace_bytes: usize,
    launches: Vec<Launch>,
) -> Result<ExecReport, RuntimeError> {
    let mut pass = PassState::new();
    for launch in &launches {
        pass.record(launch)?;
    }
    pass.finish(plan, workspace_bytes)
}

/// Handle to the outcome of one Execute pass.
#[derive(Debug)]
pub enum Completion {
    /// Every launch has been made.
    Ready(ExecReport),
    /// Launches are queued on the dispatcher.
    Pending(flume::Receiver<Result<ExecReport, RuntimeError>>),
}

impl Completion {
    /// Blocks until every launch of the pass has been dispatched.
    pub fn wait(self) -> Result<ExecReport, RuntimeError> {
        match self {
            Completion::Ready(report) => Ok(report),
            Completion::Pending(rx) => rx.recv().map_err(|_| {
                RuntimeError::Dispatch("dispatcher exited before finishing the pass".into())
            })?,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Completion::Ready(_))
    }
}

enum Job {
    Launch {
        pass: u64,
        launch: Launch,
    },
    Finish {
        pass: u64,
        plan: String,
        workspace_bytes: usize,
        reply: flume::Sender<Result<ExecReport, RuntimeError>>,
    },
}

struct PassState {
    start: Option<Instant>,
    dispatched: usize,
    timings: Vec<NodeTiming>,
    error: Option<RuntimeError>,
}

impl PassState {
    fn new() -> Self {
        Self {
            start: None,
            dispatched: 0,
            timings: Vec::new(),
            error: None,
        }
    }

    fn record(&mut self, launch: &Launch) -> Result<(), RuntimeError> {
        self.start.get_or_insert_with(Instant::now);
        let timing = launch.run()?;
        self.dispatched += 1;
        self.timings.extend(timing);
        Ok(())
    }

    fn finish(self, plan: &str, workspace_bytes: usize) -> Result<ExecReport, RuntimeError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let mut report = ExecReport::new(plan, workspace_bytes);
        report.nodes_dispatched = self.dispatched;
        report.node_timings = self.timings;
        report.wall_time = self.start.map(|s| s.elapsed()).unwrap_or_default();
        Ok(report)
    }
}

/// A dedicated thread that performs queued launches in submission order.
pub struct Dispatcher {
    tx: Option<flume::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    next_pass: AtomicU64,
    capacity: usize,
}

impl Dispatcher {
    /// Starts the dispatcher thread with a queue of `capacity` messages.
    pub fn spawn(capacity: usize) -> Result<Self, RuntimeError> {
        let (tx, rx) = flume::bounded(capacity.max(1));
        let handle = std::thread::Builder::new()
            .name("graph-rt-dispatch".into())
            .spawn(move || worker(rx))
            .map_err(|e| RuntimeError::Dispatch(format!("cannot start dispatcher thread: {e}")))?;
        tracing::debug!(capacity, "dispatcher started");
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            next_pass: AtomicU64::new(0),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queues a pass. Blocks only while the queue is full.
    pub(crate) fn submit(
        &self,
        plan: &str,
        workspace_bytes: usize,
        launches: Vec<Launch>,
    ) -> Result<Completion, RuntimeError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| RuntimeError::Dispatch("dispatcher is shut down".into()))?;
        let closed = |_| RuntimeError::Dispatch("dispatcher thread has exited".into());

        let pass = self.next_pass.fetch_add(1, Ordering::Relaxed);
        let count = launches.len();
        for launch in launches {
            tx.send(Job::Launch { pass, launch }).map_err(closed)?;
        }
        let (reply, rx) = flume::bounded(1);
        tx.send(Job::Finish {
            pass,
            plan: plan.to_string(),
            workspace_bytes,
            reply,
        })
        .map_err(closed)?;
        tracing::debug!(plan, pass, launches = count, "pass queued");
        Ok(Completion::Pending(rx))
    }
}

fn worker(rx: flume::Receiver<Job>) {
    let mut passes: HashMap<u64, PassState> = HashMap::new();
    for job in rx.iter() {
        match job {
            Job::Launch { pass, launch } => {
                let state = passes.entry(pass).or_insert_with(PassState::new);
                if state.error.is_some() {
                    tracing::debug!(pass, node = launch.node, "skipped after earlier failure");
                    continue;
                }
                if let Err(e) = state.record(&launch) {
                    tracing::error!(pass, error = %e, "queued launch failed");
                    state.error = Some(e);
                }
            }
            Job::Finish {
                pass,
                plan,
                workspace_bytes,
                reply,
            } => {
                let state = passes.remove(&pass).unwrap_or_else(PassState::new);
                // The caller may have dropped its Completion without waiting.
                let _ = reply.send(state.finish(&plan, workspace_bytes));
            }
        }
    }
    tracing::debug!("dispatcher stopped");
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("dispatcher thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("capacity", &self.capacity)
            .field("passes", &self.next_pass.load(Ordering::Relaxed))
            .field("running", &self.tx.is_some())
            .finish()
    }
}
