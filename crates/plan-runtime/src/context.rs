// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The execution context: everything a plan needs from its environment.
//!
//! There is no process-wide state. A context owns the configuration, the
//! stream handle, the workspace pool, the session counters and, in queued
//! mode, the dispatcher thread. It is passed by reference into Build,
//! Setup and Execute, and several contexts may coexist.

use crate::dispatch::Dispatcher;
use crate::{DispatchMode, PlanOptions, RuntimeConfig, RuntimeError, SessionStats};
use memory_manager::{BufferGuard, MemoryBudget, MemoryPool};
use op_graph::StreamId;
use tensor_core::DeviceBuffer;

/// Environment shared by every plan run on one stream.
#[derive(Debug)]
pub struct ExecutionContext {
    config: RuntimeConfig,
    workspace_limit: MemoryBudget,
    stream: StreamId,
    pool: MemoryPool,
    stats: SessionStats,
    dispatcher: Option<Dispatcher>,
}

impl ExecutionContext {
    /// Validates the configuration and starts the dispatcher if queued.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let workspace_limit = config.validate()?;
        let pool = MemoryPool::with_alignment(workspace_limit, config.alignment);
        let dispatcher = match config.dispatch {
            DispatchMode::Queued => Some(Dispatcher::spawn(config.queue_capacity)?),
            DispatchMode::Synchronous => None,
        };
        tracing::info!(
            limit = %workspace_limit,
            alignment = config.alignment,
            dispatch = ?config.dispatch,
            "execution context created"
        );
        Ok(Self {
            config,
            workspace_limit,
            stream: StreamId::default(),
            pool,
            stats: SessionStats::new(),
            dispatcher,
        })
    }

    /// Sets the stream launches are queued on.
    pub fn with_stream(mut self, stream: StreamId) -> Self {
        self.stream = stream;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn workspace_limit(&self) -> MemoryBudget {
        self.workspace_limit
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }

    pub fn is_queued(&self) -> bool {
        self.dispatcher.is_some()
    }

    pub(crate) fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.as_ref()
    }

    /// Plan settings derived from this context's configuration.
    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions::from_config(&self.config, self.workspace_limit)
    }

    /// Borrows a workspace buffer of `bytes` from the pool.
    ///
    /// A zero-byte request yields an empty workspace without touching the
    /// pool.
    pub fn acquire_workspace(&self, bytes: usize) -> Result<Workspace, RuntimeError> {
        if bytes == 0 {
            return Ok(Workspace { guard: None });
        }
        let guard = self.pool.acquire(bytes)?;
        Ok(Workspace { guard: Some(guard) })
    }
}

/// A workspace buffer on loan from the context's pool.
///
/// Must outlive every pass it was handed to; wait on the pass's
/// [`Completion`](crate::Completion) before dropping it.
#[derive(Debug)]
pub struct Workspace {
    guard: Option<BufferGuard>,
}

impl Workspace {
    pub fn device_buffer(&self) -> DeviceBuffer {
        self.guard
            .as_ref()
            .map(BufferGuard::device_buffer)
            .unwrap_or_else(|| DeviceBuffer::new(0, 0))
    }

    pub fn size_bytes(&self) -> usize {
        self.guard.as_ref().map_or(0, BufferGuard::size_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_new_synchronous() {
        let ctx = ExecutionContext::new(RuntimeConfig::default()).unwrap();
        assert!(!ctx.is_queued());
        assert_eq!(ctx.workspace_limit().as_mb(), 2048);
        assert_eq!(ctx.plan_options().alignment, 64);
    }

    #[test]
    fn test_new_queued_starts_dispatcher() {
        let config = RuntimeConfig {
            dispatch: DispatchMode::Queued,
            queue_capacity: 4,
            ..Default::default()
        };
        let ctx = ExecutionContext::new(config).unwrap();
        assert!(ctx.is_queued());
        drop(ctx);
    }

    #[test]
    fn test_bad_config_is_config_error() {
        let config = RuntimeConfig {
            workspace_limit: "nope".into(),
            ..Default::default()
        };
        let err = ExecutionContext::new(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_acquire_workspace() {
        let config = RuntimeConfig {
            workspace_limit: "1K".into(),
            ..Default::default()
        };
        let ctx = ExecutionContext::new(config).unwrap().with_stream(StreamId(7));
        assert_eq!(ctx.stream(), StreamId(7));

        let empty = ctx.acquire_workspace(0).unwrap();
        assert_eq!(empty.size_bytes(), 0);

        let ws = ctx.acquire_workspace(512).unwrap();
        assert_eq!(ws.device_buffer().size_bytes(), 512);
        assert_eq!(ws.device_buffer().addr() % 64, 0);

        let err = ctx.acquire_workspace(1024).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
    }
}
