// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Session counters and per-pass execution reports.
//!
//! [`SessionStats`] lives in the execution context and counts what the
//! engine did across every plan it ran. An [`ExecReport`] describes one
//! Execute pass and is what [`Completion::wait`](crate::Completion::wait)
//! hands back.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Thread-safe counters shared by every plan run under one context.
#[derive(Debug, Default)]
pub struct SessionStats {
    setups: AtomicU64,
    setup_cache_hits: AtomicU64,
    shape_inferences: AtomicU64,
    executes: AtomicU64,
    nodes_dispatched: AtomicU64,
    peak_workspace_bytes: AtomicUsize,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_setup(&self) {
        self.setups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_setup_cache_hit(&self) {
        self.setup_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_shape_inference(&self) {
        self.shape_inferences.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_execute(&self, nodes: usize) {
        self.executes.fetch_add(1, Ordering::Relaxed);
        self.nodes_dispatched
            .fetch_add(nodes as u64, Ordering::Relaxed);
    }

    pub(crate) fn update_peak_workspace(&self, bytes: usize) {
        self.peak_workspace_bytes.fetch_max(bytes, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            setups: self.setups.load(Ordering::Relaxed),
            setup_cache_hits: self.setup_cache_hits.load(Ordering::Relaxed),
            shape_inferences: self.shape_inferences.load(Ordering::Relaxed),
            executes: self.executes.load(Ordering::Relaxed),
            nodes_dispatched: self.nodes_dispatched.load(Ordering::Relaxed),
            peak_workspace_bytes: self.peak_workspace_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    /// Setup calls, including fast-path hits and failures.
    pub setups: u64,
    /// Setups that reused the previous shapes and layout.
    pub setup_cache_hits: u64,
    /// Full shape-inference passes over a plan.
    pub shape_inferences: u64,
    pub executes: u64,
    pub nodes_dispatched: u64,
    pub peak_workspace_bytes: usize,
}

impl StatsSnapshot {
    pub fn summary(&self) -> String {
        format!(
            "Session: {} setups ({} memoised, {} inference passes), {} executes, \
             {} launches, peak workspace {} bytes",
            self.setups,
            self.setup_cache_hits,
            self.shape_inferences,
            self.executes,
            self.nodes_dispatched,
            self.peak_workspace_bytes,
        )
    }
}

/// Dispatch time of one node.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct NodeTiming {
    pub node: usize,
    pub op: String,
    pub duration: Duration,
}

/// Outcome of one Execute pass.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ExecReport {
    pub plan: String,
    pub nodes_dispatched: usize,
    pub workspace_bytes: usize,
    /// Time from the first launch to the last.
    pub wall_time: Duration,
    /// Per-node timings; empty when profiling is disabled.
    pub node_timings: Vec<NodeTiming>,
}

impl ExecReport {
    pub(crate) fn new(plan: impl Into<String>, workspace_bytes: usize) -> Self {
        Self {
            plan: plan.into(),
            workspace_bytes,
            ..Default::default()
        }
    }

    /// The slowest node, if timings were recorded.
    pub fn slowest(&self) -> Option<&NodeTiming> {
        self.node_timings.iter().max_by_key(|t| t.duration)
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let mut s = format!(
            "Execute '{}': {} nodes in {:.3}ms, workspace {} bytes",
            self.plan,
            self.nodes_dispatched,
            self.wall_time.as_secs_f64() * 1000.0,
            self.workspace_bytes,
        );
        if let Some(t) = self.slowest() {
            s.push_str(&format!(
                ", slowest node {} ('{}') {:.3}ms",
                t.node,
                t.op,
                t.duration.as_secs_f64() * 1000.0
            ));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let s = SessionStats::new();
        s.record_setup();
        s.record_setup();
        s.record_setup_cache_hit();
        s.record_shape_inference();
        s.record_execute(3);
        s.update_peak_workspace(128);
        s.update_peak_workspace(64);

        let snap = s.snapshot();
        assert_eq!(snap.setups, 2);
        assert_eq!(snap.setup_cache_hits, 1);
        assert_eq!(snap.shape_inferences, 1);
        assert_eq!(snap.executes, 1);
        assert_eq!(snap.nodes_dispatched, 3);
        assert_eq!(snap.peak_workspace_bytes, 128);
        assert!(snap.summary().contains("2 setups (1 memoised"));
    }

    #[test]
    fn test_report_summary() {
        let mut r = ExecReport::new("block", 128);
        r.nodes_dispatched = 2;
        r.node_timings = vec![
            NodeTiming {
                node: 0,
                op: "linear".into(),
                duration: Duration::from_micros(30),
            },
            NodeTiming {
                node: 1,
                op: "add".into(),
                duration: Duration::from_micros(10),
            },
        ];
        assert_eq!(r.slowest().map(|t| t.node), Some(0));
        let s = r.summary();
        assert!(s.contains("Execute 'block': 2 nodes"));
        assert!(s.contains("slowest node 0 ('linear')"));
    }

    #[test]
    fn test_report_without_timings() {
        let r = ExecReport::new("p", 0);
        assert!(r.slowest().is_none());
        assert!(!r.summary().contains("slowest"));
    }
}
