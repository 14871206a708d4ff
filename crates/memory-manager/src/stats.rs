// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Workspace pool statistics.

/// Cumulative counters for a [`MemoryPool`](crate::MemoryPool).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AllocationStats {
    /// Acquire requests, including refused ones.
    pub requests: u64,
    /// Requests served from a cached buffer.
    pub reused: u64,
    /// Requests that needed a fresh backing store.
    pub fresh: u64,
    /// Requests refused by the budget.
    pub oom_count: u64,
    /// Buffers returned.
    pub releases: u64,
    /// Highest number of bytes handed out at once.
    pub peak_bytes: usize,
    /// Sum of all granted request sizes.
    pub cumulative_bytes: u64,
}

impl AllocationStats {
    /// Fraction of granted requests served from the cache.
    pub fn reuse_ratio(&self) -> f64 {
        let granted = self.reused + self.fresh;
        if granted == 0 {
            return 0.0;
        }
        self.reused as f64 / granted as f64
    }

    pub(crate) fn record_reuse(&mut self, size: usize) {
        self.requests += 1;
        self.reused += 1;
        self.cumulative_bytes += size as u64;
    }

    pub(crate) fn record_fresh(&mut self, size: usize) {
        self.requests += 1;
        self.fresh += 1;
        self.cumulative_bytes += size as u64;
    }

    pub(crate) fn record_oom(&mut self) {
        self.requests += 1;
        self.oom_count += 1;
    }

    pub(crate) fn record_release(&mut self) {
        self.releases += 1;
    }

    pub(crate) fn update_peak(&mut self, current: usize) {
        self.peak_bytes = self.peak_bytes.max(current);
    }

    /// Returns a one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "Workspace pool: {} requests ({} reused, {} fresh, {:.0}% reuse), \
             {} refused, peak {} bytes, {} releases",
            self.requests,
            self.reused,
            self.fresh,
            self.reuse_ratio() * 100.0,
            self.oom_count,
            self.peak_bytes,
            self.releases,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse_ratio() {
        let mut s = AllocationStats::default();
        assert_eq!(s.reuse_ratio(), 0.0);
        s.record_fresh(100);
        s.record_reuse(100);
        s.record_reuse(100);
        s.record_oom();
        assert!((s.reuse_ratio() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(s.requests, 4);
        assert_eq!(s.cumulative_bytes, 300);
    }

    #[test]
    fn test_peak_never_decreases() {
        let mut s = AllocationStats::default();
        s.update_peak(100);
        s.update_peak(50);
        assert_eq!(s.peak_bytes, 100);
    }

    #[test]
    fn test_summary() {
        let mut s = AllocationStats::default();
        s.record_fresh(64);
        s.record_reuse(64);
        let text = s.summary();
        assert!(text.contains("2 requests"));
        assert!(text.contains("50% reuse"));
    }
}
