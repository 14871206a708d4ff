// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Budgeted pool of workspace buffers.
//!
//! A plan tells its caller how many workspace bytes it needs; the caller
//! asks the [`MemoryPool`] for a buffer of that size before every Execute.
//! Because a decoding loop asks for the same size step after step, the pool:
//!
//! 1. Enforces the workspace budget; requests that would exceed it return
//!    `Err(OutOfMemory)`.
//! 2. Caches returned buffers binned by size class, so the steady state
//!    performs no heap allocation.
//! 3. Aligns the start of every buffer it hands out.
//!
//! # Size Classes
//! A class is the requested size rounded up to the next power of two, with
//! a floor of [`MIN_SIZE_CLASS`]. A request is served by the smallest cached
//! class that is large enough.

use crate::{AllocationStats, BufferGuard, MemoryBudget, MemoryError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Smallest size class handed out.
pub const MIN_SIZE_CLASS: usize = 4096;

/// Default alignment of buffer start addresses.
pub const DEFAULT_ALIGNMENT: usize = 64;

/// State shared between the pool and its guards.
pub struct PoolInner {
    budget: MemoryBudget,
    alignment: usize,
    allocated_bytes: AtomicUsize,
    /// size class → cached backing stores.
    cache: Mutex<BTreeMap<usize, Vec<Vec<u8>>>>,
    cached_bytes: AtomicUsize,
    stats: Mutex<AllocationStats>,
}

impl PoolInner {
    pub(crate) fn alignment(&self) -> usize {
        self.alignment
    }

    /// Called by `BufferGuard::drop`.
    pub(crate) fn return_buffer(&self, backing: Vec<u8>, size_bytes: usize) {
        self.allocated_bytes.fetch_sub(size_bytes, Ordering::AcqRel);
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_release();
        }
        if backing.is_empty() {
            return;
        }
        let class = size_class_for(size_bytes);
        self.cached_bytes.fetch_add(backing.len(), Ordering::AcqRel);
        if let Ok(mut cache) = self.cache.lock() {
            cache.entry(class).or_default().push(backing);
        }
    }

    fn take_cached(&self, class: usize) -> Option<Vec<u8>> {
        let mut cache = self.cache.lock().ok()?;
        let found = cache
            .range_mut(class..)
            .find_map(|(_, buffers)| buffers.pop())?;
        cache.retain(|_, buffers| !buffers.is_empty());
        self.cached_bytes.fetch_sub(found.len(), Ordering::AcqRel);
        Some(found)
    }
}

/// Hands out aligned workspace buffers within a budget.
///
/// # Example
/// ```
/// use memory_manager::{MemoryPool, MemoryBudget};
///
/// let pool = MemoryPool::new(MemoryBudget::from_mb(64));
/// let ws = pool.acquire(1024 * 1024).unwrap();
/// assert_eq!(pool.allocated_bytes(), 1024 * 1024);
/// assert_eq!(ws.device_buffer().addr() % 64, 0);
///
/// drop(ws);
/// assert_eq!(pool.allocated_bytes(), 0);
/// ```
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    /// Creates a pool with the default alignment.
    pub fn new(budget: MemoryBudget) -> Self {
        Self::with_alignment(budget, DEFAULT_ALIGNMENT)
    }

    /// Creates a pool whose buffers start on `alignment`-byte boundaries.
    pub fn with_alignment(budget: MemoryBudget, alignment: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                budget,
                alignment: alignment.max(1).next_power_of_two(),
                allocated_bytes: AtomicUsize::new(0),
                cache: Mutex::new(BTreeMap::new()),
                cached_bytes: AtomicUsize::new(0),
                stats: Mutex::new(AllocationStats::default()),
            }),
        }
    }

    /// Acquires a workspace buffer of `size_bytes`.
    ///
    /// The buffer goes back to the pool when the returned guard drops.
    pub fn acquire(&self, size_bytes: usize) -> Result<BufferGuard, MemoryError> {
        if size_bytes == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }

        let budget = self.inner.budget.as_bytes();
        let reserved = self
            .inner
            .allocated_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(size_bytes)
                    .filter(|total| *total <= budget)
            });
        let current = match reserved {
            Ok(previous) => previous + size_bytes,
            Err(current) => {
                if let Ok(mut stats) = self.inner.stats.lock() {
                    stats.record_oom();
                }
                return Err(MemoryError::OutOfMemory {
                    requested: size_bytes,
                    available: budget.saturating_sub(current),
                    limit: budget,
                });
            }
        };

        let class = size_class_for(size_bytes);
        let cached = self.inner.take_cached(class);
        let hit = cached.is_some();
        let backing = cached.unwrap_or_else(|| vec![0u8; class + self.inner.alignment]);

        if let Ok(mut stats) = self.inner.stats.lock() {
            if hit {
                stats.record_reuse(size_bytes);
            } else {
                stats.record_fresh(size_bytes);
            }
            stats.update_peak(current);
        }

        Ok(BufferGuard::new(backing, Arc::clone(&self.inner), size_bytes))
    }

    /// Bytes currently handed out.
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated_bytes.load(Ordering::Acquire)
    }

    /// Bytes remaining before the budget is hit.
    pub fn available_bytes(&self) -> usize {
        self.inner.budget.headroom(self.allocated_bytes())
    }

    pub fn budget(&self) -> MemoryBudget {
        self.inner.budget
    }

    pub fn alignment(&self) -> usize {
        self.inner.alignment
    }

    /// Returns a snapshot of pool statistics.
    pub fn stats(&self) -> AllocationStats {
        self.inner
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Drops every cached buffer. Buffers currently handed out are
    /// unaffected.
    pub fn shrink(&self) {
        if let Ok(mut cache) = self.inner.cache.lock() {
            cache.clear();
            self.inner.cached_bytes.store(0, Ordering::Release);
        }
    }

    /// Bytes held by cached, currently unused buffers.
    pub fn cached_bytes(&self) -> usize {
        self.inner.cached_bytes.load(Ordering::Acquire)
    }
}

/// Smallest power of two that is `>= size` and `>= MIN_SIZE_CLASS`.
fn size_class_for(size: usize) -> usize {
    size.max(MIN_SIZE_CLASS).next_power_of_two()
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("budget", &self.inner.budget)
            .field("alignment", &self.inner.alignment)
            .field("allocated_bytes", &self.allocated_bytes())
            .field("cached_bytes", &self.cached_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_drop() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let guard = pool.acquire(1024).unwrap();
        assert_eq!(pool.allocated_bytes(), 1024);
        assert_eq!(guard.size_bytes(), 1024);
        drop(guard);
        assert_eq!(pool.allocated_bytes(), 0);
    }

    #[test]
    fn test_alignment() {
        for align in [64, 256, 4096] {
            let pool = MemoryPool::with_alignment(MemoryBudget::from_mb(1), align);
            let ws = pool.acquire(100).unwrap();
            assert_eq!(ws.device_buffer().addr() % align as u64, 0);
            assert_eq!(ws.device_buffer().size_bytes(), 100);
        }
    }

    #[test]
    fn test_budget_enforced() {
        let pool = MemoryPool::new(MemoryBudget::from_bytes(1024));
        let _a = pool.acquire(512).unwrap();
        let _b = pool.acquire(512).unwrap();
        assert!(matches!(
            pool.acquire(1),
            Err(MemoryError::OutOfMemory {
                requested: 1,
                available: 0,
                limit: 1024
            })
        ));
        assert_eq!(pool.stats().oom_count, 1);
    }

    #[test]
    fn test_zero_size() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        assert!(matches!(pool.acquire(0), Err(MemoryError::ZeroSizedAllocation)));
    }

    #[test]
    fn test_steady_state_reuses_buffer() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        for _ in 0..5 {
            let ws = pool.acquire(6000).unwrap();
            drop(ws);
        }
        let stats = pool.stats();
        assert_eq!(stats.fresh, 1);
        assert_eq!(stats.reused, 4);
    }

    #[test]
    fn test_larger_class_serves_smaller_request() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        drop(pool.acquire(64 * 1024).unwrap());
        let _small = pool.acquire(100).unwrap();
        assert_eq!(pool.stats().reused, 1);
        assert_eq!(pool.cached_bytes(), 0);
    }

    #[test]
    fn test_shrink() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        drop(pool.acquire(8192).unwrap());
        assert!(pool.cached_bytes() > 0);
        pool.shrink();
        assert_eq!(pool.cached_bytes(), 0);
    }

    #[test]
    fn test_peak() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let a = pool.acquire(1000).unwrap();
        let b = pool.acquire(2000).unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.stats().peak_bytes, 3000);
    }

    #[test]
    fn test_size_class() {
        assert_eq!(size_class_for(1), MIN_SIZE_CLASS);
        assert_eq!(size_class_for(4096), 4096);
        assert_eq!(size_class_for(5000), 8192);
    }

    #[test]
    fn test_pool_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MemoryPool>();
    }
}
