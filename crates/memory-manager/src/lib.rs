// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Workspace memory for compiled plans, in two halves:
//!
//! - **Planning.** [`ArenaAllocator`] lays out internal tensors as
//!   [`Region`]s of a conceptual arena while a plan is set up. Regions of
//!   tensors whose lifetimes do not overlap may share bytes; the arena's
//!   high-water mark becomes the plan's workspace size.
//! - **Provisioning.** [`MemoryPool`] hands out aligned workspace buffers
//!   of that size within a [`MemoryBudget`], caching them between steps.
//!   Each buffer is wrapped in a [`BufferGuard`] that returns it on drop.
//!
//! # Ownership Model
//!
//! ```text
//! MemoryPool::acquire(size)
//!       │
//!       ▼
//!   BufferGuard  ◄─── owns the backing store, holds Arc<PoolInner>
//!       │  .device_buffer()  ──► DeviceBuffer handle passed to Execute
//!       │
//!       │  drop()
//!       ▼
//!   PoolInner::return_buffer()  ──► size-class cache
//! ```
//!
//! # Example
//! ```
//! use memory_manager::{ArenaAllocator, MemoryBudget, MemoryPool};
//!
//! let mut arena = ArenaAllocator::new(64);
//! let a = arena.allocate(128).unwrap();
//! arena.release(a).unwrap();
//! let b = arena.allocate(128).unwrap();
//! assert_eq!(a.offset, b.offset);
//!
//! let pool = MemoryPool::new(MemoryBudget::from_mb(1));
//! let ws = pool.acquire(arena.high_water()).unwrap();
//! assert_eq!(ws.device_buffer().size_bytes(), 128);
//! ```

pub mod arena;
mod budget;
mod error;
mod guard;
pub mod pool;
mod stats;

pub use arena::{align_up, ArenaAllocator, Region};
pub use budget::MemoryBudget;
pub use error::MemoryError;
pub use guard::BufferGuard;
pub use pool::MemoryPool;
pub use stats::AllocationStats;
