// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII workspace buffer that returns itself to the pool on drop.
//!
//! A plan only ever sees the [`DeviceBuffer`] handle of a workspace. The
//! guard owns the backing store, so the handle stays valid exactly as long
//! as the guard is alive.

use crate::pool::PoolInner;
use std::sync::Arc;
use tensor_core::DeviceBuffer;

/// An aligned workspace buffer borrowed from a [`MemoryPool`](crate::MemoryPool).
///
/// # Example
/// ```
/// use memory_manager::{MemoryBudget, MemoryPool};
///
/// let pool = MemoryPool::new(MemoryBudget::from_mb(1));
/// let ws = pool.acquire(256).unwrap();
/// let handle = ws.device_buffer();
/// assert_eq!(handle.size_bytes(), 256);
/// drop(ws); // handle must not be used past this point
/// ```
pub struct BufferGuard {
    backing: Vec<u8>,
    /// Padding in front of the aligned start.
    pad: usize,
    pool: Arc<PoolInner>,
    size_bytes: usize,
}

impl BufferGuard {
    pub(crate) fn new(backing: Vec<u8>, pool: Arc<PoolInner>, size_bytes: usize) -> Self {
        let align = pool.alignment();
        let addr = backing.as_ptr() as usize;
        let pad = (align - addr % align) % align;
        Self {
            backing,
            pad,
            pool,
            size_bytes,
        }
    }

    /// Usable size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// The buffer as an opaque device handle.
    pub fn device_buffer(&self) -> DeviceBuffer {
        let addr = self.backing.as_ptr() as u64 + self.pad as u64;
        DeviceBuffer::new(addr, self.size_bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.backing[self.pad..self.pad + self.size_bytes]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.backing[self.pad..self.pad + self.size_bytes]
    }
}

impl Drop for BufferGuard {
    fn drop(&mut self) {
        let backing = std::mem::take(&mut self.backing);
        self.pool.return_buffer(backing, self.size_bytes);
    }
}

impl std::fmt::Debug for BufferGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferGuard")
            .field("size_bytes", &self.size_bytes)
            .field("device", &self.device_buffer())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{MemoryBudget, MemoryPool};

    #[test]
    fn test_slice_matches_handle() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let mut ws = pool.acquire(300).unwrap();
        ws.as_mut_slice().fill(0xAB);
        assert_eq!(ws.as_slice().len(), 300);
        assert_eq!(
            ws.as_slice().as_ptr() as u64,
            ws.device_buffer().addr()
        );
    }

    #[test]
    fn test_reused_buffer_keeps_alignment() {
        let pool = MemoryPool::with_alignment(MemoryBudget::from_mb(1), 512);
        drop(pool.acquire(5000).unwrap());
        let ws = pool.acquire(5000).unwrap();
        assert_eq!(ws.device_buffer().addr() % 512, 0);
    }
}
