// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Offset allocator for planning a workspace arena.
//!
//! The [`ArenaAllocator`] never touches memory. It hands out byte ranges
//! inside a conceptual arena so a plan can lay out every internal tensor
//! ahead of execution, then reports the high-water mark as the workspace
//! size.
//!
//! # Strategy
//!
//! ```text
//! allocate(n):
//!   1. first free block with size >= n  ──► carve from its front
//!   2. free block touching the arena end ──► extend it
//!   3. otherwise                         ──► bump the arena end
//! release(r):
//!   insert into the sorted free list, merging with adjacent blocks
//! ```
//!
//! Every size is rounded up to the allocator's alignment, so every offset
//! it returns is aligned too.

use crate::MemoryError;
use std::collections::BTreeMap;
use std::fmt;

/// A byte range `[offset, offset + size)` inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct Region {
    pub offset: usize,
    pub size: usize,
}

impl Region {
    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// One past the last byte.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// Returns `true` if the two regions share at least one byte.
    pub fn overlaps(&self, other: &Region) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

/// Rounds `n` up to a multiple of `align`, or `None` if the result does not
/// fit in `usize`. `align` must be a power of two.
pub fn align_up(n: usize, align: usize) -> Option<usize> {
    let align = align.max(1);
    Some(n.checked_add(align - 1)? & !(align - 1))
}

/// First-fit offset allocator with a coalescing free list.
#[derive(Debug, Clone)]
pub struct ArenaAllocator {
    alignment: usize,
    /// Free blocks, sorted by offset, never adjacent to one another.
    free: Vec<Region>,
    /// Live allocations: offset → size.
    live: BTreeMap<usize, usize>,
    live_bytes: usize,
    high_water: usize,
}

impl ArenaAllocator {
    /// Creates an empty arena. A non-power-of-two alignment is rounded up.
    pub fn new(alignment: usize) -> Self {
        Self {
            alignment: alignment.max(1).next_power_of_two(),
            free: Vec::new(),
            live: BTreeMap::new(),
            live_bytes: 0,
            high_water: 0,
        }
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Reserves `size` bytes (rounded up to the alignment).
    pub fn allocate(&mut self, size: usize) -> Result<Region, MemoryError> {
        if size == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }
        let overflow = MemoryError::SizeOverflow { size };
        let size = align_up(size, self.alignment).ok_or(overflow.clone())?;

        let region = if let Some(i) = self.free.iter().position(|b| b.size >= size) {
            let block = self.free[i];
            if block.size == size {
                self.free.remove(i);
            } else {
                self.free[i] = Region::new(block.offset + size, block.size - size);
            }
            Region::new(block.offset, size)
        } else if let Some(tail) = self.free.last().copied().filter(|b| b.end() == self.high_water) {
            self.high_water = tail.offset.checked_add(size).ok_or(overflow)?;
            self.free.pop();
            Region::new(tail.offset, size)
        } else {
            let offset = self.high_water;
            self.high_water = offset.checked_add(size).ok_or(overflow)?;
            Region::new(offset, size)
        };

        self.live.insert(region.offset, region.size);
        self.live_bytes += region.size;
        Ok(region)
    }

    /// Returns a region to the free list.
    ///
    /// # Errors
    /// [`MemoryError::DoubleFree`] if the region is not a live allocation.
    pub fn release(&mut self, region: Region) -> Result<(), MemoryError> {
        match self.live.get(&region.offset) {
            Some(&size) if size == region.size => {}
            _ => {
                return Err(MemoryError::DoubleFree {
                    offset: region.offset,
                    size: region.size,
                })
            }
        }
        self.live.remove(&region.offset);
        self.live_bytes -= region.size;

        let at = self.free.partition_point(|b| b.offset < region.offset);
        self.free.insert(at, region);

        // Merge with the right neighbour, then the left.
        if at + 1 < self.free.len() && self.free[at].end() == self.free[at + 1].offset {
            self.free[at].size += self.free[at + 1].size;
            self.free.remove(at + 1);
        }
        if at > 0 && self.free[at - 1].end() == self.free[at].offset {
            self.free[at - 1].size += self.free[at].size;
            self.free.remove(at);
        }
        Ok(())
    }

    /// Arena size needed to hold every allocation made so far.
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Bytes currently allocated.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    /// Number of free blocks (fragmentation indicator).
    pub fn free_blocks(&self) -> usize {
        self.free.len()
    }

    /// Forgets every allocation and resets the high-water mark.
    pub fn reset(&mut self) {
        self.free.clear();
        self.live.clear();
        self.live_bytes = 0;
        self.high_water = 0;
    }
}
