// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for workspace planning and pooling.

/// Errors raised by the arena planner, the budget parser and the pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// A workspace buffer would push the pool past its limit.
    #[error("workspace of {requested} bytes exceeds the pool: {available} of {limit} bytes free")]
    OutOfMemory {
        requested: usize,
        available: usize,
        limit: usize,
    },

    #[error("zero-sized workspace region")]
    ZeroSizedAllocation,

    #[error("invalid workspace limit '{input}': {reason}")]
    InvalidBudget { input: String, reason: String },

    /// A size, once aligned or placed, does not fit in `usize`.
    #[error("workspace size overflows usize (request of {size} bytes)")]
    SizeOverflow { size: usize },

    /// Released a region the arena does not hold.
    #[error("region {offset}+{size} released twice or never allocated")]
    DoubleFree { offset: usize, size: usize },
}
