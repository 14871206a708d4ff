// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor descriptors and buffers.

/// Errors that can occur when constructing descriptors or slicing buffers.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// The shape has more dimensions than [`crate::MAX_RANK`].
    #[error("rank {rank} exceeds the maximum of {max}")]
    RankTooLarge { rank: usize, max: usize },

    /// A sub-region does not fit inside its parent buffer.
    #[error("region [{offset}, {offset}+{len}) is outside a buffer of {size} bytes")]
    RegionOutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    /// Host data length disagrees with the descriptor's element count.
    #[error("host data holds {actual} elements, descriptor expects {expected}")]
    HostDataMismatch { expected: usize, actual: usize },
}
