// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor-ID space.
//!
//! A graph numbers its tensors in one contiguous range split into three
//! regions, in this order:
//!
//! ```text
//! [0, in)                 graph inputs
//! [in, in + out)          graph outputs
//! [in + out, total)       internal tensors
//! ```
//!
//! Node wiring uses raw [`TensorId`]s. Everything downstream of validation
//! works with [`TensorRef`], which names the region explicitly, so a slot
//! lookup can never silently land in the wrong array.

use std::fmt;

/// A raw tensor ID as written in node wiring.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct TensorId(pub usize);

impl From<usize> for TensorId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A resolved tensor reference: region plus index within that region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TensorRef {
    Input(usize),
    Output(usize),
    Internal(usize),
}

impl TensorRef {
    /// Returns the internal index, if this is an internal tensor.
    pub fn internal(self) -> Option<usize> {
        match self {
            TensorRef::Internal(i) => Some(i),
            _ => None,
        }
    }

    /// Returns `true` for graph inputs.
    pub fn is_input(self) -> bool {
        matches!(self, TensorRef::Input(_))
    }
}

impl fmt::Display for TensorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorRef::Input(i) => write!(f, "in{i}"),
            TensorRef::Output(i) => write!(f, "out{i}"),
            TensorRef::Internal(i) => write!(f, "t{i}"),
        }
    }
}

/// Declared tensor counts of a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TensorSpace {
    pub inputs: usize,
    pub outputs: usize,
    pub internals: usize,
}

impl TensorSpace {
    pub fn new(inputs: usize, outputs: usize, internals: usize) -> Self {
        Self {
            inputs,
            outputs,
            internals,
        }
    }

    /// Total number of IDs in the space.
    pub fn total(&self) -> usize {
        self.inputs + self.outputs + self.internals
    }

    /// Resolves a raw ID into its region, or `None` if out of range.
    ///
    /// # Examples
    /// ```
    /// use op_graph::{TensorId, TensorRef, TensorSpace};
    /// let space = TensorSpace::new(2, 1, 2);
    /// assert_eq!(space.resolve(TensorId(1)), Some(TensorRef::Input(1)));
    /// assert_eq!(space.resolve(TensorId(2)), Some(TensorRef::Output(0)));
    /// assert_eq!(space.resolve(TensorId(4)), Some(TensorRef::Internal(1)));
    /// assert_eq!(space.resolve(TensorId(5)), None);
    /// ```
    pub fn resolve(&self, id: TensorId) -> Option<TensorRef> {
        let raw = id.0;
        if raw < self.inputs {
            Some(TensorRef::Input(raw))
        } else if raw < self.inputs + self.outputs {
            Some(TensorRef::Output(raw - self.inputs))
        } else if raw < self.total() {
            Some(TensorRef::Internal(raw - self.inputs - self.outputs))
        } else {
            None
        }
    }

    /// Inverse of [`TensorSpace::resolve`].
    pub fn id_of(&self, tensor: TensorRef) -> TensorId {
        match tensor {
            TensorRef::Input(i) => TensorId(i),
            TensorRef::Output(i) => TensorId(self.inputs + i),
            TensorRef::Internal(i) => TensorId(self.inputs + self.outputs + i),
        }
    }
}

impl fmt::Display for TensorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in / {} out / {} internal",
            self.inputs, self.outputs, self.internals
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_round_trip_all_ids() {
        let space = TensorSpace::new(3, 2, 4);
        for raw in 0..space.total() {
            let r = space.resolve(TensorId(raw)).unwrap();
            assert_eq!(space.id_of(r), TensorId(raw));
        }
    }

    #[test]
    fn test_empty_regions() {
        let space = TensorSpace::new(1, 1, 0);
        assert_eq!(space.resolve(TensorId(1)), Some(TensorRef::Output(0)));
        assert_eq!(space.resolve(TensorId(2)), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(TensorRef::Internal(3).to_string(), "t3");
        assert_eq!(TensorSpace::new(2, 1, 2).to_string(), "2 in / 1 out / 2 internal");
    }
}
