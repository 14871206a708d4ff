// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Lifetime analysis of internal tensors.
//!
//! For each internal tensor the plan records the node that first writes it
//! and the last node that touches it (reads or writes). Once that last node
//! has been launched, the tensor's workspace region may be handed to a later
//! tensor.

use op_graph::TensorRef;

/// Producer and last-use node of every internal tensor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TensorLifetimes {
    producer: Vec<Option<usize>>,
    max_node: Vec<Option<usize>>,
    /// node → internal tensors whose last use is that node.
    dies_after: Vec<Vec<usize>>,
}

impl TensorLifetimes {
    /// Scans nodes in order, given each node's resolved inputs and outputs.
    pub fn compute<'a, I>(internals: usize, nodes: I) -> Self
    where
        I: IntoIterator<Item = (&'a [TensorRef], &'a [TensorRef])>,
    {
        let mut producer = vec![None; internals];
        let mut max_node = vec![None; internals];
        let mut num_nodes = 0;

        for (idx, (inputs, outputs)) in nodes.into_iter().enumerate() {
            num_nodes = idx + 1;
            for t in inputs.iter().filter_map(|r| r.internal()) {
                max_node[t] = Some(idx);
            }
            for t in outputs.iter().filter_map(|r| r.internal()) {
                producer[t].get_or_insert(idx);
                max_node[t] = Some(idx);
            }
        }

        let mut dies_after = vec![Vec::new(); num_nodes];
        for (t, last) in max_node.iter().enumerate() {
            if let Some(node) = last {
                dies_after[*node].push(t);
            }
        }

        Self {
            producer,
            max_node,
            dies_after,
        }
    }

    /// Number of internal tensors tracked.
    pub fn len(&self) -> usize {
        self.producer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producer.is_empty()
    }

    /// Node that first writes internal tensor `t`.
    pub fn producer(&self, t: usize) -> Option<usize> {
        self.producer.get(t).copied().flatten()
    }

    /// Last node that reads or writes internal tensor `t`.
    pub fn tensor_max_node(&self, t: usize) -> Option<usize> {
        self.max_node.get(t).copied().flatten()
    }

    /// Internal tensors whose region is free once `node` has been launched.
    pub fn dies_after(&self, node: usize) -> &[usize] {
        self.dies_after.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns `true` if the live ranges of two internal tensors intersect.
    pub fn overlaps(&self, a: usize, b: usize) -> bool {
        match (
            self.producer(a),
            self.tensor_max_node(a),
            self.producer(b),
            self.tensor_max_node(b),
        ) {
            (Some(a0), Some(a1), Some(b0), Some(b1)) => a0 <= b1 && b0 <= a1,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TensorRef::{Input, Internal, Output};

    /// linear(in0, in1) -> t0; add(t0, in0) -> t1; norm(t1) -> out0
    fn block() -> TensorLifetimes {
        let wiring = [
            (vec![Input(0), Input(1)], vec![Internal(0)]),
            (vec![Internal(0), Input(0)], vec![Internal(1)]),
            (vec![Internal(1)], vec![Output(0)]),
        ];
        TensorLifetimes::compute(
            2,
            wiring.iter().map(|(i, o)| (i.as_slice(), o.as_slice())),
        )
    }

    #[test]
    fn test_producer_and_max_node() {
        let l = block();
        assert_eq!(l.len(), 2);
        assert_eq!(l.producer(0), Some(0));
        assert_eq!(l.tensor_max_node(0), Some(1));
        assert_eq!(l.producer(1), Some(1));
        assert_eq!(l.tensor_max_node(1), Some(2));
    }

    #[test]
    fn test_dies_after() {
        let l = block();
        assert!(l.dies_after(0).is_empty());
        assert_eq!(l.dies_after(1), &[0]);
        assert_eq!(l.dies_after(2), &[1]);
        assert!(l.dies_after(9).is_empty());
    }

    #[test]
    fn test_overlap() {
        let l = block();
        assert!(l.overlaps(0, 1));

        let wiring = [
            (vec![Input(0)], vec![Internal(0)]),
            (vec![Internal(0)], vec![Output(0)]),
            (vec![Input(0)], vec![Internal(1)]),
            (vec![Internal(1)], vec![Output(1)]),
        ];
        let l = TensorLifetimes::compute(
            2,
            wiring.iter().map(|(i, o)| (i.as_slice(), o.as_slice())),
        );
        assert!(!l.overlaps(0, 1));
    }

    #[test]
    fn test_untouched_internal() {
        let wiring = [(vec![Input(0)], vec![Output(0)])];
        let l = TensorLifetimes::compute(
            1,
            wiring.iter().map(|(i, o)| (i.as_slice(), o.as_slice())),
        );
        assert_eq!(l.producer(0), None);
        assert!(!l.overlaps(0, 0));
    }
}
