// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-step binding of caller tensors.

use crate::RuntimeError;
use op_graph::ShapeError;
use tensor_core::{Tensor, TensorDesc, MAX_RANK};

/// The tensors and parameter blob a caller hands to Setup and Execute.
///
/// The caller owns every buffer named here. A plan copies descriptors and
/// buffer handles out of the pack and drops its copies of the handles at
/// the end of each Execute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantPack {
    pub in_tensors: Vec<Tensor>,
    pub out_tensors: Vec<Tensor>,
    /// Opaque parameter blob, parsed by host tensor binders.
    pub param: String,
}

impl VariantPack {
    pub fn new(in_tensors: Vec<Tensor>, out_tensors: Vec<Tensor>) -> Self {
        Self {
            in_tensors,
            out_tensors,
            param: String::new(),
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = param.into();
        self
    }

    /// Descriptors of the input tensors, in slot order.
    pub fn input_descs(&self) -> Vec<TensorDesc> {
        self.in_tensors.iter().map(|t| t.desc.clone()).collect()
    }

    /// Rejects descriptors no plan can hold: ranks above [`MAX_RANK`] and
    /// byte sizes that overflow `usize`.
    pub(crate) fn check_descs(&self) -> Result<(), RuntimeError> {
        let slots = self
            .in_tensors
            .iter()
            .enumerate()
            .map(|(i, t)| ("input", i, t))
            .chain(self.out_tensors.iter().enumerate().map(|(i, t)| ("output", i, t)));
        for (side, i, t) in slots {
            let rank = t.desc.shape.rank();
            if rank > MAX_RANK {
                return Err(RuntimeError::PackShape {
                    slot: format!("{side} {i}"),
                    source: ShapeError::RankTooLarge { rank, max: MAX_RANK },
                });
            }
            if t.desc.checked_size_bytes().is_none() {
                return Err(RuntimeError::SizeOverflow {
                    what: format!("{side} {i}"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tensor_core::{DType, Shape};

    fn unbound(dims: Vec<usize>) -> Tensor {
        Tensor::unbound(TensorDesc::new(DType::F32, Shape::new(dims)))
    }

    #[test]
    fn test_check_descs_accepts_max_rank() {
        let pack = VariantPack::new(vec![unbound(vec![1; MAX_RANK])], vec![unbound(vec![2, 3])]);
        assert!(pack.check_descs().is_ok());
    }

    #[test]
    fn test_check_descs_rejects_rank_above_max() {
        let pack = VariantPack::new(vec![unbound(vec![2, 3])], vec![unbound(vec![1; MAX_RANK + 1])]);
        let err = pack.check_descs().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
        assert_eq!(err.to_string(), "variant pack output 0: rank 9 exceeds the maximum of 8");
    }

    #[test]
    fn test_check_descs_rejects_overflowing_size() {
        let pack = VariantPack::new(vec![unbound(vec![1 << 40, 1 << 30])], vec![]);
        let err = pack.check_descs().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(matches!(err, RuntimeError::SizeOverflow { ref what } if what == "input 0"));
    }
}
