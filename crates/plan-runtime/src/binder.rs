// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host tensor binders: per-step parameters into host-resident inputs.
//!
//! A decode step carries small integer parameters (sequence lengths, token
//! offsets, the layer index) that kernels read from host memory. The caller
//! serialises them into [`VariantPack::param`] as JSON; a binder parses the
//! blob and attaches the values to input slots, rewriting each slot's
//! descriptor to match. Device buffers already bound to those slots are
//! left as they are.
//!
//! ```
//! use plan_runtime::{DecoderStepBinder, HostTensorBinder, VariantPack};
//! use tensor_core::{DType, Shape, Tensor, TensorDesc};
//!
//! let placeholder = || Tensor::unbound(TensorDesc::new(DType::I32, Shape::vector(1)));
//! let mut pack = VariantPack::new(vec![placeholder(), placeholder()], vec![])
//!     .with_param(r#"{"seqLen":[3,3],"layerId":2}"#);
//!
//! let mut binder = DecoderStepBinder::new(0, 1);
//! binder.parse_param(&pack.param).unwrap();
//! binder.bind_tensor(&mut pack).unwrap();
//! assert_eq!(pack.in_tensors[0].desc.shape.dims(), &[2]);
//! ```

use crate::{RuntimeError, VariantPack};
use serde::Deserialize;
use serde_json::Value;
use tensor_core::HostData;

/// Parses a parameter blob and binds the values into a variant pack.
pub trait HostTensorBinder: Send {
    fn name(&self) -> &str;

    /// Parses `param`, replacing any previously parsed values.
    fn parse_param(&mut self, param: &str) -> Result<(), RuntimeError>;

    /// Attaches the parsed values to the pack's input slots. On error the
    /// pack is left unchanged.
    fn bind_tensor(&self, pack: &mut VariantPack) -> Result<(), RuntimeError>;
}

/// Runs every binder over `pack.param`, in order.
///
/// All parameters are parsed before any slot is written. If a binder fails
/// to bind, the input slots are restored to their state before the call.
pub fn bind_host_tensors(
    binders: &mut [Box<dyn HostTensorBinder>],
    pack: &mut VariantPack,
) -> Result<(), RuntimeError> {
    for binder in binders.iter_mut() {
        binder.parse_param(&pack.param)?;
    }
    let saved = pack.in_tensors.clone();
    for binder in binders.iter() {
        if let Err(e) = binder.bind_tensor(pack) {
            pack.in_tensors = saved;
            return Err(e);
        }
    }
    Ok(())
}

/// Writes `(slot, values)` pairs once every slot is known to exist.
fn bind_slots(
    binder: &str,
    pack: &mut VariantPack,
    writes: &[(usize, &[i32])],
) -> Result<(), RuntimeError> {
    let inputs = pack.in_tensors.len();
    if let Some(&(slot, _)) = writes.iter().find(|(slot, _)| *slot >= inputs) {
        return Err(RuntimeError::BinderMismatch {
            binder: binder.to_string(),
            slot,
            inputs,
        });
    }
    for &(slot, values) in writes {
        pack.in_tensors[slot].bind_host(HostData::I32(values.to_vec()));
        tracing::debug!(binder, slot, len = values.len(), "host tensor bound");
    }
    Ok(())
}

fn not_parsed(binder: &str) -> RuntimeError {
    RuntimeError::State(format!("binder '{binder}' has no parsed parameters"))
}

// ── DecoderStepBinder ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecoderStepParam {
    seq_len: Vec<i32>,
    #[serde(default)]
    token_offset: Option<Vec<i32>>,
    layer_id: i32,
}

/// Binds the decode-step parameters of a transformer layer.
///
/// Expects `{"seqLen": [..], "layerId": n}` with an optional
/// `"tokenOffset": [..]`. `seqLen` goes to its slot as a 1-D tensor and
/// `layerId` as a 1-element tensor. `tokenOffset` is bound only when a
/// slot was configured for it.
#[derive(Debug, Clone)]
pub struct DecoderStepBinder {
    seq_len_slot: usize,
    layer_id_slot: usize,
    token_offset_slot: Option<usize>,
    parsed: Option<DecoderStepParam>,
}

impl DecoderStepBinder {
    pub fn new(seq_len_slot: usize, layer_id_slot: usize) -> Self {
        Self {
            seq_len_slot,
            layer_id_slot,
            token_offset_slot: None,
            parsed: None,
        }
    }

    pub fn with_token_offset(mut self, slot: usize) -> Self {
        self.token_offset_slot = Some(slot);
        self
    }
}

impl HostTensorBinder for DecoderStepBinder {
    fn name(&self) -> &str {
        "decoder_step"
    }

    fn parse_param(&mut self, param: &str) -> Result<(), RuntimeError> {
        self.parsed = None;
        let parsed: DecoderStepParam = serde_json::from_str(param)
            .map_err(|e| RuntimeError::Config(format!("decoder step parameters: {e}")))?;
        if parsed.seq_len.is_empty() {
            return Err(RuntimeError::Config(
                "decoder step parameters: seqLen is empty".into(),
            ));
        }
        self.parsed = Some(parsed);
        Ok(())
    }

    fn bind_tensor(&self, pack: &mut VariantPack) -> Result<(), RuntimeError> {
        let parsed = self.parsed.as_ref().ok_or_else(|| not_parsed(self.name()))?;
        let layer_id = [parsed.layer_id];
        let mut writes = vec![
            (self.seq_len_slot, parsed.seq_len.as_slice()),
            (self.layer_id_slot, layer_id.as_slice()),
        ];
        if let (Some(slot), Some(offsets)) = (self.token_offset_slot, &parsed.token_offset) {
            writes.push((slot, offsets.as_slice()));
        }
        bind_slots(self.name(), pack, &writes)
    }
}

// ── FieldBinder ────────────────────────────────────────────────────

/// How a JSON field maps onto a host tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// An integer, bound as a 1-element tensor.
    Scalar,
    /// An array of integers, bound as a 1-D tensor.
    Vector,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: String,
    pub slot: usize,
    pub kind: FieldKind,
    /// Missing optional fields leave their slot untouched.
    pub required: bool,
}

/// A table-driven binder: each named top-level field of a JSON object goes
/// to one input slot.
#[derive(Debug, Clone)]
pub struct FieldBinder {
    name: String,
    specs: Vec<FieldSpec>,
    values: Option<Vec<Option<Vec<i32>>>>,
}

impl FieldBinder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            specs: Vec::new(),
            values: None,
        }
    }

    pub fn scalar(self, field: &str, slot: usize) -> Self {
        self.field(field, slot, FieldKind::Scalar, true)
    }

    pub fn vector(self, field: &str, slot: usize) -> Self {
        self.field(field, slot, FieldKind::Vector, true)
    }

    pub fn field(mut self, field: &str, slot: usize, kind: FieldKind, required: bool) -> Self {
        self.specs.push(FieldSpec {
            field: field.to_string(),
            slot,
            kind,
            required,
        });
        self
    }

    pub fn specs(&self) -> &[FieldSpec] {
        &self.specs
    }

    fn config_error(&self, detail: String) -> RuntimeError {
        RuntimeError::Config(format!("binder '{}': {detail}", self.name))
    }

    fn to_i32(&self, field: &str, v: &Value) -> Result<i32, RuntimeError> {
        v.as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(|| self.config_error(format!("'{field}' holds {v}, expected a 32-bit integer")))
    }

    fn extract(&self, spec: &FieldSpec, v: &Value) -> Result<Vec<i32>, RuntimeError> {
        match spec.kind {
            FieldKind::Scalar => Ok(vec![self.to_i32(&spec.field, v)?]),
            FieldKind::Vector => v
                .as_array()
                .ok_or_else(|| self.config_error(format!("'{}' is not an array", spec.field)))?
                .iter()
                .map(|x| self.to_i32(&spec.field, x))
                .collect(),
        }
    }
}

impl HostTensorBinder for FieldBinder {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse_param(&mut self, param: &str) -> Result<(), RuntimeError> {
        self.values = None;
        let root: Value = serde_json::from_str(param)
            .map_err(|e| self.config_error(format!("invalid JSON: {e}")))?;
        let object = root
            .as_object()
            .ok_or_else(|| self.config_error("parameters are not a JSON object".into()))?;

        let mut values = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            match object.get(&spec.field) {
                Some(v) => values.push(Some(self.extract(spec, v)?)),
                None if spec.required => {
                    return Err(self.config_error(format!("missing field '{}'", spec.field)))
                }
                None => values.push(None),
            }
        }
        self.values = Some(values);
        Ok(())
    }

    fn bind_tensor(&self, pack: &mut VariantPack) -> Result<(), RuntimeError> {
        let values = self.values.as_ref().ok_or_else(|| not_parsed(&self.name))?;
        let writes: Vec<(usize, &[i32])> = self
            .specs
            .iter()
            .zip(values)
            .filter_map(|(spec, v)| v.as_deref().map(|v| (spec.slot, v)))
            .collect();
        bind_slots(&self.name, pack, &writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tensor_core::{DType, DeviceBuffer, Shape, Tensor, TensorDesc};

    fn pack(param: &str) -> VariantPack {
        let seq = Tensor::on_device(
            TensorDesc::new(DType::I32, Shape::vector(8)),
            DeviceBuffer::new(0x100, 32),
        );
        let layer = Tensor::unbound(TensorDesc::new(DType::I32, Shape::vector(1)));
        VariantPack::new(vec![seq, layer], vec![]).with_param(param)
    }

    #[test]
    fn test_decoder_step_binds_values() {
        let mut p = pack(r#"{"seqLen":[3,3],"layerId":2}"#);
        let mut binder = DecoderStepBinder::new(0, 1);
        binder.parse_param(&p.param).unwrap();
        binder.bind_tensor(&mut p).unwrap();

        assert_eq!(p.in_tensors[0].host, Some(HostData::I32(vec![3, 3])));
        assert_eq!(p.in_tensors[0].desc.shape.dims(), &[2]);
        assert_eq!(p.in_tensors[1].host, Some(HostData::I32(vec![2])));
        // Device buffers stay bound.
        assert_eq!(p.in_tensors[0].device, Some(DeviceBuffer::new(0x100, 32)));
        assert_eq!(p.in_tensors[1].device, None);
    }

    #[test]
    fn test_decoder_step_token_offset() {
        let mut p = pack(r#"{"seqLen":[1],"tokenOffset":[7],"layerId":0}"#);
        p.in_tensors.push(Tensor::unbound(TensorDesc::new(DType::I32, Shape::vector(1))));
        let mut binder = DecoderStepBinder::new(0, 1).with_token_offset(2);
        binder.parse_param(&p.param).unwrap();
        binder.bind_tensor(&mut p).unwrap();
        assert_eq!(p.in_tensors[2].host, Some(HostData::I32(vec![7])));
    }

    #[test]
    fn test_decoder_step_rejects_bad_params() {
        let mut binder = DecoderStepBinder::new(0, 1);
        for bad in ["not json", r#"{"seqLen":[1]}"#, r#"{"seqLen":[],"layerId":1}"#] {
            let err = binder.parse_param(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config, "{bad}");
        }
    }

    #[test]
    fn test_bind_before_parse() {
        let binder = DecoderStepBinder::new(0, 1);
        let err = binder.bind_tensor(&mut pack("{}")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn test_slot_out_of_range() {
        let mut p = pack(r#"{"seqLen":[3],"layerId":2}"#);
        let mut binder = DecoderStepBinder::new(0, 5);
        binder.parse_param(&p.param).unwrap();
        let err = binder.bind_tensor(&mut p).unwrap_err();
        assert!(matches!(err, RuntimeError::BinderMismatch { slot: 5, inputs: 2, .. }));
    }

    #[test]
    fn test_slot_mismatch_leaves_pack_unchanged() {
        let original = pack(r#"{"seqLen":[3,3],"layerId":2}"#);
        let mut p = original.clone();
        let mut binder = DecoderStepBinder::new(0, 5);
        binder.parse_param(&p.param).unwrap();
        assert!(binder.bind_tensor(&mut p).is_err());
        assert_eq!(p, original);

        let mut binder = FieldBinder::new("custom").vector("seqLen", 0).scalar("layerId", 7);
        binder.parse_param(&p.param).unwrap();
        assert!(binder.bind_tensor(&mut p).is_err());
        assert_eq!(p, original);
    }

    #[test]
    fn test_bind_host_tensors_restores_on_failure() {
        let original = pack(r#"{"seqLen":[2,2],"layerId":1,"extra":3}"#);
        let mut p = original.clone();
        let mut binders: Vec<Box<dyn HostTensorBinder>> = vec![
            Box::new(DecoderStepBinder::new(0, 1)),
            Box::new(FieldBinder::new("extra").scalar("extra", 4)),
        ];
        let err = bind_host_tensors(&mut binders, &mut p).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Arity);
        assert_eq!(p, original);
    }

    #[test]
    fn test_field_binder() {
        let mut p = pack(r#"{"lens":[4,5,6],"layer":9}"#);
        let mut binder = FieldBinder::new("custom")
            .vector("lens", 0)
            .scalar("layer", 1)
            .field("offsets", 2, FieldKind::Vector, false);
        binder.parse_param(&p.param).unwrap();
        binder.bind_tensor(&mut p).unwrap();
        assert_eq!(p.in_tensors[0].host, Some(HostData::I32(vec![4, 5, 6])));
        assert_eq!(p.in_tensors[1].host, Some(HostData::I32(vec![9])));
        assert_eq!(binder.specs().len(), 3);
    }

    #[test]
    fn test_field_binder_type_errors() {
        let mut binder = FieldBinder::new("custom").scalar("layer", 0);
        assert!(binder.parse_param(r#"{"layer":"two"}"#).is_err());
        assert!(binder.parse_param(r#"{"layer":4294967296}"#).is_err());
        assert!(binder.parse_param("[1,2]").is_err());
        assert!(binder.parse_param("{}").is_err());
    }

    #[test]
    fn test_bind_host_tensors_runs_all() {
        let mut p = pack(r#"{"seqLen":[2,2],"layerId":1,"extra":3}"#);
        p.in_tensors.push(Tensor::unbound(TensorDesc::new(DType::I32, Shape::vector(1))));
        let mut binders: Vec<Box<dyn HostTensorBinder>> = vec![
            Box::new(DecoderStepBinder::new(0, 1)),
            Box::new(FieldBinder::new("extra").scalar("extra", 2)),
        ];
        bind_host_tensors(&mut binders, &mut p).unwrap();
        assert_eq!(p.in_tensors[2].host, Some(HostData::I32(vec![3])));
        assert_eq!(p.in_tensors[1].host, Some(HostData::I32(vec![1])));
    }
}
