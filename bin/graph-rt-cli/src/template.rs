// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Data-driven graph templates.
//!
//! A template is a TOML file describing a graph's input slots, node wiring
//! and per-step host parameters. Tensor IDs follow the graph's ID space:
//! inputs first, then outputs, then internals.

use anyhow::Context;
use op_graph::ops::{ElementwiseAdd, Linear, RmsNorm};
use op_graph::{GraphBuilder, KernelFactory, Node, OpGraph, OperationRef, Validated};
use plan_runtime::{FieldBinder, FieldKind, HostTensorBinder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tensor_core::{DType, Shape, TensorDesc};

/// Built-in template printed by `graph-rt template`.
pub const SAMPLE: &str = r#"# Decoder block: projection, residual add, RMS norm.
name = "decoder_block"
outputs = 1
internals = 2
param = '{"seqLen":[4],"layerId":0}'

[[input]]
name = "hidden"
dtype = "f32"
shape = [4, 8]

[[input]]
name = "weight"
dtype = "f32"
shape = [8, 8]

[[input]]
name = "seq_len"
dtype = "i32"
shape = [1]

[[input]]
name = "layer_id"
dtype = "i32"
shape = [1]

[[host]]
field = "seqLen"
slot = 2
kind = "vector"

[[host]]
field = "layerId"
slot = 3
kind = "scalar"

[[node]]
op = "linear"
inputs = [0, 1]
outputs = [5]

[[node]]
op = "add"
inputs = [5, 0]
outputs = [6]

[[node]]
op = "rms_norm"
inputs = [6]
outputs = [4]
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Linear,
    LinearTransposed,
    LinearBias,
    Add,
    RmsNorm,
    RmsNormGamma,
}

impl OpKind {
    fn instantiate(self, kernel: Arc<dyn KernelFactory>) -> OperationRef {
        match self {
            OpKind::Linear => Arc::new(Linear::new(kernel)),
            OpKind::LinearTransposed => Arc::new(Linear::new(kernel).transposed()),
            OpKind::LinearBias => Arc::new(Linear::new(kernel).with_bias()),
            OpKind::Add => Arc::new(ElementwiseAdd::new(kernel)),
            OpKind::RmsNorm => Arc::new(RmsNorm::new(kernel)),
            OpKind::RmsNormGamma => Arc::new(RmsNorm::with_gamma(kernel)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTemplate {
    #[serde(default)]
    pub name: String,
    pub dtype: String,
    pub shape: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeTemplate {
    pub op: OpKind,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
    /// Input viewed as `[rows, last_dim]` by this node.
    #[serde(default)]
    pub flatten_input: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    Scalar,
    Vector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTemplate {
    pub field: String,
    pub slot: usize,
    pub kind: HostKind,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphTemplate {
    pub name: String,
    pub outputs: usize,
    #[serde(default)]
    pub internals: usize,
    /// Parameter blob handed to host binders each step.
    #[serde(default)]
    pub param: String,
    #[serde(rename = "input")]
    pub inputs: Vec<SlotTemplate>,
    #[serde(default, rename = "host")]
    pub host: Vec<HostTemplate>,
    #[serde(rename = "node")]
    pub nodes: Vec<NodeTemplate>,
}

impl GraphTemplate {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read template '{}'", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in template '{}'", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Builds and validates the graph, backing every node with `kernel`.
    pub fn build(&self, kernel: Arc<dyn KernelFactory>) -> anyhow::Result<OpGraph<Validated>> {
        let mut builder = GraphBuilder::new(self.name.as_str())
            .inputs(self.inputs.len())
            .outputs(self.outputs)
            .internals(self.internals);
        for node in &self.nodes {
            let op = node.op.instantiate(kernel.clone());
            let mut built = Node::new(op, node.inputs.iter().copied(), node.outputs.iter().copied());
            if let Some(input) = node.flatten_input {
                built = built.with_reshape(input, Shape::flatten_to_matrix);
            }
            builder.push_node(built);
        }
        Ok(builder.build()?)
    }

    /// Descriptors of the declared input slots.
    pub fn input_descs(&self) -> anyhow::Result<Vec<TensorDesc>> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(i, slot)| -> anyhow::Result<TensorDesc> {
                let dtype = DType::from_str_loose(&slot.dtype)
                    .with_context(|| format!("input {i}: unknown dtype '{}'", slot.dtype))?;
                Ok(TensorDesc::new(dtype, Shape::try_new(slot.shape.clone())?))
            })
            .collect()
    }

    /// One binder covering every `[[host]]` entry, if there are any.
    pub fn binders(&self) -> Vec<Box<dyn HostTensorBinder>> {
        if self.host.is_empty() {
            return Vec::new();
        }
        let binder = self.host.iter().fold(FieldBinder::new(&self.name), |b, h| {
            let kind = match h.kind {
                HostKind::Scalar => FieldKind::Scalar,
                HostKind::Vector => FieldKind::Vector,
            };
            b.field(&h.field, h.slot, kind, h.required)
        });
        let binder: Box<dyn HostTensorBinder> = Box::new(binder);
        vec![binder]
    }

    /// Display label for input slot `i`.
    pub fn input_label(&self, i: usize) -> String {
        match self.inputs.get(i) {
            Some(slot) if !slot.name.is_empty() => format!("in{i} ({})", slot.name),
            _ => format!("in{i}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use op_graph::ops::NullKernel;
    use plan_runtime::VariantPack;
    use tensor_core::{HostData, Tensor};

    #[test]
    fn test_sample_parses_and_builds() {
        let t = GraphTemplate::from_toml(SAMPLE).unwrap();
        assert_eq!(t.name, "decoder_block");
        assert_eq!(t.inputs.len(), 4);
        assert_eq!(t.nodes[1].op, OpKind::Add);

        let graph = t.build(Arc::new(NullKernel)).unwrap();
        assert_eq!(graph.num_nodes(), 3);
        let out = graph.infer_shape(&t.input_descs().unwrap()).unwrap();
        assert_eq!(out[0].shape.dims(), &[4, 8]);
    }

    #[test]
    fn test_sample_binders() {
        let t = GraphTemplate::from_toml(SAMPLE).unwrap();
        let descs = t.input_descs().unwrap();
        let mut pack = VariantPack::new(descs.into_iter().map(Tensor::unbound).collect(), vec![])
            .with_param(t.param.clone());
        let mut binders = t.binders();
        plan_runtime::bind_host_tensors(&mut binders, &mut pack).unwrap();
        assert_eq!(pack.in_tensors[2].host, Some(HostData::I32(vec![4])));
        assert_eq!(pack.in_tensors[3].host, Some(HostData::I32(vec![0])));
    }

    #[test]
    fn test_flatten_input() {
        let text = r#"
name = "flat"
outputs = 1

[[input]]
dtype = "f32"
shape = [2, 3, 8]

[[input]]
dtype = "f32"
shape = [8, 4]

[[node]]
op = "linear"
inputs = [0, 1]
outputs = [2]
flatten_input = 0
"#;
        let t = GraphTemplate::from_toml(text).unwrap();
        let graph = t.build(Arc::new(NullKernel)).unwrap();
        let out = graph.infer_shape(&t.input_descs().unwrap()).unwrap();
        assert_eq!(out[0].shape.dims(), &[6, 4]);
        assert_eq!(t.input_label(0), "in0");
    }

    #[test]
    fn test_flatten_input_out_of_range_is_rejected() {
        let text = r#"
name = "flat"
outputs = 1

[[input]]
dtype = "f32"
shape = [2, 8]

[[input]]
dtype = "f32"
shape = [8, 4]

[[node]]
op = "linear"
inputs = [0, 1]
outputs = [2]
flatten_input = 5
"#;
        let t = GraphTemplate::from_toml(text).unwrap();
        let err = t.build(Arc::new(NullKernel)).unwrap_err();
        assert!(err.to_string().contains("reshape"), "{err}");
    }

    #[test]
    fn test_bad_wiring_is_rejected() {
        let text = SAMPLE.replace("outputs = [4]", "outputs = [9]");
        let t = GraphTemplate::from_toml(&text).unwrap();
        assert!(t.build(Arc::new(NullKernel)).is_err());
    }

    #[test]
    fn test_unknown_dtype() {
        let text = SAMPLE.replace("dtype = \"i32\"", "dtype = \"c64\"");
        let t = GraphTemplate::from_toml(&text).unwrap();
        assert!(t.input_descs().is_err());
    }
}
