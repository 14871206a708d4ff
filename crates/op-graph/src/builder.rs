// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fluent construction of operation graphs.

use crate::graph::{GraphShapeFn, Node, OpGraph, Validated};
use crate::{GraphError, OperationRef, ShapeError, TensorSpace};
use std::sync::Arc;
use tensor_core::{Shape, TensorDesc};

/// Records tensor counts and node wiring, then validates on [`build`].
///
/// [`build`]: GraphBuilder::build
#[derive(Clone)]
pub struct GraphBuilder {
    name: String,
    space: TensorSpace,
    nodes: Vec<Node>,
    shape_fn: Option<GraphShapeFn>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            space: TensorSpace::default(),
            nodes: Vec::new(),
            shape_fn: None,
        }
    }

    pub fn inputs(mut self, n: usize) -> Self {
        self.space.inputs = n;
        self
    }

    pub fn outputs(mut self, n: usize) -> Self {
        self.space.outputs = n;
        self
    }

    pub fn internals(mut self, n: usize) -> Self {
        self.space.internals = n;
        self
    }

    /// Appends a node reading `inputs` and writing `outputs`.
    pub fn node(
        mut self,
        op: OperationRef,
        inputs: impl IntoIterator<Item = usize>,
        outputs: impl IntoIterator<Item = usize>,
    ) -> Self {
        self.nodes.push(Node::new(op, inputs, outputs));
        self
    }

    /// Appends a node whose input `input` is viewed through `reshape`.
    pub fn node_with_reshape(
        mut self,
        op: OperationRef,
        inputs: impl IntoIterator<Item = usize>,
        outputs: impl IntoIterator<Item = usize>,
        input: usize,
        reshape: impl Fn(&Shape) -> Shape + Send + Sync + 'static,
    ) -> Self {
        self.nodes
            .push(Node::new(op, inputs, outputs).with_reshape(input, reshape));
        self
    }

    /// Appends a fully constructed node. Useful when building in a loop.
    pub fn push_node(&mut self, node: Node) -> &mut Self {
        self.nodes.push(node);
        self
    }

    /// Overrides per-node shape propagation for the whole graph.
    pub fn infer_shape_with(
        mut self,
        f: impl Fn(&[TensorDesc]) -> Result<Vec<TensorDesc>, ShapeError> + Send + Sync + 'static,
    ) -> Self {
        self.shape_fn = Some(Arc::new(f));
        self
    }

    /// Validates the recorded wiring.
    pub fn build(self) -> Result<OpGraph<Validated>, GraphError> {
        let mut graph = OpGraph::new(self.name, self.space, self.nodes);
        if let Some(f) = self.shape_fn {
            graph = graph.with_shape_fn(f);
        }
        graph.validate()
    }
}

impl std::fmt::Debug for GraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("name", &self.name)
            .field("space", &self.space)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
