// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operation graph: an ordered list of nodes over a tensor-ID space.
//!
//! # Type-State Pattern
//!
//! ```text
//! OpGraph<Declared>     wiring recorded, not yet checked.
//!       │  .validate()
//!       ▼
//! OpGraph<Validated>    wiring verified, ready for plan building.
//! ```
//!
//! The plan builder only accepts `OpGraph<Validated>`, so a plan can never
//! be compiled from a graph with dangling or out-of-range tensor IDs.
//!
//! # Ordering
//!
//! Nodes run in the order they were declared. The graph never reorders
//! them; a node may only read tensors that are graph inputs or that an
//! earlier node wrote.

use crate::{check_input_count, GraphError, OperationRef, ShapeError, TensorId, TensorRef, TensorSpace};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tensor_core::{Shape, TensorDesc};

/// Rewrites the shape an input is viewed as, without copying data.
pub type ReshapeFn = Arc<dyn Fn(&Shape) -> Shape + Send + Sync>;

/// Graph-level shape inference override.
pub type GraphShapeFn =
    Arc<dyn Fn(&[TensorDesc]) -> Result<Vec<TensorDesc>, ShapeError> + Send + Sync>;

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: graph wiring has been recorded but not validated.
#[derive(Debug, Clone)]
pub struct Declared;

/// Marker: graph wiring has been validated.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug + Clone {}
impl GraphState for Declared {}
impl GraphState for Validated {}

// ── Node ───────────────────────────────────────────────────────────

/// One step of a graph: an operation and its tensor wiring.
///
/// `reshapes[i]`, when present, changes how input `i` is viewed by this
/// node. The element count must not change.
#[derive(Clone)]
pub struct Node {
    pub op: OperationRef,
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
    pub reshapes: Vec<Option<ReshapeFn>>,
}

impl Node {
    pub fn new(
        op: OperationRef,
        inputs: impl IntoIterator<Item = usize>,
        outputs: impl IntoIterator<Item = usize>,
    ) -> Self {
        let inputs: Vec<TensorId> = inputs.into_iter().map(TensorId).collect();
        let outputs = outputs.into_iter().map(TensorId).collect();
        let reshapes = vec![None; inputs.len()];
        Self {
            op,
            inputs,
            outputs,
            reshapes,
        }
    }

    /// Attaches a reshape function to input `input`.
    ///
    /// An index past the node's input list grows the reshape table beyond
    /// the inputs, which validation reports as a `"reshape"` arity mismatch.
    pub fn with_reshape(
        mut self,
        input: usize,
        f: impl Fn(&Shape) -> Shape + Send + Sync + 'static,
    ) -> Self {
        if input >= self.reshapes.len() {
            self.reshapes.resize(input + 1, None);
        }
        self.reshapes[input] = Some(Arc::new(f));
        self
    }

    /// Returns the descriptor input `input` is viewed as by this node.
    ///
    /// # Errors
    /// [`ShapeError::ReshapeElementCount`] if the reshape function changes
    /// the element count.
    pub fn view_input(&self, input: usize, desc: &TensorDesc) -> Result<TensorDesc, ShapeError> {
        match self.reshapes.get(input).and_then(Option::as_ref) {
            None => Ok(desc.clone()),
            Some(f) => {
                let to = f(&desc.shape);
                if to.num_elements() != desc.shape.num_elements() {
                    return Err(ShapeError::ReshapeElementCount {
                        input,
                        from: desc.shape.clone(),
                        to,
                    });
                }
                Ok(desc.with_shape(to))
            }
        }
    }

    /// Runs the node's shape inference on already-viewed inputs and checks
    /// the output count.
    pub fn infer_outputs(&self, inputs: &[TensorDesc]) -> Result<Vec<TensorDesc>, ShapeError> {
        check_input_count(self.op.as_ref(), inputs)?;
        let outputs = self.op.infer_shape(inputs)?;
        if outputs.len() != self.op.output_count() {
            return Err(ShapeError::OutputCount {
                op: self.op.name().to_string(),
                expected: self.op.output_count(),
                actual: outputs.len(),
            });
        }
        Ok(outputs)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("op", &self.op.name())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field(
                "reshaped",
                &self.reshapes.iter().map(Option::is_some).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ── OpGraph ────────────────────────────────────────────────────────

/// A named operation graph. The generic parameter encodes validation state.
#[derive(Clone)]
pub struct OpGraph<S: GraphState = Validated> {
    name: String,
    space: TensorSpace,
    nodes: Vec<Node>,
    shape_fn: Option<GraphShapeFn>,
    _state: PhantomData<S>,
}

impl OpGraph<Declared> {
    /// Creates a graph in the `Declared` state.
    pub fn new(name: impl Into<String>, space: TensorSpace, nodes: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            space,
            nodes,
            shape_fn: None,
            _state: PhantomData,
        }
    }

    /// Replaces per-node shape propagation with a caller-supplied function.
    pub fn with_shape_fn(mut self, f: GraphShapeFn) -> Self {
        self.shape_fn = Some(f);
        self
    }

    /// Validates the wiring and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - The graph has at least one node.
    /// - Every node's input and output counts match its operation.
    /// - Every tensor ID lies inside the declared space.
    /// - No node writes a graph input.
    /// - Every non-input tensor is written before it is read.
    ///
    /// A graph output no node writes is reported with a warning only.
    pub fn validate(self) -> Result<OpGraph<Validated>, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::EmptyGraph { graph: self.name });
        }

        let total = self.space.total();
        let mut written = vec![false; total];
        for w in written.iter_mut().take(self.space.inputs) {
            *w = true;
        }

        for (idx, node) in self.nodes.iter().enumerate() {
            self.check_arity(idx, node)?;

            for id in &node.inputs {
                let resolved = self.resolve(idx, *id)?;
                if !written[id.0] {
                    tracing::debug!(graph = %self.name, node = idx, tensor = %resolved, "read before write");
                    return Err(GraphError::DanglingTensor {
                        graph: self.name.clone(),
                        node: idx,
                        id: id.0,
                    });
                }
            }
            for id in &node.outputs {
                if self.resolve(idx, *id)?.is_input() {
                    return Err(GraphError::WritesGraphInput {
                        graph: self.name.clone(),
                        node: idx,
                        id: id.0,
                    });
                }
                written[id.0] = true;
            }
        }

        for out in 0..self.space.outputs {
            let id = self.space.id_of(TensorRef::Output(out));
            if !written[id.0] {
                tracing::warn!(graph = %self.name, output = out, "graph output is never written");
            }
        }

        tracing::debug!(graph = %self.name, nodes = self.nodes.len(), space = %self.space, "graph validated");

        Ok(OpGraph {
            name: self.name,
            space: self.space,
            nodes: self.nodes,
            shape_fn: self.shape_fn,
            _state: PhantomData,
        })
    }

    fn check_arity(&self, idx: usize, node: &Node) -> Result<(), GraphError> {
        let checks = [
            ("input", node.op.input_count(), node.inputs.len()),
            ("output", node.op.output_count(), node.outputs.len()),
            ("reshape", node.inputs.len(), node.reshapes.len()),
        ];
        for (side, expected, actual) in checks {
            if expected != actual {
                return Err(GraphError::ArityMismatch {
                    graph: self.name.clone(),
                    node: idx,
                    op: node.op.name().to_string(),
                    side,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    fn resolve(&self, idx: usize, id: TensorId) -> Result<TensorRef, GraphError> {
        self.space
            .resolve(id)
            .ok_or_else(|| GraphError::TensorIdOutOfRange {
                graph: self.name.clone(),
                node: idx,
                id: id.0,
                total: self.space.total(),
            })
    }
}

impl OpGraph<Validated> {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Resolves a tensor ID. Always succeeds for IDs used in node wiring.
    pub fn resolve(&self, id: TensorId) -> Option<TensorRef> {
        self.space.resolve(id)
    }

    /// Returns `true` if a graph-level shape function replaces propagation.
    pub fn has_shape_fn(&self) -> bool {
        self.shape_fn.is_some()
    }

    /// Infers graph output descriptors from graph input descriptors.
    ///
    /// Uses the graph-level shape function when one was supplied, otherwise
    /// propagates descriptors through every node in order.
    pub fn infer_shape(&self, inputs: &[TensorDesc]) -> Result<Vec<TensorDesc>, ShapeError> {
        if inputs.len() != self.space.inputs {
            return Err(ShapeError::InputCount {
                op: self.name.clone(),
                expected: self.space.inputs,
                actual: inputs.len(),
            });
        }

        if let Some(f) = &self.shape_fn {
            let outputs = f(inputs)?;
            if outputs.len() != self.space.outputs {
                return Err(ShapeError::OutputCount {
                    op: self.name.clone(),
                    expected: self.space.outputs,
                    actual: outputs.len(),
                });
            }
            return Ok(outputs);
        }

        let table = self.propagate_shapes(inputs)?;
        (0..self.space.outputs)
            .map(|out| {
                let id = self.space.id_of(TensorRef::Output(out));
                table[id.0].clone().ok_or_else(|| ShapeError::Unsupported {
                    op: self.name.clone(),
                    detail: format!("graph output {out} is never produced"),
                })
            })
            .collect()
    }

    /// Propagates descriptors through every node.
    ///
    /// Returns one entry per tensor ID; entries no node writes stay `None`.
    pub fn propagate_shapes(
        &self,
        inputs: &[TensorDesc],
    ) -> Result<Vec<Option<TensorDesc>>, ShapeError> {
        let mut table: Vec<Option<TensorDesc>> = vec![None; self.space.total()];
        for (slot, desc) in table.iter_mut().zip(inputs) {
            *slot = Some(desc.clone());
        }

        for (idx, node) in self.nodes.iter().enumerate() {
            let in_node = |source: ShapeError| ShapeError::InNode {
                node: idx,
                op: node.op.name().to_string(),
                source: Box::new(source),
            };

            let mut viewed = Vec::with_capacity(node.inputs.len());
            for (j, id) in node.inputs.iter().enumerate() {
                let desc = table[id.0].as_ref().ok_or_else(|| {
                    in_node(ShapeError::Unsupported {
                        op: node.op.name().to_string(),
                        detail: format!("input {j} has no descriptor"),
                    })
                })?;
                viewed.push(node.view_input(j, desc).map_err(in_node)?);
            }

            let outputs = node.infer_outputs(&viewed).map_err(in_node)?;
            for (id, desc) in node.outputs.iter().zip(outputs) {
                table[id.0] = Some(desc);
            }
        }
        Ok(table)
    }

    pub fn summary(&self) -> String {
        format!(
            "Graph '{}': {} nodes, {}",
            self.name,
            self.nodes.len(),
            self.space
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> OpGraph<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space(&self) -> TensorSpace {
        self.space
    }
}

impl<S: GraphState> fmt::Debug for OpGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpGraph")
            .field("name", &self.name)
            .field("space", &self.space)
            .field("nodes", &self.nodes)
            .field("shape_fn", &self.shape_fn.is_some())
            .finish()
    }
}

impl<S: GraphState> fmt::Display for OpGraph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "OpGraph '{}' ({}):", self.name, self.space)?;
        for (idx, node) in self.nodes.iter().enumerate() {
            let show = |ids: &[TensorId]| {
                ids.iter()
                    .map(|id| match self.space.resolve(*id) {
                        Some(r) => r.to_string(),
                        None => id.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            writeln!(
                f,
                "  [{idx}] {}({}) -> ({})",
                node.op.name(),
                show(&node.inputs),
                show(&node.outputs)
            )?;
        }
        Ok(())
    }
}
