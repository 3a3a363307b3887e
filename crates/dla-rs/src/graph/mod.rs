//! Mutable tensor dataflow graph the compiler passes operate on.
//!
//! Nodes are kept in a dense linear order maintained through a position index,
//! so "is node A scheduled before node B" is a single comparison and inserting
//! a node at an arbitrary anchor only shifts positions. Per-value use lists and
//! the producer map are updated on every structural edit, mirroring how the
//! node list itself is the source of truth for ordering.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::tensor::TensorSpec;

/// Stable identifier for a graph value (a producer-side edge).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ValueId(pub u32);

/// Stable identifier for a graph node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

/// Operator kinds understood by the DLA lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Conv,
    Gemm,
    MaxPool,
    Reshape,
    Relu,
    Softmax,
    Add,
    Mul,
    BatchNorm,
    Identity,
    Transpose,
    Concat,
    /// Marker reading a graph input into local memory.
    Load,
    /// Marker writing a graph output back to external memory.
    Store,
}

impl OpKind {
    /// Load/store markers delimit liveness; they are not compute operators.
    pub fn is_marker(self) -> bool {
        matches!(self, OpKind::Load | OpKind::Store)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Conv => "Conv",
            OpKind::Gemm => "Gemm",
            OpKind::MaxPool => "MaxPool",
            OpKind::Reshape => "Reshape",
            OpKind::Relu => "Relu",
            OpKind::Softmax => "Softmax",
            OpKind::Add => "Add",
            OpKind::Mul => "Mul",
            OpKind::BatchNorm => "BatchNorm",
            OpKind::Identity => "Identity",
            OpKind::Transpose => "Transpose",
            OpKind::Concat => "Concat",
            OpKind::Load => "Load",
            OpKind::Store => "Store",
        };
        write!(f, "{name}")
    }
}

/// Operator attributes carried by a node. Fields are populated per kind and
/// left at their defaults otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAttrs {
    pub kernel_shape: Vec<usize>,
    pub strides: Vec<usize>,
    pub pads_begin: Vec<usize>,
    pub pads_end: Vec<usize>,
    pub trans_a: bool,
    pub trans_b: bool,
}

/// A single operator instance in the dataflow graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: OpKind,
    pub attrs: NodeAttrs,
    pub inputs: Vec<ValueId>,
    pub outputs: Vec<ValueId>,
}

/// Metadata attached to a graph value. Identity is stable across passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueInfo {
    pub name: String,
    pub spec: TensorSpec,
}

/// Errors surfaced by structural graph edits.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("value {value:?} is used but never defined")]
    MissingValue { value: ValueId },
    #[error("node {node:?} is not part of this graph")]
    MissingNode { node: NodeId },
}

/// Mutable tensor dataflow graph.
#[derive(Debug, Default)]
pub struct Graph {
    values: HashMap<ValueId, ValueInfo>,
    nodes: HashMap<NodeId, Node>,
    pos_of: HashMap<NodeId, usize>,
    producer: HashMap<ValueId, NodeId>,
    users: HashMap<ValueId, SmallVec<[NodeId; 4]>>,
    inputs: Vec<ValueId>,
    outputs: Vec<ValueId>,
    next_value: u32,
    next_node: u32,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a graph-level input value.
    pub fn add_input(&mut self, name: impl Into<String>, spec: TensorSpec) -> ValueId {
        let value = self.new_value(name, spec);
        self.inputs.push(value);
        value
    }

    /// Marks an existing value as a graph-level output.
    pub fn mark_output(&mut self, value: ValueId) {
        self.outputs.push(value);
    }

    /// Registers a fresh value with no producer yet.
    pub fn new_value(&mut self, name: impl Into<String>, spec: TensorSpec) -> ValueId {
        let value = ValueId(self.next_value);
        self.next_value += 1;
        self.values.insert(
            value,
            ValueInfo {
                name: name.into(),
                spec,
            },
        );
        value
    }

    /// Appends a node at the end of the current ordering. Output values are
    /// created from the provided `(name, spec)` pairs and returned alongside
    /// the node id.
    pub fn add_node(
        &mut self,
        kind: OpKind,
        attrs: NodeAttrs,
        inputs: Vec<ValueId>,
        outputs: Vec<(String, TensorSpec)>,
    ) -> Result<(NodeId, Vec<ValueId>), GraphError> {
        let pos = self.pos_of.len();
        self.insert_node_at(pos, kind, attrs, inputs, outputs)
    }

    /// Creates a node and inserts it immediately before `anchor`.
    pub fn create_node_before(
        &mut self,
        kind: OpKind,
        attrs: NodeAttrs,
        inputs: Vec<ValueId>,
        outputs: Vec<(String, TensorSpec)>,
        anchor: NodeId,
    ) -> Result<(NodeId, Vec<ValueId>), GraphError> {
        let pos = self
            .pos_of
            .get(&anchor)
            .copied()
            .ok_or(GraphError::MissingNode { node: anchor })?;
        self.insert_node_at(pos, kind, attrs, inputs, outputs)
    }

    /// Creates a node and inserts it immediately after `anchor`.
    pub fn create_node_after(
        &mut self,
        kind: OpKind,
        attrs: NodeAttrs,
        inputs: Vec<ValueId>,
        outputs: Vec<(String, TensorSpec)>,
        anchor: NodeId,
    ) -> Result<(NodeId, Vec<ValueId>), GraphError> {
        let pos = self
            .pos_of
            .get(&anchor)
            .copied()
            .ok_or(GraphError::MissingNode { node: anchor })?;
        self.insert_node_at(pos + 1, kind, attrs, inputs, outputs)
    }

    fn insert_node_at(
        &mut self,
        pos: usize,
        kind: OpKind,
        attrs: NodeAttrs,
        inputs: Vec<ValueId>,
        outputs: Vec<(String, TensorSpec)>,
    ) -> Result<(NodeId, Vec<ValueId>), GraphError> {
        for value in &inputs {
            if !self.values.contains_key(value) {
                return Err(GraphError::MissingValue { value: *value });
            }
        }

        let node_id = NodeId(self.next_node);
        self.next_node += 1;

        let mut output_ids = Vec::with_capacity(outputs.len());
        for (name, spec) in outputs {
            let value = self.new_value(name, spec);
            self.producer.insert(value, node_id);
            output_ids.push(value);
        }
        for value in &inputs {
            self.users.entry(*value).or_default().push(node_id);
        }

        self.shift_positions_from(pos, 1);
        self.pos_of.insert(node_id, pos);
        self.nodes.insert(
            node_id,
            Node {
                id: node_id,
                kind,
                attrs,
                inputs,
                outputs: output_ids.clone(),
            },
        );
        Ok((node_id, output_ids))
    }

    /// Redirects every use of `old` to `new`. Producers and graph I/O lists
    /// are left untouched.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) -> Result<(), GraphError> {
        if !self.values.contains_key(&new) {
            return Err(GraphError::MissingValue { value: new });
        }
        let Some(old_users) = self.users.remove(&old) else {
            return Ok(());
        };
        for user in &old_users {
            if let Some(node) = self.nodes.get_mut(user) {
                for input in node.inputs.iter_mut() {
                    if *input == old {
                        *input = new;
                    }
                }
            }
        }
        self.users.entry(new).or_default().extend(old_users);
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn value(&self, id: ValueId) -> Option<&ValueInfo> {
        self.values.get(&id)
    }

    /// Returns node ids sorted by schedule position.
    pub fn nodes_in_order(&self) -> Vec<NodeId> {
        let mut entries: Vec<_> = self.pos_of.iter().map(|(node, pos)| (*node, *pos)).collect();
        entries.sort_by_key(|&(_, pos)| pos);
        entries.into_iter().map(|(node, _)| node).collect()
    }

    /// Returns the schedule position of a node.
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.pos_of.get(&node).copied()
    }

    /// Strict ordering over scheduled nodes.
    pub fn is_before(&self, a: NodeId, b: NodeId) -> bool {
        match (self.position(a), self.position(b)) {
            (Some(pa), Some(pb)) => pa < pb,
            _ => false,
        }
    }

    /// Returns the nodes consuming a value, in insertion order.
    pub fn users_of(&self, value: ValueId) -> &[NodeId] {
        self.users
            .get(&value)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the node producing a value, if any. Graph inputs and weights
    /// have no producer.
    pub fn producer_of(&self, value: ValueId) -> Option<NodeId> {
        self.producer.get(&value).copied()
    }

    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn shift_positions_from(&mut self, start: usize, delta: usize) {
        for pos in self.pos_of.values_mut() {
            if *pos >= start {
                *pos += delta;
            }
        }
    }
}

/// A named compilation unit owning a single dataflow graph.
#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    pub graph: Graph,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: Graph::new(),
        }
    }
}
