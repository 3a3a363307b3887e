//! Per-operator split records mapping a proposed output shape to the implied
//! input shapes.
//!
//! The splitter understands a closed operator set. Operators whose per-element
//! output shape equals their input shape share one pass-through variant;
//! convolution, pooling, and Gemm carry the attributes needed to run their
//! shape formulas backwards. Records capture every input dimension they need
//! at construction time, so a record never borrows the graph after it is
//! built.

mod planner;

pub use planner::SplitPlanner;

use std::collections::HashSet;

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::graph::{Graph, Node, NodeId, OpKind};

/// Operator kinds whose per-element output shape equals their input shape.
static INPUT_SIZE_IS_OUTPUT_SIZE: Lazy<HashSet<OpKind>> = Lazy::new(|| {
    [
        OpKind::Relu,
        OpKind::Softmax,
        OpKind::Add,
        OpKind::Mul,
        OpKind::BatchNorm,
        OpKind::Identity,
    ]
    .into_iter()
    .collect()
});

/// Errors surfaced while building or querying split records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplitError {
    /// Node kind outside the splitter's closed operator set.
    #[error("cannot split unsupported operator {kind} on node {node:?}")]
    UnsupportedOperator { node: NodeId, kind: OpKind },
    /// Input index with no shape formula for the operator kind.
    #[error("input index {index} is out of range for {kind} split")]
    InvalidInput { kind: OpKind, index: usize },
    /// A value referenced by the node carries no metadata.
    #[error("node {node:?} references a value with no recorded shape")]
    MissingValueInfo { node: NodeId },
}

/// Operator-specific data needed to back-propagate a proposed output shape.
#[derive(Debug, Clone)]
enum SplitKind {
    /// Output shape passes through unchanged to every input.
    PassThrough,
    Conv {
        kernel: Vec<usize>,
        strides: Vec<usize>,
        pads_begin: Vec<usize>,
        pads_end: Vec<usize>,
        in_channels: usize,
        weight_dims: Vec<usize>,
    },
    MaxPool {
        kernel: Vec<usize>,
        strides: Vec<usize>,
        pads_begin: Vec<usize>,
        pads_end: Vec<usize>,
    },
    Gemm {
        trans_a: bool,
        trans_b: bool,
        reduce_dim: usize,
        bias_dims: Vec<usize>,
    },
    /// Propagates the output shape unchanged; the data input of a reshape is
    /// not spatial data, so this is a known approximation.
    Reshape,
}

/// One node's original output shape plus the shape currently proposed for it.
#[derive(Debug, Clone)]
pub struct SplitRecord {
    kind_tag: OpKind,
    out_dims: Vec<usize>,
    new_out_dims: Vec<usize>,
    kind: SplitKind,
}

impl SplitRecord {
    pub(crate) fn build(graph: &Graph, node: &Node) -> Result<Self, SplitError> {
        let out_dims = output_dims(graph, node, 0)?;

        let kind = match node.kind {
            kind if INPUT_SIZE_IS_OUTPUT_SIZE.contains(&kind) => SplitKind::PassThrough,
            // A load marker copies its source value's metadata verbatim, so it
            // behaves like an identity for shape propagation and terminates
            // the upstream walk (it has no inputs). Store markers produce no
            // values and never get a record.
            kind if kind.is_marker() => SplitKind::PassThrough,
            OpKind::Conv => SplitKind::Conv {
                kernel: node.attrs.kernel_shape.clone(),
                strides: node.attrs.strides.clone(),
                pads_begin: node.attrs.pads_begin.clone(),
                pads_end: node.attrs.pads_end.clone(),
                in_channels: input_dims(graph, node, 0)?
                    .get(1)
                    .copied()
                    .ok_or(SplitError::MissingValueInfo { node: node.id })?,
                weight_dims: input_dims(graph, node, 1)?,
            },
            OpKind::MaxPool => SplitKind::MaxPool {
                kernel: node.attrs.kernel_shape.clone(),
                strides: node.attrs.strides.clone(),
                pads_begin: node.attrs.pads_begin.clone(),
                pads_end: node.attrs.pads_end.clone(),
            },
            OpKind::Gemm => {
                let a_dims = input_dims(graph, node, 0)?;
                let reduce_dim = if node.attrs.trans_a {
                    a_dims[0]
                } else {
                    a_dims[1]
                };
                SplitKind::Gemm {
                    trans_a: node.attrs.trans_a,
                    trans_b: node.attrs.trans_b,
                    reduce_dim,
                    bias_dims: input_dims(graph, node, 2)?,
                }
            }
            OpKind::Reshape => SplitKind::Reshape,
            kind => {
                return Err(SplitError::UnsupportedOperator {
                    node: node.id,
                    kind,
                })
            }
        };

        Ok(SplitRecord {
            kind_tag: node.kind,
            new_out_dims: out_dims.clone(),
            out_dims,
            kind,
        })
    }

    /// The node's output shape before any split attempt.
    pub fn original(&self) -> &[usize] {
        &self.out_dims
    }

    /// The output shape currently proposed for the node.
    pub fn proposed(&self) -> &[usize] {
        &self.new_out_dims
    }

    /// Adopts a new output shape. Rank must be preserved and every magnitude
    /// must stay within `1..=original`; the splitter never grows a tensor.
    pub fn propose_output_shape(&mut self, dims: &[usize]) -> bool {
        if dims.len() != self.out_dims.len() {
            return false;
        }
        if dims
            .iter()
            .zip(&self.out_dims)
            .any(|(&new, &old)| new < 1 || new > old)
        {
            return false;
        }
        self.new_out_dims = dims.to_vec();
        true
    }

    /// Computes the implied shape of input `index` under the currently
    /// proposed output shape.
    pub fn required_input_shape(&self, index: usize) -> Result<Vec<usize>, SplitError> {
        let out = &self.new_out_dims;
        match &self.kind {
            SplitKind::PassThrough | SplitKind::Reshape => Ok(out.clone()),
            SplitKind::Conv {
                kernel,
                strides,
                pads_begin,
                pads_end,
                in_channels,
                weight_dims,
            } => match index {
                0 => {
                    let mut dims = vec![out[0], *in_channels];
                    dims.extend(windowed_input_extents(
                        &out[2..],
                        kernel,
                        strides,
                        pads_begin,
                        pads_end,
                    ));
                    Ok(dims)
                }
                1 => {
                    let mut dims = weight_dims.clone();
                    dims[0] = out[1];
                    Ok(dims)
                }
                2 => Ok(vec![out[1]]),
                index => Err(self.invalid_input(index)),
            },
            SplitKind::MaxPool {
                kernel,
                strides,
                pads_begin,
                pads_end,
            } => match index {
                0 => {
                    let mut dims = vec![out[0], out[1]];
                    dims.extend(windowed_input_extents(
                        &out[2..],
                        kernel,
                        strides,
                        pads_begin,
                        pads_end,
                    ));
                    Ok(dims)
                }
                index => Err(self.invalid_input(index)),
            },
            SplitKind::Gemm {
                trans_a,
                trans_b,
                reduce_dim,
                bias_dims,
            } => match index {
                0 => {
                    if *trans_a {
                        Ok(vec![*reduce_dim, out[0]])
                    } else {
                        Ok(vec![out[0], *reduce_dim])
                    }
                }
                1 => {
                    if *trans_b {
                        Ok(vec![out[1], *reduce_dim])
                    } else {
                        Ok(vec![*reduce_dim, out[1]])
                    }
                }
                // The bias keeps its original extent even when the output is
                // shrunk; shrinking it would need a broadcast rule the target
                // does not define.
                2 => Ok(bias_dims.clone()),
                index => Err(self.invalid_input(index)),
            },
        }
    }

    fn invalid_input(&self, index: usize) -> SplitError {
        SplitError::InvalidInput {
            kind: self.kind_tag,
            index,
        }
    }
}

/// Inverse of the windowed-output formula, per spatial axis:
/// `(O - 1) * stride - pad_begin - pad_end + kernel`. A window larger than the
/// padded extent collapses to zero here and is rejected by the producer's
/// shape proposal.
fn windowed_input_extents(
    out_spatial: &[usize],
    kernel: &[usize],
    strides: &[usize],
    pads_begin: &[usize],
    pads_end: &[usize],
) -> Vec<usize> {
    out_spatial
        .iter()
        .enumerate()
        .map(|(axis, &extent)| {
            let implied = (extent as i64 - 1) * strides[axis] as i64
                - pads_begin[axis] as i64
                - pads_end[axis] as i64
                + kernel[axis] as i64;
            implied.max(0) as usize
        })
        .collect()
}

fn input_dims(graph: &Graph, node: &Node, index: usize) -> Result<Vec<usize>, SplitError> {
    let value = node
        .inputs
        .get(index)
        .ok_or(SplitError::MissingValueInfo { node: node.id })?;
    dims_of(graph, node, *value)
}

fn output_dims(graph: &Graph, node: &Node, index: usize) -> Result<Vec<usize>, SplitError> {
    let value = node
        .outputs
        .get(index)
        .ok_or(SplitError::MissingValueInfo { node: node.id })?;
    dims_of(graph, node, *value)
}

fn dims_of(
    graph: &Graph,
    node: &Node,
    value: crate::graph::ValueId,
) -> Result<Vec<usize>, SplitError> {
    graph
        .value(value)
        .map(|info| info.spec.shape.dims().to_vec())
        .ok_or(SplitError::MissingValueInfo { node: node.id })
}
