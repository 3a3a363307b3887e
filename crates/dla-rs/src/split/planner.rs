use std::collections::{HashMap, HashSet};

use crate::graph::{Graph, NodeId};

use super::{SplitError, SplitRecord};

/// Orchestrates backward shape propagation across the graph.
///
/// The planner owns one split record per node with at least one output, built
/// up front for a single split attempt. A failed attempt leaves records in a
/// partially updated state; the caller discards the planner instead of rolling
/// back. Revisiting a node with a shape it has already adopted counts as
/// success, which bounds the walk on shared subgraphs.
#[derive(Debug)]
pub struct SplitPlanner {
    records: HashMap<NodeId, SplitRecord>,
    visited: HashSet<(NodeId, Vec<usize>)>,
}

impl SplitPlanner {
    /// Builds records for every value-producing node. A node kind outside the
    /// splitter's operator set aborts construction.
    pub fn new(graph: &Graph) -> Result<Self, SplitError> {
        let mut records = HashMap::new();
        for id in graph.nodes_in_order() {
            let Some(node) = graph.node(id) else {
                continue;
            };
            if node.outputs.is_empty() {
                continue;
            }
            records.insert(id, SplitRecord::build(graph, node)?);
        }
        Ok(Self {
            records,
            visited: HashSet::new(),
        })
    }

    pub fn record(&self, node: NodeId) -> Option<&SplitRecord> {
        self.records.get(&node)
    }

    /// Shrinks `axis` of the node's original output by `factor` (ceiling
    /// division) and delegates to [`SplitPlanner::split_by_shape`].
    pub fn split_by_factor(
        &mut self,
        graph: &Graph,
        node: NodeId,
        axis: usize,
        factor: usize,
        update_upstream: bool,
    ) -> bool {
        let Some(record) = self.records.get(&node) else {
            return false;
        };
        let mut dims = record.original().to_vec();
        if axis >= dims.len() || factor == 0 {
            return false;
        }
        dims[axis] = (dims[axis] + factor - 1) / factor;
        self.split_by_shape(graph, node, &dims, update_upstream)
    }

    /// Asks the node's record to adopt `dims`. On success, and when
    /// `update_upstream` holds, recurses into the producer of each input with
    /// the implied input shape; the result is the conjunction over all
    /// inputs. No rollback is performed on failure.
    pub fn split_by_shape(
        &mut self,
        graph: &Graph,
        node: NodeId,
        dims: &[usize],
        update_upstream: bool,
    ) -> bool {
        let Some(record) = self.records.get_mut(&node) else {
            return false;
        };
        if !record.propose_output_shape(dims) {
            return false;
        }
        if !update_upstream {
            return true;
        }
        // Already propagated this exact shape through this node.
        if !self.visited.insert((node, dims.to_vec())) {
            return true;
        }

        let Some(n) = graph.node(node) else {
            return false;
        };
        let inputs = n.inputs.clone();

        let mut status = true;
        for (index, value) in inputs.into_iter().enumerate() {
            let Some(producer) = graph.producer_of(value) else {
                // Graph inputs and weights have no producing node; the walk
                // stops here.
                continue;
            };
            let implied = match self
                .records
                .get(&node)
                .map(|record| record.required_input_shape(index))
            {
                Some(Ok(dims)) => dims,
                _ => {
                    status = false;
                    continue;
                }
            };
            status &= self.split_by_shape(graph, producer, &implied, true);
        }
        status
    }
}
