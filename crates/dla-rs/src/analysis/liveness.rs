use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::graph::{Graph, ValueId};

/// Half-open range of node positions during which a value's storage must be
/// preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveInterval {
    pub value: ValueId,
    pub start: usize,
    pub end: usize,
}

impl LiveInterval {
    pub fn new(value: ValueId, start: usize, end: usize) -> Self {
        debug_assert!(end > start, "live interval must cover at least one position");
        Self { value, start, end }
    }

    /// Two intervals intersect iff their ranges share at least one position.
    pub fn intersects(&self, other: &LiveInterval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Ordered, immutable liveness result for one graph.
///
/// One interval per value referenced by the graph's nodes. A value defined at
/// position `p` with its latest use at position `q` lives over `[p, q + 1)`;
/// an unused definition lives over `[p, p + 1)`. Producer-less values (graph
/// inputs and weights) start at position 0.
#[derive(Debug, Clone)]
pub struct GraphLiveness {
    intervals: Vec<LiveInterval>,
}

impl GraphLiveness {
    pub fn analyze(graph: &Graph) -> Self {
        let mut def: HashMap<ValueId, usize> = HashMap::new();
        let mut last_use: HashMap<ValueId, usize> = HashMap::new();

        for (pos, node_id) in graph.nodes_in_order().into_iter().enumerate() {
            let Some(node) = graph.node(node_id) else {
                continue;
            };
            for value in &node.inputs {
                def.entry(*value).or_insert(0);
                let slot = last_use.entry(*value).or_insert(pos);
                *slot = (*slot).max(pos);
            }
            for value in &node.outputs {
                def.insert(*value, pos);
            }
        }

        let mut intervals: Vec<LiveInterval> = def
            .into_iter()
            .map(|(value, start)| {
                let end = last_use
                    .get(&value)
                    .map(|use_pos| use_pos + 1)
                    .unwrap_or(start + 1)
                    .max(start + 1);
                LiveInterval::new(value, start, end)
            })
            .collect();
        intervals.sort_by_key(|interval| (interval.start, interval.value));

        Self { intervals }
    }

    pub fn intervals(&self) -> &[LiveInterval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}
