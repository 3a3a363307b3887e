use std::collections::HashMap;

use crate::graph::{Graph, ValueId};
use crate::target::{MemSize, TargetMemInfo};

/// Maps every value consumed or produced by a compute node to its byte size.
pub type ValueSizeMap = HashMap<ValueId, MemSize>;

/// Sweeps the graph once and records the target's size for each value touched
/// by a compute node; load/store markers are skipped. A value seen as both
/// some node's output and another's input is written twice; the collaborator
/// returns equal sizes for equal values, so the duplicate write is idempotent.
pub fn collect_value_sizes(graph: &Graph, mem_info: &dyn TargetMemInfo) -> ValueSizeMap {
    let mut sizes = ValueSizeMap::new();
    for id in graph.nodes_in_order() {
        let Some(node) = graph.node(id) else {
            continue;
        };
        if node.kind.is_marker() {
            continue;
        }
        for value in node.inputs.iter().chain(node.outputs.iter()) {
            let Some(info) = graph.value(*value) else {
                continue;
            };
            sizes.insert(*value, mem_info.value_memory_size(info));
        }
    }
    sizes
}
