use crate::graph::{Graph, GraphError, NodeAttrs, NodeId, OpKind, ValueId};

/// Rewrites the graph so every graph input is read through a `Load` marker and
/// every graph output feeds a `Store` marker.
///
/// The markers anchor the liveness endpoints of graph-level values: a load is
/// inserted immediately before the earliest use of each input, its output
/// copies the input value's metadata, and all uses are redirected to it; a
/// store consuming each output value is inserted immediately before that
/// value's latest use, or immediately after its producer when nothing
/// downstream reads it. Re-running the insertion is a no-op: inputs whose
/// uses were already redirected have no users left, and outputs already
/// anchored by a store are skipped.
pub fn insert_load_store(graph: &mut Graph) -> Result<(), GraphError> {
    for value in graph.inputs().to_vec() {
        let Some(first) = earliest_use(graph, value) else {
            continue;
        };
        let Some(info) = graph.value(value) else {
            return Err(GraphError::MissingValue { value });
        };
        let name = format!("{}.load", info.name);
        let spec = info.spec.clone();
        let (_, outputs) = graph.create_node_before(
            OpKind::Load,
            NodeAttrs::default(),
            Vec::new(),
            vec![(name, spec)],
            first,
        )?;
        graph.replace_all_uses(value, outputs[0])?;
    }

    for value in graph.outputs().to_vec() {
        if has_store_user(graph, value) {
            continue;
        }
        match latest_use(graph, value) {
            Some(last) => {
                graph.create_node_before(
                    OpKind::Store,
                    NodeAttrs::default(),
                    vec![value],
                    Vec::new(),
                    last,
                )?;
            }
            None => {
                let Some(producer) = graph.producer_of(value) else {
                    continue;
                };
                graph.create_node_after(
                    OpKind::Store,
                    NodeAttrs::default(),
                    vec![value],
                    Vec::new(),
                    producer,
                )?;
            }
        }
    }

    Ok(())
}

fn earliest_use(graph: &Graph, value: ValueId) -> Option<NodeId> {
    let mut first: Option<NodeId> = None;
    for &user in graph.users_of(value) {
        first = match first {
            Some(current) if !graph.is_before(user, current) => Some(current),
            _ => Some(user),
        };
    }
    first
}

fn latest_use(graph: &Graph, value: ValueId) -> Option<NodeId> {
    let mut last: Option<NodeId> = None;
    for &user in graph.users_of(value) {
        last = match last {
            Some(current) if !graph.is_before(current, user) => Some(current),
            _ => Some(user),
        };
    }
    last
}

fn has_store_user(graph: &Graph, value: ValueId) -> bool {
    graph
        .users_of(value)
        .iter()
        .any(|user| matches!(graph.node(*user).map(|node| node.kind), Some(OpKind::Store)))
}
