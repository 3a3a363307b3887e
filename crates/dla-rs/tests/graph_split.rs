use dla_rs::graph::{Graph, NodeAttrs, NodeId, OpKind};
use dla_rs::split::{SplitError, SplitPlanner};
use dla_rs::tensor::{DType, Shape, TensorSpec};

fn f32_spec(dims: &[usize]) -> TensorSpec {
    TensorSpec::new(DType::F32, Shape::new(dims.to_vec()))
}

fn out(name: &str, dims: &[usize]) -> (String, TensorSpec) {
    (name.to_string(), f32_spec(dims))
}

fn conv_attrs() -> NodeAttrs {
    NodeAttrs {
        kernel_shape: vec![3, 3],
        strides: vec![1, 1],
        pads_begin: vec![1, 1],
        pads_end: vec![1, 1],
        ..NodeAttrs::default()
    }
}

/// 3x3/s1/p1 convolution mapping `(1, 8, 16, 16)` to `(1, 32, 16, 16)`,
/// optionally fed through a leading Relu.
fn conv_graph(with_relu: bool) -> (Graph, NodeId, Option<NodeId>) {
    let mut graph = Graph::new();
    let x = graph.add_input("x", f32_spec(&[1, 8, 16, 16]));
    let w = graph.add_input("w", f32_spec(&[32, 8, 3, 3]));
    let b = graph.add_input("b", f32_spec(&[32]));

    let (relu, data) = if with_relu {
        let (relu, relu_out) = graph
            .add_node(
                OpKind::Relu,
                NodeAttrs::default(),
                vec![x],
                vec![out("t", &[1, 8, 16, 16])],
            )
            .unwrap();
        (Some(relu), relu_out[0])
    } else {
        (None, x)
    };

    let (conv, conv_out) = graph
        .add_node(
            OpKind::Conv,
            conv_attrs(),
            vec![data, w, b],
            vec![out("y", &[1, 32, 16, 16])],
        )
        .unwrap();
    graph.mark_output(conv_out[0]);
    (graph, conv, relu)
}

#[test]
fn conv_split_on_batch_axis_is_saturated_by_ceil_division() {
    let (graph, conv, _) = conv_graph(false);
    let mut planner = SplitPlanner::new(&graph).unwrap();
    // Axis 0 is already 1; ceil(1 / 2) keeps it at 1.
    assert!(planner.split_by_factor(&graph, conv, 0, 2, true));

    let record = planner.record(conv).unwrap();
    assert_eq!(record.proposed(), &[1, 32, 16, 16]);
    assert_eq!(record.required_input_shape(0).unwrap(), vec![1, 8, 16, 16]);
    assert_eq!(record.required_input_shape(1).unwrap(), vec![32, 8, 3, 3]);
    assert_eq!(record.required_input_shape(2).unwrap(), vec![32]);
}

#[test]
fn conv_split_on_spatial_axis_shrinks_the_data_input() {
    let (graph, conv, _) = conv_graph(false);
    let mut planner = SplitPlanner::new(&graph).unwrap();
    assert!(planner.split_by_factor(&graph, conv, 2, 2, true));

    let record = planner.record(conv).unwrap();
    assert_eq!(record.proposed(), &[1, 32, 8, 16]);
    // (8 - 1) * 1 - 1 - 1 + 3 = 8 rows of input for 8 rows of output.
    assert_eq!(record.required_input_shape(0).unwrap(), vec![1, 8, 8, 16]);
    // Weights and bias only follow the output-channel axis.
    assert_eq!(record.required_input_shape(1).unwrap(), vec![32, 8, 3, 3]);
    assert_eq!(record.required_input_shape(2).unwrap(), vec![32]);
}

#[test]
fn split_propagates_through_elementwise_producers() {
    let (graph, conv, relu) = conv_graph(true);
    let relu = relu.unwrap();
    let mut planner = SplitPlanner::new(&graph).unwrap();
    assert!(planner.split_by_factor(&graph, conv, 2, 2, true));

    // The Relu feeding the convolution adopts the implied data shape.
    assert_eq!(planner.record(relu).unwrap().proposed(), &[1, 8, 8, 16]);
}

#[test]
fn split_by_factor_one_is_a_no_op() {
    let (graph, conv, relu) = conv_graph(true);
    let relu = relu.unwrap();
    let mut planner = SplitPlanner::new(&graph).unwrap();
    assert!(planner.split_by_factor(&graph, conv, 0, 1, true));

    let conv_record = planner.record(conv).unwrap();
    assert_eq!(conv_record.proposed(), conv_record.original());
    let relu_record = planner.record(relu).unwrap();
    assert_eq!(relu_record.proposed(), relu_record.original());
}

#[test]
fn update_upstream_false_leaves_producers_untouched() {
    let (graph, conv, relu) = conv_graph(true);
    let relu = relu.unwrap();
    let mut planner = SplitPlanner::new(&graph).unwrap();
    assert!(planner.split_by_shape(&graph, conv, &[1, 32, 8, 16], false));

    assert_eq!(planner.record(conv).unwrap().proposed(), &[1, 32, 8, 16]);
    let relu_record = planner.record(relu).unwrap();
    assert_eq!(relu_record.proposed(), relu_record.original());
}

fn gemm_graph(trans_a: bool, trans_b: bool) -> (Graph, NodeId) {
    let mut graph = Graph::new();
    let a_dims: &[usize] = if trans_a { &[8, 4] } else { &[4, 8] };
    let b_dims: &[usize] = if trans_b { &[6, 8] } else { &[8, 6] };
    let a = graph.add_input("a", f32_spec(a_dims));
    let b = graph.add_input("b", f32_spec(b_dims));
    let c = graph.add_input("c", f32_spec(&[4, 6]));
    let (gemm, gemm_out) = graph
        .add_node(
            OpKind::Gemm,
            NodeAttrs {
                trans_a,
                trans_b,
                ..NodeAttrs::default()
            },
            vec![a, b, c],
            vec![out("y", &[4, 6])],
        )
        .unwrap();
    graph.mark_output(gemm_out[0]);
    (graph, gemm)
}

#[test]
fn gemm_split_with_transposed_a() {
    let (graph, gemm) = gemm_graph(true, false);
    let mut planner = SplitPlanner::new(&graph).unwrap();
    assert!(planner.split_by_shape(&graph, gemm, &[2, 6], true));

    let record = planner.record(gemm).unwrap();
    assert_eq!(record.required_input_shape(0).unwrap(), vec![8, 2]);
    assert_eq!(record.required_input_shape(1).unwrap(), vec![8, 6]);
    // The bias keeps its original extent.
    assert_eq!(record.required_input_shape(2).unwrap(), vec![4, 6]);
}

#[test]
fn gemm_split_with_transposed_b() {
    let (graph, gemm) = gemm_graph(true, true);
    let mut planner = SplitPlanner::new(&graph).unwrap();
    assert!(planner.split_by_shape(&graph, gemm, &[2, 6], true));

    let record = planner.record(gemm).unwrap();
    assert_eq!(record.required_input_shape(0).unwrap(), vec![8, 2]);
    assert_eq!(record.required_input_shape(1).unwrap(), vec![6, 8]);
}

#[test]
fn maxpool_split_keeps_proposed_channels() {
    let mut graph = Graph::new();
    let x = graph.add_input("x", f32_spec(&[1, 32, 16, 16]));
    let (pool, pool_out) = graph
        .add_node(
            OpKind::MaxPool,
            NodeAttrs {
                kernel_shape: vec![2, 2],
                strides: vec![2, 2],
                pads_begin: vec![0, 0],
                pads_end: vec![0, 0],
                ..NodeAttrs::default()
            },
            vec![x],
            vec![out("y", &[1, 32, 8, 8])],
        )
        .unwrap();
    graph.mark_output(pool_out[0]);

    let mut planner = SplitPlanner::new(&graph).unwrap();
    assert!(planner.split_by_shape(&graph, pool, &[1, 16, 8, 8], true));
    let record = planner.record(pool).unwrap();
    // Channels are copied from the proposed output, not widened.
    assert_eq!(record.required_input_shape(0).unwrap(), vec![1, 16, 16, 16]);
}

#[test]
fn reshape_rejection_propagates_without_rollback() {
    let mut graph = Graph::new();
    let x = graph.add_input("x", f32_spec(&[16]));
    let (identity, identity_out) = graph
        .add_node(
            OpKind::Identity,
            NodeAttrs::default(),
            vec![x],
            vec![out("t", &[16])],
        )
        .unwrap();
    let (reshape, reshape_out) = graph
        .add_node(
            OpKind::Reshape,
            NodeAttrs::default(),
            vec![identity_out[0]],
            vec![out("r", &[2, 8])],
        )
        .unwrap();
    graph.mark_output(reshape_out[0]);

    let mut planner = SplitPlanner::new(&graph).unwrap();
    // Reshape forwards its own (rank-2) proposal upstream, which the rank-1
    // identity producer refuses.
    assert!(!planner.split_by_shape(&graph, reshape, &[1, 8], true));

    // No rollback: the reshape record keeps the accepted proposal while the
    // refused producer stays at its original shape.
    assert_eq!(planner.record(reshape).unwrap().proposed(), &[1, 8]);
    let identity_record = planner.record(identity).unwrap();
    assert_eq!(identity_record.proposed(), identity_record.original());
}

#[test]
fn proposals_never_grow_or_zero_a_dimension() {
    let (graph, conv, _) = conv_graph(false);
    let mut planner = SplitPlanner::new(&graph).unwrap();
    assert!(!planner.split_by_shape(&graph, conv, &[2, 32, 16, 16], false));
    assert!(!planner.split_by_shape(&graph, conv, &[0, 32, 16, 16], false));
    assert!(!planner.split_by_shape(&graph, conv, &[1, 32, 16], false));

    let record = planner.record(conv).unwrap();
    assert_eq!(record.proposed(), record.original());
}

#[test]
fn unsupported_operator_aborts_record_building() {
    let mut graph = Graph::new();
    let x = graph.add_input("x", f32_spec(&[1, 2]));
    let (_, transpose_out) = graph
        .add_node(
            OpKind::Transpose,
            NodeAttrs::default(),
            vec![x],
            vec![out("y", &[2, 1])],
        )
        .unwrap();
    graph.mark_output(transpose_out[0]);

    let err = SplitPlanner::new(&graph).unwrap_err();
    assert!(matches!(
        err,
        SplitError::UnsupportedOperator {
            kind: OpKind::Transpose,
            ..
        }
    ));
}
