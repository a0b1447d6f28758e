use crate::profile::{CommGroup, CommOp, infer_comm_group, resolve_comm_group};

#[test]
fn sendrecv_op_classifies_as_pipeline() {
    assert_eq!(
        infer_comm_group("some_layer", &[CommOp::Sendrecv]),
        Some(CommGroup::Pp)
    );
}

#[test]
fn pipeline_name_markers_classify_as_pipeline() {
    for name in [
        "send_forward",
        "recv_forward",
        "send_backward",
        "recv_backward_0",
    ] {
        assert_eq!(infer_comm_group(name, &[]), Some(CommGroup::Pp), "{name}");
    }
}

#[test]
fn gradient_allreduce_classifies_as_data_parallel() {
    assert_eq!(
        infer_comm_group("layer_norm_weight_grad", &[CommOp::Allreduce]),
        Some(CommGroup::Dp)
    );
    assert_eq!(
        infer_comm_group("layer_norm_weight_grad", &[CommOp::AllreduceAsync]),
        Some(CommGroup::Dp)
    );
    // Gradient suffix without an all-reduce stays unknown.
    assert_eq!(infer_comm_group("layer_norm_weight_grad", &[]), None);
    // An all-reduce without the gradient suffix stays unknown.
    assert_eq!(infer_comm_group("layer_norm_weight", &[CommOp::Allreduce]), None);
}

#[test]
fn tensor_model_parallel_region_markers_classify_as_tp() {
    for name in [
        "reduce_from_tensor_model_parallel_region",
        "gather_from_tensor_model_parallel_region_1",
        "scatter_to_tensor_model_parallel_region",
        "reduce_scatter_to_tensor_model_parallel_region",
        "reduce_scatter_to_sequence_parallel_region",
    ] {
        assert_eq!(infer_comm_group(name, &[]), Some(CommGroup::Tp), "{name}");
    }
}

#[test]
fn pipeline_markers_beat_gradient_and_tp_markers() {
    // Priority order: pp first, then dp, then tp.
    assert_eq!(
        infer_comm_group("send_forward_grad", &[CommOp::Allreduce]),
        Some(CommGroup::Pp)
    );
    assert_eq!(
        infer_comm_group(
            "gather_from_tensor_model_parallel_region_grad",
            &[CommOp::Allreduce]
        ),
        Some(CommGroup::Dp)
    );
}

#[test]
fn explicit_tag_takes_precedence_over_inference() {
    assert_eq!(
        resolve_comm_group(Some("tp"), "send_forward", &[CommOp::Sendrecv]),
        Some(CommGroup::Tp)
    );
    assert_eq!(
        resolve_comm_group(Some("DP"), "whatever", &[]),
        Some(CommGroup::Dp)
    );
    // Unparseable tags fall back to inference.
    assert_eq!(
        resolve_comm_group(Some("expert"), "send_forward", &[]),
        Some(CommGroup::Pp)
    );
    assert_eq!(resolve_comm_group(Some(""), "matmul_0", &[]), None);
}

#[test]
fn unknown_names_stay_unclassified() {
    assert_eq!(infer_comm_group("matmul_0", &[]), None);
    assert_eq!(infer_comm_group("", &[CommOp::Alltoall]), None);
}
