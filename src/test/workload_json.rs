use crate::error::CompileError;
use crate::profile::{LayerRecord, OpBytes, ProfileSpec};
use crate::sched::Mode;
use crate::workload::{
    CompileOptions, FlatOptions, RankStep, TopologyKind, TopologyOpts, TopologySpec,
    build_flat_steps, build_topology, build_topology_strict, compile, convert_flat,
    fit_fat_tree_k, infer_fat_tree_k,
};

fn profile(raw: &str) -> ProfileSpec {
    serde_json::from_str(raw).expect("parse profile")
}

fn small_profile() -> ProfileSpec {
    profile(
        r#"
        {
            "model": "gpt2",
            "rows": [
                { "name": "matmul_0", "fw_ms": 1.5, "bw_ms": 3.0,
                  "output_shape": [8, 128] },
                { "name": "layer_norm_weight_grad", "fw_ms": 0.1,
                  "bw_ops": [ { "name": "ALLREDUCE", "args": [1024, 4] } ] }
            ]
        }
        "#,
    )
}

#[test]
fn rank_step_tags_round_trip_through_json() {
    let steps = vec![
        RankStep::Compute {
            id: 0,
            label: "fwd_mb0".to_string(),
            compute_ms: 1.25,
        },
        RankStep::Collective {
            id: 1,
            label: "tp_fwd_mb0".to_string(),
            op: "allreduce".to_string(),
            comm_bytes: 4096,
            hosts: vec![0, 1],
            comm_id: "tp-fwd-pp0-dp0-mb0".to_string(),
        },
        RankStep::Sendrecv {
            id: 2,
            label: "fwd_send_mb0".to_string(),
            comm_bytes: 1000,
            peer: 1,
            direction: crate::workload::SendRecvDirection::Send,
            comm_id: "pp-fwd-s0-mb0-dp0-tp0".to_string(),
        },
        RankStep::CollectiveWait {
            id: 3,
            label: "wait_async".to_string(),
        },
    ];
    let json = serde_json::to_string(&steps).expect("serialize steps");
    for tag in ["\"compute\"", "\"collective\"", "\"sendrecv\"", "\"collective_wait\""] {
        assert!(json.contains(tag), "missing tag {tag} in {json}");
    }
    assert!(json.contains("\"send\""));
    let parsed: Vec<RankStep> = serde_json::from_str(&json).expect("parse steps");
    assert_eq!(parsed, steps);
}

#[test]
fn compile_produces_one_rank_per_coordinate() {
    let opts = CompileOptions {
        dp: 2,
        tp: 2,
        pp: 1,
        pp_microbatch: 2,
        ..CompileOptions::default()
    };
    let workload = compile(&small_profile(), &opts).expect("compile");
    assert_eq!(workload.schema_version, 2);
    assert_eq!(workload.hosts.len(), 4);
    assert_eq!(workload.ranks.len(), 4);
    assert!(workload.steps.is_empty());
    let parallel = workload
        .meta
        .as_ref()
        .and_then(|m| m.parallel.as_ref())
        .expect("parallel meta");
    assert_eq!((parallel.dp, parallel.tp, parallel.pp), (2, 2, 1));
    assert_eq!(parallel.layout, "dp-pp-tp");
    for rank in &workload.ranks {
        assert!(!rank.steps.is_empty());
    }
}

#[test]
fn compile_is_deterministic_down_to_the_serialized_bytes() {
    let opts = CompileOptions {
        dp: 2,
        tp: 2,
        pp: 1,
        pp_microbatch: 3,
        insert_wait: true,
        ..CompileOptions::default()
    };
    let a = compile(&small_profile(), &opts).expect("compile");
    let b = compile(&small_profile(), &opts).expect("compile");
    let a = serde_json::to_string_pretty(&a).expect("serialize");
    let b = serde_json::to_string_pretty(&b).expect("serialize");
    assert_eq!(a, b);
}

#[test]
fn compile_rejects_bad_configurations_without_output() {
    let base = CompileOptions::default();

    let opts = CompileOptions {
        pp_microbatch: 0,
        ..base.clone()
    };
    assert_eq!(
        compile(&small_profile(), &opts).unwrap_err(),
        CompileError::DegreeTooSmall {
            name: "pp_microbatch"
        }
    );

    let opts = CompileOptions {
        dp: 2,
        batch: Some(7),
        ..base.clone()
    };
    assert!(matches!(
        compile(&small_profile(), &opts).unwrap_err(),
        CompileError::BatchNotDivisible { .. }
    ));

    let opts = CompileOptions {
        dp: 2,
        pp_microbatch: 4,
        batch: Some(12),
        ..base.clone()
    };
    assert!(matches!(
        compile(&small_profile(), &opts).unwrap_err(),
        CompileError::MicrobatchNotDivisible { .. }
    ));

    let opts = CompileOptions {
        dp: 2,
        hosts: Some(3),
        ..base.clone()
    };
    assert_eq!(
        compile(&small_profile(), &opts).unwrap_err(),
        CompileError::HostCountMismatch {
            hosts: 3,
            expected: 2
        }
    );

    let empty = profile(r#"{ "rows": [] }"#);
    assert_eq!(
        compile(&empty, &base).unwrap_err(),
        CompileError::EmptyProfile
    );
}

#[test]
fn inference_compile_emits_forward_only_ranks() {
    let opts = CompileOptions {
        mode: Mode::Inference,
        pp: 1,
        pp_microbatch: 2,
        ..CompileOptions::default()
    };
    let workload = compile(&small_profile(), &opts).expect("compile");
    for rank in &workload.ranks {
        for step in &rank.steps {
            assert!(step.label().starts_with("fwd_") || step.label().starts_with("dp_fwd"));
        }
    }
}

#[test]
fn flat_conversion_coalesces_compute_and_flushes_on_comm() {
    let record = |name: &str, fw: f64, bw: f64, comm: &[(crate::profile::CommOp, u64)]| {
        let mut fw_comm = OpBytes::new();
        for &(op, bytes) in comm {
            fw_comm.add(op, bytes);
        }
        LayerRecord {
            name: name.to_string(),
            fw_ms: fw,
            bw_ms: bw,
            fw_comm,
            bw_comm: OpBytes::new(),
            output_elems: None,
            group: None,
        }
    };
    use crate::profile::CommOp;

    let records = vec![
        record("a", 1.0, 1.0, &[]),
        record("b", 2.0, 0.0, &[]),
        record("sync", 0.0, 0.0, &[(CommOp::Allreduce, 4096)]),
        record("c", 0.5, 0.0, &[]),
    ];
    let steps = build_flat_steps(&records, &[0, 1]);
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].label.as_deref(), Some("sync"));
    assert_eq!(steps[0].compute_ms, 4.0);
    assert_eq!(steps[0].comm_bytes, 4096);
    assert_eq!(steps[0].hosts, vec![0, 1]);
    assert_eq!(steps[1].label.as_deref(), Some("compute_tail"));
    assert_eq!(steps[1].compute_ms, 0.5);
    assert_eq!(steps[1].comm_bytes, 0);
    assert_eq!(steps[0].id, 0);
    assert_eq!(steps[1].id, 1);
}

#[test]
fn flat_converter_builds_a_schema_one_artifact() {
    let opts = FlatOptions {
        hosts: 2,
        source: Some("predictor".to_string()),
        ..FlatOptions::default()
    };
    let workload = convert_flat(&small_profile(), &opts).expect("convert");
    assert_eq!(workload.schema_version, 1);
    assert_eq!(workload.hosts.len(), 2);
    assert!(workload.ranks.is_empty());
    assert!(!workload.steps.is_empty());
    assert!(matches!(workload.topology, TopologySpec::Dumbbell { .. }));
    assert_eq!(
        workload.meta.as_ref().and_then(|m| m.source.as_deref()),
        Some("predictor")
    );
}

#[test]
fn fat_tree_k_inference_accepts_exact_populations_only() {
    assert_eq!(infer_fat_tree_k(2), Some(2));
    assert_eq!(infer_fat_tree_k(16), Some(4));
    assert_eq!(infer_fat_tree_k(54), Some(6));
    assert_eq!(infer_fat_tree_k(128), Some(8));
    assert_eq!(infer_fat_tree_k(0), None);
    assert_eq!(infer_fat_tree_k(6), None);
    assert_eq!(infer_fat_tree_k(17), None);
}

#[test]
fn fat_tree_k_fitting_sizes_up_to_the_next_even_k() {
    assert_eq!(fit_fat_tree_k(2), 2);
    assert_eq!(fit_fat_tree_k(3), 4);
    assert_eq!(fit_fat_tree_k(6), 4);
    assert_eq!(fit_fat_tree_k(16), 4);
    assert_eq!(fit_fat_tree_k(17), 6);
    // growth loop has to step past several even candidates
    assert_eq!(fit_fat_tree_k(65), 8);
    assert_eq!(fit_fat_tree_k(129), 10);
}

#[test]
fn topology_defaults_to_dumbbell_at_two_hosts_and_fat_tree_otherwise() {
    let opts = TopologyOpts::default();
    assert!(matches!(
        build_topology(2, &opts),
        TopologySpec::Dumbbell { .. }
    ));
    match build_topology(8, &opts) {
        TopologySpec::FatTree { k, .. } => assert_eq!(k, 4),
        other => panic!("expected fat_tree, got {other:?}"),
    }
}

#[test]
fn strict_topology_requires_an_invertible_host_count() {
    let opts = TopologyOpts {
        kind: Some(TopologyKind::FatTree),
        ..TopologyOpts::default()
    };
    assert!(matches!(
        build_topology_strict(16, &opts),
        Ok(TopologySpec::FatTree { k: 4, .. })
    ));
    assert_eq!(
        build_topology_strict(6, &opts).unwrap_err(),
        CompileError::FatTreeK { hosts: 6 }
    );
    let with_k = TopologyOpts {
        kind: Some(TopologyKind::FatTree),
        k: Some(6),
        ..TopologyOpts::default()
    };
    assert!(matches!(
        build_topology_strict(6, &with_k),
        Ok(TopologySpec::FatTree { k: 6, .. })
    ));
}

#[test]
fn comm_rows_contribute_bytes_but_no_compute_time() {
    let opts = CompileOptions::default();
    let workload = compile(&small_profile(), &opts).expect("compile");
    let steps = &workload.ranks[0].steps;
    // The gradient all-reduce row carried 0.1 ms of latency, which must not
    // surface as compute; only matmul_0 contributes time.
    let compute_total: f64 = steps
        .iter()
        .filter_map(|s| match s {
            RankStep::Compute { compute_ms, .. } => Some(*compute_ms),
            _ => None,
        })
        .sum();
    assert_eq!(compute_total, 1.5 + 3.0);
    // dp=1 still runs the gradient reduction over the one-member dp group.
    let dp_bytes: u64 = steps
        .iter()
        .filter_map(|s| match s {
            RankStep::Collective { comm_bytes, .. } => Some(*comm_bytes),
            _ => None,
        })
        .sum();
    assert_eq!(dp_bytes, 1024 * 4);
}
