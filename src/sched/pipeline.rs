//! Per-rank schedule emission for the pipeline disciplines.

use crate::error::CompileError;
use crate::profile::{CommOp, is_async_op};
use crate::sched::stage::StageStats;
use crate::sched::topology::{RankInfo, RankTopology};
use crate::workload::{RankStep, SendRecvDirection};

/// Training runs forward and backward per microbatch; inference runs forward
/// only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Inference,
}

impl Mode {
    pub fn parse(raw: &str) -> Result<Self, CompileError> {
        match raw.trim() {
            "train" => Ok(Self::Train),
            "inf" => Ok(Self::Inference),
            _ => Err(CompileError::InvalidMode {
                raw: raw.to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Inference => "inf",
        }
    }
}

/// Pipeline scheduling discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineSchedule {
    /// All forward microbatches, then all backward microbatches.
    FwdBwd,
    /// Interleaved one-forward-one-backward with a per-stage warmup.
    OneFOneB,
}

impl PipelineSchedule {
    pub fn parse(raw: &str) -> Result<Self, CompileError> {
        match raw.trim() {
            "fwd_bwd" => Ok(Self::FwdBwd),
            "1f1b" => Ok(Self::OneFOneB),
            _ => Err(CompileError::InvalidPipeline {
                raw: raw.to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FwdBwd => "fwd_bwd",
            Self::OneFOneB => "1f1b",
        }
    }
}

/// Millisecond durations are emitted with microsecond precision.
pub(crate) fn round6(ms: f64) -> f64 {
    (ms * 1e6).round() / 1e6
}

fn with_op_suffix(base: String, op: CommOp, multi: bool) -> String {
    if multi {
        format!("{base}-{}", op.tag())
    } else {
        base
    }
}

/// Builds one rank's ordered step list.
///
/// Comm-ids are derived from group-invariant coordinates only, so every
/// participant of a logical collective or hand-off computes the same id.
/// Zero-duration compute, zero-byte communication, and hand-offs with no
/// peer are suppressed. If `insert_wait` is set and an async collective was
/// emitted, a single trailing wait step closes the trace. Ids are assigned
/// 0..k-1 in emission order at the end.
pub fn build_rank_steps(
    rank: &RankInfo,
    stages: &[StageStats],
    topo: &RankTopology,
    microbatches: usize,
    schedule: PipelineSchedule,
    mode: Mode,
    insert_wait: bool,
) -> Vec<RankStep> {
    let microbatches = microbatches.max(1);
    let mut emitter = StepEmitter {
        steps: Vec::new(),
        stats: &stages[rank.pp],
        tp_group: topo.tp_group(rank),
        dp_group: topo.dp_group(rank),
        prev_rank: topo.pp_prev(rank),
        next_rank: topo.pp_next(rank),
        dp: rank.dp,
        pp: rank.pp,
        tp: rank.tp,
        tp_degree: topo.tp_degree(),
        async_seen: false,
    };

    match (mode, schedule) {
        (Mode::Inference, _) => {
            for mb in 0..microbatches {
                emitter.forward(mb);
            }
        }
        (Mode::Train, PipelineSchedule::FwdBwd) => {
            for mb in 0..microbatches {
                emitter.forward(mb);
            }
            for mb in 0..microbatches {
                emitter.backward(mb);
            }
        }
        (Mode::Train, PipelineSchedule::OneFOneB) => {
            let warmup = microbatches.min(topo.pp_degree() - rank.pp - 1);
            let mut fwd_idx = 0;
            let mut bwd_idx = 0;
            for _ in 0..warmup {
                emitter.forward(fwd_idx);
                fwd_idx += 1;
            }
            for _ in 0..(microbatches - warmup) {
                emitter.forward(fwd_idx);
                fwd_idx += 1;
                emitter.backward(bwd_idx);
                bwd_idx += 1;
            }
            while bwd_idx < microbatches {
                emitter.backward(bwd_idx);
                bwd_idx += 1;
            }
        }
    }

    emitter.finish(insert_wait)
}

/// Accumulates one rank's steps during schedule emission.
struct StepEmitter<'a> {
    steps: Vec<RankStep>,
    stats: &'a StageStats,
    tp_group: Vec<usize>,
    dp_group: Vec<usize>,
    prev_rank: Option<usize>,
    next_rank: Option<usize>,
    dp: usize,
    pp: usize,
    tp: usize,
    tp_degree: usize,
    async_seen: bool,
}

impl StepEmitter<'_> {
    /// Hand-off ids carry the source stage; both endpoints of an edge derive
    /// the same id from it.
    fn pp_comm_id(&self, direction: &str, src_stage: usize, microbatch: usize) -> String {
        format!(
            "pp-{direction}-s{src_stage}-mb{microbatch}-dp{}-tp{}",
            self.dp, self.tp
        )
    }

    fn tp_comm_id(&self, direction: &str, microbatch: usize) -> String {
        format!(
            "tp-{direction}-pp{}-dp{}-mb{microbatch}",
            self.pp, self.dp
        )
    }

    fn dp_comm_id(&self, direction: &str, microbatch: usize) -> String {
        format!(
            "dp-{direction}-pp{}-tp{}-mb{microbatch}",
            self.pp, self.tp
        )
    }

    fn push_compute(&mut self, label: String, ms: f64) {
        if ms <= 0.0 {
            return;
        }
        self.steps.push(RankStep::Compute {
            id: 0,
            label,
            compute_ms: round6(ms),
        });
    }

    fn push_collective(
        &mut self,
        label: String,
        op: CommOp,
        comm_bytes: u64,
        hosts: Vec<usize>,
        comm_id: String,
    ) {
        if comm_bytes == 0 {
            return;
        }
        let op = op.collective_op();
        if is_async_op(op) {
            self.async_seen = true;
        }
        self.steps.push(RankStep::Collective {
            id: 0,
            label,
            op: op.to_string(),
            comm_bytes,
            hosts,
            comm_id,
        });
    }

    fn push_sendrecv(
        &mut self,
        label: String,
        comm_bytes: u64,
        peer: usize,
        direction: SendRecvDirection,
        comm_id: String,
    ) {
        if comm_bytes == 0 {
            return;
        }
        self.steps.push(RankStep::Sendrecv {
            id: 0,
            label,
            comm_bytes,
            peer,
            direction,
            comm_id,
        });
    }

    fn forward(&mut self, mb: usize) {
        if let Some(prev) = self.prev_rank {
            let comm_id = self.pp_comm_id("fwd", self.pp - 1, mb);
            self.push_sendrecv(
                format!("fwd_recv_mb{mb}"),
                self.stats.pp_bytes,
                prev,
                SendRecvDirection::Recv,
                comm_id,
            );
        }
        self.push_compute(format!("fwd_mb{mb}"), self.stats.fw_compute_ms);

        // With tensor-parallelism disabled, forward collective traffic has no
        // tp peers to run over and rides the data-parallel group instead.
        let entries = self.stats.tp_fw.entries();
        let multi = entries.len() > 1;
        for (op, bytes) in entries {
            if self.tp_degree > 1 {
                let comm_id = with_op_suffix(self.tp_comm_id("fwd", mb), op, multi);
                let hosts = self.tp_group.clone();
                self.push_collective(format!("tp_fwd_mb{mb}"), op, bytes, hosts, comm_id);
            } else {
                let comm_id = with_op_suffix(self.dp_comm_id("fwd", mb), op, multi);
                let hosts = self.dp_group.clone();
                self.push_collective(format!("dp_fwd_mb{mb}"), op, bytes, hosts, comm_id);
            }
        }

        if let Some(next) = self.next_rank {
            let comm_id = self.pp_comm_id("fwd", self.pp, mb);
            self.push_sendrecv(
                format!("fwd_send_mb{mb}"),
                self.stats.pp_bytes,
                next,
                SendRecvDirection::Send,
                comm_id,
            );
        }
    }

    fn backward(&mut self, mb: usize) {
        if let Some(next) = self.next_rank {
            let comm_id = self.pp_comm_id("bwd", self.pp + 1, mb);
            self.push_sendrecv(
                format!("bwd_recv_mb{mb}"),
                self.stats.pp_bytes,
                next,
                SendRecvDirection::Recv,
                comm_id,
            );
        }
        self.push_compute(format!("bwd_mb{mb}"), self.stats.bw_compute_ms);

        let entries = self.stats.tp_bw.entries();
        let multi = entries.len() > 1;
        for (op, bytes) in entries {
            let comm_id = with_op_suffix(self.tp_comm_id("bwd", mb), op, multi);
            let hosts = self.tp_group.clone();
            self.push_collective(format!("tp_bwd_mb{mb}"), op, bytes, hosts, comm_id);
        }

        let entries = self.stats.dp_bw.entries();
        let multi = entries.len() > 1;
        for (op, bytes) in entries {
            let comm_id = with_op_suffix(self.dp_comm_id("bwd", mb), op, multi);
            let hosts = self.dp_group.clone();
            self.push_collective(format!("dp_bwd_mb{mb}"), op, bytes, hosts, comm_id);
        }

        if let Some(prev) = self.prev_rank {
            let comm_id = self.pp_comm_id("bwd", self.pp, mb);
            self.push_sendrecv(
                format!("bwd_send_mb{mb}"),
                self.stats.pp_bytes,
                prev,
                SendRecvDirection::Send,
                comm_id,
            );
        }
    }

    fn finish(mut self, insert_wait: bool) -> Vec<RankStep> {
        if insert_wait && self.async_seen {
            self.steps.push(RankStep::CollectiveWait {
                id: 0,
                label: "wait_async".to_string(),
            });
        }
        for (idx, step) in self.steps.iter_mut().enumerate() {
            step.set_id(idx as u64);
        }
        self.steps
    }
}
