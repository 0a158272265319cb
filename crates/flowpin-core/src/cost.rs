//! The NUMA-aware cost model: three pure functions that every scheduler and
//! the simulation worker share. All results are in microseconds.

use std::sync::Arc;

use crate::error::Result;
use crate::matrix::DistanceMatrix;
use crate::state::SharedState;

/// Immutable cost parameters: the two distance matrices and the machine-wide
/// FLOPs-per-cycle constant.
#[derive(Debug, Clone)]
pub struct CostModel {
    latency_ns: Arc<DistanceMatrix>,
    bandwidth_gbps: Arc<DistanceMatrix>,
    flops_per_cycle: f64,
}

impl CostModel {
    pub fn new(
        latency_ns: Arc<DistanceMatrix>,
        bandwidth_gbps: Arc<DistanceMatrix>,
        flops_per_cycle: f64,
    ) -> Self {
        Self {
            latency_ns,
            bandwidth_gbps,
            flops_per_cycle,
        }
    }

    pub fn latency_ns(&self) -> &DistanceMatrix {
        &self.latency_ns
    }

    pub fn bandwidth_gbps(&self) -> &DistanceMatrix {
        &self.bandwidth_gbps
    }

    pub fn flops_per_cycle(&self) -> f64 {
        self.flops_per_cycle
    }

    /// Time to move `payload_bytes` from `src_numa` to `dst_numa`:
    /// latency plus payload over bandwidth. `src == dst` models an
    /// intra-node access and is well-defined by the matrix diagonal.
    pub fn communication_time_us(
        &self,
        src_numa: usize,
        dst_numa: usize,
        payload_bytes: f64,
    ) -> f64 {
        let latency_us = self.latency_ns.get(src_numa, dst_numa) / 1000.0;
        let bandwidth_bytes_per_us = self.bandwidth_gbps.get(src_numa, dst_numa) * 1000.0;
        latency_us + payload_bytes / bandwidth_bytes_per_us
    }

    /// Time to execute `flops` at `clock_frequency_hz`.
    pub fn compute_time_us(&self, flops: f64, clock_frequency_hz: f64) -> f64 {
        flops / (self.flops_per_cycle * clock_frequency_hz) * 1e6
    }
}

/// Earliest start of `exec_name` on `core_id`: the later of the core's
/// avail-until clock and the latest recorded RCW end among predecessors.
///
/// Predecessors are resolved through the recorded write offsets whose
/// destination is the task, so a task with no materialized inputs
/// contributes zero from the predecessor term.
pub fn earliest_start_time_us(
    state: &SharedState,
    exec_name: &str,
    core_id: usize,
) -> Result<f64> {
    let mut max_pred_finish = 0.0f64;
    for (comm_name, _) in state.write_offsets_to(exec_name) {
        let (pred_name, _) = crate::dag::split_edge_name(&comm_name);
        let pred_rcw = state.rcw_offset(pred_name)?;
        max_pred_finish = max_pred_finish.max(pred_rcw.end_us);
    }

    let avail_until = state.core_avail_until(core_id)?;
    Ok(avail_until.max(max_pred_finish))
}
