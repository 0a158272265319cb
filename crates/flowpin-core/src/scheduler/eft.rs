//! Earliest-finish-time estimation shared by MIN-MIN and HEFT.

use crate::dag::Task;
use crate::error::Result;

use super::SchedulerContext;

/// Estimate the earliest finish time of `task` on every available core and
/// return the `(core_id, eft_us)` with the minimum estimate, ties broken by
/// the lowest core id. `None` when no core is available.
///
/// The estimate is `est + read + compute + write`:
///
/// - `est` — the later of the core's avail-until clock and the latest
///   predecessor RCW end;
/// - `read` — the slowest incoming transfer, sourcing each payload from the
///   first recorded NUMA node of its producer's output (the documented
///   simplification for page sets spanning several nodes);
/// - `compute` — the FLOP budget at the core's clock;
/// - `write` — the slowest outgoing transfer under first-touch, i.e. source
///   and destination are both the candidate core's node; edges feeding the
///   sink are skipped.
pub fn best_core(ctx: &SchedulerContext, task: &Task) -> Result<Option<(usize, f64)>> {
    let incoming = ctx.state.write_offsets_to(&task.name);

    let mut best: Option<(usize, f64)> = None;

    for core_id in ctx.state.avail_core_ids() {
        let core_numa = ctx.topology.core_to_numa(core_id)?;

        let est_us = crate::cost::earliest_start_time_us(&ctx.state, &task.name, core_id)?;

        let mut read_us = 0.0f64;
        for (comm_name, range) in &incoming {
            // Empty placement means nothing was materialized (zero-byte
            // payload); such an edge costs nothing to read.
            let Some(&src_numa) = ctx.state.numa_ids_w(comm_name)?.first() else {
                continue;
            };
            read_us = read_us.max(ctx.cost.communication_time_us(
                src_numa,
                core_numa,
                range.payload,
            ));
        }

        let frequency_hz = ctx.topology.clock_frequency_hz(core_id)?;
        let compute_us = ctx.cost.compute_time_us(task.flops, frequency_hz);

        let mut write_us = 0.0f64;
        for edge in ctx.dag.out_edges(&task.name) {
            if edge.feeds_sink() {
                continue;
            }
            write_us = write_us.max(ctx.cost.communication_time_us(
                core_numa,
                core_numa,
                edge.payload_bytes,
            ));
        }

        let eft_us = est_us + read_us + compute_us + write_us;
        // Ascending core iteration makes strict < the lowest-id tie-break.
        if best.map_or(true, |(_, best_eft)| eft_us < best_eft) {
            best = Some((core_id, eft_us));
        }
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cost::CostModel;
    use crate::dag::Dag;
    use crate::matrix::DistanceMatrix;
    use crate::state::{SharedState, TimeRange};
    use crate::topology::{ClockSource, StaticTopology};

    fn two_node_ctx(core_avail: Vec<bool>) -> SchedulerContext {
        // Cores 0,1 on NUMA 0; cores 2,3 on NUMA 1.
        let topology = StaticTopology::new(vec![0, 0, 1, 1], ClockSource::Static(1e9));
        let lat = DistanceMatrix::new(2, vec![10.0, 100.0, 100.0, 10.0]).unwrap();
        let bw = DistanceMatrix::new(2, vec![50.0, 25.0, 25.0, 50.0]).unwrap();

        let tasks = vec![
            ("root".to_string(), 0.0),
            ("a".to_string(), 1e9),
            ("b".to_string(), 1e9),
            ("end".to_string(), 0.0),
        ];
        let edges = vec![
            ("root".to_string(), "a".to_string(), 0.0),
            ("a".to_string(), "b".to_string(), 1e6),
            ("b".to_string(), "end".to_string(), 0.0),
        ];
        let mut dag = Dag::from_parts(tasks, edges).unwrap();
        dag.strip_entry_exit().unwrap();

        SchedulerContext {
            dag: Arc::new(dag),
            state: Arc::new(SharedState::new(core_avail)),
            topology: Arc::new(topology),
            cost: CostModel::new(Arc::new(lat), Arc::new(bw), 32.0),
        }
    }

    #[test]
    fn no_available_core_yields_none() {
        let ctx = two_node_ctx(vec![false, false, false, false]);
        let task = ctx.dag.task_by_name("a").unwrap();
        assert!(best_core(&ctx, task).unwrap().is_none());
    }

    #[test]
    fn identical_cores_tie_break_to_lowest_id() {
        let ctx = two_node_ctx(vec![true, true, true, true]);
        let task = ctx.dag.task_by_name("a").unwrap();
        let (core, _) = best_core(&ctx, task).unwrap().unwrap();
        assert_eq!(core, 0);
    }

    #[test]
    fn read_locality_pulls_consumer_to_producer_node() {
        // Producer output recorded on NUMA 1: only cores 2,3 read locally.
        let ctx = two_node_ctx(vec![true, false, true, false]);
        ctx.state
            .record_write_offset("a->b", TimeRange::new(0.0, 20.0, 1e6));
        ctx.state.set_numa_ids_w("a->b", vec![1]);
        ctx.state.record_rcw_offset("a", TimeRange::new(0.0, 20.0, 1e9));

        let task = ctx.dag.task_by_name("b").unwrap();
        let (core, eft) = best_core(&ctx, task).unwrap().unwrap();
        assert_eq!(core, 2);
        // est 20 + read (10ns + 1e6/50_000 = 20.01) + compute 31250 + no write.
        assert!((eft - (20.0 + 20.01 + 31250.0)).abs() < 1e-6);
    }

    #[test]
    fn estimate_includes_first_touch_write_term() {
        let ctx = two_node_ctx(vec![true, false, false, false]);
        let task = ctx.dag.task_by_name("a").unwrap();
        let (_, eft) = best_core(&ctx, task).unwrap().unwrap();
        // No inputs; write a->b intra-node: 0.01 + 20 us; compute 31250 us.
        assert!((eft - (31250.0 + 20.01)).abs() < 1e-6);
    }

    #[test]
    fn sink_edges_do_not_contribute_write_time() {
        let ctx = two_node_ctx(vec![true, false, false, false]);
        let task = ctx.dag.task_by_name("b").unwrap();
        // b's only outgoing edge feeds the sink; no recorded inputs either,
        // so the estimate is pure compute.
        let (_, eft) = best_core(&ctx, task).unwrap().unwrap();
        assert!((eft - 31250.0).abs() < 1e-6);
    }

    #[test]
    fn busy_core_clock_raises_the_estimate() {
        let ctx = two_node_ctx(vec![true, false, false, false]);
        ctx.state.release_core(0, 5000.0);
        let task = ctx.dag.task_by_name("a").unwrap();
        let (_, eft) = best_core(&ctx, task).unwrap().unwrap();
        assert!((eft - (5000.0 + 31250.0 + 20.01)).abs() < 1e-6);
    }
}
