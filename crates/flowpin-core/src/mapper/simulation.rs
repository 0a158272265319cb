//! Simulation execution: every duration comes from the cost model, nothing
//! touches memory, and the whole run stays on the orchestrator thread.
//!
//! `core_avail_until` doubles as the per-core simulation clock: it advances
//! to each task's RCW finish, and the earliest-start computation folds it
//! back into the next placement on that core.

use std::sync::Arc;

use log::info;

use crate::cost::{earliest_start_time_us, CostModel};
use crate::dag::Dag;
use crate::error::Result;
use crate::scheduler::Scheduler;
use crate::state::{SharedState, TimeRange, NULL_ADDRESS};
use crate::topology::Topology;

use super::{drive, Mapper};

pub struct SimulationMapper {
    dag: Arc<Dag>,
    state: Arc<SharedState>,
    topology: Arc<dyn Topology>,
    cost: CostModel,
}

impl SimulationMapper {
    pub fn new(
        dag: Arc<Dag>,
        state: Arc<SharedState>,
        topology: Arc<dyn Topology>,
        cost: CostModel,
    ) -> Self {
        Self {
            dag,
            state,
            topology,
            cost,
        }
    }

    /// Predict one task inline. Mirrors the bare-metal worker's sequence
    /// with model-derived, piecewise durations.
    fn simulate_task(&self, task_index: usize, core_id: usize) -> Result<()> {
        let task = self.dag.task(task_index);
        let state = &self.state;

        let core_numa = self.topology.core_to_numa(core_id)?;
        let earliest_start = earliest_start_time_us(state, &task.name, core_id)?;

        info!(
            "task '{}' simulated on core {core_id} (numa {core_numa})",
            task.name
        );

        /* PREDICT READS */
        let mut latest_read_end = earliest_start;

        for (comm_name, range) in state.write_offsets_to(&task.name) {
            let read_time = match state.numa_ids_w(&comm_name)?.first() {
                Some(&src_numa) => {
                    self.cost
                        .communication_time_us(src_numa, core_numa, range.payload)
                }
                None => 0.0,
            };

            let read_start = earliest_start;
            let read_end = read_start + read_time;
            state.record_read_offset(
                &comm_name,
                TimeRange::new(read_start, read_end, range.payload),
            );
            state.increment_read_active(&comm_name);
            latest_read_end = latest_read_end.max(read_end);
        }

        /* PREDICT COMPUTE */
        let frequency_hz = self.topology.clock_frequency_hz(core_id)?;
        let compute_time = self.cost.compute_time_us(task.flops, frequency_hz);
        let compute_start = latest_read_end;
        let compute_end = compute_start + compute_time;

        state.record_compute_offset(
            &task.name,
            TimeRange::new(compute_start, compute_end, task.flops),
        );
        state.increment_exec_active(&task.name);

        /* PREDICT WRITES */
        let mut latest_write_end = compute_end;

        for edge in self.dag.out_edges(&task.name) {
            if edge.feeds_sink() {
                continue;
            }
            // First-touch: the written pages land on the executing core's
            // node, so source and destination coincide.
            let write_time =
                self.cost
                    .communication_time_us(core_numa, core_numa, edge.payload_bytes);
            let write_start = compute_end;
            let write_end = write_start + write_time;

            state.record_write_offset(
                &edge.name,
                TimeRange::new(write_start, write_end, edge.payload_bytes),
            );
            state.set_numa_ids_w(&edge.name, vec![core_numa]);
            state.set_address(&edge.name, NULL_ADDRESS);
            state.increment_write_active(&edge.name);

            latest_write_end = latest_write_end.max(write_end);
        }

        state.record_rcw_offset(
            &task.name,
            TimeRange::new(earliest_start, latest_write_end, task.flops),
        );

        for edge in self.dag.out_edges(&task.name) {
            edge.mark_completed();
        }

        // Advance this core's clock to the predicted finish.
        state.release_core(core_id, latest_write_end);
        Ok(())
    }
}

impl Mapper for SimulationMapper {
    fn run(&mut self, scheduler: &mut dyn Scheduler) -> Result<()> {
        let dag = Arc::clone(&self.dag);
        let state = Arc::clone(&self.state);
        drive(scheduler, &dag, &state, |task_index, core_id, _eft_us| {
            self.simulate_task(task_index, core_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::matrix::DistanceMatrix;
    use crate::topology::{ClockSource, StaticTopology};

    fn chain_mapper() -> (SimulationMapper, Arc<Dag>, Arc<SharedState>) {
        let tasks = vec![
            ("root".to_string(), 0.0),
            ("A".to_string(), 1e9),
            ("B".to_string(), 1e9),
            ("end".to_string(), 0.0),
        ];
        let edges = vec![
            ("root".to_string(), "A".to_string(), 0.0),
            ("A".to_string(), "B".to_string(), 1e6),
            ("B".to_string(), "end".to_string(), 0.0),
        ];
        let mut dag = Dag::from_parts(tasks, edges).unwrap();
        dag.strip_entry_exit().unwrap();
        let dag = Arc::new(dag);

        let state = Arc::new(SharedState::new(vec![true, true]));
        let lat = DistanceMatrix::new(2, vec![10.0, 100.0, 100.0, 10.0]).unwrap();
        let bw = DistanceMatrix::new(2, vec![50.0, 25.0, 25.0, 50.0]).unwrap();
        let mapper = SimulationMapper::new(
            Arc::clone(&dag),
            Arc::clone(&state),
            Arc::new(StaticTopology::new(vec![0, 1], ClockSource::Static(1e9))),
            CostModel::new(Arc::new(lat), Arc::new(bw), 32.0),
        );
        (mapper, dag, state)
    }

    #[test]
    fn simulated_task_records_piecewise_offsets() {
        let (mapper, dag, state) = chain_mapper();
        state.commit_core(0);
        mapper.simulate_task(0, 0).unwrap();

        // No inputs: compute starts at 0, runs 31250 us, then one write of
        // 1e6 bytes intra-node (0.01 + 20 us).
        let compute = state.compute_offset("A").unwrap();
        assert_eq!(compute.start_us, 0.0);
        assert!((compute.end_us - 31250.0).abs() < 1e-6);

        let write = state
            .write_offsets_to("B")
            .into_iter()
            .next()
            .map(|(_, r)| r)
            .unwrap();
        assert!((write.start_us - 31250.0).abs() < 1e-6);
        assert!((write.end_us - 31270.01).abs() < 1e-6);

        let rcw = state.rcw_offset("A").unwrap();
        assert_eq!(rcw.start_us, 0.0);
        assert!((rcw.end_us - 31270.01).abs() < 1e-6);

        // The core clock advanced to the RCW finish and the core is free.
        assert_eq!(state.core_avail_until(0).unwrap(), rcw.end_us);
        assert_eq!(state.avail_core_ids(), vec![0, 1]);

        // Frontier advanced.
        assert!(dag.edge_by_name("A->B").unwrap().is_completed());
    }

    #[test]
    fn dependent_task_starts_after_predecessor_rcw_end() {
        let (mapper, dag, state) = chain_mapper();
        state.commit_core(0);
        mapper.simulate_task(0, 0).unwrap();
        dag.task(0).mark_assigned();

        // Run B on the other node: its read crosses the interconnect.
        state.commit_core(1);
        mapper.simulate_task(1, 1).unwrap();

        let a_rcw = state.rcw_offset("A").unwrap();
        let b_rcw = state.rcw_offset("B").unwrap();
        assert!(b_rcw.start_us >= a_rcw.end_us);

        let read = state.read_offset("A->B").unwrap();
        // 100 ns -> 0.1 us latency plus 1e6 / 25_000 = 40 us cross-node.
        assert!((read.end_us - read.start_us - 40.1).abs() < 1e-6);
    }

    #[test]
    fn virtual_records_use_the_null_address_sentinel() {
        let (mapper, _, state) = chain_mapper();
        state.commit_core(0);
        mapper.simulate_task(0, 0).unwrap();
        assert_eq!(state.address("A->B").unwrap(), NULL_ADDRESS);
        assert_eq!(state.numa_ids_w("A->B").unwrap(), vec![0]);
    }
}
