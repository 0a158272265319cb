//! Locality-aware FIFO: ready tasks enter a persistent queue (optionally
//! sorted by input-payload weight), and the head is placed on the core whose
//! NUMA node holds the most of its input data.

use std::collections::{HashMap, HashSet, VecDeque};

use log::debug;

use crate::config::MapperType;
use crate::error::Result;

use super::{Decision, Scheduler, SchedulerContext};

pub struct FifoScheduler {
    ctx: SchedulerContext,
    queue: VecDeque<usize>,
    queued: HashSet<usize>,
    prioritize_by_core_id: bool,
    prioritize_by_exec_order: bool,
    mapper_type: MapperType,
}

impl FifoScheduler {
    pub fn new(
        ctx: SchedulerContext,
        prioritize_by_core_id: bool,
        prioritize_by_exec_order: bool,
        mapper_type: MapperType,
    ) -> Self {
        Self {
            ctx,
            queue: VecDeque::new(),
            queued: HashSet::new(),
            prioritize_by_core_id,
            prioritize_by_exec_order,
            mapper_type,
        }
    }

    /// Sum of recorded incoming payload bytes; the task's data pull.
    fn data_locality_score(&self, task_name: &str) -> f64 {
        self.ctx
            .state
            .write_offsets_to(task_name)
            .iter()
            .map(|(_, range)| range.payload)
            .sum()
    }

    /// Incoming payload of `task_name` per NUMA node; payloads whose pages
    /// span several nodes are split evenly.
    fn numa_payload_of_inputs(&self, task_name: &str) -> Result<HashMap<usize, f64>> {
        let mut payload_by_numa: HashMap<usize, f64> = HashMap::new();
        for (comm_name, range) in self.ctx.state.write_offsets_to(task_name) {
            let numa_ids = self.ctx.state.numa_ids_w(&comm_name)?;
            if numa_ids.is_empty() {
                continue;
            }
            let share = range.payload / numa_ids.len() as f64;
            for numa_id in numa_ids {
                *payload_by_numa.entry(numa_id).or_insert(0.0) += share;
            }
        }
        Ok(payload_by_numa)
    }

    /// Pick the core for the queue head and estimate its finish time there.
    fn best_core(&self, task_name: &str, flops: f64) -> Result<Option<(usize, f64)>> {
        let mut avail = self.ctx.state.avail_core_ids();
        if avail.is_empty() {
            return Ok(None);
        }

        let payload_by_numa = self.numa_payload_of_inputs(task_name)?;

        if self.prioritize_by_core_id {
            // Cores on data-heavy nodes first; stable sort keeps id order
            // inside a node.
            let mut keyed: Vec<(usize, f64)> = Vec::with_capacity(avail.len());
            for &core_id in &avail {
                let numa_id = self.ctx.topology.core_to_numa(core_id)?;
                keyed.push((
                    core_id,
                    payload_by_numa.get(&numa_id).copied().unwrap_or(0.0),
                ));
            }
            keyed.sort_by(|a, b| b.1.partial_cmp(&a.1).expect("scores are finite"));
            avail = keyed.into_iter().map(|(core_id, _)| core_id).collect();
        }

        let mut chosen = avail[0];
        if self.mapper_type == MapperType::Simulation {
            // The simulation clock lives in avail_until: dispatch on the
            // core whose "now" is earliest, resolved in sort order.
            let snapshot = self.ctx.state.core_snapshot();
            let current_time = avail
                .iter()
                .map(|&core_id| snapshot[core_id].1)
                .fold(f64::INFINITY, f64::min);
            chosen = *avail
                .iter()
                .find(|&&core_id| snapshot[core_id].1 <= current_time)
                .expect("some available core attains the minimum");
        }

        let chosen_numa = self.ctx.topology.core_to_numa(chosen)?;
        debug!("fifo head '{task_name}' -> core {chosen} (numa {chosen_numa})");

        let est_us = crate::cost::earliest_start_time_us(&self.ctx.state, task_name, chosen)?;

        let mut read_us = 0.0f64;
        for (comm_name, range) in self.ctx.state.write_offsets_to(task_name) {
            // Empty placement means nothing was materialized (zero-byte
            // payload); such an edge costs nothing to read.
            let Some(&src_numa) = self.ctx.state.numa_ids_w(&comm_name)?.first() else {
                continue;
            };
            read_us = read_us.max(self.ctx.cost.communication_time_us(
                src_numa,
                chosen_numa,
                range.payload,
            ));
        }

        let frequency_hz = self.ctx.topology.clock_frequency_hz(chosen)?;
        let compute_us = self.ctx.cost.compute_time_us(flops, frequency_hz);

        let mut write_us = 0.0f64;
        for edge in self.ctx.dag.out_edges(task_name) {
            if edge.feeds_sink() {
                continue;
            }
            write_us = write_us.max(self.ctx.cost.communication_time_us(
                chosen_numa,
                chosen_numa,
                edge.payload_bytes,
            ));
        }

        Ok(Some((chosen, est_us + read_us + compute_us + write_us)))
    }
}

impl Scheduler for FifoScheduler {
    fn has_next(&self) -> bool {
        self.ctx.dag.has_unassigned()
    }

    fn next(&mut self) -> Result<Decision> {
        let mut ready = self.ctx.dag.ready_tasks();
        if ready.is_empty() {
            return Ok(Decision::NoReadyTask);
        }

        if self.prioritize_by_exec_order {
            // Data-heavy tasks first; stable sort preserves DAG order for
            // equal scores.
            let scores: HashMap<usize, f64> = ready
                .iter()
                .map(|&idx| {
                    (
                        idx,
                        self.data_locality_score(&self.ctx.dag.task(idx).name),
                    )
                })
                .collect();
            ready.sort_by(|a, b| scores[b].partial_cmp(&scores[a]).expect("scores are finite"));
        }

        for task_index in ready {
            if self.queued.insert(task_index) {
                self.queue.push_back(task_index);
            }
        }

        let &head = self.queue.front().expect("ready set was non-empty");
        let task = self.ctx.dag.task(head);
        let Some((core_id, eft_us)) = self.best_core(&task.name, task.flops)? else {
            // Keep the head queued; the driver backs off and retries.
            return Ok(Decision::NoAvailableCore);
        };

        self.queue.pop_front();
        self.queued.remove(&head);
        Ok(Decision::Assign {
            task_index: head,
            core_id,
            eft_us,
        })
    }
}
