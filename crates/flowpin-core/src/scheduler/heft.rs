//! HEFT: rank tasks once by upward rank (longest compute+communication path
//! to a sink), then place the highest-ranked ready task on its best core.

use std::collections::HashMap;

use log::debug;

use crate::dag::Task;
use crate::error::Result;

use super::{eft, Decision, Scheduler, SchedulerContext};

pub struct HeftScheduler {
    ctx: SchedulerContext,
    /// Average compute cost per task and average communication cost per
    /// edge, keyed by name.
    cost_by_name: HashMap<String, f64>,
    upward_ranks: HashMap<String, f64>,
}

impl HeftScheduler {
    pub fn new(ctx: SchedulerContext) -> Self {
        Self {
            ctx,
            cost_by_name: HashMap::new(),
            upward_ranks: HashMap::new(),
        }
    }

    /// Average compute cost of each task over the available cores, and
    /// average communication cost of each edge from the mean latency and
    /// bandwidth over all ordered pairs of available cores.
    fn initialize_costs(&mut self) -> Result<()> {
        let avail = self.ctx.state.avail_core_ids();
        if avail.is_empty() {
            return Err(crate::error::Error::Config(
                "HEFT initialization requires at least one available core".into(),
            ));
        }

        for task in self.ctx.dag.tasks() {
            if task.name == crate::dag::SINK_NAME {
                continue;
            }
            let mut total_us = 0.0;
            for &core_id in &avail {
                let hz = self.ctx.topology.clock_frequency_hz(core_id)?;
                total_us += self.ctx.cost.compute_time_us(task.flops, hz);
            }
            self.cost_by_name
                .insert(task.name.clone(), total_us / avail.len() as f64);
        }

        let mut latency_sum_ns = 0.0;
        let mut bandwidth_sum_gbps = 0.0;
        for &src in &avail {
            for &dst in &avail {
                let src_numa = self.ctx.topology.core_to_numa(src)?;
                let dst_numa = self.ctx.topology.core_to_numa(dst)?;
                latency_sum_ns += self.ctx.cost.latency_ns().get(src_numa, dst_numa);
                bandwidth_sum_gbps += self.ctx.cost.bandwidth_gbps().get(src_numa, dst_numa);
            }
        }
        let pair_count = (avail.len() * avail.len()) as f64;
        let mean_latency_ns = latency_sum_ns / pair_count;
        let mean_bandwidth_gbps = bandwidth_sum_gbps / pair_count;

        for task in self.ctx.dag.tasks() {
            for edge in self.ctx.dag.out_edges(&task.name) {
                if edge.feeds_sink() {
                    continue;
                }
                let cost_seconds =
                    mean_latency_ns / 1e9 + edge.payload_bytes / mean_bandwidth_gbps;
                self.cost_by_name.insert(edge.name.clone(), cost_seconds);
            }
        }

        Ok(())
    }

    /// Memoized upward rank: own cost plus the heaviest successor path.
    /// Edges into the sink contribute nothing.
    fn upward_rank(&mut self, task_name: &str) -> f64 {
        if let Some(&rank) = self.upward_ranks.get(task_name) {
            return rank;
        }

        let own_cost = self.cost_by_name.get(task_name).copied().unwrap_or(0.0);

        let successors: Vec<(String, String)> = self
            .ctx
            .dag
            .out_edges(task_name)
            .map(|edge| (edge.name.clone(), edge.dst.clone()))
            .collect();

        let mut max_successor = 0.0f64;
        for (edge_name, successor) in successors {
            if successor == crate::dag::SINK_NAME {
                continue;
            }
            let comm_cost = self.cost_by_name.get(&edge_name).copied().unwrap_or(0.0);
            let successor_rank = self.upward_rank(&successor);
            max_successor = max_successor.max(comm_cost + successor_rank);
        }

        let rank = own_cost + max_successor;
        self.upward_ranks.insert(task_name.to_string(), rank);
        rank
    }

    #[cfg(test)]
    fn rank_of(&self, task_name: &str) -> f64 {
        self.upward_ranks[task_name]
    }

    fn rank_of_task(&self, task: &Task) -> f64 {
        self.upward_ranks.get(&task.name).copied().unwrap_or(0.0)
    }
}

impl Scheduler for HeftScheduler {
    fn initialize(&mut self) -> Result<()> {
        self.initialize_costs()?;
        let names: Vec<String> = self
            .ctx
            .dag
            .tasks()
            .iter()
            .map(|t| t.name.clone())
            .collect();
        for name in names {
            let rank = self.upward_rank(&name);
            debug!("upward_rank {name}: {rank}");
        }
        Ok(())
    }

    fn has_next(&self) -> bool {
        self.ctx.dag.has_unassigned()
    }

    fn next(&mut self) -> Result<Decision> {
        let mut ready = self.ctx.dag.ready_tasks();
        if ready.is_empty() {
            return Ok(Decision::NoReadyTask);
        }

        // Highest rank first; equal ranks fall back to the smaller name.
        ready.sort_by(|&a, &b| {
            let (task_a, task_b) = (self.ctx.dag.task(a), self.ctx.dag.task(b));
            self.rank_of_task(task_b)
                .partial_cmp(&self.rank_of_task(task_a))
                .expect("upward ranks are finite")
                .then_with(|| task_a.name.cmp(&task_b.name))
        });

        let task = self.ctx.dag.task(ready[0]);
        match eft::best_core(&self.ctx, task)? {
            Some((core_id, eft_us)) => Ok(Decision::Assign {
                task_index: ready[0],
                core_id,
                eft_us,
            }),
            None => Ok(Decision::NoAvailableCore),
        }
    }
}
