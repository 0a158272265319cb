//! Pluggable scheduling policies.
//!
//! A scheduler owns no state beyond its policy bookkeeping; the DAG, the
//! shared record, the topology oracle, and the cost model arrive through
//! [`SchedulerContext`]. Each `next()` call inspects the current frontier and
//! proposes one (task, core) placement; the mapper commits it.

pub mod eft;
pub mod fifo;
pub mod heft;
pub mod min_min;

use std::sync::Arc;

use crate::config::{Config, SchedulerType};
use crate::cost::CostModel;
use crate::dag::Dag;
use crate::error::Result;
use crate::state::SharedState;
use crate::topology::Topology;

pub use fifo::FifoScheduler;
pub use heft::HeftScheduler;
pub use min_min::MinMinScheduler;

/// Outcome of one scheduling step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// No task is ready at this instant; the driver must back off.
    NoReadyTask,
    /// Ready tasks exist but no core is available; the driver must back off.
    NoAvailableCore,
    /// Place `task_index` on `core_id`; `eft_us` is the estimated finish.
    Assign {
        task_index: usize,
        core_id: usize,
        eft_us: f64,
    },
}

/// The capability set every policy implements.
pub trait Scheduler: Send {
    /// One-shot precomputation before the first `next()` (HEFT uses it).
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// True while any task in the DAG is unassigned.
    fn has_next(&self) -> bool;

    /// Propose the next placement. A task returned here is marked assigned
    /// by the mapper commit, never inside `next()` itself.
    fn next(&mut self) -> Result<Decision>;
}

/// Shared handles injected into every policy.
#[derive(Clone)]
pub struct SchedulerContext {
    pub dag: Arc<Dag>,
    pub state: Arc<SharedState>,
    pub topology: Arc<dyn Topology>,
    pub cost: CostModel,
}

/// Construct the configured policy.
pub fn build_scheduler(config: &Config, ctx: SchedulerContext) -> Box<dyn Scheduler> {
    match config.scheduler_type {
        SchedulerType::MinMin => Box::new(MinMinScheduler::new(ctx)),
        SchedulerType::Heft => Box::new(HeftScheduler::new(ctx)),
        SchedulerType::Fifo => Box::new(FifoScheduler::new(
            ctx,
            config.scheduler_param("fifo_prioritize_by_core_id") == Some("yes"),
            config.scheduler_param("fifo_prioritize_by_exec_order") == Some("yes"),
            config.mapper_type,
        )),
    }
}
