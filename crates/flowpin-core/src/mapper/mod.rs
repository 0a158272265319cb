//! Mapper driver: pulls placements from the scheduler, commits them, and
//! hands them to an execution mode.
//!
//! The loop never spins: when the scheduler reports no ready task or no
//! available core, the driver sleeps a fixed backoff and asks again.

pub mod bare_metal;
pub mod simulation;

use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::info;

use crate::dag::Dag;
use crate::error::Result;
use crate::scheduler::{Decision, Scheduler};
use crate::state::SharedState;

pub use bare_metal::BareMetalMapper;
pub use simulation::SimulationMapper;

/// Fixed sleep between scheduler polls when nothing can be placed.
pub const BACKOFF: Duration = Duration::from_secs(5);

/// An execution mode that can drain the whole DAG.
pub trait Mapper {
    fn run(&mut self, scheduler: &mut dyn Scheduler) -> Result<()>;
}

/// Absolute wall-clock time in microseconds since the epoch.
pub(crate) fn now_us() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_micros() as f64
}

/// The shared spawn/commit loop.
///
/// `launch` receives an already-committed placement: the task is marked
/// assigned and the core is unavailable before the call.
pub(crate) fn drive(
    scheduler: &mut dyn Scheduler,
    dag: &Dag,
    state: &SharedState,
    mut launch: impl FnMut(usize, usize, f64) -> Result<()>,
) -> Result<()> {
    scheduler.initialize()?;

    while scheduler.has_next() {
        match scheduler.next()? {
            Decision::NoReadyTask => {
                info!("no ready tasks, backing off {}s", BACKOFF.as_secs());
                thread::sleep(BACKOFF);
            }
            Decision::NoAvailableCore => {
                info!("no available cores, backing off {}s", BACKOFF.as_secs());
                thread::sleep(BACKOFF);
            }
            Decision::Assign {
                task_index,
                core_id,
                eft_us,
            } => {
                let task = dag.task(task_index);
                info!(
                    "assign task '{}' -> core {core_id} (estimated finish {eft_us:.1} us)",
                    task.name
                );
                task.mark_assigned();
                state.commit_core(core_id);
                launch(task_index, core_id, eft_us)?;
            }
        }
    }

    Ok(())
}
