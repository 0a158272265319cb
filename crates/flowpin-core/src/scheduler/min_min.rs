//! MIN-MIN: each step, the (ready task, available core) pair with the
//! globally minimum estimated finish time wins.

use crate::error::Result;

use super::{eft, Decision, Scheduler, SchedulerContext};

pub struct MinMinScheduler {
    ctx: SchedulerContext,
}

impl MinMinScheduler {
    pub fn new(ctx: SchedulerContext) -> Self {
        Self { ctx }
    }
}

impl Scheduler for MinMinScheduler {
    fn has_next(&self) -> bool {
        self.ctx.dag.has_unassigned()
    }

    fn next(&mut self) -> Result<Decision> {
        let ready = self.ctx.dag.ready_tasks();
        if ready.is_empty() {
            return Ok(Decision::NoReadyTask);
        }
        if self.ctx.state.avail_core_ids().is_empty() {
            return Ok(Decision::NoAvailableCore);
        }

        // Ties: smallest task name lexicographically, then lowest core id
        // (the estimator already resolves the core tie).
        let mut selected: Option<(usize, usize, f64)> = None;
        for task_index in ready {
            let task = self.ctx.dag.task(task_index);
            let Some((core_id, eft_us)) = eft::best_core(&self.ctx, task)? else {
                return Ok(Decision::NoAvailableCore);
            };

            let better = match selected {
                None => true,
                Some((best_index, _, best_eft)) => {
                    eft_us < best_eft
                        || (eft_us == best_eft
                            && task.name < self.ctx.dag.task(best_index).name)
                }
            };
            if better {
                selected = Some((task_index, core_id, eft_us));
            }
        }

        let (task_index, core_id, eft_us) = selected.expect("ready set was non-empty");
        Ok(Decision::Assign {
            task_index,
            core_id,
            eft_us,
        })
    }
}
