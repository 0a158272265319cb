//! Bare-metal execution: one OS thread per assigned task, pinned to its
//! core, emulating the task's reads, compute, and writes against real memory
//! so the recorded timings reflect the machine's NUMA topology.

use std::alloc::{self, Layout};
use std::sync::Arc;

use log::{error, info, warn};

use crate::config::MemPolicyType;
use crate::cost::earliest_start_time_us;
use crate::dag::Dag;
use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use crate::state::{SharedState, TimeRange};
use crate::topology::Topology;

use super::{drive, now_us, Mapper};

pub struct BareMetalMapper {
    dag: Arc<Dag>,
    state: Arc<SharedState>,
    topology: Arc<dyn Topology>,
    mem_policy: MemPolicyType,
    mem_bind_numa_ids: Vec<usize>,
}

impl BareMetalMapper {
    pub fn new(
        dag: Arc<Dag>,
        state: Arc<SharedState>,
        topology: Arc<dyn Topology>,
        mem_policy: MemPolicyType,
        mem_bind_numa_ids: Vec<usize>,
    ) -> Self {
        Self {
            dag,
            state,
            topology,
            mem_policy,
            mem_bind_numa_ids,
        }
    }
}

impl Mapper for BareMetalMapper {
    fn run(&mut self, scheduler: &mut dyn Scheduler) -> Result<()> {
        let dag = Arc::clone(&self.dag);
        let state = Arc::clone(&self.state);

        drive(scheduler, &dag, &state, |task_index, core_id, _eft_us| {
            let worker = Worker {
                dag: Arc::clone(&self.dag),
                state: Arc::clone(&self.state),
                topology: Arc::clone(&self.topology),
                mem_policy: self.mem_policy,
                mem_bind_numa_ids: self.mem_bind_numa_ids.clone(),
                task_index,
                core_id,
            };

            // Registered on the driver thread so the final barrier can never
            // observe a transient zero between spawn and worker startup.
            self.state.worker_started();

            let task_name = self.dag.task(task_index).name.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("flowpin-{task_name}"))
                .spawn(move || worker.run());
            if let Err(spawn_err) = spawned {
                self.state.worker_finished();
                return Err(Error::Topology(format!(
                    "could not spawn worker for '{task_name}': {spawn_err}"
                )));
            }
            Ok(())
        })?;

        self.state.wait_for_quiescence();
        Ok(())
    }
}

struct Worker {
    dag: Arc<Dag>,
    state: Arc<SharedState>,
    topology: Arc<dyn Topology>,
    mem_policy: MemPolicyType,
    mem_bind_numa_ids: Vec<usize>,
    task_index: usize,
    core_id: usize,
}

impl Worker {
    fn run(self) {
        let task_name = self.dag.task(self.task_index).name.clone();
        let core_id = self.core_id;

        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.execute()));
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => Error::WorkerPanic {
                task: task_name,
                reason: err.to_string(),
            },
            Err(_) => Error::WorkerPanic {
                task: task_name,
                reason: "worker thread panicked".to_string(),
            },
        };

        // A worker either runs to completion or takes the process down;
        // limping on would deadlock the frontier.
        error!("core {core_id}: {failure}");
        std::process::exit(1);
    }

    fn execute(&self) -> Result<()> {
        let task = self.dag.task(self.task_index);
        let state = &self.state;

        self.topology.bind_current_thread_to_core(self.core_id)?;
        self.topology
            .set_thread_memory_policy(self.mem_policy, &self.mem_bind_numa_ids)?;

        // Placement self-check: the scheduler's core and the OS's view of
        // where this thread runs must agree.
        let locality = self.topology.thread_locality()?;
        let current_core = usize::try_from(locality.core_id)
            .map_err(|_| Error::Topology("thread runs on an unresolvable core".into()))?;
        if current_core != self.core_id {
            return Err(Error::Topology(format!(
                "worker for '{}' runs on core {current_core}, expected {}",
                task.name, self.core_id
            )));
        }

        let (pid, tid) = process_and_thread_ids();
        info!(
            "pid: {pid}, tid: {tid}, task: {}, core: {} => started, numa: {}, \
             mem_policy: {}",
            task.name,
            self.core_id,
            locality.numa_id,
            self.mem_policy.as_str()
        );

        let earliest_start = earliest_start_time_us(state, &task.name, self.core_id)?;

        /* EMULATE MEMORY READS */
        let mut actual_read_us = 0.0f64;

        for (comm_name, range) in state.write_offsets_to(&task.name) {
            let address = state.address(&comm_name)?;
            let len = range.payload as usize;

            let numa_before = self.topology.numa_ids_of_address(address, len)?;

            let read_start = now_us();
            let partial_sum = read_every_byte(address, len);
            let read_end = now_us();

            info!(
                "pid: {pid}, tid: {tid}, task: {}, core: {} => read: {comm_name}, \
                 payload_bytes: {}, checksum: {partial_sum}",
                task.name, self.core_id, range.payload
            );

            // Access can trigger page-migration policies; capture both sides.
            let numa_after = self.topology.numa_ids_of_address(address, len)?;
            info!(
                "pid: {pid}, tid: {tid}, task: {}, core: {} => read: {comm_name}, \
                 numa_before_read: {numa_before:?}, numa_after_read: {numa_after:?}, \
                 pages_migration: {}",
                task.name,
                self.core_id,
                if numa_before != numa_after { "yes" } else { "no" }
            );

            state.checksum_add(partial_sum);
            state.set_numa_ids_r(&comm_name, numa_after);
            state.record_read_timestamps(
                &comm_name,
                TimeRange::new(read_start, read_end, range.payload),
            );
            state.record_read_offset(
                &comm_name,
                TimeRange::new(
                    earliest_start,
                    earliest_start + (read_end - read_start),
                    range.payload,
                ),
            );
            state.increment_read_active(&comm_name);

            free_buffer(address, len);
            actual_read_us = actual_read_us.max(read_end - read_start);
        }

        /* EMULATE COMPUTE */
        let compute_start = now_us();
        fma_loop(task.flops);
        let compute_end = now_us();
        let compute_us = compute_end - compute_start;

        state.record_compute_timestamps(
            &task.name,
            TimeRange::new(compute_start, compute_end, task.flops),
        );
        state.record_compute_offset(
            &task.name,
            TimeRange::new(
                earliest_start + actual_read_us,
                earliest_start + actual_read_us + compute_us,
                task.flops,
            ),
        );
        state.increment_exec_active(&task.name);

        /* EMULATE MEMORY WRITES */
        let mut actual_write_us = 0.0f64;

        for edge in self.dag.out_edges(&task.name) {
            if edge.feeds_sink() {
                continue;
            }
            let len = edge.payload_bytes as usize;

            let Some(address) = alloc_buffer(len) else {
                // Keep the run alive: drop the remaining writes but still
                // release the core and complete the frontier below.
                warn!(
                    "task '{}': allocation of {len} bytes for '{}' failed, aborting writes",
                    task.name, edge.name
                );
                break;
            };

            let write_start = now_us();
            zero_buffer(address, len);
            let write_end = now_us();

            state.set_address(&edge.name, address);
            let numa_after_write = self.topology.numa_ids_of_address(address, len)?;
            info!(
                "pid: {pid}, tid: {tid}, task: {}, core: {} => write: {}, \
                 payload_bytes: {}, numa_after_write: {numa_after_write:?}",
                task.name, self.core_id, edge.name, edge.payload_bytes
            );
            state.set_numa_ids_w(&edge.name, numa_after_write);

            state.record_write_timestamps(
                &edge.name,
                TimeRange::new(write_start, write_end, edge.payload_bytes),
            );
            let write_anchor = earliest_start + actual_read_us + compute_us;
            state.record_write_offset(
                &edge.name,
                TimeRange::new(
                    write_anchor,
                    write_anchor + (write_end - write_start),
                    edge.payload_bytes,
                ),
            );
            state.increment_write_active(&edge.name);

            actual_write_us = actual_write_us.max(write_end - write_start);
        }

        /* RECORD THE TASK-LEVEL INTERVAL AND PLACEMENT */
        let actual_finish = earliest_start + actual_read_us + compute_us + actual_write_us;
        state.record_rcw_offset(
            &task.name,
            TimeRange::new(earliest_start, actual_finish, task.flops),
        );
        state.set_thread_locality(&task.name, self.topology.thread_locality()?);

        // Publish the frontier only after every record above is final: a
        // dependent that sees these edges completed sees finished offsets.
        for edge in self.dag.out_edges(&task.name) {
            edge.mark_completed();
        }

        state.release_core(self.core_id, actual_finish);
        state.worker_finished();

        info!(
            "pid: {pid}, tid: {tid}, task: {}, core: {} => finished, \
             rcw: {earliest_start:.1}..{actual_finish:.1} us",
            task.name, self.core_id
        );
        Ok(())
    }
}

/// (process id, thread id) of the calling worker, for log correlation.
#[cfg(target_os = "linux")]
fn process_and_thread_ids() -> (i32, i32) {
    // SAFETY: getpid and gettid always succeed.
    unsafe { (libc::getpid(), libc::gettid()) }
}

#[cfg(not(target_os = "linux"))]
fn process_and_thread_ids() -> (i32, i32) {
    // SAFETY: getpid always succeeds. No portable thread id here.
    (unsafe { libc::getpid() }, 0)
}

/// Allocate an uninitialized buffer; `None` when the allocator refuses.
fn alloc_buffer(len: usize) -> Option<usize> {
    if len == 0 {
        // A zero-byte payload still needs a distinct, freeable address.
        return Some(Layout::from_size_align(1, 1).ok()?.align());
    }
    let layout = Layout::from_size_align(len, 1).ok()?;
    // SAFETY: layout has non-zero size; the null return is checked below.
    let ptr = unsafe { alloc::alloc(layout) };
    if ptr.is_null() {
        None
    } else {
        Some(ptr as usize)
    }
}

fn free_buffer(address: usize, len: usize) {
    if len == 0 {
        return;
    }
    let layout = Layout::from_size_align(len, 1).expect("layout was valid at allocation");
    // SAFETY: address came from alloc_buffer with the identical layout and
    // is freed exactly once, by the single reader of the edge.
    unsafe { alloc::dealloc(address as *mut u8, layout) };
}

/// Touch every byte of the buffer and fold it into a sum the compiler cannot
/// elide. The sum feeds the global read checksum.
fn read_every_byte(address: usize, len: usize) -> u64 {
    let mut sum = 0u64;
    for i in 0..len {
        // SAFETY: [address, address + len) is a live allocation owned by
        // this worker until free_buffer below; volatile keeps the loop real.
        let byte = unsafe { std::ptr::read_volatile((address + i) as *const u8) };
        sum = sum.wrapping_add(byte as u64);
    }
    std::hint::black_box(sum)
}

/// The timed write: zero-fill, which also first-touches every page.
fn zero_buffer(address: usize, len: usize) {
    if len == 0 {
        return;
    }
    // SAFETY: [address, address + len) is a live allocation from alloc_buffer.
    unsafe { std::ptr::write_bytes(address as *mut u8, 0, len) };
    std::hint::black_box(address);
}

/// Fused multiply-add loop, the usual stand-in for dense compute kernels.
fn fma_loop(flops: f64) {
    let a = 1.0f64;
    let b = 2.0f64;
    let mut c = 0.0f64;
    let iterations = flops as u64;
    for _ in 0..iterations {
        c = std::hint::black_box(a) * std::hint::black_box(b) + c;
    }
    std::hint::black_box(c);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_round_trip_sums_to_zero() {
        let len = 8192;
        let address = alloc_buffer(len).unwrap();
        zero_buffer(address, len);
        assert_eq!(read_every_byte(address, len), 0);
        free_buffer(address, len);
    }

    #[test]
    fn zero_length_buffer_has_an_address() {
        let address = alloc_buffer(0).unwrap();
        assert_ne!(address, 0);
        free_buffer(address, 0);
    }

    #[test]
    fn fma_loop_handles_zero_flops() {
        fma_loop(0.0);
    }
}
