//! Process-wide shared state: per-task and per-edge records, core
//! availability, the active-worker barrier, and the read checksum.
//!
//! Each map family sits behind its own mutex so scheduler reads do not block
//! worker writes to unrelated families. Lifecycle is init → steady state
//! (many concurrent mutators) → teardown; the runtime owns the single
//! instance and lends `Arc` handles to the scheduler (reads) and the workers
//! (writes).

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::dag::{split_edge_name, Dag};
use crate::error::{Error, Result};
use crate::topology::ThreadLocality;

/// A recorded interval: start, end (microseconds) and the payload moved or
/// computed inside it (bytes for edges, FLOPs for compute).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start_us: f64,
    pub end_us: f64,
    pub payload: f64,
}

impl TimeRange {
    pub fn new(start_us: f64, end_us: f64, payload: f64) -> Self {
        Self {
            start_us,
            end_us,
            payload,
        }
    }
}

/// Simulation-mode sentinel stored in the address map.
pub const NULL_ADDRESS: usize = 0;

#[derive(Debug, Default)]
struct CoreAvailability {
    avail: Vec<bool>,
    avail_until_us: Vec<f64>,
}

#[derive(Debug, Default)]
struct ActivityCounters {
    execs: HashMap<String, u32>,
    reads: HashMap<String, u32>,
    writes: HashMap<String, u32>,
}

#[derive(Debug, Default)]
struct CommRecords {
    address: HashMap<String, usize>,
    numa_ids_r: HashMap<String, Vec<usize>>,
    numa_ids_w: HashMap<String, Vec<usize>>,
}

#[derive(Debug, Default)]
struct TimestampRecords {
    comm_r: HashMap<String, TimeRange>,
    comm_w: HashMap<String, TimeRange>,
    exec_c: HashMap<String, TimeRange>,
}

#[derive(Debug, Default)]
struct OffsetRecords {
    comm_r: HashMap<String, TimeRange>,
    comm_w: HashMap<String, TimeRange>,
    exec_c: HashMap<String, TimeRange>,
    exec_rcw: HashMap<String, TimeRange>,
}

/// The single shared record described in the data model.
#[derive(Debug)]
pub struct SharedState {
    cores: Mutex<CoreAvailability>,
    counters: Mutex<ActivityCounters>,
    comm: Mutex<CommRecords>,
    locality: Mutex<HashMap<String, ThreadLocality>>,
    timestamps: Mutex<TimestampRecords>,
    offsets: Mutex<OffsetRecords>,
    active: Mutex<u32>,
    active_zero: Condvar,
    checksum: Mutex<u64>,
}

impl SharedState {
    /// Fresh state with the given core availability and zeroed clocks.
    pub fn new(core_avail: Vec<bool>) -> Self {
        let avail_until_us = vec![0.0; core_avail.len()];
        Self {
            cores: Mutex::new(CoreAvailability {
                avail: core_avail,
                avail_until_us,
            }),
            counters: Mutex::new(ActivityCounters::default()),
            comm: Mutex::new(CommRecords::default()),
            locality: Mutex::new(HashMap::new()),
            timestamps: Mutex::new(TimestampRecords::default()),
            offsets: Mutex::new(OffsetRecords::default()),
            active: Mutex::new(0),
            active_zero: Condvar::new(),
            checksum: Mutex::new(0),
        }
    }

    /// Zero one activity counter per task, readable edge, and writable edge,
    /// so the report distinguishes "never ran" from "absent".
    pub fn seed_counters(&self, dag: &Dag) {
        let mut counters = self.lock(&self.counters);
        for task in dag.tasks() {
            counters.execs.insert(task.name.clone(), 0);
            for edge in dag.in_edges(&task.name) {
                counters.reads.entry(edge.name.clone()).or_insert(0);
            }
            for edge in dag.out_edges(&task.name) {
                if !edge.feeds_sink() {
                    counters.writes.entry(edge.name.clone()).or_insert(0);
                }
            }
        }
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        // A poisoned lock means a worker died mid-update; continuing would
        // report torn records.
        mutex.lock().expect("shared state lock poisoned")
    }

    // ------------------------------------------------------------------
    // Core availability
    // ------------------------------------------------------------------

    /// Ids of currently available cores, ascending.
    pub fn avail_core_ids(&self) -> Vec<usize> {
        let cores = self.lock(&self.cores);
        cores
            .avail
            .iter()
            .enumerate()
            .filter_map(|(id, &avail)| avail.then_some(id))
            .collect()
    }

    /// Consistent snapshot of (available, avail_until) per core.
    pub fn core_snapshot(&self) -> Vec<(bool, f64)> {
        let cores = self.lock(&self.cores);
        cores
            .avail
            .iter()
            .zip(&cores.avail_until_us)
            .map(|(&a, &u)| (a, u))
            .collect()
    }

    pub fn core_avail_until(&self, core_id: usize) -> Result<f64> {
        let cores = self.lock(&self.cores);
        cores
            .avail_until_us
            .get(core_id)
            .copied()
            .ok_or_else(|| Error::MissingKey {
                map: "core_avail_until",
                key: core_id.to_string(),
            })
    }

    /// Commit point of an assignment: the core leaves the available set.
    pub fn commit_core(&self, core_id: usize) {
        let mut cores = self.lock(&self.cores);
        cores.avail[core_id] = false;
    }

    /// Return a core to the available set. The new `avail_until` lands in
    /// the same critical section as the availability flip.
    pub fn release_core(&self, core_id: usize, avail_until_us: f64) {
        let mut cores = self.lock(&self.cores);
        cores.avail[core_id] = true;
        cores.avail_until_us[core_id] = avail_until_us;
    }

    // ------------------------------------------------------------------
    // Active-worker barrier
    // ------------------------------------------------------------------

    /// Register a worker. Called on the driver thread at spawn commit so the
    /// final barrier can never observe a transient zero.
    pub fn worker_started(&self) {
        *self.lock(&self.active) += 1;
    }

    /// Deregister a worker; wakes the barrier when the count hits zero.
    pub fn worker_finished(&self) {
        let mut active = self.lock(&self.active);
        *active -= 1;
        if *active == 0 {
            self.active_zero.notify_all();
        }
    }

    /// Block until every registered worker has finished.
    pub fn wait_for_quiescence(&self) {
        let mut active = self.lock(&self.active);
        while *active > 0 {
            active = self
                .active_zero
                .wait(active)
                .expect("shared state lock poisoned");
        }
    }

    pub fn active_workers(&self) -> u32 {
        *self.lock(&self.active)
    }

    // ------------------------------------------------------------------
    // Read checksum
    // ------------------------------------------------------------------

    /// Fold a worker's per-thread byte sum into the global checksum.
    /// Order-independent by construction (wrapping addition).
    pub fn checksum_add(&self, partial: u64) {
        let mut checksum = self.lock(&self.checksum);
        *checksum = checksum.wrapping_add(partial);
    }

    pub fn checksum(&self) -> u64 {
        *self.lock(&self.checksum)
    }

    // ------------------------------------------------------------------
    // Activity counters
    // ------------------------------------------------------------------

    pub fn increment_exec_active(&self, name: &str) {
        *self
            .lock(&self.counters)
            .execs
            .entry(name.to_string())
            .or_insert(0) += 1;
    }

    pub fn increment_read_active(&self, name: &str) {
        *self
            .lock(&self.counters)
            .reads
            .entry(name.to_string())
            .or_insert(0) += 1;
    }

    pub fn increment_write_active(&self, name: &str) {
        *self
            .lock(&self.counters)
            .writes
            .entry(name.to_string())
            .or_insert(0) += 1;
    }

    /// (execs, reads, writes) counter maps, cloned.
    pub fn counter_snapshot(
        &self,
    ) -> (
        HashMap<String, u32>,
        HashMap<String, u32>,
        HashMap<String, u32>,
    ) {
        let counters = self.lock(&self.counters);
        (
            counters.execs.clone(),
            counters.reads.clone(),
            counters.writes.clone(),
        )
    }

    // ------------------------------------------------------------------
    // Communication records
    // ------------------------------------------------------------------

    pub fn set_address(&self, comm_name: &str, address: usize) {
        self.lock(&self.comm)
            .address
            .insert(comm_name.to_string(), address);
    }

    pub fn address(&self, comm_name: &str) -> Result<usize> {
        self.lock(&self.comm)
            .address
            .get(comm_name)
            .copied()
            .ok_or_else(|| Error::MissingKey {
                map: "comm_name_to_address",
                key: comm_name.to_string(),
            })
    }

    pub fn set_numa_ids_r(&self, comm_name: &str, numa_ids: Vec<usize>) {
        self.lock(&self.comm)
            .numa_ids_r
            .insert(comm_name.to_string(), numa_ids);
    }

    pub fn set_numa_ids_w(&self, comm_name: &str, numa_ids: Vec<usize>) {
        self.lock(&self.comm)
            .numa_ids_w
            .insert(comm_name.to_string(), numa_ids);
    }

    pub fn numa_ids_w(&self, comm_name: &str) -> Result<Vec<usize>> {
        self.lock(&self.comm)
            .numa_ids_w
            .get(comm_name)
            .cloned()
            .ok_or_else(|| Error::MissingKey {
                map: "comm_name_to_numa_ids_w",
                key: comm_name.to_string(),
            })
    }

    pub fn numa_ids_snapshot(
        &self,
    ) -> (
        HashMap<String, Vec<usize>>,
        HashMap<String, Vec<usize>>,
    ) {
        let comm = self.lock(&self.comm);
        (comm.numa_ids_r.clone(), comm.numa_ids_w.clone())
    }

    // ------------------------------------------------------------------
    // Thread locality
    // ------------------------------------------------------------------

    pub fn set_thread_locality(&self, exec_name: &str, locality: ThreadLocality) {
        self.lock(&self.locality)
            .insert(exec_name.to_string(), locality);
    }

    pub fn locality_snapshot(&self) -> HashMap<String, ThreadLocality> {
        self.lock(&self.locality).clone()
    }

    // ------------------------------------------------------------------
    // Timestamps (absolute microseconds since epoch)
    // ------------------------------------------------------------------

    pub fn record_read_timestamps(&self, comm_name: &str, range: TimeRange) {
        self.lock(&self.timestamps)
            .comm_r
            .insert(comm_name.to_string(), range);
    }

    pub fn record_write_timestamps(&self, comm_name: &str, range: TimeRange) {
        self.lock(&self.timestamps)
            .comm_w
            .insert(comm_name.to_string(), range);
    }

    pub fn record_compute_timestamps(&self, exec_name: &str, range: TimeRange) {
        self.lock(&self.timestamps)
            .exec_c
            .insert(exec_name.to_string(), range);
    }

    /// (read, write, compute) timestamp maps, cloned.
    pub fn timestamp_snapshot(
        &self,
    ) -> (
        HashMap<String, TimeRange>,
        HashMap<String, TimeRange>,
        HashMap<String, TimeRange>,
    ) {
        let ts = self.lock(&self.timestamps);
        (ts.comm_r.clone(), ts.comm_w.clone(), ts.exec_c.clone())
    }

    // ------------------------------------------------------------------
    // Offsets (relative microseconds from the workflow's logical start)
    // ------------------------------------------------------------------

    pub fn record_read_offset(&self, comm_name: &str, range: TimeRange) {
        self.lock(&self.offsets)
            .comm_r
            .insert(comm_name.to_string(), range);
    }

    pub fn record_write_offset(&self, comm_name: &str, range: TimeRange) {
        self.lock(&self.offsets)
            .comm_w
            .insert(comm_name.to_string(), range);
    }

    pub fn record_compute_offset(&self, exec_name: &str, range: TimeRange) {
        self.lock(&self.offsets)
            .exec_c
            .insert(exec_name.to_string(), range);
    }

    pub fn record_rcw_offset(&self, exec_name: &str, range: TimeRange) {
        self.lock(&self.offsets)
            .exec_rcw
            .insert(exec_name.to_string(), range);
    }

    pub fn rcw_offset(&self, exec_name: &str) -> Result<TimeRange> {
        self.lock(&self.offsets)
            .exec_rcw
            .get(exec_name)
            .copied()
            .ok_or_else(|| Error::MissingKey {
                map: "exec_name_to_rcw_time_offset_payload",
                key: exec_name.to_string(),
            })
    }

    pub fn read_offset(&self, comm_name: &str) -> Option<TimeRange> {
        self.lock(&self.offsets).comm_r.get(comm_name).copied()
    }

    pub fn compute_offset(&self, exec_name: &str) -> Option<TimeRange> {
        self.lock(&self.offsets).exec_c.get(exec_name).copied()
    }

    /// Recorded write offsets whose edge destination is `dst_name`, sorted by
    /// edge name for deterministic iteration.
    ///
    /// This is the canonical "incoming materialized edges" query: entry edges
    /// stripped at load time never wrote an offset and therefore never
    /// appear.
    pub fn write_offsets_to(&self, dst_name: &str) -> Vec<(String, TimeRange)> {
        let offsets = self.lock(&self.offsets);
        let mut matches: Vec<(String, TimeRange)> = offsets
            .comm_w
            .iter()
            .filter(|(name, _)| split_edge_name(name).1 == dst_name)
            .map(|(name, &range)| (name.clone(), range))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        matches
    }

    /// (read, write, compute, rcw) offset maps, cloned.
    #[allow(clippy::type_complexity)]
    pub fn offset_snapshot(
        &self,
    ) -> (
        HashMap<String, TimeRange>,
        HashMap<String, TimeRange>,
        HashMap<String, TimeRange>,
        HashMap<String, TimeRange>,
    ) {
        let offsets = self.lock(&self.offsets);
        (
            offsets.comm_r.clone(),
            offsets.comm_w.clone(),
            offsets.exec_c.clone(),
            offsets.exec_rcw.clone(),
        )
    }
}
