//! Hardware topology oracle: logical cores, NUMA nodes, clock frequencies,
//! page placement, thread pinning, and thread memory policy.
//!
//! [`SysTopology`] answers from the running Linux host (`/sys`, `/proc`, and
//! raw syscalls). [`StaticTopology`] answers from explicit tables; it backs
//! simulation runs that model a different host, and unit tests.
//!
//! Logical core ids coalesce SMT siblings: one core per distinct
//! (package id, core id) pair, pinning always targets the core's first
//! processing unit. Any OS-level failure is reported to the caller; there is
//! no silent fallback.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::{ClockFrequencyType, MemPolicyType};
use crate::error::{Error, Result};

/// Where the current thread ran at capture time, plus scheduler churn
/// counters from OS accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadLocality {
    pub numa_id: i64,
    pub core_id: i64,
    pub voluntary_cs: i64,
    pub involuntary_cs: i64,
    pub core_migrations: i64,
}

/// How a topology resolves per-core clock frequencies.
#[derive(Debug, Clone)]
pub enum ClockSource {
    /// One fixed value for every core.
    Static(f64),
    /// Per-core vector indexed by logical core id.
    Array(Vec<f64>),
    /// Live scaling frequency read from the OS.
    Dynamic,
}

impl ClockSource {
    /// Build from the configured clock mode.
    pub fn from_config(
        kind: ClockFrequencyType,
        scalar: Option<f64>,
        vector: Option<Vec<f64>>,
    ) -> Result<Self> {
        match kind {
            ClockFrequencyType::Static => scalar
                .map(ClockSource::Static)
                .ok_or_else(|| Error::Config("static clock mode without a frequency".into())),
            ClockFrequencyType::Array => vector
                .map(ClockSource::Array)
                .ok_or_else(|| Error::Config("array clock mode without frequencies".into())),
            ClockFrequencyType::Dynamic => Ok(ClockSource::Dynamic),
        }
    }
}

/// The queryable oracle shared by schedulers and workers.
///
/// All operations are pure lookups except [`Topology::bind_current_thread_to_core`]
/// and [`Topology::set_thread_memory_policy`], which mutate the calling
/// thread's OS state.
pub trait Topology: Send + Sync {
    /// Number of logical cores (SMT siblings coalesced).
    fn core_count(&self) -> usize;

    /// Number of NUMA nodes.
    fn numa_count(&self) -> usize;

    /// NUMA node of a logical core.
    fn core_to_numa(&self, core_id: usize) -> Result<usize>;

    /// Logical core that owns an OS processing-unit id (as reported by the
    /// "which CPU am I on" syscall). Used for worker self-checks.
    fn pu_to_core(&self, os_pu_id: usize) -> Result<usize>;

    /// Clock frequency of a core in Hz, resolved against the clock source.
    fn clock_frequency_hz(&self, core_id: usize) -> Result<f64>;

    /// NUMA nodes holding the pages that back `[addr, addr + len)`.
    /// May be empty when no page is materialized yet.
    fn numa_ids_of_address(&self, addr: usize, len: usize) -> Result<Vec<usize>>;

    /// Pin the calling thread to the first processing unit of a core.
    fn bind_current_thread_to_core(&self, core_id: usize) -> Result<()>;

    /// Apply a memory-binding policy to the calling thread.
    fn set_thread_memory_policy(&self, policy: MemPolicyType, numa_ids: &[usize]) -> Result<()>;

    /// Capture the calling thread's current placement and churn counters.
    fn thread_locality(&self) -> Result<ThreadLocality>;
}

#[derive(Debug, Clone)]
struct CoreInfo {
    /// Processing units of this core, first one used for pinning.
    pus: Vec<usize>,
    numa_id: usize,
}

/// Topology of the running Linux host.
#[derive(Debug)]
pub struct SysTopology {
    cores: Vec<CoreInfo>,
    pu_to_core: BTreeMap<usize, usize>,
    numa_count: usize,
    clock: ClockSource,
}

impl SysTopology {
    /// Enumerate the host from `/sys/devices/system`.
    pub fn detect(clock: ClockSource) -> Result<Self> {
        let node_pus = read_numa_nodes()?;
        let numa_count = node_pus.keys().max().map_or(1, |max| max + 1);

        let mut pu_to_node = BTreeMap::new();
        for (&node, pus) in &node_pus {
            for &pu in pus {
                pu_to_node.insert(pu, node);
            }
        }

        // Group PUs into physical cores by (package id, core id).
        let mut grouped: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
        for &pu in pu_to_node.keys() {
            let package = read_sys_usize(&format!(
                "/sys/devices/system/cpu/cpu{pu}/topology/physical_package_id"
            ))?;
            let core = read_sys_usize(&format!(
                "/sys/devices/system/cpu/cpu{pu}/topology/core_id"
            ))?;
            grouped.entry((package, core)).or_default().push(pu);
        }

        let mut cores = Vec::with_capacity(grouped.len());
        let mut pu_to_core = BTreeMap::new();
        for (core_id, mut pus) in grouped.into_values().enumerate() {
            pus.sort_unstable();
            let numa_id = *pu_to_node.get(&pus[0]).ok_or_else(|| {
                Error::Topology(format!("PU {} belongs to no NUMA node", pus[0]))
            })?;
            for &pu in &pus {
                pu_to_core.insert(pu, core_id);
            }
            cores.push(CoreInfo { pus, numa_id });
        }

        if cores.is_empty() {
            return Err(Error::Topology("no cores enumerated from /sys".into()));
        }

        Ok(Self {
            cores,
            pu_to_core,
            numa_count,
            clock,
        })
    }

    fn core(&self, core_id: usize) -> Result<&CoreInfo> {
        self.cores
            .get(core_id)
            .ok_or_else(|| Error::Topology(format!("core id {core_id} not present")))
    }

    fn first_pu(&self, core_id: usize) -> Result<usize> {
        Ok(self.core(core_id)?.pus[0])
    }
}

impl Topology for SysTopology {
    fn core_count(&self) -> usize {
        self.cores.len()
    }

    fn numa_count(&self) -> usize {
        self.numa_count
    }

    fn core_to_numa(&self, core_id: usize) -> Result<usize> {
        Ok(self.core(core_id)?.numa_id)
    }

    fn pu_to_core(&self, os_pu_id: usize) -> Result<usize> {
        self.pu_to_core
            .get(&os_pu_id)
            .copied()
            .ok_or_else(|| Error::Topology(format!("no core owns PU {os_pu_id}")))
    }

    fn clock_frequency_hz(&self, core_id: usize) -> Result<f64> {
        match &self.clock {
            ClockSource::Static(hz) => Ok(*hz),
            ClockSource::Array(freqs) => freqs.get(core_id).copied().ok_or_else(|| {
                Error::Config(format!(
                    "clock_frequencies_hz has no entry for core {core_id}"
                ))
            }),
            ClockSource::Dynamic => {
                let pu = self.first_pu(core_id)?;
                let path =
                    format!("/sys/devices/system/cpu/cpu{pu}/cpufreq/scaling_cur_freq");
                let khz = read_sys_usize(&path)?;
                Ok(khz as f64 * 1000.0)
            }
        }
    }

    fn numa_ids_of_address(&self, addr: usize, len: usize) -> Result<Vec<usize>> {
        os::numa_ids_of_address(addr, len)
    }

    fn bind_current_thread_to_core(&self, core_id: usize) -> Result<()> {
        os::bind_current_thread_to_pu(self.first_pu(core_id)?)
    }

    fn set_thread_memory_policy(&self, policy: MemPolicyType, numa_ids: &[usize]) -> Result<()> {
        os::set_thread_memory_policy(policy, numa_ids)
    }

    fn thread_locality(&self) -> Result<ThreadLocality> {
        let (pu, numa_id) = os::current_pu_and_node()?;
        let core_id = self.pu_to_core(pu)? as i64;
        let (voluntary_cs, involuntary_cs) = os::thread_context_switches()?;
        let core_migrations = os::thread_migrations();
        Ok(ThreadLocality {
            numa_id: numa_id as i64,
            core_id,
            voluntary_cs,
            involuntary_cs,
            core_migrations,
        })
    }
}

/// A topology answered from explicit tables instead of the running host.
///
/// Core `i` maps to `numa_of_core[i]` and owns the single processing unit
/// `i`. OS-side operations (pinning, memory policy, locality capture) are
/// rejected: this topology describes a modeled machine, not the one the
/// process runs on.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    numa_of_core: Vec<usize>,
    numa_count: usize,
    clock: ClockSource,
}

impl StaticTopology {
    pub fn new(numa_of_core: Vec<usize>, clock: ClockSource) -> Self {
        let numa_count = numa_of_core.iter().max().map_or(1, |max| max + 1);
        Self {
            numa_of_core,
            numa_count,
            clock,
        }
    }

    /// Uniform machine: `cores` cores spread round-robin-free (blocked) over
    /// `numa_nodes` nodes, all at `hz`.
    pub fn uniform(cores: usize, numa_nodes: usize, hz: f64) -> Self {
        let per_node = cores.div_ceil(numa_nodes.max(1));
        let numa_of_core = (0..cores).map(|c| c / per_node.max(1)).collect();
        Self::new(numa_of_core, ClockSource::Static(hz))
    }
}

impl Topology for StaticTopology {
    fn core_count(&self) -> usize {
        self.numa_of_core.len()
    }

    fn numa_count(&self) -> usize {
        self.numa_count
    }

    fn core_to_numa(&self, core_id: usize) -> Result<usize> {
        self.numa_of_core
            .get(core_id)
            .copied()
            .ok_or_else(|| Error::Topology(format!("core id {core_id} not present")))
    }

    fn pu_to_core(&self, os_pu_id: usize) -> Result<usize> {
        if os_pu_id < self.numa_of_core.len() {
            Ok(os_pu_id)
        } else {
            Err(Error::Topology(format!("no core owns PU {os_pu_id}")))
        }
    }

    fn clock_frequency_hz(&self, core_id: usize) -> Result<f64> {
        self.core_to_numa(core_id)?;
        match &self.clock {
            ClockSource::Static(hz) => Ok(*hz),
            ClockSource::Array(freqs) => freqs.get(core_id).copied().ok_or_else(|| {
                Error::Config(format!(
                    "clock_frequencies_hz has no entry for core {core_id}"
                ))
            }),
            ClockSource::Dynamic => Err(Error::Topology(
                "a static topology has no live clock to read".into(),
            )),
        }
    }

    fn numa_ids_of_address(&self, _addr: usize, _len: usize) -> Result<Vec<usize>> {
        Ok(Vec::new())
    }

    fn bind_current_thread_to_core(&self, _core_id: usize) -> Result<()> {
        Err(Error::Topology(
            "a static topology cannot pin threads on the running host".into(),
        ))
    }

    fn set_thread_memory_policy(&self, _policy: MemPolicyType, _numa_ids: &[usize]) -> Result<()> {
        Err(Error::MemPolicy(
            "a static topology cannot bind memory on the running host".into(),
        ))
    }

    fn thread_locality(&self) -> Result<ThreadLocality> {
        Err(Error::Topology(
            "a static topology has no thread placement to capture".into(),
        ))
    }
}

/// Parse `/sys/devices/system/node/node*/cpulist` into node → PU lists.
/// Hosts without the node directory are treated as one NUMA node holding
/// every online PU.
fn read_numa_nodes() -> Result<BTreeMap<usize, Vec<usize>>> {
    let node_dir = Path::new("/sys/devices/system/node");
    let mut nodes = BTreeMap::new();

    if node_dir.is_dir() {
        for entry in fs::read_dir(node_dir).map_err(|e| Error::io(node_dir, e))? {
            let entry = entry.map_err(|e| Error::io(node_dir, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(id_str) = name.strip_prefix("node") else {
                continue;
            };
            let Ok(node_id) = id_str.parse::<usize>() else {
                continue;
            };
            let cpulist_path = entry.path().join("cpulist");
            let cpulist =
                fs::read_to_string(&cpulist_path).map_err(|e| Error::io(&cpulist_path, e))?;
            nodes.insert(node_id, parse_cpu_list(cpulist.trim())?);
        }
    }

    if nodes.is_empty() {
        let online_path = Path::new("/sys/devices/system/cpu/online");
        let online =
            fs::read_to_string(online_path).map_err(|e| Error::io(online_path, e))?;
        nodes.insert(0, parse_cpu_list(online.trim())?);
    }

    Ok(nodes)
}

/// Parse a kernel CPU list such as `"0-3,8-11"` or `"0,2,4"`.
fn parse_cpu_list(list: &str) -> Result<Vec<usize>> {
    let mut pus = Vec::new();
    for part in list.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once('-') {
            Some((start, end)) => {
                let start: usize = start
                    .parse()
                    .map_err(|_| Error::Topology(format!("bad cpu range '{part}'")))?;
                let end: usize = end
                    .parse()
                    .map_err(|_| Error::Topology(format!("bad cpu range '{part}'")))?;
                pus.extend(start..=end);
            }
            None => pus.push(
                part.parse()
                    .map_err(|_| Error::Topology(format!("bad cpu id '{part}'")))?,
            ),
        }
    }
    Ok(pus)
}

/// Read a small integer from a `/sys` attribute. A handful of attributes
/// (e.g. `physical_package_id`) report -1 on exotic hardware; negatives are
/// clamped to zero so grouping still works.
fn read_sys_usize(path: &str) -> Result<usize> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let value: i64 = text.trim().parse().map_err(|_| {
        Error::Topology(format!(
            "{path}: expected an integer, got '{}'",
            text.trim()
        ))
    })?;
    Ok(value.max(0) as usize)
}

#[cfg(target_os = "linux")]
mod os {
    //! Raw Linux syscalls behind the oracle. Every failure carries errno.

    use std::fs;
    use std::mem;

    use crate::config::MemPolicyType;
    use crate::error::{Error, Result};

    fn errno_message(context: &str) -> String {
        format!("{context}: {}", std::io::Error::last_os_error())
    }

    /// (PU id, NUMA node id) of the calling thread via `getcpu(2)`.
    pub fn current_pu_and_node() -> Result<(usize, usize)> {
        let mut cpu: libc::c_uint = 0;
        let mut node: libc::c_uint = 0;
        // SAFETY: getcpu writes two c_uint out-params and ignores the third
        // (unused since Linux 2.6.24); both pointers are valid locals.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_getcpu,
                &mut cpu as *mut libc::c_uint,
                &mut node as *mut libc::c_uint,
                std::ptr::null_mut::<libc::c_void>(),
            )
        };
        if rc != 0 {
            return Err(Error::Topology(errno_message("getcpu")));
        }
        Ok((cpu as usize, node as usize))
    }

    /// Pin the calling thread to exactly one processing unit.
    pub fn bind_current_thread_to_pu(pu: usize) -> Result<()> {
        // SAFETY: cpu_set_t is a plain bitmask; zeroed is a valid empty set.
        let mut set: libc::cpu_set_t = unsafe { mem::zeroed() };
        // SAFETY: CPU_SET writes a bit inside the set; pu is bounds-checked
        // against the set capacity by the macro itself.
        unsafe { libc::CPU_SET(pu, &mut set) };
        // SAFETY: pid 0 targets the calling thread; set is a valid cpu_set_t.
        let rc = unsafe { libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set) };
        if rc != 0 {
            return Err(Error::Topology(errno_message(&format!(
                "sched_setaffinity(pu {pu})"
            ))));
        }
        Ok(())
    }

    /// Apply a thread memory policy via `set_mempolicy(2)`.
    ///
    /// Linux has no next-touch or mixed policy; both are rejected rather
    /// than silently mapped to something else. `first-touch` is the kernel's
    /// default local-allocation behavior.
    pub fn set_thread_memory_policy(policy: MemPolicyType, numa_ids: &[usize]) -> Result<()> {
        let (mode, wants_mask) = match policy {
            MemPolicyType::Default | MemPolicyType::FirstTouch => (libc::MPOL_DEFAULT, false),
            MemPolicyType::Bind => (libc::MPOL_BIND, true),
            MemPolicyType::Interleave => (libc::MPOL_INTERLEAVE, true),
            MemPolicyType::NextTouch | MemPolicyType::Mixed => {
                return Err(Error::MemPolicy(format!(
                    "policy '{}' is not supported by set_mempolicy on Linux",
                    policy.as_str()
                )));
            }
        };

        let mut mask: libc::c_ulong = 0;
        if wants_mask {
            for &node in numa_ids {
                if node >= libc::c_ulong::BITS as usize {
                    return Err(Error::MemPolicy(format!(
                        "NUMA node id {node} exceeds the supported mask width"
                    )));
                }
                mask |= 1 << node;
            }
            if mask == 0 {
                return Err(Error::MemPolicy(format!(
                    "policy '{}' needs at least one NUMA node",
                    policy.as_str()
                )));
            }
        }

        let mask_ptr = if wants_mask {
            &mask as *const libc::c_ulong
        } else {
            std::ptr::null()
        };
        let maxnode: libc::c_ulong = if wants_mask {
            libc::c_ulong::BITS as libc::c_ulong + 1
        } else {
            0
        };

        // SAFETY: mode is a valid MPOL_* constant; mask_ptr is either null
        // (DEFAULT) or points to a live c_ulong whose width matches maxnode.
        let rc = unsafe { libc::syscall(libc::SYS_set_mempolicy, mode, mask_ptr, maxnode) };
        if rc != 0 {
            return Err(Error::MemPolicy(errno_message(&format!(
                "set_mempolicy({})",
                policy.as_str()
            ))));
        }
        Ok(())
    }

    /// NUMA nodes of the pages backing `[addr, addr + len)` via
    /// `move_pages(2)` in query mode (null target nodes).
    ///
    /// Pages that are not yet materialized report a negative status and are
    /// skipped, so the result may be empty.
    pub fn numa_ids_of_address(addr: usize, len: usize) -> Result<Vec<usize>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        // SAFETY: sysconf(_SC_PAGESIZE) is always safe.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let first_page = addr & !(page_size - 1);
        let page_count = (addr + len - first_page).div_ceil(page_size);

        let pages: Vec<*mut libc::c_void> = (0..page_count)
            .map(|i| (first_page + i * page_size) as *mut libc::c_void)
            .collect();
        let mut status: Vec<libc::c_int> = vec![-1; page_count];

        // SAFETY: pid 0 queries the calling process; pages and status are
        // live arrays of page_count entries; a null nodes pointer selects
        // query mode, writing each page's node (or a negative errno) into
        // status.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_move_pages,
                0,
                page_count as libc::c_ulong,
                pages.as_ptr(),
                std::ptr::null::<libc::c_int>(),
                status.as_mut_ptr(),
                0,
            )
        };
        if rc != 0 {
            return Err(Error::Topology(errno_message("move_pages")));
        }

        let mut nodes: Vec<usize> = status
            .into_iter()
            .filter(|&s| s >= 0)
            .map(|s| s as usize)
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        Ok(nodes)
    }

    /// (voluntary, involuntary) context switches of the calling thread.
    pub fn thread_context_switches() -> Result<(i64, i64)> {
        // SAFETY: zeroed rusage is a valid out-param for getrusage.
        let mut usage: libc::rusage = unsafe { mem::zeroed() };
        // SAFETY: RUSAGE_THREAD scopes accounting to the calling thread.
        let rc = unsafe { libc::getrusage(libc::RUSAGE_THREAD, &mut usage) };
        if rc != 0 {
            return Err(Error::Topology(errno_message("getrusage")));
        }
        Ok((usage.ru_nvcsw, usage.ru_nivcsw))
    }

    /// `nr_migrations` from the thread's scheduler statistics, or -1 when
    /// the field cannot be read (kernel built without schedstats).
    pub fn thread_migrations() -> i64 {
        let text = fs::read_to_string("/proc/thread-self/sched")
            .or_else(|_| fs::read_to_string("/proc/self/sched"))
            .unwrap_or_default();
        for line in text.lines() {
            if line.starts_with("nr_migrations") {
                if let Some(value) = line.rsplit(':').next() {
                    if let Ok(parsed) = value.trim().parse() {
                        return parsed;
                    }
                }
            }
        }
        -1
    }
}

#[cfg(not(target_os = "linux"))]
mod os {
    //! Non-Linux hosts can still run simulation mode through
    //! [`super::StaticTopology`]; the live oracle is unavailable.

    use crate::config::MemPolicyType;
    use crate::error::{Error, Result};

    const UNSUPPORTED: &str = "the system topology oracle requires Linux";

    pub fn current_pu_and_node() -> Result<(usize, usize)> {
        Err(Error::Topology(UNSUPPORTED.into()))
    }

    pub fn bind_current_thread_to_pu(_pu: usize) -> Result<()> {
        Err(Error::Topology(UNSUPPORTED.into()))
    }

    pub fn set_thread_memory_policy(_policy: MemPolicyType, _numa_ids: &[usize]) -> Result<()> {
        Err(Error::MemPolicy(UNSUPPORTED.into()))
    }

    pub fn numa_ids_of_address(_addr: usize, _len: usize) -> Result<Vec<usize>> {
        Err(Error::Topology(UNSUPPORTED.into()))
    }

    pub fn thread_context_switches() -> Result<(i64, i64)> {
        Err(Error::Topology(UNSUPPORTED.into()))
    }

    pub fn thread_migrations() -> i64 {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_list_ranges_and_singles() {
        assert_eq!(parse_cpu_list("0-3,8-11").unwrap(), vec![0, 1, 2, 3, 8, 9, 10, 11]);
        assert_eq!(parse_cpu_list("0,2,4,6").unwrap(), vec![0, 2, 4, 6]);
        assert_eq!(parse_cpu_list("5").unwrap(), vec![5]);
    }

    #[test]
    fn cpu_list_garbage_rejected() {
        assert!(parse_cpu_list("0-x").is_err());
        assert!(parse_cpu_list("abc").is_err());
    }

    #[test]
    fn static_topology_maps_cores_to_nodes() {
        let topo = StaticTopology::new(vec![0, 0, 1, 1], ClockSource::Static(1e9));
        assert_eq!(topo.core_count(), 4);
        assert_eq!(topo.numa_count(), 2);
        assert_eq!(topo.core_to_numa(0).unwrap(), 0);
        assert_eq!(topo.core_to_numa(3).unwrap(), 1);
        assert!(topo.core_to_numa(4).is_err());
    }

    #[test]
    fn static_topology_uniform_blocks_nodes() {
        let topo = StaticTopology::uniform(8, 2, 2e9);
        assert_eq!(topo.core_to_numa(0).unwrap(), 0);
        assert_eq!(topo.core_to_numa(3).unwrap(), 0);
        assert_eq!(topo.core_to_numa(4).unwrap(), 1);
        assert_eq!(topo.clock_frequency_hz(7).unwrap(), 2e9);
    }

    #[test]
    fn static_topology_array_clock_is_per_core() {
        let topo = StaticTopology::new(
            vec![0, 1],
            ClockSource::Array(vec![1e9, 3e9]),
        );
        assert_eq!(topo.clock_frequency_hz(1).unwrap(), 3e9);
        assert!(topo.clock_frequency_hz(2).is_err());
    }

    #[test]
    fn static_topology_rejects_os_operations() {
        let topo = StaticTopology::uniform(2, 1, 1e9);
        assert!(topo.bind_current_thread_to_core(0).is_err());
        assert!(topo.thread_locality().is_err());
        assert!(topo
            .set_thread_memory_policy(MemPolicyType::Bind, &[0])
            .is_err());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn sys_topology_detects_this_host() {
        let topo = SysTopology::detect(ClockSource::Static(1e9)).unwrap();
        assert!(topo.core_count() >= 1);
        assert!(topo.numa_count() >= 1);
        // Every core resolves to a node, and its first PU maps back to it.
        for core in 0..topo.core_count() {
            assert!(topo.core_to_numa(core).unwrap() < topo.numa_count());
        }
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn sys_topology_reports_own_pages() {
        let topo = SysTopology::detect(ClockSource::Static(1e9)).unwrap();
        let buf = vec![1u8; 64 * 1024];
        let nodes = topo
            .numa_ids_of_address(buf.as_ptr() as usize, buf.len())
            .unwrap();
        // Touched pages must live somewhere real.
        assert!(!nodes.is_empty());
        assert!(nodes.iter().all(|&n| n < topo.numa_count()));
    }

    #[test]
    #[cfg(target_os = "linux")]
    #[ignore] // Mutates the calling thread's affinity.
    fn bind_then_self_check_round_trips() {
        let topo = SysTopology::detect(ClockSource::Dynamic).unwrap();
        topo.bind_current_thread_to_core(0).unwrap();
        let locality = topo.thread_locality().unwrap();
        assert_eq!(locality.core_id, 0);
    }
}
