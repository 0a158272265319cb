//! The run report: a YAML-like text document with `user`, `workflow`,
//! `runtime`, and `trace` sections, two spaces of indentation per level.
//!
//! Map sections are emitted in sorted key order so two identical runs
//! produce byte-identical reports.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::config::{ClockFrequencyType, Config};
use crate::cost::CostModel;
use crate::error::{Error, Result};
use crate::matrix::DistanceMatrix;
use crate::state::{SharedState, TimeRange};

/// Borrow of everything the report echoes.
pub struct Report<'a> {
    pub config: &'a Config,
    pub cost: &'a CostModel,
    pub state: &'a SharedState,
}

impl Report<'_> {
    /// Write the report to `path`, creating or truncating it.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut out = BufWriter::new(file);
        self.write_to(&mut out).map_err(|e| Error::io(path, e))?;
        out.flush().map_err(|e| Error::io(path, e))
    }

    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        self.write_user(out)?;
        self.write_workflow(out)?;
        self.write_runtime(out)?;
        self.write_trace(out)
    }

    fn write_user(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "user:")?;
        writeln!(out, "  flops_per_cycle: {}", self.config.flops_per_cycle)?;
        writeln!(
            out,
            "  clock_frequency_type: {}",
            self.config.clock_frequency_type.as_str()
        )?;
        match self.config.clock_frequency_type {
            ClockFrequencyType::Array => {
                writeln!(out, "  clock_frequencies_hz:")?;
                for (core_id, hz) in self
                    .config
                    .clock_frequencies_hz
                    .iter()
                    .flatten()
                    .enumerate()
                {
                    writeln!(out, "    {core_id}: {hz}")?;
                }
            }
            _ => {
                writeln!(
                    out,
                    "  clock_frequency_hz: {}",
                    self.config.clock_frequency_hz.unwrap_or(0.0)
                )?;
            }
        }
        writeln!(
            out,
            "  scheduler_type: {}",
            self.config.scheduler_type.as_str()
        )?;
        let params: BTreeMap<&str, &str> =
            self.config.scheduler_params_map().into_iter().collect();
        if !params.is_empty() {
            writeln!(out, "  scheduler_params:")?;
            for (key, value) in params {
                writeln!(out, "    {key}: {value}")?;
            }
        }
        writeln!(out, "  mapper_type: {}", self.config.mapper_type.as_str())?;
        writeln!(
            out,
            "  mapper_mem_policy_type: {}",
            self.config.mapper_mem_policy_type.as_str()
        )?;

        write_matrix(out, "distance_lat_ns", self.cost.latency_ns(), 2)?;
        write_matrix(out, "distance_bw_gbps", self.cost.bandwidth_gbps(), 2)?;
        writeln!(out)
    }

    fn write_workflow(&self, out: &mut impl Write) -> io::Result<()> {
        let (execs, reads, writes) = self.state.counter_snapshot();
        writeln!(out, "workflow:")?;
        writeln!(out, "  execs_count: {}", execs.len())?;
        writeln!(out, "  reads_count: {}", reads.len())?;
        writeln!(out, "  writes_count: {}", writes.len())?;
        writeln!(out)
    }

    fn write_runtime(&self, out: &mut impl Write) -> io::Result<()> {
        let (execs, reads, writes) = self.state.counter_snapshot();
        writeln!(out, "runtime:")?;
        writeln!(out, "  threads_checksum: {}", self.state.checksum())?;
        writeln!(out, "  threads_active: {}", self.state.active_workers())?;
        writeln!(out, "  tasks_active_count: {}", total(&execs))?;
        writeln!(out, "  reads_active_count: {}", total(&reads))?;
        writeln!(out, "  writes_active_count: {}", total(&writes))?;

        let snapshot = self.state.core_snapshot();
        if !snapshot.is_empty() {
            writeln!(out, "  core_availability:")?;
            for (core_id, (avail, until)) in snapshot.iter().enumerate() {
                if *avail {
                    writeln!(out, "    {core_id}: {{avail_until: {until}}}")?;
                }
            }
        }
        writeln!(out)
    }

    fn write_trace(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "trace:")?;

        let locality = self.state.locality_snapshot();
        if !locality.is_empty() {
            writeln!(out, "  name_to_thread_locality:")?;
            for (name, loc) in sorted(&locality) {
                writeln!(
                    out,
                    "    {name}: {{numa_id: {}, core_id: {}, voluntary_cs: {}, \
                     involuntary_cs: {}, core_migrations: {}}}",
                    loc.numa_id, loc.core_id, loc.voluntary_cs, loc.involuntary_cs,
                    loc.core_migrations
                )?;
            }
            writeln!(out)?;
        }

        let (numa_r, numa_w) = self.state.numa_ids_snapshot();
        write_numa_map(out, "numa_mappings_write", &numa_w)?;
        write_numa_map(out, "numa_mappings_read", &numa_r)?;

        let (ts_r, ts_w, ts_c) = self.state.timestamp_snapshot();
        write_range_map(out, "comm_name_read_timestamps", &ts_r)?;
        write_range_map(out, "comm_name_write_timestamps", &ts_w)?;
        write_range_map(out, "exec_name_compute_timestamps", &ts_c)?;

        let (of_r, of_w, of_c, of_rcw) = self.state.offset_snapshot();
        write_range_map(out, "comm_name_read_offsets", &of_r)?;
        write_range_map(out, "comm_name_write_offsets", &of_w)?;
        write_range_map(out, "exec_name_compute_offsets", &of_c)?;
        write_range_map(out, "exec_name_total_offsets", &of_rcw)?;

        Ok(())
    }
}

fn total(counters: &HashMap<String, u32>) -> u64 {
    counters.values().map(|&c| c as u64).sum()
}

fn sorted<V>(map: &HashMap<String, V>) -> BTreeMap<&str, &V> {
    map.iter().map(|(k, v)| (k.as_str(), v)).collect()
}

fn write_matrix(
    out: &mut impl Write,
    key: &str,
    matrix: &DistanceMatrix,
    indent: usize,
) -> io::Result<()> {
    let pad = " ".repeat(indent);
    writeln!(out, "{pad}{key}:")?;
    for row in 0..matrix.dim() {
        let cells = matrix
            .row(row)
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "{pad}  - [{cells}]")?;
    }
    Ok(())
}

fn write_numa_map(
    out: &mut impl Write,
    header: &str,
    map: &HashMap<String, Vec<usize>>,
) -> io::Result<()> {
    if map.is_empty() {
        return Ok(());
    }
    writeln!(out, "  {header}:")?;
    for (name, numa_ids) in sorted(map) {
        let ids = numa_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "    {name}: {{numa_ids: [{ids}]}}")?;
    }
    writeln!(out)
}

fn write_range_map(
    out: &mut impl Write,
    header: &str,
    map: &HashMap<String, TimeRange>,
) -> io::Result<()> {
    if map.is_empty() {
        return Ok(());
    }
    writeln!(out, "  {header}:")?;
    for (name, range) in sorted(map) {
        writeln!(
            out,
            "    {name}: {{start: {}, end: {}, payload: {}}}",
            range.start_us, range.end_us, range.payload
        )?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::state::TimeRange;
    use crate::topology::ThreadLocality;

    fn fixture() -> (Config, CostModel, SharedState) {
        let config: Config = serde_json::from_value(serde_json::json!({
            "dag_file": "w.dot",
            "flops_per_cycle": 32,
            "clock_frequency_type": "static",
            "clock_frequency_hz": 1e9,
            "distance_matrices": {"latency_ns": "lat.txt", "bandwidth_gbps": "bw.txt"},
            "core_avail_mask": "0x3",
            "scheduler_type": "fifo",
            "scheduler_params": ["fifo_prioritize_by_core_id=yes"],
            "mapper_type": "simulation",
            "out_file_name": "report.yml"
        }))
        .unwrap();

        let lat = DistanceMatrix::new(2, vec![10.0, 100.0, 100.0, 10.0]).unwrap();
        let bw = DistanceMatrix::new(2, vec![50.0, 25.0, 25.0, 50.0]).unwrap();
        let cost = CostModel::new(Arc::new(lat), Arc::new(bw), 32.0);

        let state = SharedState::new(vec![true, true]);
        state.record_rcw_offset("a", TimeRange::new(0.0, 10.5, 1e9));
        state.record_write_offset("a->b", TimeRange::new(5.0, 10.5, 4.0));
        state.set_numa_ids_w("a->b", vec![0, 1]);
        state.increment_exec_active("a");
        state.set_thread_locality(
            "a",
            ThreadLocality {
                numa_id: 0,
                core_id: 1,
                voluntary_cs: 3,
                involuntary_cs: 1,
                core_migrations: 0,
            },
        );
        (config, cost, state)
    }

    fn render() -> String {
        let (config, cost, state) = fixture();
        let report = Report {
            config: &config,
            cost: &cost,
            state: &state,
        };
        let mut buf = Vec::new();
        report.write_to(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn sections_appear_in_order() {
        let text = render();
        let user = text.find("user:").unwrap();
        let workflow = text.find("workflow:").unwrap();
        let runtime = text.find("runtime:").unwrap();
        let trace = text.find("trace:").unwrap();
        assert!(user < workflow && workflow < runtime && runtime < trace);
    }

    #[test]
    fn user_section_echoes_configuration() {
        let text = render();
        assert!(text.contains("  flops_per_cycle: 32"));
        assert!(text.contains("  clock_frequency_type: static"));
        assert!(text.contains("  scheduler_type: fifo"));
        assert!(text.contains("    fifo_prioritize_by_core_id: yes"));
        assert!(text.contains("  distance_lat_ns:"));
        assert!(text.contains("    - [10, 100]"));
    }

    #[test]
    fn runtime_section_reports_available_cores() {
        let text = render();
        assert!(text.contains("  threads_checksum: 0"));
        assert!(text.contains("  tasks_active_count: 1"));
        assert!(text.contains("    0: {avail_until: 0}"));
        assert!(text.contains("    1: {avail_until: 0}"));
    }

    #[test]
    fn trace_section_prints_records_and_skips_empty_maps() {
        let text = render();
        assert!(text.contains("  name_to_thread_locality:"));
        assert!(text
            .contains("    a: {numa_id: 0, core_id: 1, voluntary_cs: 3, involuntary_cs: 1, core_migrations: 0}"));
        assert!(text.contains("  numa_mappings_write:"));
        assert!(text.contains("    a->b: {numa_ids: [0, 1]}"));
        assert!(text.contains("  comm_name_write_offsets:"));
        assert!(text.contains("    a->b: {start: 5, end: 10.5, payload: 4}"));
        assert!(text.contains("  exec_name_total_offsets:"));
        // Nothing was read and no timestamps were taken.
        assert!(!text.contains("comm_name_read_timestamps"));
        assert!(!text.contains("numa_mappings_read"));
    }

    #[test]
    fn identical_state_renders_identical_reports() {
        assert_eq!(render(), render());
    }
}
