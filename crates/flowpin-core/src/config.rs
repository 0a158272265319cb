//! Configuration document: a single JSON file selecting the DAG, the machine
//! model, the scheduler policy, and the execution mode.
//!
//! Every recognized option is validated at load time; unknown fields, unknown
//! enum values, and malformed masks are fatal before anything else starts.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable that overrides `out_file_name` when set.
pub const OUT_FILE_ENV: &str = "FLOWPIN_OUT_FILE";

/// How per-core clock frequencies are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockFrequencyType {
    /// One fixed value for every core.
    Static,
    /// Live scaling frequency read from the OS per core.
    Dynamic,
    /// Per-core vector supplied in the configuration.
    Array,
}

impl ClockFrequencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::Array => "array",
        }
    }
}

/// Scheduling policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SchedulerType {
    #[serde(rename = "min-min")]
    MinMin,
    #[serde(rename = "heft")]
    Heft,
    #[serde(rename = "fifo")]
    Fifo,
}

impl SchedulerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinMin => "min-min",
            Self::Heft => "heft",
            Self::Fifo => "fifo",
        }
    }
}

/// Execution mode selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MapperType {
    #[serde(rename = "bare-metal")]
    BareMetal,
    #[serde(rename = "simulation")]
    Simulation,
}

impl MapperType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BareMetal => "bare-metal",
            Self::Simulation => "simulation",
        }
    }
}

/// Thread memory-binding policy applied by bare-metal workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MemPolicyType {
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "first-touch")]
    FirstTouch,
    #[serde(rename = "bind")]
    Bind,
    #[serde(rename = "interleave")]
    Interleave,
    #[serde(rename = "next-touch")]
    NextTouch,
    #[serde(rename = "mixed")]
    Mixed,
}

impl MemPolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::FirstTouch => "first-touch",
            Self::Bind => "bind",
            Self::Interleave => "interleave",
            Self::NextTouch => "next-touch",
            Self::Mixed => "mixed",
        }
    }

    /// Whether this policy carries a NUMA node set.
    pub fn takes_node_set(&self) -> bool {
        matches!(self, Self::Bind | Self::Interleave)
    }
}

/// Paths of the two distance-matrix text files.
#[derive(Debug, Clone, Deserialize)]
pub struct DistanceMatrixPaths {
    pub latency_ns: PathBuf,
    pub bandwidth_gbps: PathBuf,
}

/// The full recognized option set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub dag_file: PathBuf,
    pub flops_per_cycle: f64,

    pub clock_frequency_type: ClockFrequencyType,
    #[serde(default)]
    pub clock_frequency_hz: Option<f64>,
    #[serde(default)]
    pub clock_frequencies_hz: Option<Vec<f64>>,

    pub distance_matrices: DistanceMatrixPaths,

    #[serde(default)]
    pub core_avail_mask: Option<String>,
    #[serde(default)]
    pub core_avail_ids: Option<Vec<usize>>,

    pub scheduler_type: SchedulerType,
    #[serde(default)]
    pub scheduler_params: Vec<String>,

    pub mapper_type: MapperType,
    #[serde(default = "default_mem_policy")]
    pub mapper_mem_policy_type: MemPolicyType,
    #[serde(default)]
    pub mapper_mem_bind_numa_node_ids: Vec<usize>,

    pub out_file_name: PathBuf,
}

fn default_mem_policy() -> MemPolicyType {
    MemPolicyType::Default
}

impl Config {
    /// Load and validate a configuration document.
    ///
    /// Applies the [`OUT_FILE_ENV`] override before returning.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config: Config = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        if let Ok(out) = env::var(OUT_FILE_ENV) {
            config.out_file_name = PathBuf::from(out);
        }
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.flops_per_cycle <= 0.0 {
            return Err(Error::Config("flops_per_cycle must be positive".into()));
        }

        match self.clock_frequency_type {
            ClockFrequencyType::Static if self.clock_frequency_hz.is_none() => {
                return Err(Error::Config(
                    "clock_frequency_type 'static' requires clock_frequency_hz".into(),
                ));
            }
            ClockFrequencyType::Array
                if self
                    .clock_frequencies_hz
                    .as_ref()
                    .map_or(true, |v| v.is_empty()) =>
            {
                return Err(Error::Config(
                    "clock_frequency_type 'array' requires a non-empty clock_frequencies_hz"
                        .into(),
                ));
            }
            _ => {}
        }

        match (&self.core_avail_mask, &self.core_avail_ids) {
            (None, None) => {
                return Err(Error::Config(
                    "one of core_avail_mask or core_avail_ids is required".into(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(Error::Config(
                    "core_avail_mask and core_avail_ids are mutually exclusive".into(),
                ));
            }
            _ => {}
        }

        if self.mapper_mem_policy_type.takes_node_set()
            && self.mapper_mem_bind_numa_node_ids.is_empty()
        {
            return Err(Error::Config(format!(
                "memory policy '{}' requires mapper_mem_bind_numa_node_ids",
                self.mapper_mem_policy_type.as_str()
            )));
        }

        for param in &self.scheduler_params {
            if !param.contains('=') {
                return Err(Error::Config(format!(
                    "scheduler param '{param}' is not of the form key=value"
                )));
            }
        }

        // Parse eagerly so a malformed mask fails at initialize, not mid-run.
        self.core_avail()?;

        Ok(())
    }

    /// Core availability as an ordered boolean sequence indexed by core id.
    ///
    /// For the mask form, the sequence length is the position of the highest
    /// set bit; for the id-list form, it is the largest listed id plus one.
    pub fn core_avail(&self) -> Result<Vec<bool>> {
        if let Some(mask_str) = &self.core_avail_mask {
            let digits = mask_str
                .trim()
                .trim_start_matches("0x")
                .trim_start_matches("0X");
            let mask = u64::from_str_radix(digits, 16)
                .map_err(|_| Error::Config(format!("malformed core_avail_mask '{mask_str}'")))?;
            if mask == 0 {
                return Err(Error::Config("core_avail_mask selects no cores".into()));
            }
            let core_count = 64 - mask.leading_zeros() as usize;
            return Ok((0..core_count).map(|i| mask & (1 << i) != 0).collect());
        }

        let ids = self.core_avail_ids.as_ref().expect("validated");
        let max = ids
            .iter()
            .max()
            .ok_or_else(|| Error::Config("core_avail_ids selects no cores".into()))?;
        let mut avail = vec![false; max + 1];
        for &id in ids {
            avail[id] = true;
        }
        Ok(avail)
    }

    /// Look up a `key=value` scheduler parameter.
    pub fn scheduler_param(&self, key: &str) -> Option<&str> {
        self.scheduler_params.iter().find_map(|param| {
            let (k, v) = param.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    /// All scheduler parameters as a map, for the report echo.
    pub fn scheduler_params_map(&self) -> HashMap<&str, &str> {
        self.scheduler_params
            .iter()
            .filter_map(|param| param.split_once('='))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_json() -> serde_json::Value {
        serde_json::json!({
            "dag_file": "workflow.dot",
            "flops_per_cycle": 32,
            "clock_frequency_type": "static",
            "clock_frequency_hz": 1e9,
            "distance_matrices": {
                "latency_ns": "lat.txt",
                "bandwidth_gbps": "bw.txt"
            },
            "core_avail_mask": "0x3",
            "scheduler_type": "min-min",
            "scheduler_params": [],
            "mapper_type": "simulation",
            "mapper_mem_policy_type": "default",
            "mapper_mem_bind_numa_node_ids": [],
            "out_file_name": "report.yml"
        })
    }

    fn parse(value: serde_json::Value) -> Result<Config> {
        let config: Config = serde_json::from_value(value)
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn minimal_config_parses() {
        let config = parse(base_json()).unwrap();
        assert_eq!(config.scheduler_type, SchedulerType::MinMin);
        assert_eq!(config.mapper_type, MapperType::Simulation);
        assert_eq!(config.core_avail().unwrap(), vec![true, true]);
    }

    #[test]
    fn unknown_enum_value_is_fatal() {
        let mut json = base_json();
        json["scheduler_type"] = "round-robin".into();
        assert!(parse(json).is_err());
    }

    #[test]
    fn missing_required_field_is_fatal() {
        let mut json = base_json();
        json.as_object_mut().unwrap().remove("dag_file");
        assert!(parse(json).is_err());
    }

    #[test]
    fn static_clock_requires_scalar() {
        let mut json = base_json();
        json.as_object_mut().unwrap().remove("clock_frequency_hz");
        assert!(parse(json).is_err());
    }

    #[test]
    fn array_clock_requires_vector() {
        let mut json = base_json();
        json["clock_frequency_type"] = "array".into();
        assert!(parse(json.clone()).is_err());
        json["clock_frequencies_hz"] = serde_json::json!([1e9, 2e9]);
        assert!(parse(json).is_ok());
    }

    #[test]
    fn mask_decodes_sparse_bits() {
        let mut json = base_json();
        json["core_avail_mask"] = "0x800000000001".into();
        let avail = parse(json).unwrap().core_avail().unwrap();
        assert_eq!(avail.len(), 48);
        assert!(avail[0]);
        assert!(avail[47]);
        assert_eq!(avail.iter().filter(|&&b| b).count(), 2);
    }

    #[test]
    fn malformed_mask_is_fatal() {
        let mut json = base_json();
        json["core_avail_mask"] = "0xZZ".into();
        assert!(parse(json).is_err());
    }

    #[test]
    fn id_list_is_alternative_to_mask() {
        let mut json = base_json();
        json.as_object_mut().unwrap().remove("core_avail_mask");
        json["core_avail_ids"] = serde_json::json!([0, 4]);
        let avail = parse(json).unwrap().core_avail().unwrap();
        assert_eq!(avail, vec![true, false, false, false, true]);
    }

    #[test]
    fn mask_and_ids_are_mutually_exclusive() {
        let mut json = base_json();
        json["core_avail_ids"] = serde_json::json!([0]);
        assert!(parse(json).is_err());
    }

    #[test]
    fn bind_policy_requires_node_set() {
        let mut json = base_json();
        json["mapper_mem_policy_type"] = "bind".into();
        assert!(parse(json.clone()).is_err());
        json["mapper_mem_bind_numa_node_ids"] = serde_json::json!([0, 1]);
        assert!(parse(json).is_ok());
    }

    #[test]
    fn scheduler_params_lookup() {
        let mut json = base_json();
        json["scheduler_params"] = serde_json::json!([
            "fifo_prioritize_by_core_id=yes",
            "fifo_prioritize_by_exec_order=no"
        ]);
        let config = parse(json).unwrap();
        assert_eq!(
            config.scheduler_param("fifo_prioritize_by_core_id"),
            Some("yes")
        );
        assert_eq!(
            config.scheduler_param("fifo_prioritize_by_exec_order"),
            Some("no")
        );
        assert_eq!(config.scheduler_param("absent"), None);
    }

    #[test]
    fn malformed_scheduler_param_is_fatal() {
        let mut json = base_json();
        json["scheduler_params"] = serde_json::json!(["not_a_pair"]);
        assert!(parse(json).is_err());
    }

    #[test]
    fn env_override_replaces_out_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", base_json()).unwrap();

        env::set_var(OUT_FILE_ENV, "/tmp/override.yml");
        let config = Config::from_file(file.path()).unwrap();
        env::remove_var(OUT_FILE_ENV);

        assert_eq!(config.out_file_name, PathBuf::from("/tmp/override.yml"));
    }
}
