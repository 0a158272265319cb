//! The runtime orchestrator: wires configuration to components, owns their
//! lifecycle, drives the mapper, and emits the report.
//!
//! Phases: initialize → run → stop (report) → finalize (drop).

use std::sync::Arc;

use log::info;

use crate::config::{Config, MapperType};
use crate::cost::CostModel;
use crate::dag::{self, Dag};
use crate::error::{Error, Result};
use crate::mapper::{BareMetalMapper, Mapper, SimulationMapper};
use crate::matrix::DistanceMatrix;
use crate::report::Report;
use crate::scheduler::{build_scheduler, Scheduler, SchedulerContext};
use crate::state::SharedState;
use crate::topology::{ClockSource, SysTopology, Topology};

// Field order is the teardown order: scheduler, then mapper, then the DAG
// and the shared/topology handles they kept alive.
pub struct Runtime {
    scheduler: Box<dyn Scheduler>,
    mapper: Box<dyn Mapper>,
    dag: Arc<Dag>,
    state: Arc<SharedState>,
    cost: CostModel,
    config: Config,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

impl Runtime {
    /// Initialize against the running host's topology.
    pub fn initialize(config: Config) -> Result<Self> {
        let clock = ClockSource::from_config(
            config.clock_frequency_type,
            config.clock_frequency_hz,
            config.clock_frequencies_hz.clone(),
        )?;
        let topology = Arc::new(SysTopology::detect(clock)?);
        Self::with_topology(config, topology)
    }

    /// Initialize with an explicit topology — a modeled host for simulation
    /// runs, or a fixture in tests.
    pub fn with_topology(config: Config, topology: Arc<dyn Topology>) -> Result<Self> {
        let mut dag = dag::read_dot(&config.dag_file)?;
        dag.strip_entry_exit()?;
        let dag = Arc::new(dag);
        info!(
            "loaded workflow: {} tasks, {} edges",
            dag.tasks().len(),
            dag.edges().len()
        );

        let latency = Arc::new(DistanceMatrix::from_file(
            &config.distance_matrices.latency_ns,
        )?);
        let bandwidth = Arc::new(DistanceMatrix::from_file(
            &config.distance_matrices.bandwidth_gbps,
        )?);
        if latency.dim() != bandwidth.dim() {
            return Err(Error::Config(format!(
                "latency matrix is {lat}x{lat} but bandwidth matrix is {bw}x{bw}",
                lat = latency.dim(),
                bw = bandwidth.dim()
            )));
        }
        if latency.dim() < topology.numa_count() {
            return Err(Error::Config(format!(
                "distance matrices cover {} NUMA nodes but the topology has {}",
                latency.dim(),
                topology.numa_count()
            )));
        }

        let core_avail = config.core_avail()?;
        if core_avail.len() > topology.core_count() {
            return Err(Error::Config(format!(
                "core availability names core {} but the topology has {} cores",
                core_avail.len() - 1,
                topology.core_count()
            )));
        }
        if let Some(freqs) = &config.clock_frequencies_hz {
            if freqs.len() < core_avail.len() {
                return Err(Error::Config(format!(
                    "clock_frequencies_hz has {} entries for {} cores",
                    freqs.len(),
                    core_avail.len()
                )));
            }
        }

        let state = Arc::new(SharedState::new(core_avail));
        state.seed_counters(&dag);

        let cost = CostModel::new(latency, bandwidth, config.flops_per_cycle);

        let ctx = SchedulerContext {
            dag: Arc::clone(&dag),
            state: Arc::clone(&state),
            topology: Arc::clone(&topology),
            cost: cost.clone(),
        };
        let scheduler = build_scheduler(&config, ctx);

        let mapper: Box<dyn Mapper> = match config.mapper_type {
            MapperType::BareMetal => Box::new(BareMetalMapper::new(
                Arc::clone(&dag),
                Arc::clone(&state),
                Arc::clone(&topology),
                config.mapper_mem_policy_type,
                config.mapper_mem_bind_numa_node_ids.clone(),
            )),
            MapperType::Simulation => Box::new(SimulationMapper::new(
                Arc::clone(&dag),
                Arc::clone(&state),
                Arc::clone(&topology),
                cost.clone(),
            )),
        };

        Ok(Self {
            scheduler,
            mapper,
            dag,
            state,
            cost,
            config,
        })
    }

    /// Drive the mapper until the DAG is drained and workers are quiescent.
    pub fn run(&mut self) -> Result<()> {
        info!(
            "run: scheduler={}, mapper={}",
            self.config.scheduler_type.as_str(),
            self.config.mapper_type.as_str()
        );
        self.mapper.run(self.scheduler.as_mut())
    }

    /// Emit the report to the configured output path.
    pub fn stop(&self) -> Result<()> {
        let report = Report {
            config: &self.config,
            cost: &self.cost,
            state: &self.state,
        };
        report.write_to_file(&self.config.out_file_name)?;
        info!("report written to {}", self.config.out_file_name.display());
        Ok(())
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
