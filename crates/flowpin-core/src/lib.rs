//! # flowpin-core
//!
//! NUMA-aware workflow scheduling and execution for a single multi-socket
//! host. Given a DAG whose vertices carry a FLOP budget and whose edges
//! carry a byte payload, flowpin assigns each ready task to a physical core
//! and either emulates its reads, compute, and writes against real memory on
//! a pinned thread (bare-metal mode) or predicts the timings from a
//! latency/bandwidth model without touching memory (simulation mode).
//!
//! ## Quick start
//!
//! ```no_run
//! use flowpin_core::{Config, Runtime};
//!
//! let config = Config::from_file("run.json")?;
//! let mut runtime = Runtime::initialize(config)?;
//! runtime.run()?;
//! runtime.stop()?; // writes the report
//! # Ok::<(), flowpin_core::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Config → Runtime → Scheduler (MIN-MIN / HEFT / FIFO) → Mapper → Workers
//!
//! The scheduler proposes one `(task, core, estimated finish)` placement per
//! step from the shared cost model; the mapper commits it and hands it to
//! the configured execution mode. Workers record NUMA placements, timestamp
//! ranges, and deterministic time offsets into [`state::SharedState`], which
//! the report writer serializes at the end of the run.

pub mod config;
pub mod cost;
pub mod dag;
pub mod error;
pub mod mapper;
pub mod matrix;
pub mod report;
pub mod runtime;
pub mod scheduler;
pub mod state;
pub mod topology;

pub use config::{Config, MapperType, SchedulerType};
pub use error::{Error, Result};
pub use runtime::Runtime;
pub use topology::{ClockSource, StaticTopology, SysTopology, Topology};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
