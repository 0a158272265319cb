//! Error types surfaced by the scheduling and execution core.
//!
//! No error is retried. Worker-side failures propagate to the orchestrator,
//! which tears down and exits with a failure status.

use std::path::PathBuf;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure mode the core surfaces to its caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration: unknown enum value, missing field, malformed mask.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// File could not be read or written.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed DAG input or a DAG traversal inconsistency.
    #[error("dag: {0}")]
    Dag(String),

    /// Malformed distance-matrix file.
    #[error("distance matrix {path}: {reason}")]
    Matrix { path: PathBuf, reason: String },

    /// A topology lookup could not be resolved (core id, NUMA id, PU id).
    #[error("topology: {0}")]
    Topology(String),

    /// The OS rejected a thread memory-binding request.
    #[error("memory policy: {0}")]
    MemPolicy(String),

    /// A record expected in shared state was never created.
    /// Indicates a DAG traversal bug, not a user error.
    #[error("missing key in {map}: {key}")]
    MissingKey { map: &'static str, key: String },

    /// A pinned worker died (error or panic) before completing its task.
    /// The process aborts, since the frontier can no longer advance.
    #[error("worker for task '{task}' aborted: {reason}")]
    WorkerPanic { task: String, reason: String },
}

impl Error {
    /// Wrap an io::Error with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
