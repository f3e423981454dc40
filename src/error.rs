//! Error types for cluster lifecycle operations.
//!
//! Every failure is reported to the caller; none of them poison the cluster
//! itself, which stays usable for subsequent start/kill calls.

use crate::role::DaemonRole;
use std::io;
use thiserror::Error;

/// Result alias used across the crate.
pub type ClusterResult<T> = Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    /// The executable for a role could not be located. Start failure; no
    /// cluster state was mutated.
    #[error("{role} binary not found: {detail}")]
    Resolution { role: DaemonRole, detail: String },

    /// The OS refused to create the child process. Start failure; no cluster
    /// state was mutated.
    #[error("failed to spawn {role}: {source}")]
    Spawn {
        role: DaemonRole,
        #[source]
        source: io::Error,
    },

    /// The termination signal could not be delivered. The handle stays
    /// tracked so the caller can retry the kill.
    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },

    /// Reaping the child did not return a clean status. The handle stays
    /// tracked so the caller can retry.
    #[error("wait for pid {pid} failed: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },

    /// A singleton role (statestored, catalogd) was started while an
    /// instance is still tracked.
    #[error("{role} is already running (pid {pid}); kill it before starting another")]
    AlreadyRunning { role: DaemonRole, pid: u32 },

    /// Kill or wait was asked for a daemon the cluster no longer tracks.
    /// This is the clean failure for a repeated kill on the same id.
    #[error("no tracked {role} with pid {pid}")]
    UnknownDaemon { role: DaemonRole, pid: u32 },

    /// The monotonic port allocator ran off the end of the u16 range.
    #[error("port allocator exhausted the u16 range")]
    PortsExhausted,

    /// Harness-side filesystem failure (scratch directory, daemon log file).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
