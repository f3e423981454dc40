//! External mini-cluster harness
//!
//! Launches, tracks and force-kills the daemons of an ephemeral test
//! cluster: one statestored, one catalogd and any number of workers.

pub mod cluster;
pub mod config;
pub mod error;
pub mod handle;
pub mod logging;
pub mod manifest;
pub mod ports;
pub mod process;
pub mod role;
pub mod signal;

// Re-export the types most callers need
pub use cluster::{MiniCluster, WorkerOpts};
pub use config::{BuildMode, ClusterConfig};
pub use error::{ClusterError, ClusterResult};
pub use handle::{DaemonHandle, DaemonId};
pub use manifest::{ClusterManifest, DaemonRecord};
pub use role::DaemonRole;
