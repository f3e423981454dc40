//! On-disk snapshot of the cluster for post-mortem inspection.

use crate::config::BuildMode;
use crate::handle::DaemonHandle;
use crate::role::DaemonRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use uuid::Uuid;

/// One tracked daemon as written to the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRecord {
    pub role: DaemonRole,
    pub pid: u32,
    pub args: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub log_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator_port: Option<u16>,
}

impl DaemonRecord {
    pub fn from_handle(handle: &DaemonHandle) -> Self {
        Self {
            role: handle.role(),
            pid: handle.pid(),
            args: handle.args().to_vec(),
            started_at: handle.started_at(),
            log_path: handle.log_path().to_string_lossy().into_owned(),
            coordinator_port: handle.coordinator_port(),
        }
    }
}

/// Snapshot of one cluster, rewritten after every successful start, kill or
/// wait. Stale manifests from crashed runs are how leaked daemons get found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterManifest {
    pub cluster_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub build: BuildMode,
    pub daemons: Vec<DaemonRecord>,
}

impl ClusterManifest {
    pub fn persist(&self, path: &Path) -> io::Result<()> {
        let payload = serde_json::to_string_pretty(self).map_err(io::Error::from)?;
        fs::write(path, payload)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(io::Error::from)
    }
}
