//! Per-daemon bookkeeping: the owned process handle and its public id.

use crate::error::ClusterResult;
use crate::process;
use crate::role::DaemonRole;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus};

/// Identifier callers hold instead of the handle itself. The cluster owns
/// every handle; a `DaemonId` names one without borrowing it, and goes stale
/// once the daemon is killed or waited out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DaemonId {
    pub(crate) role: DaemonRole,
    pub(crate) pid: u32,
}

impl DaemonId {
    pub fn role(&self) -> DaemonRole {
        self.role
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl fmt::Display for DaemonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.role, self.pid)
    }
}

/// One tracked OS process. Holding a `DaemonHandle` means the spawn
/// succeeded; there is no unstarted or half-started state to observe.
#[derive(Debug)]
pub struct DaemonHandle {
    role: DaemonRole,
    pid: u32,
    args: Vec<String>,
    started_at: DateTime<Utc>,
    log_path: PathBuf,
    coordinator_port: Option<u16>,
    child: Child,
}

impl DaemonHandle {
    /// Spawn the daemon and wrap it. Fails without side effects if the OS
    /// refuses the spawn.
    pub(crate) fn launch(
        role: DaemonRole,
        program: &Path,
        args: Vec<String>,
        log_path: PathBuf,
        coordinator_port: Option<u16>,
    ) -> ClusterResult<Self> {
        let child = process::spawn_daemon(role, program, &args, &log_path)?;
        let pid = child.id();
        Ok(Self {
            role,
            pid,
            args,
            started_at: Utc::now(),
            log_path,
            coordinator_port,
            child,
        })
    }

    pub fn id(&self) -> DaemonId {
        DaemonId {
            role: self.role,
            pid: self.pid,
        }
    }

    pub fn role(&self) -> DaemonRole {
        self.role
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// File receiving the daemon's combined stdout and stderr.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Port of the coordination sub-service. `None` means the worker was
    /// started without one; always `None` for statestored and catalogd.
    pub fn coordinator_port(&self) -> Option<u16> {
        self.coordinator_port
    }

    /// Signal-0 liveness probe of the underlying process.
    pub fn is_alive(&self) -> bool {
        process::process_alive(self.pid)
    }

    /// SIGKILL the process group, then block until the child is reaped.
    pub(crate) fn kill(&mut self) -> ClusterResult<ExitStatus> {
        process::kill_group(self.pid)?;
        process::reap(self.pid, &mut self.child)
    }

    /// Block until the daemon exits on its own and reap it.
    pub(crate) fn wait(&mut self) -> ClusterResult<ExitStatus> {
        process::reap(self.pid, &mut self.child)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn launch_sh(dir: &TempDir, script: &str, port: Option<u16>) -> DaemonHandle {
        DaemonHandle::launch(
            DaemonRole::Workerd,
            Path::new("/bin/sh"),
            vec!["-c".to_string(), script.to_string()],
            dir.path().join("workerd.0.log"),
            port,
        )
        .unwrap()
    }

    #[test]
    fn launch_records_identity_and_arguments() {
        let dir = TempDir::new().unwrap();
        let mut handle = launch_sh(&dir, "sleep 30", Some(25_000));

        assert_eq!(handle.role(), DaemonRole::Workerd);
        assert_eq!(handle.id().pid(), handle.pid());
        assert_eq!(handle.coordinator_port(), Some(25_000));
        assert_eq!(handle.args()[0], "-c");
        assert!(handle.started_at() <= Utc::now());
        assert_eq!(handle.id().to_string(), format!("workerd/{}", handle.pid()));

        handle.kill().unwrap();
    }

    #[test]
    fn kill_flips_liveness() {
        let dir = TempDir::new().unwrap();
        let mut handle = launch_sh(&dir, "sleep 30", None);

        assert!(handle.is_alive());
        handle.kill().unwrap();
        assert!(!handle.is_alive());
    }

    #[test]
    fn wait_returns_the_exit_status() {
        let dir = TempDir::new().unwrap();
        let mut handle = launch_sh(&dir, "exit 3", None);

        let status = handle.wait().unwrap();
        assert_eq!(status.code(), Some(3));
    }
}
