//! The cluster controller: start, track and kill external daemons.

use crate::config::{self, ClusterConfig};
use crate::error::{ClusterError, ClusterResult};
use crate::handle::{DaemonHandle, DaemonId};
use crate::manifest::{ClusterManifest, DaemonRecord};
use crate::ports::PortAllocator;
use crate::role::DaemonRole;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tempfile::TempDir;
use tracing::{info, warn};
use uuid::Uuid;

/// Options for one worker daemon. The default worker runs both
/// sub-services, which is what most integration tests want.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOpts {
    /// Start the coordination sub-service on a freshly allocated port.
    pub coordinator: bool,
    /// Start the execution sub-service.
    pub executor: bool,
}

impl Default for WorkerOpts {
    fn default() -> Self {
        Self {
            coordinator: true,
            executor: true,
        }
    }
}

/// Scratch space for logs and the manifest. The temp variant disappears
/// with the cluster; a configured root outlives it for post-mortems.
#[derive(Debug)]
enum Scratch {
    Temp(TempDir),
    Fixed(PathBuf),
}

impl Scratch {
    fn path(&self) -> &Path {
        match self {
            Scratch::Temp(dir) => dir.path(),
            Scratch::Fixed(path) => path,
        }
    }
}

/// An ephemeral multi-process cluster: at most one statestored, at most one
/// catalogd, any number of workers. Single-threaded by construction; every
/// operation takes `&mut self`.
///
/// Dropping the cluster kills everything it still tracks.
#[derive(Debug)]
pub struct MiniCluster {
    config: ClusterConfig,
    cluster_id: Uuid,
    created_at: DateTime<Utc>,
    scratch: Scratch,
    log_dir: PathBuf,
    ports: PortAllocator,
    launch_ordinal: u64,
    statestored: Option<DaemonHandle>,
    catalogd: Option<DaemonHandle>,
    workers: HashMap<u32, DaemonHandle>,
}

impl MiniCluster {
    /// Cluster with env-derived defaults (`MINICLUSTER_HOME`,
    /// `MINICLUSTER_BUILD`, `MINICLUSTER_BASE_PORT`).
    pub fn new() -> ClusterResult<Self> {
        Self::with_config(ClusterConfig::default())
    }

    pub fn with_config(config: ClusterConfig) -> ClusterResult<Self> {
        let cluster_id = Uuid::new_v4();
        let scratch = match &config.scratch_root {
            Some(root) => {
                let dir = root.join(format!("minicluster-{}", cluster_id.simple()));
                fs::create_dir_all(&dir)?;
                Scratch::Fixed(dir)
            }
            None => Scratch::Temp(tempfile::Builder::new().prefix("minicluster-").tempdir()?),
        };
        let log_dir = scratch.path().join(config::LOG_SUBDIR);
        fs::create_dir_all(&log_dir)?;
        let ports = PortAllocator::new(config.base_port);

        info!(cluster = %cluster_id, scratch = %scratch.path().display(), build = %config.build,
              "mini-cluster created");
        Ok(Self {
            config,
            cluster_id,
            created_at: Utc::now(),
            scratch,
            log_dir,
            ports,
            launch_ordinal: 0,
            statestored: None,
            catalogd: None,
            workers: HashMap::new(),
        })
    }

    /// Launch the state-store daemon. At most one is tracked at a time; a
    /// second start without an intervening kill is rejected.
    pub fn start_statestored(&mut self) -> ClusterResult<DaemonId> {
        if let Some(handle) = &self.statestored {
            return Err(ClusterError::AlreadyRunning {
                role: DaemonRole::Statestored,
                pid: handle.pid(),
            });
        }
        let program = DaemonRole::Statestored.resolve(&self.config)?;
        let handle = self.launch(DaemonRole::Statestored, &program, Vec::new(), None)?;
        let id = handle.id();
        self.statestored = Some(handle);
        self.persist_manifest();
        info!(daemon = %id, "statestored started");
        Ok(id)
    }

    /// Launch the catalog daemon. Same singleton contract as statestored.
    pub fn start_catalogd(&mut self) -> ClusterResult<DaemonId> {
        if let Some(handle) = &self.catalogd {
            return Err(ClusterError::AlreadyRunning {
                role: DaemonRole::Catalogd,
                pid: handle.pid(),
            });
        }
        let program = DaemonRole::Catalogd.resolve(&self.config)?;
        let handle = self.launch(DaemonRole::Catalogd, &program, Vec::new(), None)?;
        let id = handle.id();
        self.catalogd = Some(handle);
        self.persist_manifest();
        info!(daemon = %id, "catalogd started");
        Ok(id)
    }

    /// Launch one worker daemon. With `opts.coordinator` the worker gets the
    /// next unused port as `--coordinator_port`; with `opts.executor` it gets
    /// the `--enable_executor` switch.
    pub fn start_worker(&mut self, opts: WorkerOpts) -> ClusterResult<DaemonId> {
        // Resolve before allocating so a missing binary burns no port.
        let program = DaemonRole::Workerd.resolve(&self.config)?;

        let mut args = Vec::new();
        let mut coordinator_port = None;
        if opts.coordinator {
            let port = self.ports.next_port()?;
            args.push(format!("--coordinator_port={port}"));
            coordinator_port = Some(port);
        }
        if opts.executor {
            args.push("--enable_executor".to_string());
        }

        let handle = self.launch(DaemonRole::Workerd, &program, args, coordinator_port)?;
        let id = handle.id();
        self.workers.insert(handle.pid(), handle);
        self.persist_manifest();
        info!(daemon = %id, port = ?coordinator_port, executor = opts.executor, "workerd started");
        Ok(id)
    }

    /// Force-kill one daemon and stop tracking it: SIGKILL to its process
    /// group, then a blocking reap. On a signal or wait failure the handle
    /// stays tracked so the caller can retry (or `wait` it out).
    pub fn kill(&mut self, id: DaemonId) -> ClusterResult<()> {
        let handle = self.handle_mut(id).ok_or(ClusterError::UnknownDaemon {
            role: id.role(),
            pid: id.pid(),
        })?;
        let status = handle.kill()?;
        self.remove(id);
        self.persist_manifest();
        info!(daemon = %id, ?status, "daemon killed");
        Ok(())
    }

    /// Block until a daemon exits on its own, reap it, stop tracking it.
    pub fn wait(&mut self, id: DaemonId) -> ClusterResult<ExitStatus> {
        let handle = self.handle_mut(id).ok_or(ClusterError::UnknownDaemon {
            role: id.role(),
            pid: id.pid(),
        })?;
        let status = handle.wait()?;
        self.remove(id);
        self.persist_manifest();
        info!(daemon = %id, ?status, "daemon exited");
        Ok(status)
    }

    /// Best-effort kill of everything tracked, workers first, then catalogd,
    /// then statestored. Failures are logged and swallowed. `Drop` calls
    /// this, so a cluster going out of scope leaks no processes.
    pub fn shutdown(&mut self) {
        let ids: Vec<DaemonId> = self
            .workers
            .values()
            .map(DaemonHandle::id)
            .chain(self.catalogd.as_ref().map(DaemonHandle::id))
            .chain(self.statestored.as_ref().map(DaemonHandle::id))
            .collect();
        for id in ids {
            if let Err(err) = self.kill(id) {
                warn!(daemon = %id, %err, "shutdown kill failed");
            }
        }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn statestored(&self) -> Option<&DaemonHandle> {
        self.statestored.as_ref()
    }

    pub fn catalogd(&self) -> Option<&DaemonHandle> {
        self.catalogd.as_ref()
    }

    /// Tracked workers in no particular order.
    pub fn workers(&self) -> impl Iterator<Item = &DaemonHandle> {
        self.workers.values()
    }

    pub fn handle(&self, id: DaemonId) -> Option<&DaemonHandle> {
        match id.role() {
            DaemonRole::Statestored => self.statestored.as_ref().filter(|h| h.pid() == id.pid()),
            DaemonRole::Catalogd => self.catalogd.as_ref().filter(|h| h.pid() == id.pid()),
            DaemonRole::Workerd => self.workers.get(&id.pid()),
        }
    }

    pub fn cluster_id(&self) -> Uuid {
        self.cluster_id
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Directory holding `logs/` and the manifest.
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.scratch.path().join(config::MANIFEST_FILE)
    }

    /// Snapshot of every tracked daemon: statestored, catalogd, then
    /// workers by ascending pid.
    pub fn manifest(&self) -> ClusterManifest {
        let mut daemons = Vec::new();
        if let Some(handle) = &self.statestored {
            daemons.push(DaemonRecord::from_handle(handle));
        }
        if let Some(handle) = &self.catalogd {
            daemons.push(DaemonRecord::from_handle(handle));
        }
        let mut workers: Vec<&DaemonHandle> = self.workers.values().collect();
        workers.sort_by_key(|handle| handle.pid());
        daemons.extend(workers.into_iter().map(DaemonRecord::from_handle));

        ClusterManifest {
            cluster_id: self.cluster_id,
            created_at: self.created_at,
            build: self.config.build,
            daemons,
        }
    }

    fn launch(
        &mut self,
        role: DaemonRole,
        program: &Path,
        args: Vec<String>,
        coordinator_port: Option<u16>,
    ) -> ClusterResult<DaemonHandle> {
        let log_path = self
            .log_dir
            .join(format!("{}.{}.log", role.name(), self.launch_ordinal));
        let handle = DaemonHandle::launch(role, program, args, log_path, coordinator_port)?;
        // The ordinal advances only on a successful spawn.
        self.launch_ordinal += 1;
        Ok(handle)
    }

    fn handle_mut(&mut self, id: DaemonId) -> Option<&mut DaemonHandle> {
        match id.role() {
            DaemonRole::Statestored => self.statestored.as_mut().filter(|h| h.pid() == id.pid()),
            DaemonRole::Catalogd => self.catalogd.as_mut().filter(|h| h.pid() == id.pid()),
            DaemonRole::Workerd => self.workers.get_mut(&id.pid()),
        }
    }

    fn remove(&mut self, id: DaemonId) {
        match id.role() {
            DaemonRole::Statestored => {
                self.statestored.take_if(|h| h.pid() == id.pid());
            }
            DaemonRole::Catalogd => {
                self.catalogd.take_if(|h| h.pid() == id.pid());
            }
            DaemonRole::Workerd => {
                self.workers.remove(&id.pid());
            }
        }
    }

    fn persist_manifest(&self) {
        let path = self.manifest_path();
        if let Err(err) = self.manifest().persist(&path) {
            warn!(path = %path.display(), %err, "failed to write cluster manifest");
        }
    }
}

impl Drop for MiniCluster {
    fn drop(&mut self) {
        self.shutdown();
    }
}
