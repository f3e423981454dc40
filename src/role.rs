//! Daemon roles and per-role binary resolution.

use crate::config::{self, BuildMode, ClusterConfig};
use crate::error::{ClusterError, ClusterResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The three daemon kinds a cluster can launch. A closed set; every variant
/// knows its own binary name, install subdirectory and env override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonRole {
    Statestored,
    Catalogd,
    Workerd,
}

impl DaemonRole {
    pub const ALL: [DaemonRole; 3] = [
        DaemonRole::Statestored,
        DaemonRole::Catalogd,
        DaemonRole::Workerd,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DaemonRole::Statestored => "statestored",
            DaemonRole::Catalogd => "catalogd",
            DaemonRole::Workerd => "workerd",
        }
    }

    pub fn binary_name(&self) -> &'static str {
        match self {
            DaemonRole::Statestored => config::STATESTORED_BIN,
            DaemonRole::Catalogd => config::CATALOGD_BIN,
            DaemonRole::Workerd => config::WORKERD_BIN,
        }
    }

    /// Subdirectory of the build tree that holds this role's binary.
    pub fn service_subdir(&self) -> &'static str {
        match self {
            DaemonRole::Statestored => "statestore",
            DaemonRole::Catalogd => "catalog",
            DaemonRole::Workerd => "worker",
        }
    }

    pub fn env_var_name(&self) -> &'static str {
        match self {
            DaemonRole::Statestored => "STATESTORED_BIN",
            DaemonRole::Catalogd => "CATALOGD_BIN",
            DaemonRole::Workerd => "WORKERD_BIN",
        }
    }

    /// Locate this role's executable.
    ///
    /// Precedence: per-role env override, then the configured installation
    /// tree, then PATH. A configured home is authoritative: once one is set,
    /// a binary missing from the tree is an error and PATH is never consulted.
    pub fn resolve(&self, config: &ClusterConfig) -> ClusterResult<PathBuf> {
        if let Some(overridden) = env::var(self.env_var_name())
            .ok()
            .filter(|raw| !raw.trim().is_empty())
        {
            let path = PathBuf::from(shellexpand::tilde(&overridden).into_owned());
            if path.is_file() {
                debug!(role = self.name(), path = %path.display(), "resolved via env override");
                return Ok(path);
            }
            return Err(ClusterError::Resolution {
                role: *self,
                detail: format!(
                    "{} points at {}, which does not exist",
                    self.env_var_name(),
                    path.display()
                ),
            });
        }

        if let Some(home) = &config.home {
            let candidate = install_path(home, config.build, *self);
            if candidate.is_file() {
                debug!(role = self.name(), path = %candidate.display(), "resolved via install tree");
                return Ok(candidate);
            }
            return Err(ClusterError::Resolution {
                role: *self,
                detail: format!("{} does not exist", candidate.display()),
            });
        }

        match which::which(self.binary_name()) {
            Ok(path) => {
                debug!(role = self.name(), path = %path.display(), "resolved via PATH");
                Ok(path)
            }
            Err(_) => Err(ClusterError::Resolution {
                role: *self,
                detail: format!(
                    "no {} configured and '{}' not found in PATH",
                    config::HOME_ENV,
                    self.binary_name()
                ),
            }),
        }
    }
}

impl fmt::Display for DaemonRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// `<home>/build/<variant>/<service>/<binary>`.
fn install_path(home: &Path, build: BuildMode, role: DaemonRole) -> PathBuf {
    home.join(config::BUILD_SUBDIR)
        .join(build.dir_name())
        .join(role.service_subdir())
        .join(role.binary_name())
}
