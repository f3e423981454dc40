//! Cluster configuration: build variant, installation home, port base.
//!
//! Everything here is fixed when a [`ClusterConfig`] is built; the cluster
//! never re-reads the environment after construction (the per-role `*_BIN`
//! overrides are the one exception, looked up at resolve time so tests can
//! point a single role at a stub binary).

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

pub const STATESTORED_BIN: &str = "statestored";
pub const CATALOGD_BIN: &str = "catalogd";
pub const WORKERD_BIN: &str = "workerd";

pub const HOME_ENV: &str = "MINICLUSTER_HOME";
pub const BUILD_ENV: &str = "MINICLUSTER_BUILD";
pub const BASE_PORT_ENV: &str = "MINICLUSTER_BASE_PORT";

/// First port handed out by a fresh cluster unless overridden.
pub const DEFAULT_BASE_PORT: u16 = 25_000;

/// Directory layout under the installation home: `build/<variant>/<service>/`.
pub const BUILD_SUBDIR: &str = "build";
pub const LOG_SUBDIR: &str = "logs";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Which build of the daemon binaries to launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    #[default]
    Debug,
    Release,
}

impl BuildMode {
    pub fn dir_name(&self) -> &'static str {
        match self {
            BuildMode::Debug => "debug",
            BuildMode::Release => "release",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(BuildMode::Debug),
            "release" => Some(BuildMode::Release),
            _ => None,
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.dir_name())
    }
}

/// Immutable knobs for one cluster instance.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Debug or release daemon binaries. Defaults to debug.
    pub build: BuildMode,
    /// Installation root containing `build/<variant>/...`. `None` means no
    /// tree is configured and resolution falls back to PATH.
    pub home: Option<PathBuf>,
    /// First port the monotonic allocator hands out.
    pub base_port: u16,
    /// Parent directory for the cluster scratch dir. `None` uses a TempDir
    /// that is removed when the cluster is dropped.
    pub scratch_root: Option<PathBuf>,
}

impl ClusterConfig {
    /// Config with explicit build mode and everything else defaulted
    /// (no home tree, default base port, temp scratch).
    pub fn new(build: BuildMode) -> Self {
        Self {
            build,
            home: None,
            base_port: DEFAULT_BASE_PORT,
            scratch_root: None,
        }
    }

    /// Read `MINICLUSTER_HOME`, `MINICLUSTER_BUILD` and `MINICLUSTER_BASE_PORT`
    /// once. Malformed values are logged and replaced by defaults rather than
    /// failing construction.
    pub fn from_env() -> Self {
        let build = match env::var(BUILD_ENV) {
            Ok(raw) => BuildMode::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unrecognized {BUILD_ENV}, using debug");
                BuildMode::Debug
            }),
            Err(_) => BuildMode::Debug,
        };

        let home = env::var(HOME_ENV)
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| PathBuf::from(shellexpand::tilde(&raw).into_owned()));

        let base_port = match env::var(BASE_PORT_ENV) {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = %raw, "unparsable {BASE_PORT_ENV}, using {DEFAULT_BASE_PORT}");
                DEFAULT_BASE_PORT
            }),
            Err(_) => DEFAULT_BASE_PORT,
        };

        Self {
            build,
            home,
            base_port,
            scratch_root: None,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let original = env::var(key).ok();
            env::set_var(key, value);
            Self { key, original }
        }

        fn unset(key: &'static str) -> Self {
            let original = env::var(key).ok();
            env::remove_var(key);
            Self { key, original }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.original {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    #[test]
    fn build_mode_dir_names() {
        assert_eq!(BuildMode::Debug.dir_name(), "debug");
        assert_eq!(BuildMode::Release.dir_name(), "release");
        assert_eq!(BuildMode::default(), BuildMode::Debug);
    }

    #[test]
    fn build_mode_parse_is_case_insensitive() {
        assert_eq!(BuildMode::parse("Release"), Some(BuildMode::Release));
        assert_eq!(BuildMode::parse(" debug "), Some(BuildMode::Debug));
        assert_eq!(BuildMode::parse("optimized"), None);
    }

    #[serial]
    #[test]
    fn from_env_reads_home_and_build() {
        let _home = EnvGuard::set(HOME_ENV, "/opt/queryd");
        let _build = EnvGuard::set(BUILD_ENV, "release");
        let _port = EnvGuard::set(BASE_PORT_ENV, "31000");

        let cfg = ClusterConfig::from_env();
        assert_eq!(cfg.home.as_deref(), Some(std::path::Path::new("/opt/queryd")));
        assert_eq!(cfg.build, BuildMode::Release);
        assert_eq!(cfg.base_port, 31000);
    }

    #[serial]
    #[test]
    fn from_env_defaults_when_unset() {
        let _home = EnvGuard::unset(HOME_ENV);
        let _build = EnvGuard::unset(BUILD_ENV);
        let _port = EnvGuard::unset(BASE_PORT_ENV);

        let cfg = ClusterConfig::from_env();
        assert!(cfg.home.is_none());
        assert_eq!(cfg.build, BuildMode::Debug);
        assert_eq!(cfg.base_port, DEFAULT_BASE_PORT);
    }

    #[serial]
    #[test]
    fn from_env_tolerates_garbage_port() {
        let _port = EnvGuard::set(BASE_PORT_ENV, "not-a-port");
        let cfg = ClusterConfig::from_env();
        assert_eq!(cfg.base_port, DEFAULT_BASE_PORT);
    }

    #[serial]
    #[test]
    fn from_env_expands_tilde_in_home() {
        let _home = EnvGuard::set(HOME_ENV, "~/cluster");
        let cfg = ClusterConfig::from_env();
        let home = cfg.home.expect("home should be set");
        assert!(
            !home.to_string_lossy().starts_with('~'),
            "tilde should be expanded, got {}",
            home.display()
        );
    }
}
