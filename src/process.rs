//! Process primitives: group-leader spawn, forced kill, liveness probe.

use crate::error::{ClusterError, ClusterResult};
use crate::role::DaemonRole;
use std::fs::File;
use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

/// Arrange for the child to become a process-group leader and, on Linux, to
/// be killed by the kernel if the harness itself dies.
pub fn prepare_command(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;

        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(io::Error::last_os_error());
                }
                #[cfg(target_os = "linux")]
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) != 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }
}

/// Spawn one daemon with stdin closed and stdout+stderr appended to a single
/// log file. The file is opened before the spawn so an unwritable log path
/// fails the start without creating a process.
pub fn spawn_daemon(
    role: DaemonRole,
    program: &Path,
    args: &[String],
    log_path: &Path,
) -> ClusterResult<Child> {
    let stdout = File::create(log_path)?;
    let stderr = stdout.try_clone()?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));
    prepare_command(&mut cmd);

    cmd.spawn()
        .map_err(|source| ClusterError::Spawn { role, source })
}

/// SIGKILL the daemon's whole process group. The un-reaped child keeps its
/// pid reserved, so the group id cannot be recycled before the reap.
pub fn kill_group(pid: u32) -> ClusterResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        kill(Pid::from_raw(-(pid as i32)), Signal::SIGKILL).map_err(|errno| {
            ClusterError::Signal {
                pid,
                source: io::Error::from(errno),
            }
        })
    }
    #[cfg(not(unix))]
    {
        Err(ClusterError::Signal {
            pid,
            source: io::Error::new(io::ErrorKind::Unsupported, "signals are unix-only"),
        })
    }
}

/// Block until the child exits and reap it.
pub fn reap(pid: u32, child: &mut Child) -> ClusterResult<ExitStatus> {
    child
        .wait()
        .map_err(|source| ClusterError::Wait { pid, source })
}

/// Signal-0 probe. EPERM still means the process exists.
pub fn process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        match unsafe { libc::kill(pid as libc::pid_t, 0) } {
            0 => true,
            _ => io::Error::last_os_error().raw_os_error() == Some(libc::EPERM),
        }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh() -> &'static Path {
        Path::new("/bin/sh")
    }

    #[test]
    fn spawn_captures_stdout_and_stderr_in_one_file() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("workerd.0.log");
        let args = vec![
            "-c".to_string(),
            "echo to-stdout; echo to-stderr 1>&2".to_string(),
        ];

        let mut child = spawn_daemon(DaemonRole::Workerd, sh(), &args, &log).unwrap();
        let status = reap(child.id(), &mut child).unwrap();
        assert!(status.success());

        let captured = std::fs::read_to_string(&log).unwrap();
        assert!(captured.contains("to-stdout"));
        assert!(captured.contains("to-stderr"));
    }

    #[test]
    fn kill_group_terminates_a_sleeping_child() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("statestored.0.log");
        let args = vec!["-c".to_string(), "sleep 30".to_string()];

        let mut child = spawn_daemon(DaemonRole::Statestored, sh(), &args, &log).unwrap();
        let pid = child.id();
        assert!(process_alive(pid));

        kill_group(pid).unwrap();
        let status = reap(pid, &mut child).unwrap();
        assert!(!status.success());
        assert!(!process_alive(pid));
    }

    #[test]
    fn kill_group_of_a_reaped_pid_errors() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("catalogd.0.log");
        let args = vec!["-c".to_string(), "exit 0".to_string()];

        let mut child = spawn_daemon(DaemonRole::Catalogd, sh(), &args, &log).unwrap();
        let pid = child.id();
        reap(pid, &mut child).unwrap();

        let err = kill_group(pid).unwrap_err();
        assert!(matches!(err, ClusterError::Signal { .. }));
    }

    #[test]
    fn spawning_a_non_executable_is_a_spawn_error() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("not-a-binary");
        std::fs::write(&bogus, "plain text").unwrap();
        let log = dir.path().join("workerd.0.log");

        let err = spawn_daemon(DaemonRole::Workerd, &bogus, &[], &log).unwrap_err();
        assert!(matches!(err, ClusterError::Spawn { .. }));
    }
}
