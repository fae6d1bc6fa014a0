//! Device workers as child processes.
//!
//! Each worker runs as `<this executable> [ambient flags] worker <device name>`.
//! The device name is the only per-worker value handed across; everything
//! else the child needs it reads itself.

use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

use super::{WorkerExitStatus, WorkerHandle, WorkerLauncher};

/// Starts worker processes
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    base_args: Vec<OsString>,
}

impl ProcessLauncher {
    /// Launch workers from `program`, passing `base_args` before `worker <name>`
    pub fn new(program: impl Into<PathBuf>, base_args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            base_args,
        }
    }

    /// Launch workers from the running executable with the same ambient flags
    pub fn for_current_exe(config_path: Option<&Path>, debug: bool) -> io::Result<Self> {
        let mut base_args = Vec::new();
        if let Some(path) = config_path {
            base_args.push(OsString::from("--config"));
            base_args.push(path.as_os_str().to_owned());
        }
        if debug {
            base_args.push(OsString::from("--debug"));
        }

        Ok(Self::new(std::env::current_exe()?, base_args))
    }
}

impl WorkerLauncher for ProcessLauncher {
    type Handle = ProcessHandle;

    fn spawn(&self, device_name: &str) -> io::Result<ProcessHandle> {
        let child = Command::new(&self.program)
            .args(&self.base_args)
            .arg("worker")
            .arg(device_name)
            .stdin(Stdio::null())
            // Children die with the supervisor even if it unwinds
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        debug!("Spawned worker for {} (pid {:?})", device_name, pid);

        Ok(ProcessHandle { child, pid })
    }
}

/// A running worker process
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
}

#[async_trait]
impl WorkerHandle for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn try_reap(&mut self) -> io::Result<Option<WorkerExitStatus>> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| WorkerExitStatus { code: status.code() }))
    }

    async fn terminate(&mut self) -> io::Result<()> {
        request_termination(&mut self.child)?;
        let status = self.child.wait().await?;
        debug!("Worker pid {:?} exited: {}", self.pid, status);
        Ok(())
    }

    async fn kill(&mut self) -> io::Result<()> {
        match self.child.start_kill() {
            // Already reaped
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            other => other?,
        }
        let status = self.child.wait().await?;
        debug!("Worker pid {:?} killed: {}", self.pid, status);
        Ok(())
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) -> io::Result<()> {
    // No id means the child was already reaped
    let Some(pid) = child.id() else {
        return Ok(());
    };

    // SAFETY: plain signal delivery to a pid we spawned and have not reaped yet
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if result == -1 {
        let err = io::Error::last_os_error();
        if !is_vanished(&err) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> io::Result<()> {
    match child.start_kill() {
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
        other => other,
    }
}

/// The process no longer exists or was already reaped
pub fn is_vanished(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        matches!(err.raw_os_error(), Some(libc::ESRCH) | Some(libc::ECHILD))
    }

    #[cfg(not(unix))]
    {
        err.kind() == io::ErrorKind::NotFound
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn shell_launcher(script: &str) -> ProcessLauncher {
        // sh -c <script> slidecast worker <name>
        ProcessLauncher::new(
            "sh",
            vec![
                OsString::from("-c"),
                OsString::from(script),
                OsString::from("slidecast"),
            ],
        )
    }

    async fn wait_for_exit(handle: &mut ProcessHandle) -> WorkerExitStatus {
        for _ in 0..100 {
            if let Some(status) = handle.try_reap().unwrap() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("worker did not exit");
    }

    #[tokio::test]
    async fn test_spawn_passes_only_device_name() {
        // Exits 0 only when invoked as `worker Lobby`
        let launcher = shell_launcher(r#"[ "$1" = worker ] && [ "$2" = Lobby ] && [ $# -eq 2 ]"#);
        let mut handle = launcher.spawn("Lobby").unwrap();

        assert!(handle.pid().is_some());
        let status = wait_for_exit(&mut handle).await;
        assert_eq!(status.code, Some(0));
    }

    #[tokio::test]
    async fn test_try_reap_reports_running_then_exited() {
        let launcher = shell_launcher("sleep 0.2; exit 3");
        let mut handle = launcher.spawn("Lobby").unwrap();

        assert!(handle.try_reap().unwrap().is_none());
        let status = wait_for_exit(&mut handle).await;
        assert_eq!(status.code, Some(3));
    }

    #[tokio::test]
    async fn test_terminate_stops_long_running_worker() {
        let launcher = shell_launcher("exec sleep 30");
        let mut handle = launcher.spawn("Lobby").unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle.terminate())
            .await
            .expect("terminate blocked")
            .unwrap();

        // Already reaped; a second request is harmless
        handle.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_kill_waits_for_worker_ignoring_sigterm() {
        let launcher = shell_launcher("trap '' TERM; while :; do sleep 1; done");
        let mut handle = launcher.spawn("Lobby").unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle.kill())
            .await
            .expect("kill blocked")
            .unwrap();

        assert!(handle.pid().is_some());
        // Reaped by kill; another kill is harmless
        handle.kill().await.unwrap();
    }

    #[test]
    fn test_vanished_classification() {
        assert!(is_vanished(&io::Error::from_raw_os_error(libc::ECHILD)));
        assert!(is_vanished(&io::Error::from_raw_os_error(libc::ESRCH)));
        assert!(!is_vanished(&io::Error::from_raw_os_error(libc::EPERM)));
    }
}
