//! Discovery and supervision of device workers.
//!
//! Every cycle the supervisor asks the directory which receivers are
//! reachable, starts a worker for each receiver it is not already tracking,
//! waits a moment for the new workers to connect and then reaps whatever
//! has exited. The name -> handle table is owned by the supervisor alone;
//! workers never see it.

use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::airplay::ReceiverDirectory;
use crate::config::SupervisorConfig;

pub mod process;

pub use process::{is_vanished, ProcessHandle, ProcessLauncher};

/// Exit status of a reaped worker. Clean and failed exits are treated alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExitStatus {
    /// `None` when the worker was ended by a signal
    pub code: Option<i32>,
}

impl std::fmt::Display for WorkerExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// Handle to one running worker
#[async_trait]
pub trait WorkerHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// Non-blocking exit check; `Ok(None)` while the worker is still running
    fn try_reap(&mut self) -> io::Result<Option<WorkerExitStatus>>;

    /// Ask the worker to terminate and wait until it has exited
    async fn terminate(&mut self) -> io::Result<()>;

    /// Forcefully end the worker and wait until it has exited
    async fn kill(&mut self) -> io::Result<()>;
}

/// Starts isolated workers. The device name is all a worker is given.
pub trait WorkerLauncher: Send + Sync {
    type Handle: WorkerHandle;

    fn spawn(&self, device_name: &str) -> io::Result<Self::Handle>;
}

/// What a reap check decided for one tracked worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapOutcome {
    Exited(WorkerExitStatus),
    /// The process no longer exists or was already reaped elsewhere
    Vanished,
    /// The check itself failed; the entry is dropped anyway
    Lost(String),
}

/// Discovery and supervisor loop
pub struct Supervisor<D, L>
where
    L: WorkerLauncher,
{
    directory: D,
    launcher: L,
    workers: HashMap<String, L::Handle>,
    cycle_interval: Duration,
    settle_interval: Duration,
}

impl<D, L> Supervisor<D, L>
where
    D: ReceiverDirectory,
    L: WorkerLauncher,
{
    pub fn new(directory: D, launcher: L, config: &SupervisorConfig) -> Self {
        Self {
            directory,
            launcher,
            workers: HashMap::new(),
            cycle_interval: config.cycle_interval(),
            settle_interval: config.settle_interval(),
        }
    }

    /// Names of the devices that currently have a tracked worker, sorted
    pub fn tracked_devices(&self) -> Vec<String> {
        let mut names: Vec<_> = self.workers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_tracking(&self, device_name: &str) -> bool {
        self.workers.contains_key(device_name)
    }

    /// Discover receivers and start a worker for each untracked one.
    ///
    /// Returns how many workers were started, or `None` when discovery found
    /// nothing or failed.
    pub async fn discover_and_spawn(&mut self) -> Option<usize> {
        info!("Searching for receivers");

        let receivers = match self.directory.discover().await {
            Ok(receivers) => receivers,
            Err(e) => {
                info!("No receivers found: {}", e);
                return None;
            }
        };

        let mut spawned = 0;
        for receiver in receivers {
            if self.workers.contains_key(&receiver.name) {
                debug!("Slideshow already running on device {}", receiver.name);
                continue;
            }

            match self.launcher.spawn(&receiver.name) {
                Ok(handle) => {
                    info!(
                        "Started worker for device {} (pid {:?})",
                        receiver.name,
                        handle.pid()
                    );
                    self.workers.insert(receiver.name, handle);
                    spawned += 1;
                }
                Err(e) => {
                    // Not tracked, so the next cycle tries again
                    error!("Failed to start worker for device {}: {}", receiver.name, e);
                }
            }
        }

        Some(spawned)
    }

    /// Drop every worker that has exited or can no longer be checked.
    ///
    /// Only a definite "still running" keeps an entry. Never fails.
    pub fn reap(&mut self) -> Vec<(String, ReapOutcome)> {
        let mut reaped = Vec::new();

        self.workers.retain(|name, handle| {
            let outcome = match handle.try_reap() {
                Ok(None) => return true,
                Ok(Some(status)) => {
                    debug!("Reaping worker for device {}: {}", name, status);
                    ReapOutcome::Exited(status)
                }
                Err(e) if is_vanished(&e) => {
                    debug!("Worker for device {} is already gone: {}", name, e);
                    ReapOutcome::Vanished
                }
                Err(e) => {
                    warn!(
                        "Possibly lost track of worker for device {} (pid {:?}): {}",
                        name,
                        handle.pid(),
                        e
                    );
                    ReapOutcome::Lost(e.to_string())
                }
            };

            reaped.push((name.clone(), outcome));
            false
        });

        reaped
    }

    /// One full discovery cycle: scan, spawn, settle, reap, wait
    pub async fn tick(&mut self) {
        if self.discover_and_spawn().await.is_none() {
            info!("Sleeping {:?} before searching again", self.cycle_interval);
            tokio::time::sleep(self.cycle_interval).await;
            return;
        }

        // Give new workers a moment to connect
        tokio::time::sleep(self.settle_interval).await;

        self.reap();

        tokio::time::sleep(self.cycle_interval.saturating_sub(self.settle_interval)).await;
    }

    /// Run cycles until `shutdown` resolves, then terminate every worker.
    ///
    /// Returns how many workers were terminated.
    pub async fn run_until<F>(&mut self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        {
            let cycles = async {
                loop {
                    self.tick().await;
                }
            };

            tokio::select! {
                _ = cycles => {}
                _ = shutdown => {
                    info!("Shutdown requested");
                }
            }
        }

        self.shutdown().await
    }

    /// Terminate every tracked worker and wait for all of them to exit
    pub async fn shutdown(&mut self) -> usize {
        if self.workers.is_empty() {
            info!("No workers to clean up");
            return 0;
        }

        info!("Cleaning up workers: {:?}", self.tracked_devices());

        let terminations = self.workers.drain().map(|(name, mut handle)| async move {
            match handle.terminate().await {
                Ok(()) => debug!("Worker for device {} terminated", name),
                Err(e) => {
                    warn!(
                        "Failed to terminate worker for device {}: {}, killing it",
                        name, e
                    );
                    if let Err(e) = handle.kill().await {
                        error!("Failed to kill worker for device {}: {}", name, e);
                    }
                }
            }
        });

        join_all(terminations).await.len()
    }
}
