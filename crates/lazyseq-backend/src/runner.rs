//! Single backend invocation
//!
//! Writes the sequentialized program to a temporary file, runs the backend
//! in its own process group under a wall-clock timeout, and classifies the
//! captured output. A timeout kills the whole group, not just the direct
//! child, since some backends fork solver subprocesses.

use crate::BackendError;
use lazyseq_core::{BackendKind, VerificationResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tokio::time::{error::Elapsed, timeout};
use tracing::{debug, warn};

/// Configuration for one backend invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// Binary to run; `kind.command()` when absent
    pub binary: Option<String>,

    /// Arguments placed before the program file
    pub args: Vec<String>,

    /// Wall-clock budget; zero means no limit
    pub timeout: Duration,
}

impl BackendConfig {
    /// Stock configuration for a backend: 32-bit analysis plus an optional
    /// unwinding bound.
    #[must_use]
    pub fn for_kind(kind: BackendKind, unwind: Option<u32>) -> Self {
        let mut args = vec!["--32".to_string()];
        if let Some(bound) = unwind {
            args.push("--unwind".to_string());
            args.push(bound.to_string());
        }
        Self {
            kind,
            binary: None,
            args,
            timeout: Duration::from_secs(3600),
        }
    }

    fn binary(&self) -> &str {
        self.binary.as_deref().unwrap_or(self.kind.command())
    }
}

/// Runs one backend over a sequentialized program.
pub struct BackendRunner {
    config: BackendConfig,
}

impl BackendRunner {
    #[must_use]
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    /// Write `program` to a temp file and verify it.
    pub async fn run(&self, program: &str) -> Result<VerificationResult, BackendError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("seq.c");
        std::fs::write(&path, program)?;
        self.run_file(&path).await
    }

    /// Verify an already-written sequentialized program. `extra_args` go
    /// after the configured arguments, before the file.
    pub async fn run_file(&self, path: &Path) -> Result<VerificationResult, BackendError> {
        self.run_file_with(path, &[]).await
    }

    pub async fn run_file_with(
        &self,
        path: &Path,
        extra_args: &[String],
    ) -> Result<VerificationResult, BackendError> {
        let mut running = self.launch(path, extra_args)?;
        let start = Instant::now();
        let outcome = timeout(self.budget(), running.collect()).await;
        self.settle(outcome, &mut running, start.elapsed()).await
    }

    /// Like [`run_file_with`](Self::run_file_with), but abandons the run
    /// when `cancel` fires, killing the backend's whole process group.
    /// Returns `None` on cancellation.
    pub async fn run_file_until(
        &self,
        path: &Path,
        extra_args: &[String],
        cancel: &mut broadcast::Receiver<()>,
    ) -> Option<Result<VerificationResult, BackendError>> {
        let mut running = match self.launch(path, extra_args) {
            Ok(running) => running,
            Err(e) => return Some(Err(e)),
        };
        let start = Instant::now();

        let outcome = tokio::select! {
            outcome = timeout(self.budget(), running.collect()) => Some(outcome),
            _ = cancel.recv() => None,
        };
        match outcome {
            Some(outcome) => Some(self.settle(outcome, &mut running, start.elapsed()).await),
            None => {
                debug!("backend {} cancelled", self.config.kind);
                running.abort().await;
                None
            }
        }
    }

    fn launch(&self, path: &Path, extra_args: &[String]) -> Result<RunningBackend, BackendError> {
        let mut cmd = Command::new(self.config.binary());
        cmd.args(&self.config.args);
        cmd.args(extra_args);
        cmd.arg(path);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        debug!("running backend: {:?}", cmd);
        let child = cmd
            .spawn()
            .map_err(|e| BackendError::Spawn(format!("{}: {e}", self.config.binary())))?;
        let pid = child.id();
        Ok(RunningBackend { child, pid })
    }

    /// Zero means unlimited; one year keeps the timer arithmetic sane.
    fn budget(&self) -> Duration {
        if self.config.timeout.is_zero() {
            Duration::from_secs(365 * 24 * 3600)
        } else {
            self.config.timeout
        }
    }

    async fn settle(
        &self,
        outcome: Result<std::io::Result<(ExitStatus, String, String)>, Elapsed>,
        running: &mut RunningBackend,
        duration: Duration,
    ) -> Result<VerificationResult, BackendError> {
        match outcome {
            Ok(Ok((status, stdout, stderr))) => {
                let output = format!("{stdout}\n{stderr}");
                let mut result =
                    VerificationResult::from_output(self.config.kind, output, duration);
                if !status.success() && !result.status.is_definitive() {
                    result = result.with_diagnostic(format!("backend exited with {status}"));
                }
                Ok(result)
            }
            Ok(Err(e)) => Err(BackendError::Io(e)),
            Err(_) => {
                warn!(
                    "backend {} timed out after {:?}",
                    self.config.kind, self.config.timeout
                );
                running.abort().await;
                Ok(VerificationResult::timeout(self.config.kind, duration))
            }
        }
    }
}

/// A spawned backend with its pipes still attached.
struct RunningBackend {
    child: Child,
    pid: Option<u32>,
}

impl RunningBackend {
    async fn collect(&mut self) -> std::io::Result<(ExitStatus, String, String)> {
        let stdout_handle = self.child.stdout.take();
        let stderr_handle = self.child.stderr.take();
        let mut stdout = String::new();
        let mut stderr = String::new();

        let (status, stdout, stderr) = tokio::join!(
            self.child.wait(),
            async {
                if let Some(mut handle) = stdout_handle {
                    let _ = handle.read_to_string(&mut stdout).await;
                }
                stdout
            },
            async {
                if let Some(mut handle) = stderr_handle {
                    let _ = handle.read_to_string(&mut stderr).await;
                }
                stderr
            }
        );

        Ok((status?, stdout, stderr))
    }

    /// Kill the whole process group, then reap the direct child.
    async fn abort(&mut self) {
        kill_group(self.pid);
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // The child leads its own process group; negative pid semantics via
        // killpg reach forked solver subprocesses too.
        unsafe {
            libc::killpg(pid as i32, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}
