//! Remote command execution over a pre-authenticated ssh channel.
//!
//! **Critical architectural boundary:**
//! - This layer knows HOW to reach the cluster (ssh/scp subprocesses)
//! - It does NOT know scheduler semantics
//! - Everything above composes plain command strings and delegates here
//!
//! The [`RemoteExecutor`] trait exists so the orchestration and monitoring
//! code can be exercised against a scripted double instead of a live
//! cluster.

use crate::error::{ClusterError, ClusterResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, trace};
use vigil_common::config::ClusterConfig;

/// Structured outcome of one remote command. A non-zero exit code is not an
/// error at this layer: `success` is false and the caller decides.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// None when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub elapsed_ms: u64,
}

impl ExecutionResult {
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// One command on one remote host with a timeout, plus file transfer.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(
        &self,
        command: &str,
        timeout: Duration,
        working_dir: Option<&str>,
    ) -> ClusterResult<ExecutionResult>;

    async fn push(&self, local: &Path, remote: &str) -> ClusterResult<()>;

    async fn pull(&self, remote: &str, local: &Path) -> ClusterResult<()>;
}

/// Production executor shelling out to ssh/scp in batch mode.
///
/// Commands are serialized per instance: one in-flight command per target
/// host at a time.
pub struct SshExecutor {
    target: String,
    port: u16,
    connect_timeout_secs: u64,
    lock: Mutex<()>,
}

impl SshExecutor {
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            target: config.ssh.target(),
            port: config.ssh.port,
            connect_timeout_secs: config.ssh.connect_timeout_secs,
            lock: Mutex::new(()),
        }
    }

    fn ssh_command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs))
            .arg("-p")
            .arg(self.port.to_string())
            .arg(&self.target)
            .arg(remote_command);
        cmd
    }

    fn scp_command(&self, from: &str, to: &str) -> Command {
        let mut cmd = Command::new("scp");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs))
            .arg("-P")
            .arg(self.port.to_string())
            .arg(from)
            .arg(to);
        cmd
    }

    /// Run a local ssh/scp process with a hard timeout. On timeout the
    /// local child is killed (`kill_on_drop`), but nothing reaches over to
    /// the remote side: the remote process may keep running.
    async fn run(&self, mut cmd: Command, timeout: Duration) -> ClusterResult<ExecutionResult> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let child = cmd
            .spawn()
            .map_err(|e| ClusterError::Connection(format!("spawn: {e}")))?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ClusterError::CommandTimeout {
                    seconds: timeout.as_secs(),
                });
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code();

        // ssh reserves exit code 255 for its own failures (unreachable
        // host, refused key, ...). The remote command never produces it.
        if exit_code == Some(255) {
            return Err(ClusterError::Connection(stderr.trim().to_string()));
        }

        Ok(ExecutionResult {
            success: output.status.success(),
            stdout,
            stderr,
            exit_code,
            elapsed_ms,
        })
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(
        &self,
        command: &str,
        timeout: Duration,
        working_dir: Option<&str>,
    ) -> ClusterResult<ExecutionResult> {
        let _guard = self.lock.lock().await;

        let remote_command = match working_dir {
            Some(dir) => format!("cd {dir} && {command}"),
            None => command.to_string(),
        };

        trace!(target = %self.target, command = %remote_command, "remote exec");
        let result = self.run(self.ssh_command(&remote_command), timeout).await?;
        debug!(
            target = %self.target,
            exit_code = ?result.exit_code,
            elapsed_ms = result.elapsed_ms,
            "remote exec finished"
        );
        Ok(result)
    }

    async fn push(&self, local: &Path, remote: &str) -> ClusterResult<()> {
        let _guard = self.lock.lock().await;

        let from = local.to_string_lossy().into_owned();
        let to = format!("{}:{}", self.target, remote);
        trace!(%from, %to, "scp push");

        let timeout = Duration::from_secs(self.connect_timeout_secs + 60);
        let result = self.run(self.scp_command(&from, &to), timeout).await?;
        if !result.success {
            return Err(ClusterError::Io(format!(
                "scp push failed: {}",
                result.stderr.trim()
            )));
        }
        Ok(())
    }

    async fn pull(&self, remote: &str, local: &Path) -> ClusterResult<()> {
        let _guard = self.lock.lock().await;

        let from = format!("{}:{}", self.target, remote);
        let to = local.to_string_lossy().into_owned();
        trace!(%from, %to, "scp pull");

        let timeout = Duration::from_secs(self.connect_timeout_secs + 60);
        let result = self.run(self.scp_command(&from, &to), timeout).await?;
        if !result.success {
            return Err(ClusterError::Io(format!(
                "scp pull failed: {}",
                result.stderr.trim()
            )));
        }
        Ok(())
    }
}
