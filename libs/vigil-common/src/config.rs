// Cluster configuration for vigil components
use crate::types::Thresholds;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Connection settings for the remote cluster head node. Authentication is
/// external: the ssh agent / key setup must already allow batch-mode logins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    pub host: String,
    pub user: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

impl SshSettings {
    /// `user@host` as passed to ssh/scp.
    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Settings for the periodic monitoring loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Session identifiers whose progress the agent analyzes each cycle.
    #[serde(default)]
    pub sessions: Vec<String>,
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold_minutes: u64,
    /// How many trailing log lines each analysis pass inspects.
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: u64,
    #[serde(default)]
    pub thresholds: Thresholds,
}

fn default_interval() -> u64 {
    300
}

fn default_stall_threshold() -> u64 {
    60
}

fn default_log_tail_lines() -> u64 {
    200
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            sessions: Vec::new(),
            stall_threshold_minutes: default_stall_threshold(),
            log_tail_lines: default_log_tail_lines(),
            thresholds: Thresholds::default(),
        }
    }
}

/// One explicit, immutable configuration value threaded into every
/// component constructor. Nothing below this layer reads process-wide
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub ssh: SshSettings,
    /// Remote directory where submission scripts land and jobs run.
    pub remote_workdir: String,
    /// Remote base directory containing per-session experiment output.
    pub experiment_dir: String,
    /// Remote path whose filesystem usage the monitor watches. Defaults to
    /// the experiment directory.
    #[serde(default)]
    pub disk_path: Option<String>,
    /// Local directory receiving collected job artifacts.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Local directory receiving agent monitoring reports.
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default)]
    pub monitor: MonitorSettings,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_command_timeout() -> u64 {
    60
}

impl ClusterConfig {
    /// Load configuration from a JSON file.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("cluster config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .context("Failed to read cluster config")?;

        serde_json::from_str(&content).context("Failed to parse cluster config")
    }

    /// Load with default path (config/cluster.json).
    pub fn load_default() -> Result<Self> {
        Self::load(Path::new("config/cluster.json"))
    }

    pub fn disk_path(&self) -> &str {
        self.disk_path.as_deref().unwrap_or(&self.experiment_dir)
    }
}
