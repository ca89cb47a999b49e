//! Host resource sampling over the remote channel.
//!
//! Four fixed queries per sample: memory summary, load average, filesystem
//! usage for the watched path, process count. A failed sub-query leaves its
//! field empty instead of discarding the sample — a monitoring loop must
//! keep reporting whatever it can still see.

use crate::remote::RemoteExecutor;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use vigil_common::config::ClusterConfig;
use vigil_common::types::{CpuLoad, DiskUsage, MemoryUsage, ResourceSnapshot};

pub struct ResourceMonitor {
    executor: Arc<dyn RemoteExecutor>,
    disk_path: String,
    host: String,
    command_timeout: Duration,
}

impl ResourceMonitor {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: &ClusterConfig) -> Self {
        Self {
            executor,
            disk_path: config.disk_path().to_string(),
            host: config.ssh.host.clone(),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Take one sample. Never fails: each sub-query degrades independently.
    pub async fn sample(&self) -> ResourceSnapshot {
        let mut snapshot = ResourceSnapshot::empty(Utc::now());

        snapshot.memory = self
            .query("free -m", parse_free)
            .await;
        snapshot.cpu_load = self
            .query("cat /proc/loadavg", parse_loadavg)
            .await;
        snapshot.disk = self
            .query(&format!("df -Pk {}", self.disk_path), parse_df)
            .await;
        snapshot.process_count = self
            .query("ps -e --no-headers | wc -l", parse_process_count)
            .await;

        snapshot
    }

    async fn query<T>(&self, command: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
        match self
            .executor
            .execute(command, self.command_timeout, None)
            .await
        {
            Ok(result) if result.success => {
                let parsed = parse(&result.stdout);
                if parsed.is_none() {
                    warn!(host = %self.host, %command, "unparseable resource query output");
                }
                parsed
            }
            Ok(result) => {
                warn!(
                    host = %self.host,
                    %command,
                    exit_code = ?result.exit_code,
                    "resource query failed"
                );
                None
            }
            Err(e) => {
                warn!(host = %self.host, %command, error = %e, "resource query error");
                None
            }
        }
    }
}

/// Parse `free -m` output. The "Mem:" row carries total/used/free in MB.
fn parse_free(output: &str) -> Option<MemoryUsage> {
    let row = output.lines().find(|l| l.starts_with("Mem:"))?;
    let fields: Vec<&str> = row.split_whitespace().collect();
    let total_mb: u64 = fields.get(1)?.parse().ok()?;
    let used_mb: u64 = fields.get(2)?.parse().ok()?;
    let free_mb: u64 = fields.get(3)?.parse().ok()?;
    if total_mb == 0 {
        return None;
    }
    Some(MemoryUsage {
        total_mb,
        used_mb,
        free_mb,
        usage_percent: used_mb as f64 / total_mb as f64 * 100.0,
    })
}

/// Parse /proc/loadavg: three load figures lead the line.
fn parse_loadavg(output: &str) -> Option<CpuLoad> {
    let mut fields = output.split_whitespace();
    Some(CpuLoad {
        one: fields.next()?.parse().ok()?,
        five: fields.next()?.parse().ok()?,
        fifteen: fields.next()?.parse().ok()?,
    })
}

/// Parse `df -Pk` POSIX output: the data row carries 1024-blocks, used,
/// available, capacity.
fn parse_df(output: &str) -> Option<DiskUsage> {
    let row = output.lines().nth(1)?;
    let fields: Vec<&str> = row.split_whitespace().collect();
    let total_kb: u64 = fields.get(1)?.parse().ok()?;
    let used_kb: u64 = fields.get(2)?.parse().ok()?;
    let available_kb: u64 = fields.get(3)?.parse().ok()?;
    let usage_percent = fields.get(4)?.trim_end_matches('%').parse().ok()?;
    Some(DiskUsage {
        total_kb,
        used_kb,
        available_kb,
        usage_percent,
    })
}

fn parse_process_count(output: &str) -> Option<u64> {
    output.trim().parse().ok()
}
