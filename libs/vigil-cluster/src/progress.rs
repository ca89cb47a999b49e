//! Experiment progress inference from session logs.
//!
//! Progress is scraped from unstructured log text through a table of named
//! regex matchers. The table is pluggable: adding an indicator means adding
//! a [`ProgressPattern`], not touching the analysis loop. This is explicitly
//! not a stable contract — a job that wants its progress tracked must emit
//! phrases the table recognizes.

use crate::error::ClusterResult;
use crate::remote::{ExecutionResult, RemoteExecutor};
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use vigil_common::config::ClusterConfig;
use vigil_common::types::{IndicatorReading, ProgressSnapshot, ProgressStatus};

/// One named progress indicator matcher. The first capture group, when
/// present and numeric, becomes the indicator value.
pub struct ProgressPattern {
    pub name: String,
    regex: Regex,
}

impl ProgressPattern {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            regex: Regex::new(pattern)?,
        })
    }

    fn read(&self, line: &str, timestamp: DateTime<Utc>) -> Option<IndicatorReading> {
        let captures = self.regex.captures(line)?;
        let matched_text = captures.get(0).map(|m| m.as_str().to_string())?;
        let value = captures.get(1).and_then(|m| m.as_str().parse().ok());
        Some(IndicatorReading {
            matched_text,
            value,
            timestamp,
        })
    }
}

/// Indicator table for the experiment logs this system grew up with.
pub fn default_patterns() -> Vec<ProgressPattern> {
    [
        (
            "construction_progress",
            r"(?i)construction\s+(?:progress|phase)[:\s]+([0-9]+(?:\.[0-9]+)?)\s*%?",
        ),
        (
            "convergence",
            r"(?i)converg(?:ence|ed)[:\s]+([0-9]*\.?[0-9]+(?:[eE][+-]?[0-9]+)?)",
        ),
        (
            "error_rate",
            r"(?i)error\s+rate[:\s]+([0-9]*\.?[0-9]+(?:[eE][+-]?[0-9]+)?)",
        ),
        ("iteration", r"(?i)iteration[:\s]+([0-9]+)"),
    ]
    .into_iter()
    .map(|(name, pattern)| ProgressPattern::new(name, pattern).expect("pattern is valid"))
    .collect()
}

pub struct ExperimentProgressAnalyzer {
    executor: Arc<dyn RemoteExecutor>,
    experiment_dir: String,
    patterns: Vec<ProgressPattern>,
    stall_threshold_minutes: u64,
    tail_lines: u64,
    command_timeout: Duration,
}

impl ExperimentProgressAnalyzer {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: &ClusterConfig) -> Self {
        Self {
            executor,
            experiment_dir: config.experiment_dir.clone(),
            patterns: default_patterns(),
            stall_threshold_minutes: config.monitor.stall_threshold_minutes,
            tail_lines: config.monitor.log_tail_lines,
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    /// Replace the indicator table.
    pub fn with_patterns(mut self, patterns: Vec<ProgressPattern>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Analyze one session. Never fails: missing directories, missing logs
    /// and remote hiccups all map to named statuses so a monitoring loop
    /// survives transient trouble.
    pub async fn analyze(&self, session: &str) -> ProgressSnapshot {
        let dir = match self.find_session_dir(session).await {
            Ok(Some(dir)) => dir,
            Ok(None) => {
                return ProgressSnapshot::with_status(session, ProgressStatus::NoOutputDirectory)
            }
            Err(e) => {
                warn!(session, error = %e, "session directory lookup failed");
                return ProgressSnapshot::with_status(session, ProgressStatus::AnalysisError);
            }
        };

        let log = match self.find_log(&dir).await {
            Ok(Some(log)) => log,
            Ok(None) => return ProgressSnapshot::with_status(session, ProgressStatus::NoLogFile),
            Err(e) => {
                warn!(session, error = %e, "log lookup failed");
                return ProgressSnapshot::with_status(session, ProgressStatus::AnalysisError);
            }
        };

        let mut snapshot = ProgressSnapshot::with_status(session, ProgressStatus::Running);
        snapshot.last_activity = self.log_mtime(&log).await;

        let tail = match self
            .run(&format!("tail -n {} {}", self.tail_lines, log))
            .await
        {
            Ok(result) if result.success => result.stdout,
            Ok(result) => {
                warn!(session, exit_code = ?result.exit_code, "log tail failed");
                snapshot.status = ProgressStatus::AnalysisError;
                return snapshot;
            }
            Err(e) => {
                warn!(session, error = %e, "log tail failed");
                snapshot.status = ProgressStatus::AnalysisError;
                return snapshot;
            }
        };

        let now = Utc::now();
        for line in tail.lines() {
            for pattern in &self.patterns {
                if let Some(reading) = pattern.read(line, now) {
                    // Later lines are more recent; last match wins.
                    snapshot.indicators.insert(pattern.name.clone(), reading);
                }
            }
            let lowered = line.to_lowercase();
            if lowered.contains("error") {
                snapshot.errors.push(line.trim().to_string());
            }
            if lowered.contains("warning") {
                snapshot.warnings.push(line.trim().to_string());
            }
        }

        if let Some(last_activity) = snapshot.last_activity {
            let idle_minutes = (now - last_activity).num_minutes().max(0) as u64;
            if idle_minutes > self.stall_threshold_minutes {
                snapshot.status = ProgressStatus::PotentiallyStalled;
                snapshot.stall_minutes = Some(idle_minutes);
            }
        }

        snapshot
    }

    /// Newest directory matching the session identifier, or None.
    async fn find_session_dir(&self, session: &str) -> ClusterResult<Option<String>> {
        let result = self
            .run(&format!(
                "ls -dt {}/*{}* 2>/dev/null | head -n 1",
                self.experiment_dir, session
            ))
            .await?;
        Ok(non_empty_line(&result))
    }

    /// Newest log artifact inside the session directory, or None.
    async fn find_log(&self, dir: &str) -> ClusterResult<Option<String>> {
        let result = self
            .run(&format!("ls -t {dir}/*.log 2>/dev/null | head -n 1"))
            .await?;
        Ok(non_empty_line(&result))
    }

    async fn log_mtime(&self, log: &str) -> Option<DateTime<Utc>> {
        match self.run(&format!("stat -c %Y {log}")).await {
            Ok(result) if result.success => result
                .stdout_trimmed()
                .parse::<i64>()
                .ok()
                .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single()),
            Ok(_) | Err(_) => {
                warn!(log, "could not read log mtime");
                None
            }
        }
    }

    async fn run(&self, command: &str) -> ClusterResult<ExecutionResult> {
        self.executor
            .execute(command, self.command_timeout, None)
            .await
    }
}

fn non_empty_line(result: &ExecutionResult) -> Option<String> {
    if !result.success {
        return None;
    }
    let line = result.stdout_trimmed();
    if line.is_empty() {
        None
    } else {
        Some(line.lines().next().unwrap_or("").to_string())
    }
}
