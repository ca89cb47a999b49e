use crate::metrics::MetricValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Scheduler resource request attached to a job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Wall-clock limit in scheduler format (HH:MM:SS).
    pub time_limit: String,
    /// Memory request in scheduler format (e.g. "4G", "512M").
    pub memory: String,
    pub cpus: u32,
    pub nodes: u32,
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            time_limit: "01:00:00".to_string(),
            memory: "4G".to_string(),
            cpus: 1,
            nodes: 1,
        }
    }
}

/// One unit of schedulable work. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    /// Shell body executed by the scheduler after the directive header.
    pub script: String,
    #[serde(default)]
    pub resources: ResourceRequest,
    /// Names of previously submitted specs that must complete first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Ordered environment overlay rendered as `export K=V` lines ahead of
    /// the script body. Later entries override earlier ones at runtime.
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
            resources: ResourceRequest::default(),
            dependencies: Vec::new(),
            env: Vec::new(),
        }
    }
}

/// Tracking handle returned by submission. The job id is the scheduler's
/// opaque identifier; the handle itself is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub spec_name: String,
    pub submitted_at: DateTime<Utc>,
}

impl JobHandle {
    /// Handle for a job id obtained out of band (operator CLI). The job
    /// name is unknown in that case.
    pub fn for_job_id(job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        Self {
            spec_name: job_id.clone(),
            job_id,
            submitted_at: Utc::now(),
        }
    }
}

/// Job lifecycle state. Transitions are monotonic over
/// Pending -> Running -> terminal; Cancelled is reachable from any
/// non-terminal state via an explicit cancel. Unknown means "no data right
/// now, retry later" and is never terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
            JobState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Point-in-time status report for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
}

impl JobStatus {
    pub fn from_state(state: JobState) -> Self {
        Self {
            state,
            start_time: None,
            end_time: None,
            exit_code: None,
        }
    }
}

/// Collected outcome of a finished job. Created once, immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultBundle {
    pub job_id: String,
    pub exit_code: Option<i32>,
    pub runtime_seconds: Option<f64>,
    /// Local paths of downloaded output artifacts.
    pub artifacts: Vec<PathBuf>,
    /// Metrics scraped from job stdout (`name: value` convention).
    pub metrics: HashMap<String, MetricValue>,
}

/// Memory summary in megabytes as reported by the target host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total_mb: u64,
    pub used_mb: u64,
    pub free_mb: u64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuLoad {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Filesystem usage in kilobytes for the watched path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub total_kb: u64,
    pub used_kb: u64,
    pub available_kb: u64,
    pub usage_percent: f64,
}

/// One resource sample. Every field is individually optional: a failed
/// sub-query leaves its field empty instead of discarding the sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub memory: Option<MemoryUsage>,
    pub cpu_load: Option<CpuLoad>,
    pub disk: Option<DiskUsage>,
    pub process_count: Option<u64>,
}

impl ResourceSnapshot {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            memory: None,
            cpu_load: None,
            disk: None,
            process_count: None,
        }
    }
}

/// Outcome classification for one progress analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStatus {
    Running,
    PotentiallyStalled,
    NoOutputDirectory,
    NoLogFile,
    AnalysisError,
}

/// Most recent match for one named progress indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorReading {
    pub matched_text: String,
    /// First capture group parsed as a number, when the pattern has one.
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Inferred state of one experiment session, derived from log inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub session: String,
    pub status: ProgressStatus,
    pub indicators: HashMap<String, IndicatorReading>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Last modification of the log artifact.
    pub last_activity: Option<DateTime<Utc>>,
    pub stall_minutes: Option<u64>,
}

impl ProgressSnapshot {
    pub fn with_status(session: impl Into<String>, status: ProgressStatus) -> Self {
        Self {
            session: session.into(),
            status,
            indicators: HashMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            last_activity: None,
            stall_minutes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A detected deviation between observed state and configured thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Type tag, e.g. "memory_usage", "experiment_stalled".
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    /// Related entity: hostname for resource anomalies, session id for
    /// experiment anomalies.
    pub subject: String,
    pub timestamp: DateTime<Utc>,
}

/// Thresholds for anomaly detection. All comparisons are strict
/// greater-than: a value exactly at the threshold does not trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    pub memory_percent: f64,
    pub cpu_load: f64,
    pub disk_percent: f64,
    pub process_count: u64,
    /// How many of the most recent errors an `experiment_errors` anomaly
    /// carries.
    pub max_reported_errors: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            memory_percent: 90.0,
            cpu_load: 16.0,
            disk_percent: 90.0,
            process_count: 2000,
            max_reported_errors: 5,
        }
    }
}

/// Bound on a numeric metric declared in test expectations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricBound {
    Equals(f64),
    AtMost(f64),
    AtLeast(f64),
}

impl MetricBound {
    pub fn check(&self, value: f64) -> bool {
        match self {
            MetricBound::Equals(expected) => (value - expected).abs() < f64::EPSILON,
            MetricBound::AtMost(limit) => value <= *limit,
            MetricBound::AtLeast(limit) => value >= *limit,
        }
    }
}

/// Declared expectations for one test case. A test with no expectations
/// passes iff its exit code is zero; a test with any declared expectation
/// passes iff every individual check passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Expectations {
    pub exit_code: Option<i32>,
    pub max_runtime_seconds: Option<f64>,
    #[serde(default)]
    pub metrics: HashMap<String, MetricBound>,
}

impl Expectations {
    pub fn is_empty(&self) -> bool {
        self.exit_code.is_none() && self.max_runtime_seconds.is_none() && self.metrics.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    /// Free-form category used for per-type statistics (e.g. "smoke",
    /// "regression").
    #[serde(rename = "type")]
    pub kind: String,
    /// Shell body of the test.
    pub script: String,
    #[serde(default = "default_test_timeout")]
    pub timeout_minutes: u64,
    #[serde(default = "default_test_memory")]
    pub memory: String,
    #[serde(default)]
    pub expect: Option<Expectations>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_test_timeout() -> u64 {
    60
}

fn default_test_memory() -> String {
    "4G".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    pub name: String,
    pub tests: Vec<TestCase>,
}

/// Per-test outcome after execution and validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub kind: String,
    pub state: JobState,
    pub exit_code: Option<i32>,
    pub runtime_seconds: Option<f64>,
    pub passed: bool,
    /// Human-readable description of each failed check. Empty when passed.
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStats {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub total_tests: u32,
    pub passed: u32,
    pub failed: u32,
    pub total_runtime_seconds: f64,
    pub by_type: HashMap<String, TypeStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub run_id: Uuid,
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<TestOutcome>,
    pub summary: SuiteSummary,
}
