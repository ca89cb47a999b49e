//! Job lifecycle management against the external batch scheduler.
//!
//! **Responsibilities:**
//! 1. Render a [`JobSpec`] into a submission script and hand it to `sbatch`
//! 2. Track status via a two-step probe: active queue first (`squeue`),
//!    historical accounting second (`sacct`)
//! 3. Poll handles to terminal states, logging only status changes
//! 4. Collect output artifacts and scrape `name: value` metrics
//! 5. Cancel via `scancel`
//!
//! The manager knows nothing about ssh mechanics: it composes scheduler
//! command strings and delegates to a [`RemoteExecutor`].

use crate::error::{ClusterError, ClusterResult};
use crate::remote::RemoteExecutor;
use crate::script;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vigil_common::config::ClusterConfig;
use vigil_common::metrics::parse_metrics;
use vigil_common::types::{JobHandle, JobSpec, JobState, JobStatus, ResultBundle};

/// Result of the two-step status query. Active-queue data has no exit code;
/// accounting data does. `NotFound` means neither view knows the job right
/// now, which callers must treat as "retry later".
#[derive(Debug, Clone, PartialEq)]
pub enum StatusProbe {
    Active(JobState),
    Historical {
        state: JobState,
        exit_code: Option<i32>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    },
    NotFound,
}

/// Ordering over the monotonic status axis Pending < Running < terminal.
fn rank(state: JobState) -> u8 {
    match state {
        JobState::Pending | JobState::Unknown => 0,
        JobState::Running => 1,
        JobState::Completed | JobState::Failed | JobState::Cancelled => 2,
    }
}

/// Map a scheduler state token to a job state. Tokens like
/// "CANCELLED by 1001" carry a suffix; only the first word counts.
fn map_scheduler_state(raw: &str) -> JobState {
    let token = raw.trim().split_whitespace().next().unwrap_or("");
    match token {
        "PENDING" | "CONFIGURING" | "REQUEUED" | "SUSPENDED" => JobState::Pending,
        "RUNNING" | "COMPLETING" => JobState::Running,
        "COMPLETED" => JobState::Completed,
        "FAILED" | "TIMEOUT" | "NODE_FAIL" | "OUT_OF_MEMORY" | "PREEMPTED" | "BOOT_FAIL"
        | "DEADLINE" => JobState::Failed,
        t if t.starts_with("CANCELLED") => JobState::Cancelled,
        _ => JobState::Unknown,
    }
}

fn parse_scheduler_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "Unknown" || raw == "None" {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Parse sacct's `code:signal` exit field.
fn parse_exit_code(raw: &str) -> Option<i32> {
    raw.trim().split(':').next()?.parse().ok()
}

/// Exit codes reported through the metric convention arrive as f64; only
/// whole values in i32 range are trusted.
fn exit_code_from_metric(n: f64) -> Option<i32> {
    if n.fract() == 0.0 && (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&n) {
        Some(n as i32)
    } else {
        None
    }
}

pub struct JobManager {
    executor: Arc<dyn RemoteExecutor>,
    config: ClusterConfig,
    command_timeout: Duration,
    submit_pattern: Regex,
    /// Last confirmed state per job id. Used to keep reported status
    /// monotonic and to pin Cancelled after an explicit cancel.
    tracked: Mutex<HashMap<String, JobState>>,
    /// Spec name -> scheduler id, for dependency resolution.
    submitted: Mutex<HashMap<String, String>>,
}

impl JobManager {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: ClusterConfig) -> Self {
        let command_timeout = Duration::from_secs(config.command_timeout_secs);
        Self {
            executor,
            config,
            command_timeout,
            submit_pattern: Regex::new(r"Submitted batch job (\d+)")
                .expect("submit pattern is valid"),
            tracked: Mutex::new(HashMap::new()),
            submitted: Mutex::new(HashMap::new()),
        }
    }

    /// Render, transfer and submit a job spec. Any failure along the way is
    /// a `Submission` error: an unidentified job cannot be tracked, so
    /// nothing here is recoverable.
    pub async fn submit(&self, spec: &JobSpec) -> ClusterResult<JobHandle> {
        let dependency_ids = self.resolve_dependencies(spec).await?;
        let rendered = script::render(spec, &dependency_ids);

        let local = std::env::temp_dir().join(format!(
            "vigil-{}-{}.sbatch",
            spec.name,
            std::process::id()
        ));
        tokio::fs::write(&local, &rendered)
            .await
            .map_err(|e| ClusterError::Submission(format!("write script: {e}")))?;

        let remote = format!("{}/{}.sbatch", self.config.remote_workdir, spec.name);
        let push_result = self.executor.push(&local, &remote).await;
        let _ = tokio::fs::remove_file(&local).await;
        push_result.map_err(|e| ClusterError::Submission(format!("transfer: {e}")))?;

        let result = self
            .executor
            .execute(
                &format!("sbatch {}.sbatch", spec.name),
                self.command_timeout,
                Some(&self.config.remote_workdir),
            )
            .await
            .map_err(|e| ClusterError::Submission(e.to_string()))?;

        if !result.success {
            return Err(ClusterError::Submission(format!(
                "sbatch exited {:?}: {}",
                result.exit_code,
                result.stderr.trim()
            )));
        }

        let job_id = self
            .submit_pattern
            .captures(&result.stdout)
            .map(|c| c[1].to_string())
            .ok_or_else(|| {
                ClusterError::Submission(format!(
                    "no job id in scheduler response: {}",
                    result.stdout.trim()
                ))
            })?;

        self.tracked
            .lock()
            .await
            .insert(job_id.clone(), JobState::Pending);
        self.submitted
            .lock()
            .await
            .insert(spec.name.clone(), job_id.clone());

        info!(job_id = %job_id, job = %spec.name, "job submitted");

        Ok(JobHandle {
            job_id,
            spec_name: spec.name.clone(),
            submitted_at: Utc::now(),
        })
    }

    async fn resolve_dependencies(&self, spec: &JobSpec) -> ClusterResult<Vec<String>> {
        let submitted = self.submitted.lock().await;
        spec.dependencies
            .iter()
            .map(|name| {
                submitted.get(name).cloned().ok_or_else(|| {
                    ClusterError::Submission(format!(
                        "dependency '{name}' of '{}' has not been submitted",
                        spec.name
                    ))
                })
            })
            .collect()
    }

    /// Two-step status probe: the active queue knows pending/running jobs,
    /// accounting knows finished ones.
    async fn probe(&self, job_id: &str) -> ClusterResult<StatusProbe> {
        let active = self
            .executor
            .execute(
                &format!("squeue -h -j {job_id} -o %T"),
                self.command_timeout,
                None,
            )
            .await
            .map_err(|e| ClusterError::Query(e.to_string()))?;

        // squeue exits non-zero for ids it no longer knows; both that and
        // an empty listing mean "not in the active queue", not an error.
        if active.success && !active.stdout_trimmed().is_empty() {
            let state = map_scheduler_state(active.stdout_trimmed());
            return Ok(StatusProbe::Active(state));
        }

        let history = self
            .executor
            .execute(
                &format!("sacct -n -P -X -j {job_id} -o State,ExitCode,Start,End"),
                self.command_timeout,
                None,
            )
            .await
            .map_err(|e| ClusterError::Query(e.to_string()))?;

        let Some(row) = history.stdout.lines().find(|l| !l.trim().is_empty()) else {
            return Ok(StatusProbe::NotFound);
        };

        let mut fields = row.trim().split('|');
        let state = map_scheduler_state(fields.next().unwrap_or(""));
        let exit_code = fields.next().and_then(parse_exit_code);
        let start_time = fields.next().and_then(parse_scheduler_time);
        let end_time = fields.next().and_then(parse_scheduler_time);

        Ok(StatusProbe::Historical {
            state,
            exit_code,
            start_time,
            end_time,
        })
    }

    /// Query the current status of one job. Returns `Unknown` (never a
    /// terminal state) when neither scheduler view has data. Reported
    /// states never regress along Pending -> Running -> terminal, even when
    /// the scheduler's views disagree between polls.
    pub async fn get_status(&self, handle: &JobHandle) -> ClusterResult<JobStatus> {
        let probe = self.probe(&handle.job_id).await?;

        let mut tracked = self.tracked.lock().await;
        let current = tracked.get(&handle.job_id).copied();

        let status = match probe {
            StatusProbe::NotFound => match current {
                Some(state) if state.is_terminal() => JobStatus::from_state(state),
                _ => JobStatus::from_state(JobState::Unknown),
            },
            StatusProbe::Active(observed) => {
                let state = reconcile(current, observed);
                JobStatus::from_state(state)
            }
            StatusProbe::Historical {
                state: observed,
                exit_code,
                start_time,
                end_time,
            } => {
                let state = reconcile(current, observed);
                if state == observed {
                    JobStatus {
                        state,
                        start_time,
                        end_time,
                        exit_code,
                    }
                } else {
                    JobStatus::from_state(state)
                }
            }
        };

        if status.state != JobState::Unknown {
            tracked.insert(handle.job_id.clone(), status.state);
        }
        Ok(status)
    }

    /// Block until every handle reaches a terminal state or `max_wait`
    /// elapses. Elapsing is a normal return: remaining handles keep their
    /// last observed status. Emits one log event per status change and
    /// stays quiet otherwise.
    pub async fn monitor(
        &self,
        handles: &[JobHandle],
        poll_interval: Duration,
        max_wait: Duration,
    ) -> HashMap<String, JobStatus> {
        let started = Instant::now();
        let mut statuses: HashMap<String, JobStatus> = handles
            .iter()
            .map(|h| (h.job_id.clone(), JobStatus::from_state(JobState::Pending)))
            .collect();

        loop {
            for handle in handles {
                let previous = statuses[&handle.job_id].state;
                if previous.is_terminal() {
                    continue;
                }
                match self.get_status(handle).await {
                    Ok(status) if status.state == JobState::Unknown => {
                        debug!(
                            job_id = %handle.job_id,
                            "no scheduler data; keeping last observed status"
                        );
                    }
                    Ok(status) => {
                        if status.state != previous {
                            info!(
                                job_id = %handle.job_id,
                                job = %handle.spec_name,
                                from = %previous,
                                to = %status.state,
                                "job status changed"
                            );
                        }
                        statuses.insert(handle.job_id.clone(), status);
                    }
                    Err(e) => {
                        warn!(
                            job_id = %handle.job_id,
                            error = %e,
                            "status query failed; keeping last observed status"
                        );
                    }
                }
            }

            if statuses.values().all(|s| s.state.is_terminal()) {
                debug!(jobs = handles.len(), "all jobs terminal");
                break;
            }
            if started.elapsed() >= max_wait {
                let pending = statuses
                    .values()
                    .filter(|s| !s.state.is_terminal())
                    .count();
                warn!(
                    waited_secs = started.elapsed().as_secs(),
                    still_pending = pending,
                    "monitor window elapsed before all jobs finished"
                );
                break;
            }
            tokio::time::sleep(poll_interval).await;
        }

        statuses
    }

    /// Download the job's output artifact and scrape metrics from it.
    /// Lines that do not follow the `name: value` convention are ignored.
    pub async fn collect_results(&self, handle: &JobHandle) -> ClusterResult<ResultBundle> {
        let artifact_name = format!("{}-{}.out", handle.spec_name, handle.job_id);
        let remote = format!("{}/{}", self.config.remote_workdir, artifact_name);

        let local_dir = self.config.results_dir.join(&handle.job_id);
        tokio::fs::create_dir_all(&local_dir).await?;
        let local = local_dir.join(&artifact_name);

        self.executor.pull(&remote, &local).await?;
        let stdout = tokio::fs::read_to_string(&local).await?;
        let metrics = parse_metrics(&stdout);

        let runtime_seconds = metrics.get("runtime_seconds").and_then(|v| v.as_number());

        // Accounting exit code preferred; the instrumentation metric is the
        // fallback when accounting lags behind.
        let status = self.get_status(handle).await.ok();
        let exit_code = status.and_then(|s| s.exit_code).or_else(|| {
            metrics
                .get("exit_code")
                .and_then(|v| v.as_number())
                .and_then(exit_code_from_metric)
        });

        info!(
            job_id = %handle.job_id,
            metrics = metrics.len(),
            artifact = %local.display(),
            "results collected"
        );

        Ok(ResultBundle {
            job_id: handle.job_id.clone(),
            exit_code,
            runtime_seconds,
            artifacts: vec![local],
            metrics,
        })
    }

    /// Cancel a job. On success the local state moves to Cancelled no
    /// matter what non-terminal state the job was in.
    pub async fn cancel(&self, handle: &JobHandle) -> ClusterResult<()> {
        let result = self
            .executor
            .execute(
                &format!("scancel {}", handle.job_id),
                self.command_timeout,
                None,
            )
            .await
            .map_err(|e| ClusterError::Query(e.to_string()))?;

        if !result.success {
            return Err(ClusterError::Query(format!(
                "scancel exited {:?}: {}",
                result.exit_code,
                result.stderr.trim()
            )));
        }

        self.tracked
            .lock()
            .await
            .insert(handle.job_id.clone(), JobState::Cancelled);
        info!(job_id = %handle.job_id, job = %handle.spec_name, "job cancelled");
        Ok(())
    }

    /// Drop local bookkeeping for a handle once its results are collected.
    pub async fn forget(&self, handle: &JobHandle) {
        self.tracked.lock().await.remove(&handle.job_id);
        self.submitted.lock().await.remove(&handle.spec_name);
    }
}

/// Keep reported state monotonic: an observation that would move backwards
/// along Pending -> Running -> terminal is discarded in favor of what we
/// already confirmed, and a confirmed terminal state admits no further
/// transition at all (scheduler views occasionally contradict each other
/// between polls).
fn reconcile(current: Option<JobState>, observed: JobState) -> JobState {
    match current {
        Some(current) if current.is_terminal() => current,
        Some(current) if rank(observed) < rank(current) => current,
        _ => observed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{failed, ok, MockExecutor};

    fn test_config() -> ClusterConfig {
        let results_dir = std::env::temp_dir().join(format!("vigil-test-{}", uuid::Uuid::new_v4()));
        let json = format!(
            r#"{{
                "ssh": {{ "host": "head.example", "user": "ops" }},
                "remote_workdir": "/scratch/ops/jobs",
                "experiment_dir": "/scratch/ops/experiments",
                "results_dir": {:?}
            }}"#,
            results_dir.to_string_lossy()
        );
        serde_json::from_str(&json).unwrap()
    }

    fn manager(executor: MockExecutor) -> JobManager {
        JobManager::new(Arc::new(executor), test_config())
    }

    fn spec(name: &str) -> JobSpec {
        JobSpec::new(name, "srun ./experiment")
    }

    #[test]
    fn test_map_scheduler_state() {
        assert_eq!(map_scheduler_state("PENDING"), JobState::Pending);
        assert_eq!(map_scheduler_state("RUNNING"), JobState::Running);
        assert_eq!(map_scheduler_state("COMPLETING"), JobState::Running);
        assert_eq!(map_scheduler_state("COMPLETED"), JobState::Completed);
        assert_eq!(map_scheduler_state("FAILED"), JobState::Failed);
        assert_eq!(map_scheduler_state("TIMEOUT"), JobState::Failed);
        assert_eq!(map_scheduler_state("OUT_OF_MEMORY"), JobState::Failed);
        assert_eq!(map_scheduler_state("CANCELLED"), JobState::Cancelled);
        assert_eq!(map_scheduler_state("CANCELLED by 1001"), JobState::Cancelled);
        assert_eq!(map_scheduler_state("SOMETHING_NEW"), JobState::Unknown);
        assert_eq!(map_scheduler_state(""), JobState::Unknown);
    }

    #[test]
    fn test_parse_exit_code() {
        assert_eq!(parse_exit_code("0:0"), Some(0));
        assert_eq!(parse_exit_code("1:0"), Some(1));
        assert_eq!(parse_exit_code("137:9"), Some(137));
        assert_eq!(parse_exit_code(""), None);
    }

    #[test]
    fn test_exit_code_from_metric() {
        assert_eq!(exit_code_from_metric(0.0), Some(0));
        assert_eq!(exit_code_from_metric(137.0), Some(137));
        assert_eq!(exit_code_from_metric(-1.0), Some(-1));
        // Fractional or out-of-range values are not exit codes.
        assert_eq!(exit_code_from_metric(1.5), None);
        assert_eq!(exit_code_from_metric(1e12), None);
        assert_eq!(exit_code_from_metric(f64::NAN), None);
    }

    #[tokio::test]
    async fn test_submit_then_status_is_non_terminal() {
        let jobs = manager(
            MockExecutor::new()
                .on("sbatch", ok("Submitted batch job 4242"))
                .on("squeue", ok("PENDING")),
        );

        let handle = jobs.submit(&spec("exp-a")).await.unwrap();
        assert_eq!(handle.job_id, "4242");

        let status = jobs.get_status(&handle).await.unwrap();
        assert!(!status.state.is_terminal());
        assert_eq!(status.state, JobState::Pending);
    }

    #[tokio::test]
    async fn test_submit_script_content_and_dependencies() {
        let executor = Arc::new(
            MockExecutor::new().on_sequence(
                "sbatch",
                vec![ok("Submitted batch job 100"), ok("Submitted batch job 101")],
            ),
        );
        let jobs = JobManager::new(executor.clone(), test_config());

        jobs.submit(&spec("first")).await.unwrap();
        let mut second = spec("second");
        second.dependencies = vec!["first".to_string()];
        jobs.submit(&second).await.unwrap();

        let pushed = executor.pushed_scripts();
        assert_eq!(pushed.len(), 2);
        assert!(pushed[0].0.contains("#SBATCH --job-name=first"));
        assert!(pushed[0].1.ends_with("/first.sbatch"));
        assert!(!pushed[0].0.contains("--dependency"));
        // Second job waits on the first one's scheduler id.
        assert!(pushed[1].0.contains("#SBATCH --dependency=afterok:100"));
    }

    #[tokio::test]
    async fn test_submit_unknown_dependency_fails() {
        let jobs = manager(MockExecutor::new().on("sbatch", ok("Submitted batch job 1")));
        let mut dependent = spec("needs-missing");
        dependent.dependencies = vec!["missing".to_string()];

        let err = jobs.submit(&dependent).await.unwrap_err();
        assert!(matches!(err, ClusterError::Submission(_)));
    }

    #[tokio::test]
    async fn test_submit_without_parseable_id_is_fatal() {
        let jobs = manager(MockExecutor::new().on("sbatch", ok("queue is on fire")));
        let err = jobs.submit(&spec("exp-a")).await.unwrap_err();
        assert!(matches!(err, ClusterError::Submission(_)));
    }

    #[tokio::test]
    async fn test_submit_sbatch_failure_is_fatal() {
        let jobs = manager(MockExecutor::new().on("sbatch", failed("invalid partition", 1)));
        let err = jobs.submit(&spec("exp-a")).await.unwrap_err();
        assert!(matches!(err, ClusterError::Submission(_)));
    }

    #[tokio::test]
    async fn test_status_falls_back_to_accounting() {
        let jobs = manager(
            MockExecutor::new()
                .on("squeue", ok(""))
                .on(
                    "sacct",
                    ok("COMPLETED|0:0|2026-08-01T10:00:00|2026-08-01T10:05:00"),
                ),
        );

        let status = jobs
            .get_status(&JobHandle::for_job_id("555"))
            .await
            .unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.exit_code, Some(0));
        assert!(status.start_time.is_some());
        assert!(status.end_time.is_some());
    }

    #[tokio::test]
    async fn test_status_unknown_when_both_views_empty() {
        let jobs = manager(
            MockExecutor::new()
                .on("squeue", ok(""))
                .on("sacct", ok("")),
        );

        let status = jobs
            .get_status(&JobHandle::for_job_id("555"))
            .await
            .unwrap();
        assert_eq!(status.state, JobState::Unknown);
        assert!(!status.state.is_terminal());
    }

    #[tokio::test]
    async fn test_status_never_regresses() {
        // Accounting confirms completion, then the active queue claims the
        // job is running again. The regression must not surface.
        let jobs = manager(
            MockExecutor::new()
                .on_sequence("squeue", vec![ok(""), ok("RUNNING")])
                .on("sacct", ok("COMPLETED|0:0||")),
        );
        let handle = JobHandle::for_job_id("900");

        let first = jobs.get_status(&handle).await.unwrap();
        assert_eq!(first.state, JobState::Completed);

        let second = jobs.get_status(&handle).await.unwrap();
        assert_eq!(second.state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_cancel_pins_cancelled_state() {
        let jobs = manager(
            MockExecutor::new()
                .on("squeue", ok("RUNNING"))
                .on("scancel", ok("")),
        );
        let handle = JobHandle::for_job_id("321");

        assert_eq!(
            jobs.get_status(&handle).await.unwrap().state,
            JobState::Running
        );
        jobs.cancel(&handle).await.unwrap();

        // squeue still reports RUNNING for a moment; Cancelled wins.
        let status = jobs.get_status(&handle).await.unwrap();
        assert_eq!(status.state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn test_terminal_state_does_not_flip() {
        // Accounting first reports COMPLETED, then a contradictory FAILED
        // row for the same job. The first confirmed terminal state sticks.
        let jobs = manager(
            MockExecutor::new()
                .on("squeue", ok(""))
                .on_sequence(
                    "sacct",
                    vec![ok("COMPLETED|0:0||"), ok("FAILED|1:0||")],
                ),
        );
        let handle = JobHandle::for_job_id("600");

        let first = jobs.get_status(&handle).await.unwrap();
        assert_eq!(first.state, JobState::Completed);

        let second = jobs.get_status(&handle).await.unwrap();
        assert_eq!(second.state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_cancel_pin_survives_accounting_rows() {
        // After an explicit cancel, accounting claims the job completed
        // normally. The pinned Cancelled state is not overwritten.
        let jobs = manager(
            MockExecutor::new()
                .on("scancel", ok(""))
                .on("squeue", ok(""))
                .on("sacct", ok("COMPLETED|0:0||")),
        );
        let handle = JobHandle::for_job_id("601");

        jobs.cancel(&handle).await.unwrap();
        let status = jobs.get_status(&handle).await.unwrap();
        assert_eq!(status.state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn test_monitor_returns_when_all_terminal() {
        let jobs = manager(
            MockExecutor::new()
                .on_sequence("squeue", vec![ok("PENDING"), ok("RUNNING"), ok("")])
                .on("sacct", ok("COMPLETED|0:0||")),
        );
        let handle = JobHandle::for_job_id("42");

        let statuses = jobs
            .monitor(
                std::slice::from_ref(&handle),
                Duration::from_millis(5),
                Duration::from_secs(10),
            )
            .await;

        assert_eq!(statuses["42"].state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_monitor_max_wait_is_a_normal_return() {
        let jobs = manager(MockExecutor::new().on("squeue", ok("RUNNING")));
        let handle = JobHandle::for_job_id("42");

        let statuses = jobs
            .monitor(
                std::slice::from_ref(&handle),
                Duration::from_millis(5),
                Duration::from_millis(20),
            )
            .await;

        // Timed out, not an error: last observed status is returned.
        assert_eq!(statuses["42"].state, JobState::Running);
    }

    #[tokio::test]
    async fn test_monitor_keeps_last_status_through_data_gaps() {
        // The scheduler briefly knows nothing about the job; the last
        // observed status survives instead of regressing to Unknown.
        let jobs = manager(
            MockExecutor::new()
                .on_sequence("squeue", vec![ok("RUNNING"), ok("")])
                .on("sacct", ok("")),
        );
        let handle = JobHandle::for_job_id("42");

        let statuses = jobs
            .monitor(
                std::slice::from_ref(&handle),
                Duration::from_millis(5),
                Duration::from_millis(30),
            )
            .await;

        assert_eq!(statuses["42"].state, JobState::Running);
    }

    #[tokio::test]
    async fn test_collect_results_scrapes_metrics() {
        let jobs = manager(
            MockExecutor::new()
                .on("squeue", ok(""))
                .on("sacct", ok("COMPLETED|0:0||"))
                .with_pull_content(
                    ".out",
                    "solver booting\nexit_code: 0\nruntime_seconds: 37\naccuracy: 0.93\nnot a metric line\n",
                ),
        );
        let handle = JobHandle {
            job_id: "42".to_string(),
            spec_name: "exp-a".to_string(),
            submitted_at: Utc::now(),
        };

        let bundle = jobs.collect_results(&handle).await.unwrap();
        assert_eq!(bundle.exit_code, Some(0));
        assert_eq!(bundle.runtime_seconds, Some(37.0));
        assert_eq!(bundle.metrics["accuracy"].as_number(), Some(0.93));
        assert_eq!(bundle.artifacts.len(), 1);
        // Unrecognized lines are ignored, not an error.
        assert!(!bundle.metrics.contains_key("not"));
    }

    #[tokio::test]
    async fn test_collect_results_missing_artifact_is_an_error() {
        let jobs = manager(MockExecutor::new());
        let handle = JobHandle::for_job_id("42");
        let err = jobs.collect_results(&handle).await.unwrap_err();
        assert!(matches!(err, ClusterError::Io(_)));
    }
}
