//! Test suite execution on the cluster.
//!
//! **Flow:**
//! 1. Each test case becomes a job whose script is wrapped so it reports
//!    `exit_code` and `runtime_seconds` as scrapeable metrics
//! 2. Cases run in parallel, or chained through scheduler dependencies in
//!    sequential mode
//! 3. After all jobs settle, results are collected, validated against the
//!    declared expectations, and summarized per test type
//!
//! A case whose submission fails is recorded as a failed outcome; the rest
//! of the suite still runs. In sequential mode the chain continues from the
//! last case that actually made it into the queue.

use crate::error::{ClusterError, ClusterResult};
use crate::jobs::JobManager;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
use vigil_common::metrics::MetricValue;
use vigil_common::types::{
    Expectations, JobHandle, JobSpec, JobState, ResourceRequest, SuiteResult, SuiteSummary,
    TestCase, TestOutcome, TestSuite, TypeStats,
};

pub struct TestSuiteRunner {
    jobs: Arc<JobManager>,
    results_dir: PathBuf,
    poll_interval: Duration,
}

impl TestSuiteRunner {
    pub fn new(jobs: Arc<JobManager>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            jobs,
            results_dir: results_dir.into(),
            poll_interval: Duration::from_secs(15),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Load a suite definition from a local JSON file.
    pub async fn load_suite(path: &Path) -> ClusterResult<TestSuite> {
        let raw = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&raw)
            .map_err(|e| ClusterError::Parse(format!("suite {}: {e}", path.display())))
    }

    /// Run every case of the suite and return the aggregated result. Never
    /// fails as a whole: per-case problems become failed outcomes.
    pub async fn run(&self, suite: &TestSuite, parallel: bool) -> SuiteResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            suite = %suite.name,
            run_id = %run_id,
            tests = suite.tests.len(),
            parallel,
            "test suite started"
        );

        let mut outcomes: Vec<Option<TestOutcome>> = vec![None; suite.tests.len()];
        let mut handles: Vec<(usize, JobHandle)> = Vec::new();
        let mut previous: Option<String> = None;

        for (idx, case) in suite.tests.iter().enumerate() {
            let chain_after = if parallel { None } else { previous.as_deref() };
            let spec = case_spec(case, chain_after);
            match self.jobs.submit(&spec).await {
                Ok(handle) => {
                    previous = Some(case.name.clone());
                    handles.push((idx, handle));
                }
                Err(e) => {
                    warn!(test = %case.name, error = %e, "test submission failed");
                    outcomes[idx] = Some(failed_outcome(
                        case,
                        JobState::Failed,
                        format!("submission failed: {e}"),
                    ));
                }
            }
        }

        let submitted: Vec<JobHandle> = handles.iter().map(|(_, h)| h.clone()).collect();
        let budget_secs: u64 = suite.tests.iter().map(|c| c.timeout_minutes * 60).sum();
        let statuses = self
            .jobs
            .monitor(
                &submitted,
                self.poll_interval,
                Duration::from_secs(budget_secs.max(60)),
            )
            .await;

        for (idx, handle) in handles {
            let case = &suite.tests[idx];
            let state = statuses
                .get(&handle.job_id)
                .map(|s| s.state)
                .unwrap_or(JobState::Unknown);

            let outcome = match self.jobs.collect_results(&handle).await {
                Ok(bundle) => {
                    let failures = validate(
                        case.expect.as_ref(),
                        bundle.exit_code,
                        bundle.runtime_seconds,
                        &bundle.metrics,
                    );
                    TestOutcome {
                        name: case.name.clone(),
                        kind: case.kind.clone(),
                        state,
                        exit_code: bundle.exit_code,
                        runtime_seconds: bundle.runtime_seconds,
                        passed: failures.is_empty(),
                        failures,
                    }
                }
                Err(e) => {
                    warn!(test = %case.name, job_id = %handle.job_id, error = %e, "result collection failed");
                    failed_outcome(case, state, format!("result collection failed: {e}"))
                }
            };
            self.jobs.forget(&handle).await;
            outcomes[idx] = Some(outcome);
        }

        let outcomes: Vec<TestOutcome> = outcomes.into_iter().flatten().collect();
        let summary = summarize(&outcomes);
        info!(
            suite = %suite.name,
            run_id = %run_id,
            passed = summary.passed,
            failed = summary.failed,
            "test suite finished"
        );

        SuiteResult {
            run_id,
            suite: suite.name.clone(),
            started_at,
            outcomes,
            summary,
        }
    }

    /// Persist a suite result as pretty-printed JSON under the results
    /// directory.
    pub async fn save(&self, result: &SuiteResult) -> ClusterResult<PathBuf> {
        tokio::fs::create_dir_all(&self.results_dir).await?;
        let path = self
            .results_dir
            .join(format!("suite-{}-{}.json", result.suite, result.run_id));
        let json = serde_json::to_string_pretty(result)
            .map_err(|e| ClusterError::Parse(e.to_string()))?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}

/// Turn a test case into a job spec. `chain_after` adds a sequential-mode
/// dependency on the previously submitted case.
fn case_spec(case: &TestCase, chain_after: Option<&str>) -> JobSpec {
    let mut dependencies = case.dependencies.clone();
    if let Some(prev) = chain_after {
        if !dependencies.iter().any(|d| d == prev) {
            dependencies.push(prev.to_string());
        }
    }
    JobSpec {
        name: case.name.clone(),
        script: instrument(&case.script),
        resources: ResourceRequest {
            time_limit: minutes_to_limit(case.timeout_minutes),
            memory: case.memory.clone(),
            ..ResourceRequest::default()
        },
        dependencies,
        env: Vec::new(),
    }
}

/// Wrap a test body so its exit code and wall-clock runtime land in the
/// output following the metric convention, whatever the body itself prints.
fn instrument(body: &str) -> String {
    format!(
        "start_ts=$(date +%s)\n\
         {}\n\
         rc=$?\n\
         end_ts=$(date +%s)\n\
         echo \"exit_code: $rc\"\n\
         echo \"runtime_seconds: $((end_ts - start_ts))\"\n\
         exit $rc\n",
        body.trim_end()
    )
}

fn minutes_to_limit(minutes: u64) -> String {
    format!("{:02}:{:02}:00", minutes / 60, minutes % 60)
}

/// Check an outcome against declared expectations. With no expectations a
/// zero exit code is the sole criterion; otherwise every declared check
/// must pass. Returns one message per failed check.
fn validate(
    expect: Option<&Expectations>,
    exit_code: Option<i32>,
    runtime_seconds: Option<f64>,
    metrics: &HashMap<String, MetricValue>,
) -> Vec<String> {
    let mut failures = Vec::new();

    let expect = match expect {
        Some(e) if !e.is_empty() => e,
        _ => {
            if exit_code != Some(0) {
                failures.push(format!("exit code {exit_code:?}, expected 0"));
            }
            return failures;
        }
    };

    if let Some(expected) = expect.exit_code {
        if exit_code != Some(expected) {
            failures.push(format!("exit code {exit_code:?}, expected {expected}"));
        }
    }

    if let Some(limit) = expect.max_runtime_seconds {
        match runtime_seconds {
            Some(runtime) if runtime <= limit => {}
            Some(runtime) => {
                failures.push(format!("runtime {runtime}s exceeds limit {limit}s"));
            }
            None => failures.push(format!("runtime unknown, limit {limit}s declared")),
        }
    }

    for (name, bound) in &expect.metrics {
        match metrics.get(name).and_then(|v| v.as_number()) {
            Some(value) if bound.check(value) => {}
            Some(value) => {
                failures.push(format!("metric '{name}' = {value} violates {bound:?}"));
            }
            None => failures.push(format!("metric '{name}' missing or non-numeric")),
        }
    }

    failures
}

fn failed_outcome(case: &TestCase, state: JobState, reason: String) -> TestOutcome {
    TestOutcome {
        name: case.name.clone(),
        kind: case.kind.clone(),
        state,
        exit_code: None,
        runtime_seconds: None,
        passed: false,
        failures: vec![reason],
    }
}

fn summarize(outcomes: &[TestOutcome]) -> SuiteSummary {
    let mut summary = SuiteSummary::default();
    for outcome in outcomes {
        summary.total_tests += 1;
        let stats = summary.by_type.entry(outcome.kind.clone()).or_insert(TypeStats::default());
        stats.total += 1;
        if outcome.passed {
            summary.passed += 1;
            stats.passed += 1;
        } else {
            summary.failed += 1;
            stats.failed += 1;
        }
        summary.total_runtime_seconds += outcome.runtime_seconds.unwrap_or(0.0);
    }
    summary
}
