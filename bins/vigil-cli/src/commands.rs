// CLI commands for operating jobs and suites on the cluster
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use vigil_cluster::jobs::JobManager;
use vigil_cluster::remote::SshExecutor;
use vigil_cluster::suite::TestSuiteRunner;
use vigil_common::config::ClusterConfig;
use vigil_common::types::{JobHandle, JobSpec, ResourceRequest};

fn manager() -> Result<(ClusterConfig, Arc<JobManager>)> {
    let config = ClusterConfig::load_default()
        .context("Failed to load cluster config (config/cluster.json)")?;
    let executor = Arc::new(SshExecutor::new(&config));
    let jobs = Arc::new(JobManager::new(executor, config.clone()));
    Ok((config, jobs))
}

/// Submit a local job script
pub async fn submit(
    script_path: &str,
    name: Option<&str>,
    time: &str,
    mem: &str,
    cpus: u32,
    nodes: u32,
) -> Result<()> {
    let path = Path::new(script_path);
    let script = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job script {script_path}"))?;

    let name = match name {
        Some(name) => name.to_string(),
        None => path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| "job".to_string()),
    };

    println!("🚀 Submitting job: {}", name);

    let spec = JobSpec {
        name,
        script,
        resources: ResourceRequest {
            time_limit: time.to_string(),
            memory: mem.to_string(),
            cpus,
            nodes,
        },
        dependencies: vec![],
        env: vec![],
    };

    let (_, jobs) = manager()?;
    let handle = jobs.submit(&spec).await?;

    println!("✅ Job '{}' submitted with id {}", handle.spec_name, handle.job_id);
    println!("\n📋 Next steps:");
    println!("  1. Check status:     vigil status {}", handle.job_id);
    println!(
        "  2. Collect results:  vigil results {} --name {}",
        handle.job_id, handle.spec_name
    );
    Ok(())
}

/// Query the current status of one job
pub async fn status(job_id: &str) -> Result<()> {
    let (_, jobs) = manager()?;
    let status = jobs.get_status(&JobHandle::for_job_id(job_id)).await?;

    println!("Job {}: {}", job_id, status.state);
    if let Some(start) = status.start_time {
        println!("  started:  {}", start);
    }
    if let Some(end) = status.end_time {
        println!("  ended:    {}", end);
    }
    if let Some(code) = status.exit_code {
        println!("  exit code: {}", code);
    }
    Ok(())
}

pub async fn cancel(job_id: &str) -> Result<()> {
    let (_, jobs) = manager()?;
    jobs.cancel(&JobHandle::for_job_id(job_id)).await?;
    println!("✅ Job {} cancelled", job_id);
    Ok(())
}

/// Download a job's output artifact and show its scraped metrics
pub async fn results(job_id: &str, name: Option<&str>) -> Result<()> {
    let (_, jobs) = manager()?;
    let mut handle = JobHandle::for_job_id(job_id);
    if let Some(name) = name {
        // The output artifact is named after the job name, not the job id.
        handle.spec_name = name.to_string();
    }

    let bundle = jobs.collect_results(&handle).await?;

    println!("✅ Results for job {}", job_id);
    if let Some(code) = bundle.exit_code {
        println!("  exit code: {}", code);
    }
    if let Some(runtime) = bundle.runtime_seconds {
        println!("  runtime:   {}s", runtime);
    }
    for artifact in &bundle.artifacts {
        println!("  artifact:  {}", artifact.display());
    }
    if bundle.metrics.is_empty() {
        println!("  (no metrics reported)");
    } else {
        println!("  metrics:");
        let mut names: Vec<&String> = bundle.metrics.keys().collect();
        names.sort();
        for name in names {
            println!("    {}: {}", name, bundle.metrics[name]);
        }
    }
    Ok(())
}

/// Poll jobs until every one reaches a terminal state or the window closes
pub async fn monitor(job_ids: &[String], interval_secs: u64, max_wait_minutes: u64) -> Result<()> {
    if job_ids.is_empty() {
        bail!("No job ids given");
    }

    let (_, jobs) = manager()?;
    let handles: Vec<JobHandle> = job_ids.iter().map(JobHandle::for_job_id).collect();

    println!(
        "👀 Monitoring {} job(s), polling every {}s...",
        handles.len(),
        interval_secs
    );

    let statuses = jobs
        .monitor(
            &handles,
            Duration::from_secs(interval_secs),
            Duration::from_secs(max_wait_minutes * 60),
        )
        .await;

    println!("\n📋 Final status:");
    for handle in &handles {
        let status = &statuses[&handle.job_id];
        let mark = if status.state.is_terminal() { "✅" } else { "⏳" };
        match status.exit_code {
            Some(code) => println!("  {} {}: {} (exit {})", mark, handle.job_id, status.state, code),
            None => println!("  {} {}: {}", mark, handle.job_id, status.state),
        }
    }
    Ok(())
}

/// Run a test suite definition and persist the result
pub async fn run_suite(file: &str, parallel: bool) -> Result<()> {
    let suite = TestSuiteRunner::load_suite(Path::new(file)).await?;
    println!(
        "🚀 Running suite '{}' ({} test(s), {})",
        suite.name,
        suite.tests.len(),
        if parallel { "parallel" } else { "sequential" }
    );

    let (config, jobs) = manager()?;
    let runner = TestSuiteRunner::new(jobs, config.results_dir.clone());
    let result = runner.run(&suite, parallel).await;

    println!();
    for outcome in &result.outcomes {
        let mark = if outcome.passed { "✅" } else { "❌" };
        let runtime = outcome
            .runtime_seconds
            .map(|r| format!(" ({r}s)"))
            .unwrap_or_default();
        println!("  {} {} [{}]{}", mark, outcome.name, outcome.kind, runtime);
        for failure in &outcome.failures {
            println!("      ↳ {}", failure);
        }
    }

    println!(
        "\n📊 {}: {} passed, {} failed, {:.0}s total runtime",
        result.suite, result.summary.passed, result.summary.failed,
        result.summary.total_runtime_seconds
    );
    for (kind, stats) in &result.summary.by_type {
        println!("    {}: {}/{} passed", kind, stats.passed, stats.total);
    }

    let path = runner.save(&result).await?;
    println!("📝 Result written to {}", path.display());

    if result.summary.failed > 0 {
        bail!("{} test(s) failed", result.summary.failed);
    }
    Ok(())
}
