mod report;

use report::MonitorReport;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use vigil_cluster::anomaly;
use vigil_cluster::progress::ExperimentProgressAnalyzer;
use vigil_cluster::remote::SshExecutor;
use vigil_cluster::resource::ResourceMonitor;
use vigil_common::config::ClusterConfig;
use vigil_common::types::Severity;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Vigil agent booting...");

    let config = ClusterConfig::load_default().map_err(|e| {
        error!("Failed to load cluster configuration: {}", e);
        error!("Make sure config/cluster.json exists");
        e
    })?;

    info!(
        host = %config.ssh.host,
        interval_secs = config.monitor.interval_secs,
        sessions = config.monitor.sessions.len(),
        "Agent configured"
    );

    let executor = Arc::new(SshExecutor::new(&config));
    let resources = ResourceMonitor::new(executor.clone(), &config);
    let analyzer = ExperimentProgressAnalyzer::new(executor, &config);

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        warn!("Received shutdown signal");
    };

    tokio::select! {
        _ = monitor_loop(&config, &resources, &analyzer) => {},
        _ = shutdown => {},
    }

    info!("Agent shutdown complete");
    Ok(())
}

async fn monitor_loop(
    config: &ClusterConfig,
    resources: &ResourceMonitor,
    analyzer: &ExperimentProgressAnalyzer,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.monitor.interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        run_cycle(config, resources, analyzer).await;
    }
}

async fn run_cycle(
    config: &ClusterConfig,
    resources: &ResourceMonitor,
    analyzer: &ExperimentProgressAnalyzer,
) {
    let snapshot = resources.sample().await;
    info!(
        memory = snapshot.memory.is_some(),
        cpu_load = snapshot.cpu_load.is_some(),
        disk = snapshot.disk.is_some(),
        processes = ?snapshot.process_count,
        "Resource sample taken"
    );

    let mut sessions = Vec::with_capacity(config.monitor.sessions.len());
    for session in &config.monitor.sessions {
        let progress = analyzer.analyze(session).await;
        info!(
            session = %session,
            status = ?progress.status,
            indicators = progress.indicators.len(),
            errors = progress.errors.len(),
            "Session analyzed"
        );
        sessions.push(progress);
    }

    let anomalies = anomaly::detect(
        resources.host(),
        &snapshot,
        &sessions,
        &config.monitor.thresholds,
    );
    for anomaly in &anomalies {
        match anomaly.severity {
            Severity::Warning => warn!(
                kind = %anomaly.kind,
                subject = %anomaly.subject,
                "{}",
                anomaly.message
            ),
            Severity::Error | Severity::Critical => error!(
                kind = %anomaly.kind,
                subject = %anomaly.subject,
                "{}",
                anomaly.message
            ),
        }
    }
    if anomalies.is_empty() {
        info!("No anomalies detected");
    }

    let report = MonitorReport::new(snapshot, sessions, anomalies);
    match report.write(&config.reports_dir).await {
        Ok(path) => info!(report = %path.display(), "Report written"),
        // Non-fatal - the agent keeps monitoring.
        Err(e) => error!(error = %e, "Failed to write report"),
    }
}
