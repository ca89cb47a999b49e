//! Anomaly detection over resource and progress snapshots.
//!
//! **Critical properties:**
//! - Pure function: (host, snapshots, thresholds) -> anomalies
//! - Knows nothing about ssh, schedulers or log formats
//! - No internal memory and no cross-call deduplication: a periodic caller
//!   re-reports an ongoing condition every cycle
//!
//! All numeric comparisons are strict greater-than: a reading exactly at
//! its threshold does not trigger. Anomaly timestamps come from the inputs,
//! so identical inputs yield identical output.

use vigil_common::types::{
    Anomaly, ProgressSnapshot, ProgressStatus, ResourceSnapshot, Severity, Thresholds,
};

/// `host` becomes the subject of resource anomalies; session ids subject
/// the experiment ones.
pub fn detect(
    host: &str,
    resources: &ResourceSnapshot,
    progress: &[ProgressSnapshot],
    thresholds: &Thresholds,
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    let timestamp = resources.timestamp;
    let host = host.to_string();

    if let Some(memory) = &resources.memory {
        if memory.usage_percent > thresholds.memory_percent {
            anomalies.push(Anomaly {
                kind: "memory_usage".to_string(),
                severity: Severity::Warning,
                message: format!(
                    "memory usage {:.1}% exceeds threshold {:.1}%",
                    memory.usage_percent, thresholds.memory_percent
                ),
                subject: host.clone(),
                timestamp,
            });
        }
    }

    if let Some(load) = &resources.cpu_load {
        if load.one > thresholds.cpu_load {
            anomalies.push(Anomaly {
                kind: "cpu_load".to_string(),
                severity: Severity::Warning,
                message: format!(
                    "1m load average {:.2} exceeds threshold {:.2}",
                    load.one, thresholds.cpu_load
                ),
                subject: host.clone(),
                timestamp,
            });
        }
    }

    if let Some(disk) = &resources.disk {
        if disk.usage_percent > thresholds.disk_percent {
            anomalies.push(Anomaly {
                kind: "disk_usage".to_string(),
                severity: Severity::Error,
                message: format!(
                    "disk usage {:.1}% exceeds threshold {:.1}%",
                    disk.usage_percent, thresholds.disk_percent
                ),
                subject: host.clone(),
                timestamp,
            });
        }
    }

    if let Some(count) = resources.process_count {
        if count > thresholds.process_count {
            anomalies.push(Anomaly {
                kind: "process_count".to_string(),
                severity: Severity::Warning,
                message: format!(
                    "{count} processes exceed threshold {}",
                    thresholds.process_count
                ),
                subject: host.clone(),
                timestamp,
            });
        }
    }

    for snapshot in progress {
        if !snapshot.errors.is_empty() {
            let recent: Vec<&str> = snapshot
                .errors
                .iter()
                .rev()
                .take(thresholds.max_reported_errors)
                .rev()
                .map(String::as_str)
                .collect();
            anomalies.push(Anomaly {
                kind: "experiment_errors".to_string(),
                severity: Severity::Error,
                message: format!(
                    "{} error line(s) in session log; most recent: {}",
                    snapshot.errors.len(),
                    recent.join(" | ")
                ),
                subject: snapshot.session.clone(),
                timestamp,
            });
        }

        if snapshot.status == ProgressStatus::PotentiallyStalled {
            let minutes = snapshot.stall_minutes.unwrap_or(0);
            anomalies.push(Anomaly {
                kind: "experiment_stalled".to_string(),
                severity: Severity::Warning,
                message: format!("no log activity for {minutes} minutes"),
                subject: snapshot.session.clone(),
                timestamp,
            });
        }
    }

    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vigil_common::types::{CpuLoad, DiskUsage, MemoryUsage};

    fn snapshot() -> ResourceSnapshot {
        ResourceSnapshot {
            timestamp: Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap(),
            memory: Some(MemoryUsage {
                total_mb: 1000,
                used_mb: 900,
                free_mb: 100,
                usage_percent: 90.0,
            }),
            cpu_load: Some(CpuLoad {
                one: 4.0,
                five: 3.0,
                fifteen: 2.0,
            }),
            disk: Some(DiskUsage {
                total_kb: 1000,
                used_kb: 900,
                available_kb: 100,
                usage_percent: 90.0,
            }),
            process_count: Some(500),
        }
    }

    fn thresholds() -> Thresholds {
        Thresholds {
            memory_percent: 90.0,
            cpu_load: 4.0,
            disk_percent: 90.0,
            process_count: 500,
            max_reported_errors: 2,
        }
    }

    #[test]
    fn test_exactly_at_threshold_does_not_trigger() {
        // Every reading sits exactly on its threshold.
        let anomalies = detect("head.example", &snapshot(), &[], &thresholds());
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_one_unit_above_triggers() {
        let mut resources = snapshot();
        resources.memory.as_mut().unwrap().usage_percent = 91.0;
        resources.cpu_load.as_mut().unwrap().one = 5.0;
        resources.disk.as_mut().unwrap().usage_percent = 91.0;
        resources.process_count = Some(501);

        let anomalies = detect("head.example", &resources, &[], &thresholds());
        let kinds: Vec<&str> = anomalies.iter().map(|a| a.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["memory_usage", "cpu_load", "disk_usage", "process_count"]
        );
        // Resource anomalies name the sampled host.
        assert!(anomalies.iter().all(|a| a.subject == "head.example"));
    }

    #[test]
    fn test_missing_fields_are_skipped() {
        let mut resources = snapshot();
        resources.memory = None;
        resources.disk = None;
        resources.cpu_load.as_mut().unwrap().one = 100.0;

        let anomalies = detect("head.example", &resources, &[], &thresholds());
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, "cpu_load");
    }

    #[test]
    fn test_experiment_errors_carry_most_recent() {
        let mut progress = ProgressSnapshot::with_status("run-alpha", ProgressStatus::Running);
        progress.errors = vec![
            "error: one".to_string(),
            "error: two".to_string(),
            "error: three".to_string(),
        ];

        let anomalies = detect("head.example", &snapshot(), &[progress], &thresholds());
        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert_eq!(anomaly.kind, "experiment_errors");
        assert_eq!(anomaly.severity, Severity::Error);
        assert_eq!(anomaly.subject, "run-alpha");
        // max_reported_errors = 2: only the two most recent, in order.
        assert!(anomaly.message.contains("error: two | error: three"));
        assert!(!anomaly.message.contains("error: one"));
    }

    #[test]
    fn test_stalled_session() {
        let mut progress =
            ProgressSnapshot::with_status("run-beta", ProgressStatus::PotentiallyStalled);
        progress.stall_minutes = Some(90);

        let anomalies = detect("head.example", &snapshot(), &[progress], &thresholds());
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, "experiment_stalled");
        assert!(anomalies[0].message.contains("90 minutes"));
    }

    #[test]
    fn test_detect_is_idempotent() {
        let mut resources = snapshot();
        resources.memory.as_mut().unwrap().usage_percent = 99.0;
        let mut progress = ProgressSnapshot::with_status("run-alpha", ProgressStatus::Running);
        progress.errors = vec!["error: boom".to_string()];
        let progress = vec![progress];

        let first = detect("head.example", &resources, &progress, &thresholds());
        let second = detect("head.example", &resources, &progress, &thresholds());
        let third = detect("head.example", &resources, &progress, &thresholds());
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(first.len(), 2);
    }
}
