use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vigil_common::types::{Anomaly, ProgressSnapshot, ResourceSnapshot};

/// One monitoring cycle's findings, persisted as JSON for operators and
/// downstream tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorReport {
    pub timestamp: DateTime<Utc>,
    pub resources: ResourceSnapshot,
    pub sessions: Vec<ProgressSnapshot>,
    pub anomalies: Vec<Anomaly>,
}

impl MonitorReport {
    pub fn new(
        resources: ResourceSnapshot,
        sessions: Vec<ProgressSnapshot>,
        anomalies: Vec<Anomaly>,
    ) -> Self {
        Self {
            timestamp: resources.timestamp,
            resources,
            sessions,
            anomalies,
        }
    }

    /// Write the report under `dir` as `report-<timestamp>.json`.
    pub async fn write(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create report directory {}", dir.display()))?;
        let path = dir.join(format!(
            "report-{}.json",
            self.timestamp.format("%Y%m%dT%H%M%SZ")
        ));
        let json = serde_json::to_string_pretty(self).context("serialize report")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("write report {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vigil_common::types::{ProgressStatus, Severity};

    #[tokio::test]
    async fn test_write_report() {
        let dir = std::env::temp_dir().join(format!("vigil-report-{}", uuid::Uuid::new_v4()));
        let resources = ResourceSnapshot::empty(Utc.with_ymd_and_hms(2026, 8, 30, 6, 0, 0).unwrap());
        let report = MonitorReport::new(
            resources,
            vec![ProgressSnapshot::with_status(
                "run-alpha",
                ProgressStatus::Running,
            )],
            vec![Anomaly {
                kind: "disk_usage".to_string(),
                severity: Severity::Error,
                message: "disk usage 95.0% exceeds threshold 90.0%".to_string(),
                subject: "cluster".to_string(),
                timestamp: Utc.with_ymd_and_hms(2026, 8, 30, 6, 0, 0).unwrap(),
            }],
        );

        let path = report.write(&dir).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "report-20260830T060000Z.json"
        );

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let reloaded: MonitorReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(reloaded.sessions.len(), 1);
        assert_eq!(reloaded.anomalies[0].kind, "disk_usage");
    }
}
