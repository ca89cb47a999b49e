//! Submission-document rendering.
//!
//! A job spec becomes a shell script with a declarative `#SBATCH` directive
//! header, an optional environment overlay, and the job body. The document
//! is consumed only by the external scheduler, never executed locally.
//! [`parse_directives`] reads the header back for verification.

use vigil_common::types::{JobSpec, ResourceRequest};

/// Render a job spec into a submission script. `dependency_ids` are the
/// scheduler ids the job must wait for (afterok semantics).
pub fn render(spec: &JobSpec, dependency_ids: &[String]) -> String {
    let mut script = String::new();
    script.push_str("#!/bin/bash\n");
    script.push_str(&format!("#SBATCH --job-name={}\n", spec.name));
    script.push_str(&format!("#SBATCH --time={}\n", spec.resources.time_limit));
    script.push_str(&format!("#SBATCH --mem={}\n", spec.resources.memory));
    script.push_str(&format!("#SBATCH --cpus-per-task={}\n", spec.resources.cpus));
    script.push_str(&format!("#SBATCH --nodes={}\n", spec.resources.nodes));
    script.push_str(&format!("#SBATCH --output={}-%j.out\n", spec.name));
    if !dependency_ids.is_empty() {
        script.push_str(&format!(
            "#SBATCH --dependency=afterok:{}\n",
            dependency_ids.join(":")
        ));
    }

    if !spec.env.is_empty() {
        script.push('\n');
        for (key, value) in &spec.env {
            script.push_str(&format!("export {}={}\n", key, shell_quote(value)));
        }
    }

    script.push('\n');
    script.push_str(&spec.script);
    if !spec.script.ends_with('\n') {
        script.push('\n');
    }
    script
}

fn shell_quote(value: &str) -> String {
    let plain = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_-./:=,".contains(c));
    if plain && !value.is_empty() {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Directive header read back from a rendered submission script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directives {
    pub job_name: Option<String>,
    pub time_limit: Option<String>,
    pub memory: Option<String>,
    pub cpus: Option<u32>,
    pub nodes: Option<u32>,
    pub dependencies: Vec<String>,
}

impl Directives {
    /// Resource request reconstructed from the header, with defaults where
    /// a directive is absent.
    pub fn resources(&self) -> ResourceRequest {
        let defaults = ResourceRequest::default();
        ResourceRequest {
            time_limit: self.time_limit.clone().unwrap_or(defaults.time_limit),
            memory: self.memory.clone().unwrap_or(defaults.memory),
            cpus: self.cpus.unwrap_or(defaults.cpus),
            nodes: self.nodes.unwrap_or(defaults.nodes),
        }
    }
}

/// Parse the `#SBATCH` header of a submission script. Unknown directives
/// are ignored.
pub fn parse_directives(script: &str) -> Directives {
    let mut directives = Directives::default();
    for line in script.lines() {
        let Some(rest) = line.trim().strip_prefix("#SBATCH --") else {
            continue;
        };
        let Some((key, value)) = rest.split_once('=') else {
            continue;
        };
        match key {
            "job-name" => directives.job_name = Some(value.to_string()),
            "time" => directives.time_limit = Some(value.to_string()),
            "mem" => directives.memory = Some(value.to_string()),
            "cpus-per-task" => directives.cpus = value.parse().ok(),
            "nodes" => directives.nodes = value.parse().ok(),
            "dependency" => {
                if let Some(ids) = value.strip_prefix("afterok:") {
                    directives.dependencies = ids.split(':').map(str::to_string).collect();
                }
            }
            _ => {}
        }
    }
    directives
}
