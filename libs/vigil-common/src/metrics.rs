//! Metric-line convention consumed from job stdout.
//!
//! Jobs report metrics as plain `metric_name: value` lines. Anything that
//! does not match the convention is ignored so jobs can print freely around
//! their metrics (forward-compatible: unknown keys are kept, junk is not).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A parsed metric value. Numeric values are preferred; anything that does
/// not parse as a number is kept verbatim as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Returns true if `name` is a valid metric identifier: starts with a letter
/// or underscore, continues with letters, digits or underscores.
fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a single `name: value` line. Returns None for lines that do not
/// follow the convention.
pub fn parse_metric_line(line: &str) -> Option<(String, MetricValue)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    let value = value.trim();
    if !is_metric_name(name) || value.is_empty() {
        return None;
    }
    let parsed = match value.parse::<f64>() {
        Ok(n) => MetricValue::Number(n),
        Err(_) => MetricValue::Text(value.to_string()),
    };
    Some((name.to_string(), parsed))
}

/// Scan free-form output for metric lines. Later occurrences of the same
/// name override earlier ones, so jobs can report running values and the
/// final line wins.
pub fn parse_metrics(text: &str) -> HashMap<String, MetricValue> {
    let mut metrics = HashMap::new();
    for line in text.lines() {
        if let Some((name, value)) = parse_metric_line(line) {
            metrics.insert(name, value);
        }
    }
    metrics
}
