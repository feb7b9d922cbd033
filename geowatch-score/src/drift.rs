//! Drift comparison between two scorecards.
//!
//! Pure: takes the baseline and current metric maps and a threshold table,
//! returns findings. `avg_citation_position` drifts on a rise (lower is
//! better); everything else drifts on a fall.

use geowatch_core::DriftSeverity;
use serde_json::Value;

pub const DRIFT_TYPE_POSITION_DROP: &str = "position_drop";
pub const DRIFT_TYPE_VISIBILITY_LOSS: &str = "visibility_loss";

/// Watched metrics and their drift thresholds.
pub const DEFAULT_THRESHOLDS: &[(&str, f64)] = &[
    ("visibility_rate", 0.10),
    ("avg_citation_position", 2.0),
    ("health_score", 10.0),
];

#[derive(Debug, Clone, PartialEq)]
pub struct DriftFinding {
    pub metric: String,
    pub drift_type: &'static str,
    pub severity: DriftSeverity,
    pub baseline_value: f64,
    pub current_value: f64,
    pub change_percent: f64,
}

fn metric_value(map: &Value, key: &str) -> f64 {
    map.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn severity_for(delta: f64, threshold: f64) -> DriftSeverity {
    if delta.abs() >= threshold * 2.0 {
        DriftSeverity::Critical
    } else {
        DriftSeverity::Warning
    }
}

/// Compare two summary-metric maps. `change_percent` is 0 when the baseline
/// is 0 — a ratio against nothing is noise, not signal.
pub fn compare(
    baseline: &Value,
    current: &Value,
    thresholds: &[(&str, f64)],
) -> Vec<DriftFinding> {
    let mut findings = Vec::new();

    for (metric, threshold) in thresholds {
        let baseline_value = metric_value(baseline, metric);
        let current_value = metric_value(current, metric);

        let (delta, change_percent) = if baseline_value > 0.0 {
            let delta = current_value - baseline_value;
            (delta, delta / baseline_value * 100.0)
        } else {
            (current_value, 0.0)
        };

        if *metric == "avg_citation_position" {
            if delta > *threshold {
                findings.push(DriftFinding {
                    metric: metric.to_string(),
                    drift_type: DRIFT_TYPE_POSITION_DROP,
                    severity: severity_for(delta, *threshold),
                    baseline_value,
                    current_value,
                    change_percent,
                });
            }
        } else if delta < -threshold {
            findings.push(DriftFinding {
                metric: metric.to_string(),
                drift_type: DRIFT_TYPE_VISIBILITY_LOSS,
                severity: severity_for(delta, *threshold),
                baseline_value,
                current_value,
                change_percent,
            });
        }
    }

    findings
}
