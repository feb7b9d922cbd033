//! Scoring and drift detection over persisted crawl evidence.
//!
//! The math lives in [`metrics`] and [`drift`] as pure functions; this
//! module wires them to the store and the notification channel.

pub mod drift;
pub mod metrics;

pub use drift::{DEFAULT_THRESHOLDS, DriftFinding, compare};
pub use metrics::{AttributedCitation, RunMetrics, calculate_metrics};

use chrono::Utc;
use geowatch_core::{
    DriftEvent, DriftEventId, GeoError, IntentKind, NotificationIntent, Notifier, ProjectId,
    Result, RunId,
};
use geowatch_store::Store;
use tracing::info;

/// Score a run from its persisted results and write the scorecard back:
/// `summary_metrics` as the full map, `health_score` denormalized for
/// listings.
pub async fn score_run(store: &dyn Store, run_id: RunId) -> Result<RunMetrics> {
    let mut run = store.run(run_id).await?;
    let project = store.project(run.project_id).await?;
    let results = store.results_for_run(run_id).await?;

    let citations: Vec<AttributedCitation> = results
        .iter()
        .flat_map(|r| {
            r.citations.iter().map(|c| AttributedCitation {
                query_id: r.query_id,
                citation: c.clone(),
            })
        })
        .collect();

    let metrics = calculate_metrics(&citations, &project.target_domains);
    run.summary_metrics = Some(serde_json::to_value(&metrics)?);
    run.health_score = Some(metrics.health_score_int());
    store.save_run(run).await?;

    info!(
        %run_id,
        health = metrics.health_score_int(),
        citations = metrics.citation_count,
        "run scored"
    );
    Ok(metrics)
}

/// Compare the project's two most recent completed, scored runs; persist a
/// [`DriftEvent`] per finding and notify the workspace.
pub async fn detect_project_drift(
    store: &dyn Store,
    project_id: ProjectId,
    notifier: &Notifier,
) -> Result<Vec<DriftEvent>> {
    let project = store.project(project_id).await?;
    let runs = store.completed_runs(project_id, 2).await?;
    if runs.len() < 2 {
        return Ok(Vec::new());
    }
    let current = &runs[0];
    let baseline = &runs[1];

    let baseline_metrics = baseline
        .summary_metrics
        .as_ref()
        .ok_or_else(|| GeoError::Internal("completed run without metrics".into()))?;
    let current_metrics = current
        .summary_metrics
        .as_ref()
        .ok_or_else(|| GeoError::Internal("completed run without metrics".into()))?;

    let findings = compare(baseline_metrics, current_metrics, DEFAULT_THRESHOLDS);
    if findings.is_empty() {
        return Ok(Vec::new());
    }

    let mut events = Vec::with_capacity(findings.len());
    for finding in &findings {
        let event = DriftEvent {
            id: DriftEventId::new(),
            project_id,
            baseline_run_id: baseline.id,
            compare_run_id: current.id,
            metric_name: finding.metric.clone(),
            baseline_value: finding.baseline_value,
            current_value: finding.current_value,
            change_percent: finding.change_percent,
            drift_type: finding.drift_type.to_string(),
            severity: finding.severity,
            detected_at: Utc::now(),
            acknowledged_at: None,
        };
        store.insert_drift_event(event.clone()).await?;
        events.push(event);
    }

    info!(%project_id, events = events.len(), "drift detected");
    for user_id in store.workspace_recipients(project.workspace_id).await? {
        let worst = findings
            .iter()
            .map(|f| f.severity)
            .max_by_key(|s| matches!(s, geowatch_core::DriftSeverity::Critical) as u8)
            .unwrap_or(geowatch_core::DriftSeverity::Warning);
        notifier.emit(
            NotificationIntent::new(
                IntentKind::DriftWarning,
                user_id,
                format!("Visibility drift detected in {}", project.name),
                format!(
                    "{} metric(s) moved past their drift thresholds between run #{} and run #{}.",
                    findings.len(),
                    baseline.run_number,
                    current.run_number
                ),
            )
            .with_metadata(serde_json::json!({
                "project_id": project_id.to_string(),
                "severity": worst,
                "metrics": findings.iter().map(|f| f.metric.clone()).collect::<Vec<_>>(),
            })),
        );
    }

    Ok(events)
}
