//! The periodic jobs. Each is an idempotent async function over the store:
//! it re-reads its own predicate on every pass, so overlapping executions
//! and restarts are harmless.

use chrono::{Duration, Utc};
use geowatch_core::{
    ConfigProvider, CrawlTask, IntentKind, NotificationIntent, Notifier, Result, TaskId,
};
use geowatch_store::Store;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info};

/// Subscriptions reset at most once per cycle; the guard keeps a daily job
/// from resetting twice in one month.
const USAGE_RESET_GUARD_DAYS: i64 = 25;
/// Renewal reminders fire on exactly these days-until-expiry marks.
const EXPIRY_REMINDER_DAYS: [i64; 4] = [7, 3, 1, 0];
const EVENT_RETENTION_DAYS: i64 = 90;

pub struct Jobs {
    store: Arc<dyn Store>,
    config: ConfigProvider,
    notifier: Notifier,
    /// Freshly enqueued checkup tasks go here for a worker to pick up.
    task_sink: Option<UnboundedSender<TaskId>>,
}

impl Jobs {
    pub fn new(store: Arc<dyn Store>, config: ConfigProvider, notifier: Notifier) -> Self {
        Self {
            store,
            config,
            notifier,
            task_sink: None,
        }
    }

    pub fn with_task_sink(mut self, sink: UnboundedSender<TaskId>) -> Self {
        self.task_sink = Some(sink);
        self
    }

    /// Enqueue a checkup task for every active project with queries whose
    /// last completed crawl is older than its interval. Returns how many
    /// tasks were created.
    pub async fn auto_checkup(&self) -> Result<u32> {
        let default_interval = self.config.auto_checkup_interval_days();
        let now = Utc::now();
        let mut created = 0;

        for project in self.store.active_projects().await? {
            let interval_days = project.checkup_interval_days.unwrap_or(default_interval);
            let cutoff = now - Duration::days(interval_days as i64);

            if let Some(last) = self.store.latest_completed_task(project.id).await? {
                if last.completed_at.is_some_and(|at| at > cutoff) {
                    continue;
                }
            }

            let queries = self.store.query_items_for_project(project.id).await?;
            if queries.is_empty() {
                continue;
            }

            let task = CrawlTask::new(
                project.id,
                project.default_engine,
                queries.iter().map(|q| q.id).collect(),
            );
            let task_id = task.id;
            self.store.insert_task(task).await?;
            info!(project = %project.id, %task_id, "scheduled auto-checkup");
            if let Some(sink) = &self.task_sink {
                let _ = sink.send(task_id);
            }
            created += 1;
        }
        Ok(created)
    }

    /// Compare the latest two scored runs of every active project. Per-project
    /// failures are logged and skipped, never fatal to the sweep.
    pub async fn drift_sweep(&self) -> Result<u32> {
        let mut events = 0;
        for project in self.store.active_projects().await? {
            match geowatch_score::detect_project_drift(
                self.store.as_ref(),
                project.id,
                &self.notifier,
            )
            .await
            {
                Ok(found) => events += found.len() as u32,
                Err(err) => {
                    error!(project = %project.id, %err, "drift check failed");
                }
            }
        }
        Ok(events)
    }

    /// Zero monthly run counters on subscriptions whose last reset is old
    /// enough. Returns how many were reset.
    pub async fn usage_reset(&self) -> Result<u32> {
        let now = Utc::now();
        let mut reset = 0;
        for mut subscription in self.store.subscriptions().await? {
            if let Some(last) = subscription.last_reset_at {
                if now - last < Duration::days(USAGE_RESET_GUARD_DAYS) {
                    continue;
                }
            }
            subscription.runs_this_month = 0;
            subscription.last_reset_at = Some(now);
            info!(workspace = %subscription.workspace_id, "reset monthly usage");
            self.store.save_subscription(subscription).await?;
            reset += 1;
        }
        Ok(reset)
    }

    /// Renewal reminders for paid subscriptions expiring soon, at the fixed
    /// day marks only. Returns how many intents were emitted.
    pub async fn expiry_reminders(&self) -> Result<u32> {
        let now = Utc::now();
        let mut sent = 0;
        for subscription in self.store.subscriptions().await? {
            if !subscription.is_active || subscription.plan_code == "free" {
                continue;
            }
            let Some(expires_at) = subscription.expires_at else {
                continue;
            };
            if expires_at < now || expires_at > now + Duration::days(7) {
                continue;
            }
            let days_left = (expires_at - now).num_days().max(0);
            if !EXPIRY_REMINDER_DAYS.contains(&days_left) {
                continue;
            }

            for user_id in self
                .store
                .workspace_recipients(subscription.workspace_id)
                .await?
            {
                self.notifier.emit(
                    NotificationIntent::new(
                        IntentKind::RenewalReminder,
                        user_id,
                        format!("Your {} plan expires soon", subscription.plan_code),
                        format!(
                            "The subscription expires on {} ({days_left} day(s) left).",
                            expires_at.format("%Y-%m-%d")
                        ),
                    )
                    .with_metadata(serde_json::json!({
                        "plan_code": subscription.plan_code,
                        "days_left": days_left,
                    })),
                );
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Nudge projects whose last completed run is older than the retest
    /// window. Projects that never ran are the auto-checkup's problem.
    pub async fn retest_reminders(&self) -> Result<u32> {
        let window = Duration::days(self.config.retest_after_days() as i64);
        let now = Utc::now();
        let mut sent = 0;

        for project in self.store.active_projects().await? {
            let runs = self.store.completed_runs(project.id, 1).await?;
            let Some(last) = runs.first() else {
                continue;
            };
            let Some(completed_at) = last.completed_at else {
                continue;
            };
            if now - completed_at < window {
                continue;
            }
            let days_since = (now - completed_at).num_days();

            for user_id in self
                .store
                .workspace_recipients(project.workspace_id)
                .await?
            {
                self.notifier.emit(
                    NotificationIntent::new(
                        IntentKind::RetestReminder,
                        user_id,
                        format!("Time to retest {}", project.name),
                        format!("The last completed run is {days_since} days old."),
                    )
                    .with_metadata(serde_json::json!({
                        "project_id": project.id.to_string(),
                        "days_since": days_since,
                    })),
                );
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Drop analytics events past retention. Returns how many were deleted.
    pub async fn event_cleanup(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(EVENT_RETENTION_DAYS);
        let deleted = self.store.delete_events_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted, "cleaned up old analytics events");
        }
        Ok(deleted)
    }
}
