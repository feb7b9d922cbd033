//! Periodic job dispatch.
//!
//! A [`Scheduler`] runs each job from [`Jobs`] on its own interval inside a
//! spawned task. Jobs are idempotent, so the runner needs no locking and
//! overlapping executions are safe.

pub mod jobs;

pub use jobs::Jobs;

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct Schedule {
    pub auto_checkup: Duration,
    pub drift_sweep: Duration,
    pub usage_reset: Duration,
    pub expiry_reminders: Duration,
    pub retest_reminders: Duration,
    pub event_cleanup: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            auto_checkup: Duration::from_secs(60 * 60),
            drift_sweep: Duration::from_secs(24 * 60 * 60),
            usage_reset: Duration::from_secs(24 * 60 * 60),
            expiry_reminders: Duration::from_secs(24 * 60 * 60),
            retest_reminders: Duration::from_secs(24 * 60 * 60),
            event_cleanup: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

pub struct Scheduler {
    jobs: Arc<Jobs>,
    schedule: Schedule,
}

impl Scheduler {
    pub fn new(jobs: Jobs, schedule: Schedule) -> Self {
        Self {
            jobs: Arc::new(jobs),
            schedule,
        }
    }

    /// Run one job by name. Unknown names are a caller bug.
    pub async fn dispatch(&self, name: &str) -> geowatch_core::Result<u64> {
        let count = match name {
            "auto_checkup" => self.jobs.auto_checkup().await? as u64,
            "drift_sweep" => self.jobs.drift_sweep().await? as u64,
            "usage_reset" => self.jobs.usage_reset().await? as u64,
            "expiry_reminders" => self.jobs.expiry_reminders().await? as u64,
            "retest_reminders" => self.jobs.retest_reminders().await? as u64,
            "event_cleanup" => self.jobs.event_cleanup().await? as u64,
            other => {
                return Err(geowatch_core::GeoError::BadRequest(format!(
                    "unknown job '{other}'"
                )));
            }
        };
        Ok(count)
    }

    /// Spawn one interval loop per job. The handles run until aborted or the
    /// runtime shuts down.
    pub fn spawn(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let entries: [(&'static str, Duration); 6] = [
            ("auto_checkup", self.schedule.auto_checkup),
            ("drift_sweep", self.schedule.drift_sweep),
            ("usage_reset", self.schedule.usage_reset),
            ("expiry_reminders", self.schedule.expiry_reminders),
            ("retest_reminders", self.schedule.retest_reminders),
            ("event_cleanup", self.schedule.event_cleanup),
        ];

        entries
            .into_iter()
            .map(|(name, every)| {
                let jobs = self.jobs.clone();
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(every);
                    // The immediate first tick would fire every job at boot.
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    ticker.tick().await;
                    loop {
                        ticker.tick().await;
                        let outcome = match name {
                            "auto_checkup" => jobs.auto_checkup().await.map(u64::from),
                            "drift_sweep" => jobs.drift_sweep().await.map(u64::from),
                            "usage_reset" => jobs.usage_reset().await.map(u64::from),
                            "expiry_reminders" => jobs.expiry_reminders().await.map(u64::from),
                            "retest_reminders" => jobs.retest_reminders().await.map(u64::from),
                            "event_cleanup" => jobs.event_cleanup().await.map(|n| n as u64),
                            _ => unreachable!(),
                        };
                        match outcome {
                            Ok(count) => info!(job = name, count, "job pass finished"),
                            Err(err) => error!(job = name, %err, "job pass failed"),
                        }
                    }
                })
            })
            .collect()
    }
}
