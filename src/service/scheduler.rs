//! Cron jobs for the daily reminder run and the optional digest.

use chrono::Local;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::ReminderConfig;
use crate::error::AppError;
use crate::logging::redact;
use crate::service::reminders::ReminderService;

pub struct ReminderScheduler {
    inner: JobScheduler,
    jobs: Vec<Uuid>,
}

impl ReminderScheduler {
    /// Register the configured jobs and start ticking.
    pub async fn start(cfg: &ReminderConfig, reminders: ReminderService) -> Result<Self, AppError> {
        let inner = JobScheduler::new().await?;
        let mut jobs = Vec::new();

        if cfg.enabled {
            let svc = reminders.clone();
            let job = Job::new_async_tz(cfg.cron.as_str(), Local, move |_uuid, _l| {
                let svc = svc.clone();
                Box::pin(async move {
                    let today = Local::now().date_naive();
                    match svc.send_today(today).await {
                        Ok(report) => info!(
                            sent = report.sent,
                            failed = report.failed,
                            "scheduled reminder run: {}",
                            report.message
                        ),
                        Err(e) => error!(error = %redact(&e.to_string()), "scheduled reminder run failed"),
                    }
                })
            })?;
            jobs.push(inner.add(job).await?);
            info!(cron = %cfg.cron, "daily reminder job scheduled");
        }

        if cfg.digest_enabled {
            let svc = reminders;
            let days = cfg.digest_days;
            let job = Job::new_async_tz(cfg.digest_cron.as_str(), Local, move |_uuid, _l| {
                let svc = svc.clone();
                Box::pin(async move {
                    let today = Local::now().date_naive();
                    match svc.send_digest(today, days).await {
                        Ok(outcome) => info!(count = outcome.count, "scheduled digest run: {}", outcome.message),
                        Err(e) => error!(error = %redact(&e.to_string()), "scheduled digest run failed"),
                    }
                })
            })?;
            jobs.push(inner.add(job).await?);
            info!(cron = %cfg.digest_cron, days, "digest job scheduled");
        }

        inner.start().await?;
        Ok(Self { inner, jobs })
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub async fn shutdown(mut self) -> Result<(), AppError> {
        self.inner.shutdown().await?;
        info!("scheduler stopped");
        Ok(())
    }
}
