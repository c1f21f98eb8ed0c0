//! Periodic sourcing and tracking sweeps.
//!
//! The returned [`JobScheduler`] must be kept alive; dropping it stops the
//! jobs. Overlapping runs of the same sweep are skipped by the sweep guards
//! on [`Dropship`].

use crate::workflow::{Dropship, WorkflowError, WorkflowErrorKind};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{info, warn};

pub async fn build_scheduler(
    dropship: Dropship,
    sourcing_cron: &str,
    tracking_cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    let dropship = Arc::new(dropship);

    register_sourcing_job(&scheduler, Arc::clone(&dropship), sourcing_cron).await?;
    register_tracking_job(&scheduler, dropship, tracking_cron).await?;

    scheduler.start().await?;
    info!(
        target = "louie.scheduler",
        sourcing_cron, tracking_cron, "scheduler started"
    );
    Ok(scheduler)
}

async fn register_sourcing_job(
    scheduler: &JobScheduler,
    dropship: Arc<Dropship>,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let dropship = Arc::clone(&dropship);
        Box::pin(async move {
            match dropship.run_sourcing_sweeps().await {
                Ok(report) => info!(
                    target = "louie.scheduler",
                    submitted = report.submit.submitted,
                    approved = report.reconcile.approved,
                    rejected = report.reconcile.rejected,
                    "scheduled sourcing sweep complete"
                ),
                Err(err) => log_sweep_error("sourcing", &err),
            }
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}

async fn register_tracking_job(
    scheduler: &JobScheduler,
    dropship: Arc<Dropship>,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let dropship = Arc::clone(&dropship);
        Box::pin(async move {
            match dropship.run_tracking_sweep().await {
                Ok(report) => info!(
                    target = "louie.scheduler",
                    checked = report.checked,
                    synced = report.synced,
                    errors = report.errors,
                    "scheduled tracking sweep complete"
                ),
                Err(err) => log_sweep_error("tracking", &err),
            }
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}

fn log_sweep_error(sweep: &'static str, err: &WorkflowError) {
    if err.kind() == WorkflowErrorKind::Conflict {
        info!(target = "louie.scheduler", sweep, "previous run still active; skipped");
    } else {
        warn!(target = "louie.scheduler", sweep, error = %err, "scheduled sweep failed");
    }
}
