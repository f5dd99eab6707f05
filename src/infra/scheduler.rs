use chrono::Utc;
use strum::IntoEnumIterator;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::{
    infra::{config::JobSchedules, error::InfraError},
    use_cases::reconciliation::{JobKind, ReconciliationJobs},
};

/// Build a scheduler with one cron job per reconciliation pass. Each firing
/// runs a single bounded pass.
pub async fn build_scheduler(
    jobs: ReconciliationJobs,
    schedules: &JobSchedules,
) -> Result<JobScheduler, InfraError> {
    let scheduler = JobScheduler::new().await?;

    for kind in JobKind::iter() {
        let cron = schedules.cron_for(kind);
        let jobs = jobs.clone();
        let job = Job::new_async(cron, move |_uuid, _l| {
            let jobs = jobs.clone();
            Box::pin(async move {
                run_once(&jobs, kind).await;
            })
        })?;
        scheduler.add(job).await?;
        info!(job = %kind, cron, "Scheduled reconciliation job");
    }

    Ok(scheduler)
}

/// Run one pass of `kind` now and log its summary.
pub async fn run_once(jobs: &ReconciliationJobs, kind: JobKind) {
    let span = info_span!("job-run", job = %kind, run_id = %Uuid::new_v4());
    async {
        let report = jobs.run(kind, Utc::now()).await;
        if report.aborted || report.failed > 0 {
            warn!(
                processed = report.processed,
                skipped = report.skipped,
                failed = report.failed,
                aborted = report.aborted,
                "Job pass finished with failures"
            );
        } else {
            info!(
                processed = report.processed,
                skipped = report.skipped,
                "Job pass finished"
            );
        }
    }
    .instrument(span)
    .await
}
