use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info, warn};

use crate::services::pages::PageManager;

/// Periodically recomputes every page document from slot and status state.
pub async fn setup_reconcile_scheduler(
    pages: Arc<PageManager>,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    scheduler
        .add(Job::new_async(cron, move |_, _| {
            let pages = pages.clone();
            Box::pin(async move {
                info!("Running scheduled status list reconciliation");
                match pages.refresh_all().await {
                    Ok(report) if report.failed.is_empty() => {
                        info!("Reconciled {} status list pages", report.refreshed)
                    }
                    Ok(report) => warn!(
                        "Reconciled {} status list pages, {} failed: {:?}",
                        report.refreshed,
                        report.failed.len(),
                        report.failed
                    ),
                    Err(e) => error!("Failed to reconcile status lists: {e:?}"),
                }
            })
        })?)
        .await?;

    scheduler.start().await?;
    Ok(scheduler)
}
