use std::{future::Future, pin::Pin};

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app_error::AppResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Candidates are paged by ascending id.
pub trait Keyed {
    fn key(&self) -> Uuid;
}

/// Result of handling a single candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Processed,
    Skipped(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when fetching a page failed and the pass stopped early.
    pub aborted: bool,
}

/// Run `handle` over every candidate `fetch` yields, `chunk_size` at a time.
///
/// `fetch(after, limit)` must return candidates with id greater than `after`,
/// ordered by id. A failing item is logged and counted; it never stops the pass.
pub async fn process_in_batches<'a, T, F, H>(
    job: &str,
    chunk_size: i64,
    fetch: F,
    handle: H,
) -> BatchReport
where
    T: Keyed + Send + 'a,
    F: Fn(Option<Uuid>, i64) -> BoxFuture<'a, AppResult<Vec<T>>>,
    H: Fn(T) -> BoxFuture<'a, AppResult<ItemOutcome>>,
{
    let chunk_size = chunk_size.max(1);
    let mut report = BatchReport::default();
    let mut after: Option<Uuid> = None;

    loop {
        let batch = match fetch(after, chunk_size).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(job, error = %e, "Failed to fetch candidates, stopping pass");
                report.aborted = true;
                break;
            }
        };

        let Some(last) = batch.last().map(Keyed::key) else {
            break;
        };
        let fetched = batch.len();

        for item in batch {
            let key = item.key();
            match handle(item).await {
                Ok(ItemOutcome::Processed) => report.processed += 1,
                Ok(ItemOutcome::Skipped(reason)) => {
                    warn!(job, item = %key, reason = %reason, "Skipped candidate");
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(job, item = %key, error = %e, "Failed to process candidate");
                    report.failed += 1;
                }
            }
        }

        if (fetched as i64) < chunk_size {
            break;
        }
        after = Some(last);
    }

    info!(
        job,
        processed = report.processed,
        skipped = report.skipped,
        failed = report.failed,
        aborted = report.aborted,
        "Job pass finished"
    );
    report
}
