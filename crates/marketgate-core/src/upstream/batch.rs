//! Bounded fan-out for per-id upstream reads.

use super::UpstreamError;
use futures::future::join_all;
use std::{
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
};
use tracing::debug;

/// Default number of workers pulling from the shared cursor.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 6;

/// Results of a batch, in input order. Failed ids are skipped.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub items: Vec<(u64, T)>,
    pub failed: usize,
    /// The last failure, kept so a fully failed batch can be reported.
    pub last_error: Option<UpstreamError>,
}

impl<T> BatchOutcome<T> {
    /// Whether every requested id failed.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.items.is_empty() && self.failed > 0
    }
}

/// Runs `fetch` for every id with at most `concurrency` calls in flight.
///
/// Workers pull the next index from a shared atomic cursor until the input is
/// exhausted, so a slow id only holds up one worker.
pub async fn fetch_all<T, F, Fut>(ids: &[u64], concurrency: usize, fetch: F) -> BatchOutcome<T>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let cursor = AtomicUsize::new(0);
    let workers = concurrency.clamp(1, ids.len().max(1));

    let cursor = &cursor;
    let fetch = &fetch;
    let worker = || async move {
        let mut done = Vec::new();
        let mut errors = Vec::new();
        loop {
            let index = cursor.fetch_add(1, Ordering::Relaxed);
            let Some(&id) = ids.get(index) else {
                break;
            };
            match fetch(id).await {
                Ok(value) => done.push((index, id, value)),
                Err(e) => {
                    debug!(id, error = %e, "batch item failed, skipping");
                    errors.push(e);
                }
            }
        }
        (done, errors)
    };

    let results = join_all((0..workers).map(|_| worker())).await;

    let mut indexed = Vec::with_capacity(ids.len());
    let mut failed = 0;
    let mut last_error = None;
    for (done, errors) in results {
        indexed.extend(done);
        failed += errors.len();
        if let Some(e) = errors.into_iter().last() {
            last_error = Some(e);
        }
    }
    indexed.sort_unstable_by_key(|(index, _, _)| *index);

    BatchOutcome {
        items: indexed.into_iter().map(|(_, id, value)| (id, value)).collect(),
        failed,
        last_error,
    }
}
