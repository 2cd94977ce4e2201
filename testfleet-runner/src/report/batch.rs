// Copyright (c) The testfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ReportStoreError;
use futures::{StreamExt, stream};
use std::future::Future;

/// The outcome of submitting items to a report store in batches.
#[derive(Clone, Debug, Default)]
pub struct BatchSubmission {
    /// The number of batches submitted.
    pub batches: usize,

    /// The number of items across all batches.
    pub items: usize,

    /// Batches that failed, sorted by index.
    pub failed_batches: Vec<FailedBatch>,
}

impl BatchSubmission {
    /// Returns true if every batch was accepted.
    pub fn is_success(&self) -> bool {
        self.failed_batches.is_empty()
    }
}

/// A batch the report store rejected.
#[derive(Clone, Debug)]
pub struct FailedBatch {
    /// The index of the batch.
    pub index: usize,

    /// The number of items in the batch.
    pub len: usize,

    /// The error returned by the store.
    pub error: ReportStoreError,
}

/// Splits `items` into chunks of `batch_size` and submits them with at most `max_concurrent`
/// submissions in flight.
///
/// Batches are independent: there is no ordering between them, failures are not retried, and a
/// failed batch doesn't stop the others.
pub async fn submit_in_batches<'a, T, F, Fut>(
    items: &'a [T],
    batch_size: usize,
    max_concurrent: usize,
    submit: F,
) -> BatchSubmission
where
    F: Fn(usize, &'a [T]) -> Fut,
    Fut: Future<Output = Result<(), ReportStoreError>>,
{
    let submit = &submit;
    let results: Vec<_> = stream::iter(items.chunks(batch_size.max(1)).enumerate())
        .map(|(index, chunk)| {
            let fut = submit(index, chunk);
            async move { (index, chunk.len(), fut.await) }
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;

    let mut submission = BatchSubmission {
        batches: results.len(),
        items: items.len(),
        failed_batches: Vec::new(),
    };
    for (index, len, result) in results {
        if let Err(error) = result {
            submission
                .failed_batches
                .push(FailedBatch { index, len, error });
        }
    }
    submission.failed_batches.sort_by_key(|batch| batch.index);
    submission
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ReportOperation;
    use pretty_assertions::assert_eq;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    #[tokio::test]
    async fn splits_into_fixed_size_batches() {
        let items: Vec<usize> = (0..1000).collect();
        let sizes = Mutex::new(Vec::new());
        let submission = submit_in_batches(&items, 400, 8, |index, batch| {
            sizes.lock().unwrap().push((index, batch.len()));
            async { Ok(()) }
        })
        .await;

        let mut sizes = sizes.into_inner().unwrap();
        sizes.sort();
        assert_eq!(sizes, vec![(0, 400), (1, 400), (2, 200)]);
        assert_eq!(submission.batches, 3);
        assert_eq!(submission.items, 1000);
        assert!(submission.is_success());
    }

    #[tokio::test]
    async fn failed_batch_does_not_stop_others() {
        let items: Vec<usize> = (0..1000).collect();
        let submitted = AtomicUsize::new(0);
        let submission = submit_in_batches(&items, 400, 8, |index, batch| {
            let result = if index == 1 {
                Err(ReportStoreError::new(
                    ReportOperation::AddTests,
                    "app/run",
                    "503 service unavailable",
                ))
            } else {
                submitted.fetch_add(batch.len(), Ordering::SeqCst);
                Ok(())
            };
            async move { result }
        })
        .await;

        assert_eq!(submitted.load(Ordering::SeqCst), 600);
        assert_eq!(submission.batches, 3);
        assert_eq!(submission.failed_batches.len(), 1);
        assert_eq!(submission.failed_batches[0].index, 1);
        assert_eq!(submission.failed_batches[0].len, 400);
    }

    #[tokio::test]
    async fn bounded_concurrency() {
        let items: Vec<usize> = (0..100).collect();
        let in_flight = AtomicUsize::new(0);
        let max_seen = AtomicUsize::new(0);
        let submission = submit_in_batches(&items, 10, 3, |_, _| {
            let in_flight = &in_flight;
            let max_seen = &max_seen;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(submission.batches, 10);
        assert!(max_seen.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn empty_input() {
        let items: Vec<u8> = Vec::new();
        let submission = submit_in_batches(&items, 400, 8, |_, _| async { Ok(()) }).await;
        assert_eq!(submission.batches, 0);
        assert!(submission.is_success());
    }
}
