//! # Batch Slicer
//!
//! Cuts an ordered sequence of items into consecutive batches of at most
//! `batch_size` mapped items and hands each batch to an async callback, awaiting
//! it before the next batch is started.
//!
//! Mapping rules:
//! - `map` returning `None` drops the item; dropped items do not count toward the
//!   batch size, so every batch except the last holds exactly `batch_size` items.
//! - An absent input item (`None` in the nullable variants) is a caller contract
//!   violation and aborts with [`BatchError::NullItem`].
//! - A fallible map returning `Err` aborts with [`BatchError::MapFailed`].
//!
//! Cancellation is observed before each batch is submitted, never mid-batch.

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::clamp_batch_size;
use crate::constants::DEFAULT_BATCH_SIZE;
use crate::error::{BatchError, Result};

/// What a slicing run submitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceSummary {
    /// Number of `on_batch` invocations
    pub batches: usize,
    /// Mapped items handed to `on_batch` across all batches
    pub items_submitted: usize,
    /// Items whose map result was `None`
    pub items_skipped: usize,
}

/// Fixed-size batching with a skip-on-`None` map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSlicer {
    batch_size: usize,
}

impl Default for BatchSlicer {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BatchSlicer {
    /// Batch sizes below 1 are clamped to 1
    pub fn new(batch_size: i64) -> Self {
        Self {
            batch_size: clamp_batch_size(batch_size),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Slice present items with an infallible map
    pub async fn execute<I, In, Out, M, F, Fut>(
        &self,
        items: I,
        mut map: M,
        on_batch: F,
        cancel: &CancellationToken,
    ) -> Result<SliceSummary>
    where
        I: IntoIterator<Item = In>,
        I::IntoIter: ExactSizeIterator,
        M: FnMut(In) -> Option<Out>,
        F: FnMut(Vec<Out>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.try_execute_nullable(
            items.into_iter().map(Some),
            move |item| Ok(map(item)),
            on_batch,
            cancel,
        )
        .await
    }

    /// Slice items that may be absent; an absent item aborts the run
    pub async fn execute_nullable<I, In, Out, M, F, Fut>(
        &self,
        items: I,
        mut map: M,
        on_batch: F,
        cancel: &CancellationToken,
    ) -> Result<SliceSummary>
    where
        I: IntoIterator<Item = Option<In>>,
        I::IntoIter: ExactSizeIterator,
        M: FnMut(In) -> Option<Out>,
        F: FnMut(Vec<Out>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.try_execute_nullable(items, move |item| Ok(map(item)), on_batch, cancel)
            .await
    }

    /// Slice present items with a fallible map
    pub async fn try_execute<I, In, Out, M, F, Fut>(
        &self,
        items: I,
        map: M,
        on_batch: F,
        cancel: &CancellationToken,
    ) -> Result<SliceSummary>
    where
        I: IntoIterator<Item = In>,
        I::IntoIter: ExactSizeIterator,
        M: FnMut(In) -> Result<Option<Out>>,
        F: FnMut(Vec<Out>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.try_execute_nullable(items.into_iter().map(Some), map, on_batch, cancel)
            .await
    }

    /// Core loop shared by every variant
    pub async fn try_execute_nullable<I, In, Out, M, F, Fut>(
        &self,
        items: I,
        mut map: M,
        mut on_batch: F,
        cancel: &CancellationToken,
    ) -> Result<SliceSummary>
    where
        I: IntoIterator<Item = Option<In>>,
        I::IntoIter: ExactSizeIterator,
        M: FnMut(In) -> Result<Option<Out>>,
        F: FnMut(Vec<Out>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let items = items.into_iter();
        let total = items.len();
        let mut summary = SliceSummary::default();
        let mut batch: Vec<Out> = Vec::with_capacity(self.batch_size.min(total));

        for (index, item) in items.enumerate() {
            let Some(item) = item else {
                return Err(BatchError::NullItem {
                    index,
                    batch_len: batch.len(),
                    total,
                });
            };

            let mapped = map(item).map_err(|e| match e {
                BatchError::MapFailed { .. } => e,
                other => BatchError::map_failed(index, other.to_string()),
            })?;

            match mapped {
                Some(mapped) => batch.push(mapped),
                None => {
                    summary.items_skipped += 1;
                    continue;
                }
            }

            if batch.len() == self.batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                self.submit(full, &mut on_batch, &mut summary, cancel).await?;
            }
        }

        // The trailing partial batch is never dropped
        if !batch.is_empty() {
            self.submit(batch, &mut on_batch, &mut summary, cancel).await?;
        }

        Ok(summary)
    }

    async fn submit<Out, F, Fut>(
        &self,
        batch: Vec<Out>,
        on_batch: &mut F,
        summary: &mut SliceSummary,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        F: FnMut(Vec<Out>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if cancel.is_cancelled() {
            warn!(
                batches_submitted = summary.batches,
                items_submitted = summary.items_submitted,
                "Batch slicing cancelled before next batch"
            );
            return Err(BatchError::cancelled("batch submission"));
        }

        let size = batch.len();
        debug!(batch_number = summary.batches + 1, batch_size = size, "Submitting batch");
        on_batch(batch).await?;

        summary.batches += 1;
        summary.items_submitted += size;
        Ok(())
    }
}

/// Slice `items` into batches of `batch_size` with no cancellation
pub async fn execute_in_batches<I, In, Out, M, F, Fut>(
    items: I,
    on_batch: F,
    map: M,
    batch_size: i64,
) -> Result<SliceSummary>
where
    I: IntoIterator<Item = In>,
    I::IntoIter: ExactSizeIterator,
    M: FnMut(In) -> Option<Out>,
    F: FnMut(Vec<Out>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    BatchSlicer::new(batch_size)
        .execute(items, map, on_batch, &CancellationToken::new())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Collected = Arc<Mutex<Vec<Vec<String>>>>;

    fn collector() -> (Collected, impl FnMut(Vec<String>) -> futures::future::Ready<Result<()>>) {
        let batches: Collected = Arc::new(Mutex::new(Vec::new()));
        let sink = batches.clone();
        let on_batch = move |batch: Vec<String>| {
            sink.lock().push(batch);
            futures::future::ready(Ok(()))
        };
        (batches, on_batch)
    }

    fn items(range: std::ops::RangeInclusive<usize>) -> Vec<String> {
        range.map(|i| i.to_string()).collect()
    }

    fn sizes(batches: &Collected) -> Vec<usize> {
        batches.lock().iter().map(Vec::len).collect()
    }

    #[tokio::test]
    async fn test_smoke_batches_of_two() {
        let (batches, on_batch) = collector();
        let summary = execute_in_batches(items(1..=5), on_batch, |s| Some(format!("mapped{s}")), 2)
            .await
            .unwrap();

        assert_eq!(sizes(&batches), vec![2, 2, 1]);
        assert_eq!(summary.items_submitted, 5);
        assert!(batches
            .lock()
            .iter()
            .flatten()
            .all(|s| s.starts_with("mapped")));
    }

    #[tokio::test]
    async fn test_all_items_smaller_than_batch_size() {
        let (batches, on_batch) = collector();
        execute_in_batches(items(1..=5), on_batch, Some, 100).await.unwrap();
        assert_eq!(sizes(&batches), vec![5]);
    }

    #[tokio::test]
    async fn test_batch_size_of_one() {
        let (batches, on_batch) = collector();
        execute_in_batches(items(1..=5), on_batch, Some, 1).await.unwrap();
        assert_eq!(sizes(&batches), vec![1, 1, 1, 1, 1]);
    }

    #[tokio::test]
    async fn test_non_positive_batch_size_is_clamped() {
        for batch_size in [0, -1, -100] {
            let (batches, on_batch) = collector();
            let summary = execute_in_batches(items(1..=3), on_batch, Some, batch_size)
                .await
                .unwrap();
            assert_eq!(sizes(&batches), vec![1, 1, 1]);
            assert_eq!(summary.batches, 3);
        }
    }

    #[tokio::test]
    async fn test_skipped_items_do_not_count() {
        let (batches, on_batch) = collector();
        let summary = execute_in_batches(
            items(1..=5),
            on_batch,
            |s| if s == "2" { None } else { Some(s) },
            5,
        )
        .await
        .unwrap();

        assert_eq!(sizes(&batches), vec![4]);
        assert_eq!(summary.items_submitted, 4);
        assert_eq!(summary.items_skipped, 1);
        assert!(!batches.lock()[0].contains(&"2".to_string()));
    }

    #[tokio::test]
    async fn test_default_batch_size_with_many_items() {
        let (batches, on_batch) = collector();
        let summary = execute_in_batches(items(1..=19_997), on_batch, Some, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();

        let sizes = sizes(&batches);
        assert_eq!(sizes.len(), 200);
        assert!(sizes[..199].iter().all(|&s| s == 100));
        assert_eq!(sizes[199], 97);
        assert_eq!(summary.items_submitted, 19_997);
    }

    #[tokio::test]
    async fn test_empty_input_submits_nothing() {
        let (batches, on_batch) = collector();
        let summary = execute_in_batches(Vec::<String>::new(), on_batch, Some, 10)
            .await
            .unwrap();
        assert_eq!(summary, SliceSummary::default());
        assert!(batches.lock().is_empty());

        let (batches, on_batch) = collector();
        execute_in_batches(items(1..=4), on_batch, |_s: String| None::<String>, 2)
            .await
            .unwrap();
        assert!(batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_null_item_aborts() {
        let (batches, on_batch) = collector();
        let input = vec![Some("1".to_string()), Some("2".to_string()), None, Some("4".to_string())];
        let err = BatchSlicer::new(2)
            .execute_nullable(input, Some, on_batch, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BatchError::NullItem {
                index: 2,
                batch_len: 0,
                total: 4
            }
        );
        // The first full batch went out before the null item was reached
        assert_eq!(sizes(&batches), vec![2]);
    }

    #[tokio::test]
    async fn test_map_error_aborts_instead_of_skipping() {
        let (batches, on_batch) = collector();
        let err = BatchSlicer::new(10)
            .try_execute(
                items(1..=3),
                |s| {
                    if s == "3" {
                        Err(BatchError::invalid_argument("item", "unparseable"))
                    } else {
                        Ok(Some(s))
                    }
                },
                on_batch,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, BatchError::MapFailed { index: 2, .. }));
        assert!(batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_callback_error_propagates() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let err = execute_in_batches(
            items(1..=6),
            move |_batch: Vec<String>| {
                *counter.lock() += 1;
                futures::future::ready(Err(BatchError::store_status("A", "submit_batch", 503, "busy")))
            },
            Some,
            2,
        )
        .await
        .unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_next_batch() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let batches: Collected = Arc::new(Mutex::new(Vec::new()));
        let sink = batches.clone();

        let err = BatchSlicer::new(2)
            .execute(
                items(1..=6),
                Some,
                move |batch: Vec<String>| {
                    sink.lock().push(batch);
                    trigger.cancel();
                    futures::future::ready(Ok(()))
                },
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(sizes(&batches), vec![2]);
    }
}
