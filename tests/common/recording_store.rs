//! A [`TableStore`] wrapper that records every call and can inject failures,
//! latency and cancellation.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use partition_batch::{
    BatchError, BatchResult, ContinuationToken, DynamicEntity, MemoryTableStore, OperationKind,
    OperationResult, QuerySegment, Result, TableOperation, TableQuery, TableStore,
};

/// One `submit_batch` call as the store saw it
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBatch {
    pub partition_key: String,
    pub row_keys: Vec<String>,
    pub operation_partitions: Vec<String>,
    pub kinds: Vec<OperationKind>,
}

impl RecordedBatch {
    pub fn len(&self) -> usize {
        self.row_keys.len()
    }
}

pub struct RecordingStore {
    inner: MemoryTableStore,
    batches: Mutex<Vec<RecordedBatch>>,
    creates: AtomicUsize,
    pages: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    latency: Option<Duration>,
    failing_partitions: Mutex<HashMap<String, u16>>,
    cancel_after_pages: Mutex<Option<(usize, CancellationToken)>>,
}

impl RecordingStore {
    pub fn new(table_name: &str) -> Self {
        Self::wrap(MemoryTableStore::new(table_name))
    }

    pub fn wrap(inner: MemoryTableStore) -> Self {
        Self {
            inner,
            batches: Mutex::new(Vec::new()),
            creates: AtomicUsize::new(0),
            pages: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            latency: None,
            failing_partitions: Mutex::new(HashMap::new()),
            cancel_after_pages: Mutex::new(None),
        }
    }

    /// Sleep inside every batch and page call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reject every batch and page request for `partition_key` with `status`
    pub fn fail_partition(&self, partition_key: &str, status: u16) {
        self.failing_partitions
            .lock()
            .insert(partition_key.to_string(), status);
    }

    /// Cancel `token` once `pages` query segments have been served
    pub fn cancel_after_pages(&self, pages: usize, token: CancellationToken) {
        *self.cancel_after_pages.lock() = Some((pages, token));
    }

    pub fn inner(&self) -> &MemoryTableStore {
        &self.inner
    }

    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.batches.lock().clone()
    }

    pub fn batches_for(&self, partition_key: &str) -> Vec<RecordedBatch> {
        self.batches
            .lock()
            .iter()
            .filter(|b| b.partition_key == partition_key)
            .cloned()
            .collect()
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.pages.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn injected_failure(&self, partition_key: &str, operation: &str) -> Result<()> {
        match self.failing_partitions.lock().get(partition_key) {
            Some(status) => Err(BatchError::store_status(
                partition_key,
                operation,
                *status,
                "injected failure",
            )),
            None => Ok(()),
        }
    }

    async fn tracked<T>(&self, call: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let result = call.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl TableStore for RecordingStore {
    fn table_name(&self) -> &str {
        self.inner.table_name()
    }

    async fn create_if_not_exists(&self) -> Result<bool> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_if_not_exists().await
    }

    async fn submit_batch(
        &self,
        partition_key: &str,
        operations: Vec<TableOperation>,
    ) -> Result<BatchResult> {
        self.batches.lock().push(RecordedBatch {
            partition_key: partition_key.to_string(),
            row_keys: operations.iter().map(|op| op.row_key().to_string()).collect(),
            operation_partitions: operations
                .iter()
                .map(|op| op.partition_key().to_string())
                .collect(),
            kinds: operations.iter().map(|op| op.kind).collect(),
        });

        self.tracked(async {
            self.injected_failure(partition_key, "submit_batch")?;
            self.inner.submit_batch(partition_key, operations).await
        })
        .await
    }

    async fn execute(&self, operation: TableOperation) -> Result<OperationResult> {
        self.injected_failure(operation.partition_key(), operation.kind.name())?;
        self.inner.execute(operation).await
    }

    async fn query_segment(
        &self,
        query: &TableQuery,
        continuation_token: Option<ContinuationToken>,
    ) -> Result<QuerySegment<DynamicEntity>> {
        let served = self.pages.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, token)) = self.cancel_after_pages.lock().as_ref() {
            if served >= *after {
                token.cancel();
            }
        }

        let pinned = query
            .filter
            .as_ref()
            .and_then(|f| f.pinned_partition_key())
            .map(str::to_string);

        self.tracked(async {
            if let Some(partition_key) = pinned.as_deref() {
                self.injected_failure(partition_key, "query_segment")?;
            }
            self.inner.query_segment(query, continuation_token).await
        })
        .await
    }
}
