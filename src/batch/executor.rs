//! # Parallel Partition Executor
//!
//! Runs one job per partition group, with at most `max_parallelism` jobs in
//! flight. Each job slices its group into single-partition batches and submits
//! them sequentially through the table pool; the number of applied operations is
//! accumulated in a shared atomic counter.
//!
//! Every started job is awaited before the call returns. On failure the first
//! non-cancellation error is reported. With `cancel_siblings_on_failure` a
//! failing job also cancels a child token shared by its siblings, which then stop
//! at their next batch boundary; the caller's token is never cancelled.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::batch::grouper::PartitionGroups;
use crate::batch::slicer::BatchSlicer;
use crate::config::BatchConfig;
use crate::constants::limits::MAX_OPERATIONS_PER_BATCH;
use crate::entity::TableEntity;
use crate::error::{keep_first_failure, BatchError, Result};
use crate::logging::log_batch_operation;
use crate::operation::{validate_batch, OperationKind, TableOperation};
use crate::pool::TablePool;
use crate::store::TableStore;

/// Totals of one grouped execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Operations the store reported as applied
    pub total_operations: usize,
    /// Partition jobs that completed successfully
    pub partitions: usize,
    /// Batches submitted by successful partition jobs
    pub batches: usize,
}

/// Result of one partition job
#[derive(Debug, Clone, Copy)]
struct PartitionOutcome {
    applied: usize,
    batches: usize,
}

/// Bounded-parallel submission of partition groups
pub struct ParallelPartitionExecutor<S: TableStore> {
    pool: Arc<TablePool<S>>,
    slicer: BatchSlicer,
    max_parallelism: usize,
    cancel_siblings_on_failure: bool,
}

impl<S: TableStore> Clone for ParallelPartitionExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            slicer: self.slicer,
            max_parallelism: self.max_parallelism,
            cancel_siblings_on_failure: self.cancel_siblings_on_failure,
        }
    }
}

impl<S: TableStore> std::fmt::Debug for ParallelPartitionExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelPartitionExecutor")
            .field("table", &self.pool.table_name())
            .field("batch_size", &self.slicer.batch_size())
            .field("max_parallelism", &self.max_parallelism)
            .field("cancel_siblings_on_failure", &self.cancel_siblings_on_failure)
            .finish()
    }
}

impl<S: TableStore> ParallelPartitionExecutor<S> {
    /// Build an executor from validated configuration
    pub fn new(pool: Arc<TablePool<S>>, config: &BatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_settings(
            pool,
            config.batch_size,
            config.effective_max_parallelism(),
        )?
        .with_cancel_siblings_on_failure(config.cancel_siblings_on_failure))
    }

    /// Build an executor from explicit settings. `batch_size` is clamped to at least 1
    /// and may not exceed the store's per-batch limit.
    pub fn with_settings(
        pool: Arc<TablePool<S>>,
        batch_size: i64,
        max_parallelism: usize,
    ) -> Result<Self> {
        if max_parallelism == 0 {
            return Err(BatchError::invalid_argument(
                "max_parallelism",
                "Must allow at least one concurrent partition",
            ));
        }
        let slicer = BatchSlicer::new(batch_size);
        if slicer.batch_size() > MAX_OPERATIONS_PER_BATCH {
            return Err(BatchError::invalid_argument(
                "batch_size",
                format!(
                    "A batch may contain at most {MAX_OPERATIONS_PER_BATCH} operations, got {batch_size}"
                ),
            ));
        }
        Ok(Self {
            pool,
            slicer,
            max_parallelism,
            cancel_siblings_on_failure: false,
        })
    }

    pub fn with_cancel_siblings_on_failure(mut self, enabled: bool) -> Self {
        self.cancel_siblings_on_failure = enabled;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.slicer.batch_size()
    }

    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    pub fn pool(&self) -> &Arc<TablePool<S>> {
        &self.pool
    }

    /// Submit every group as `kind` operations and return the applied operation count
    pub async fn execute_grouped<E>(
        &self,
        groups: PartitionGroups<E>,
        kind: OperationKind,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        E: TableEntity + 'static,
    {
        self.execute_grouped_with_summary(groups, kind, cancel)
            .await
            .map(|summary| summary.total_operations)
    }

    /// Like [`execute_grouped`](Self::execute_grouped), reporting partition and batch counts too
    #[instrument(
        skip(self, groups, kind, cancel),
        fields(
            table = %self.pool.table_name(),
            operation = %kind,
            partitions = groups.len(),
            max_parallelism = self.max_parallelism
        )
    )]
    pub async fn execute_grouped_with_summary<E>(
        &self,
        groups: PartitionGroups<E>,
        kind: OperationKind,
        cancel: &CancellationToken,
    ) -> Result<ExecutionSummary>
    where
        E: TableEntity + 'static,
    {
        if groups.is_empty() {
            debug!("No partition groups to execute");
            return Ok(ExecutionSummary::default());
        }

        let started = Instant::now();
        let siblings = cancel.child_token();
        let total = Arc::new(AtomicUsize::new(0));
        let mut pending = groups.into_groups().into_iter();
        let mut join_set: JoinSet<Result<PartitionOutcome>> = JoinSet::new();
        let mut summary = ExecutionSummary::default();
        let mut first_error: Option<BatchError> = None;

        loop {
            // Start partition jobs up to the parallelism bound
            while join_set.len() < self.max_parallelism && !siblings.is_cancelled() {
                let Some((partition_key, entities)) = pending.next() else {
                    break;
                };
                join_set.spawn(run_partition(
                    self.pool.clone(),
                    self.slicer,
                    partition_key,
                    entities,
                    kind,
                    total.clone(),
                    siblings.clone(),
                    self.cancel_siblings_on_failure,
                ));
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };

            match joined {
                Ok(Ok(outcome)) => {
                    debug!(applied = outcome.applied, batches = outcome.batches, "Partition job joined");
                    summary.partitions += 1;
                    summary.batches += outcome.batches;
                }
                Ok(Err(e)) => keep_first_failure(&mut first_error, e),
                Err(join_error) => {
                    error!(error = %join_error, "Partition task panicked");
                    if self.cancel_siblings_on_failure {
                        siblings.cancel();
                    }
                    keep_first_failure(
                        &mut first_error,
                        BatchError::task_join(format!("Partition task failed: {join_error}")),
                    );
                }
            }
        }

        let not_started = pending.len();
        if not_started > 0 {
            warn!(not_started, "Partition groups left unstarted after cancellation");
            keep_first_failure(&mut first_error, BatchError::cancelled("partition scheduling"));
        }

        summary.total_operations = total.load(Ordering::SeqCst);
        let duration_ms = Some(started.elapsed().as_millis() as u64);

        if let Some(e) = first_error {
            log_batch_operation(kind.name(), None, summary.total_operations, "failed", duration_ms);
            return Err(e);
        }

        log_batch_operation(kind.name(), None, summary.total_operations, "completed", duration_ms);
        info!(
            total_operations = summary.total_operations,
            partitions = summary.partitions,
            batches = summary.batches,
            "Grouped batch execution completed"
        );
        Ok(summary)
    }
}

/// Slice one partition group and submit its batches in order
#[allow(clippy::too_many_arguments)]
async fn run_partition<S, E>(
    pool: Arc<TablePool<S>>,
    slicer: BatchSlicer,
    partition_key: String,
    entities: Vec<E>,
    kind: OperationKind,
    total: Arc<AtomicUsize>,
    siblings: CancellationToken,
    cancel_siblings_on_failure: bool,
) -> Result<PartitionOutcome>
where
    S: TableStore,
    E: TableEntity + 'static,
{
    let started = Instant::now();
    let applied = Arc::new(AtomicUsize::new(0));

    let sliced = slicer
        .execute(
            entities,
            |entity| Some(TableOperation::new(kind, entity)),
            |operations: Vec<TableOperation>| {
                let pool = pool.clone();
                let partition_key = partition_key.clone();
                let total = total.clone();
                let applied = applied.clone();
                async move {
                    validate_batch(&partition_key, &operations)?;
                    let submit_key = partition_key.clone();
                    let result = pool
                        .execute(move |store| async move {
                            store.submit_batch(&submit_key, operations).await
                        })
                        .await?;

                    let count = result.count();
                    total.fetch_add(count, Ordering::SeqCst);
                    applied.fetch_add(count, Ordering::SeqCst);
                    debug!(partition_key = %partition_key, applied = count, "Batch applied");
                    Ok(())
                }
            },
            &siblings,
        )
        .await;

    let applied = applied.load(Ordering::SeqCst);
    let duration_ms = Some(started.elapsed().as_millis() as u64);

    match sliced {
        Ok(summary) => {
            log_batch_operation(kind.name(), Some(&partition_key), applied, "completed", duration_ms);
            Ok(PartitionOutcome {
                applied,
                batches: summary.batches,
            })
        }
        Err(e) => {
            if e.is_cancelled() {
                debug!(partition_key = %partition_key, applied, "Partition job cancelled");
            } else {
                error!(partition_key = %partition_key, applied, error = %e, "Partition job failed");
                if cancel_siblings_on_failure {
                    siblings.cancel();
                }
            }
            log_batch_operation(kind.name(), Some(&partition_key), applied, "failed", duration_ms);
            Err(e)
        }
    }
}
