//! # Paged Scanner
//!
//! Follows continuation tokens until a query is exhausted, mapping every returned
//! row into a shared [`ScanAccumulator`]. A partition scan runs one continuation
//! chain per partition key, at most `max_parallelism` chains at a time; a table
//! scan or an arbitrary query is a single chain.
//!
//! Each chain moves through [`ScanState`]:
//! `NotStarted -> Scanning(None) -> Scanning(Some(token)) -> ... -> Done`.
//! Cancellation is checked before every page request. A cancelled scan returns
//! the rows gathered so far as [`Completeness::Indeterminate`]; store and map
//! failures are returned as errors once every started chain has finished.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::BatchConfig;
use crate::entity::{validate_key, DynamicEntity};
use crate::error::{keep_first_failure, BatchError, Result};
use crate::logging::log_scan_operation;
use crate::pool::TablePool;
use crate::query::{ContinuationToken, TableQuery};
use crate::scan::accumulator::{ScanAccumulator, ScanOutcome};
use crate::store::TableStore;

/// Position of one continuation chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    NotStarted,
    /// Next request resumes at the token; `None` requests from the start
    Scanning(Option<ContinuationToken>),
    Done,
}

impl ScanState {
    /// State after a page with `next` as its continuation token
    pub fn advance(self, next: Option<ContinuationToken>) -> Self {
        match (self, next) {
            (Self::Done, _) => Self::Done,
            (_, Some(token)) => Self::Scanning(Some(token)),
            (_, None) => Self::Done,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// How far one chain got
#[derive(Debug, Clone, Copy, Default)]
struct ChainProgress {
    pages: usize,
    rows: usize,
    complete: bool,
}

/// Concurrent continuation-token scanner over one table
pub struct PagedScanner<S: TableStore> {
    pool: Arc<TablePool<S>>,
    page_size: Option<u32>,
    max_parallelism: usize,
}

impl<S: TableStore> Clone for PagedScanner<S> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            page_size: self.page_size,
            max_parallelism: self.max_parallelism,
        }
    }
}

impl<S: TableStore> std::fmt::Debug for PagedScanner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedScanner")
            .field("table", &self.pool.table_name())
            .field("page_size", &self.page_size)
            .field("max_parallelism", &self.max_parallelism)
            .finish()
    }
}

impl<S: TableStore> PagedScanner<S> {
    pub fn new(pool: Arc<TablePool<S>>, config: &BatchConfig) -> Result<Self> {
        config.validate()?;
        Self::with_settings(pool, config.scan_page_size, config.effective_max_parallelism())
    }

    pub fn with_settings(
        pool: Arc<TablePool<S>>,
        page_size: Option<u32>,
        max_parallelism: usize,
    ) -> Result<Self> {
        if max_parallelism == 0 {
            return Err(BatchError::invalid_argument(
                "max_parallelism",
                "Must allow at least one concurrent partition scan",
            ));
        }
        if page_size == Some(0) {
            return Err(BatchError::invalid_argument(
                "page_size",
                "A page must hold at least one row",
            ));
        }
        Ok(Self {
            pool,
            page_size,
            max_parallelism,
        })
    }

    pub fn table_name(&self) -> &str {
        self.pool.table_name()
    }

    /// Scan every listed partition and map each row
    pub async fn scan_partitions<K, T, M>(
        &self,
        partition_keys: K,
        map: M,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome<T>>
    where
        K: IntoIterator,
        K::Item: Into<String>,
        T: Send + 'static,
        M: Fn(DynamicEntity) -> T + Send + Sync + 'static,
    {
        self.try_scan_partitions(partition_keys, move |row| Ok(map(row)), cancel)
            .await
    }

    /// Like [`scan_partitions`](Self::scan_partitions), with a map that can fail
    #[instrument(skip_all, fields(table = %self.pool.table_name()))]
    pub async fn try_scan_partitions<K, T, M>(
        &self,
        partition_keys: K,
        map: M,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome<T>>
    where
        K: IntoIterator,
        K::Item: Into<String>,
        T: Send + 'static,
        M: Fn(DynamicEntity) -> Result<T> + Send + Sync + 'static,
    {
        let partition_keys = unique_partition_keys(partition_keys)?;
        if partition_keys.is_empty() {
            debug!("No partitions to scan");
            return Ok(ScanOutcome::complete(Vec::new()));
        }

        let started = Instant::now();
        let partition_count = partition_keys.len();
        let map = Arc::new(map);
        let accumulator = Arc::new(ScanAccumulator::new());
        let mut pending = partition_keys.into_iter();
        let mut join_set: JoinSet<Result<ChainProgress>> = JoinSet::new();
        let mut first_error: Option<BatchError> = None;
        let mut complete = true;

        loop {
            while join_set.len() < self.max_parallelism && !cancel.is_cancelled() {
                let Some(partition_key) = pending.next() else {
                    break;
                };
                let query = TableQuery::for_partition(&partition_key).with_default_take(self.page_size);
                join_set.spawn(scan_chain(
                    self.pool.clone(),
                    query,
                    partition_key,
                    map.clone(),
                    accumulator.clone(),
                    cancel.clone(),
                ));
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };

            match joined {
                Ok(Ok(progress)) => complete &= progress.complete,
                Ok(Err(e)) => keep_first_failure(&mut first_error, e),
                Err(join_error) => {
                    error!(error = %join_error, "Partition scan task panicked");
                    keep_first_failure(
                        &mut first_error,
                        BatchError::task_join(format!("Partition scan failed: {join_error}")),
                    );
                }
            }
        }

        let not_started = pending.len();
        if not_started > 0 {
            warn!(not_started, "Partition scans left unstarted after cancellation");
            complete = false;
        }

        let rows = accumulator.freeze();
        let duration_ms = Some(started.elapsed().as_millis() as u64);
        log_scan_operation(
            self.pool.table_name(),
            partition_count,
            rows.len(),
            complete && first_error.is_none(),
            duration_ms,
        );

        if let Some(e) = first_error {
            return Err(e);
        }

        info!(partitions = partition_count, rows = rows.len(), complete, "Partition scan finished");
        Ok(if complete {
            ScanOutcome::complete(rows)
        } else {
            ScanOutcome::indeterminate(rows)
        })
    }

    /// Scan the whole table as a single continuation chain
    pub async fn scan_table<T, M>(&self, map: M, cancel: &CancellationToken) -> Result<ScanOutcome<T>>
    where
        T: Send + 'static,
        M: Fn(DynamicEntity) -> T + Send + Sync + 'static,
    {
        self.try_scan_query(TableQuery::all(), move |row| Ok(map(row)), cancel)
            .await
    }

    pub async fn try_scan_table<T, M>(
        &self,
        map: M,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome<T>>
    where
        T: Send + 'static,
        M: Fn(DynamicEntity) -> Result<T> + Send + Sync + 'static,
    {
        self.try_scan_query(TableQuery::all(), map, cancel).await
    }

    /// Collect every page of an arbitrary query
    pub async fn execute_query(
        &self,
        query: TableQuery,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome<DynamicEntity>> {
        self.try_scan_query(query, Ok, cancel).await
    }

    /// Follow one continuation chain for `query`, mapping every row
    #[instrument(skip_all, fields(table = %self.pool.table_name(), filter = ?query.filter_string()))]
    pub async fn try_scan_query<T, M>(
        &self,
        query: TableQuery,
        map: M,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome<T>>
    where
        T: Send + 'static,
        M: Fn(DynamicEntity) -> Result<T> + Send + Sync + 'static,
    {
        let started = Instant::now();
        let accumulator = Arc::new(ScanAccumulator::new());
        let scope = query
            .filter
            .as_ref()
            .and_then(|filter| filter.pinned_partition_key())
            .unwrap_or_default()
            .to_string();

        let progress = scan_chain(
            self.pool.clone(),
            query.with_default_take(self.page_size),
            scope,
            Arc::new(map),
            accumulator.clone(),
            cancel.clone(),
        )
        .await;

        let rows = accumulator.freeze();
        let duration_ms = Some(started.elapsed().as_millis() as u64);
        let complete = progress.as_ref().map(|p| p.complete).unwrap_or(false);
        log_scan_operation(self.pool.table_name(), 1, rows.len(), complete, duration_ms);

        let progress = progress?;
        debug!(pages = progress.pages, rows = progress.rows, complete, "Query scan finished");
        Ok(if complete {
            ScanOutcome::complete(rows)
        } else {
            ScanOutcome::indeterminate(rows)
        })
    }
}

/// Validate partition keys and drop repeats, keeping first-seen order
fn unique_partition_keys<K>(partition_keys: K) -> Result<Vec<String>>
where
    K: IntoIterator,
    K::Item: Into<String>,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for key in partition_keys {
        let key: String = key.into();
        validate_key("partition_key", &key)?;
        if seen.insert(key.clone()) {
            unique.push(key);
        }
    }
    Ok(unique)
}

/// Request pages of `query` until the store stops returning a continuation token
async fn scan_chain<S, T, M>(
    pool: Arc<TablePool<S>>,
    query: TableQuery,
    scope: String,
    map: Arc<M>,
    accumulator: Arc<ScanAccumulator<T>>,
    cancel: CancellationToken,
) -> Result<ChainProgress>
where
    S: TableStore,
    T: Send + 'static,
    M: Fn(DynamicEntity) -> Result<T> + Send + Sync + 'static,
{
    let query = Arc::new(query);
    let mut progress = ChainProgress::default();
    let mut state = ScanState::NotStarted;

    loop {
        let token = match state {
            ScanState::Done => break,
            ScanState::NotStarted => None,
            ScanState::Scanning(token) => token,
        };

        if cancel.is_cancelled() {
            warn!(
                partition_key = %scope,
                pages = progress.pages,
                rows = progress.rows,
                "Scan cancelled before next page"
            );
            return Ok(progress);
        }

        let page_query = query.clone();
        let resume = token.clone();
        let segment = pool
            .execute(move |store| async move { store.query_segment(&page_query, resume).await })
            .await?;

        progress.pages += 1;
        let page_rows = segment.rows.len();
        let mut mapped = Vec::with_capacity(page_rows);
        for row in segment.rows {
            let index = progress.rows + mapped.len();
            mapped.push((map.as_ref())(row).map_err(|e| match e {
                BatchError::MapFailed { .. } => e,
                other => BatchError::map_failed(index, other.to_string()),
            })?);
        }
        accumulator.extend(mapped);
        progress.rows += page_rows;

        debug!(
            partition_key = %scope,
            page = progress.pages,
            rows = page_rows,
            has_more = segment.continuation_token.is_some(),
            "Scanned page"
        );

        state = ScanState::Scanning(token).advance(segment.continuation_token);
    }

    progress.complete = true;
    Ok(progress)
}
