//! # Table Batch Client
//!
//! One entry point per table: partition-aware batched writes, paged scans and
//! single-row helpers, all running through the same [`TablePool`].
//!
//! ```rust,no_run
//! use partition_batch::{BatchConfig, DynamicEntity, MemoryTableStore, TableBatchClient};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> partition_batch::Result<()> {
//! let client = TableBatchClient::from_store(MemoryTableStore::new("cards"), BatchConfig::default())?;
//! let names = vec![("deck-1", "ace"), ("deck-1", "king"), ("deck-2", "queen")];
//!
//! let applied = client
//!     .insert_or_merge_in_batches(
//!         names,
//!         |(deck, card)| DynamicEntity::new(deck, card).expect("non-blank keys"),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! assert_eq!(applied, 3);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::batch::{group_by_partition, try_group_by_partition, ParallelPartitionExecutor};
use crate::config::BatchConfig;
use crate::entity::{validate_key, DynamicEntity, TableEntity};
use crate::error::Result;
use crate::operation::{OperationKind, OperationResult, TableOperation};
use crate::pool::TablePool;
use crate::query::{ContinuationToken, TableQuery};
use crate::scan::{PagedScanner, ScanOutcome, TableLoader};
use crate::store::TableStore;

/// Batched writes, scans and point operations against one table
pub struct TableBatchClient<S: TableStore> {
    config: BatchConfig,
    executor: ParallelPartitionExecutor<S>,
    scanner: PagedScanner<S>,
}

impl<S: TableStore> Clone for TableBatchClient<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            executor: self.executor.clone(),
            scanner: self.scanner.clone(),
        }
    }
}

impl<S: TableStore> std::fmt::Debug for TableBatchClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableBatchClient")
            .field("table", &self.table_name())
            .field("config", &self.config)
            .finish()
    }
}

impl<S: TableStore> TableBatchClient<S> {
    pub fn new(pool: Arc<TablePool<S>>, config: BatchConfig) -> Result<Self> {
        let executor = ParallelPartitionExecutor::new(pool.clone(), &config)?;
        let scanner = PagedScanner::new(pool, &config)?;
        Ok(Self {
            config,
            executor,
            scanner,
        })
    }

    /// Share one thread-safe store handle across `config.table_pool_size` pool slots
    pub fn from_store(store: S, config: BatchConfig) -> Result<Self> {
        config.validate()?;
        let pool = TablePool::shared(Arc::new(store), config.table_pool_size)?;
        Self::new(Arc::new(pool), config)
    }

    pub fn table_name(&self) -> &str {
        self.pool().table_name()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<TablePool<S>> {
        self.executor.pool()
    }

    pub fn executor(&self) -> &ParallelPartitionExecutor<S> {
        &self.executor
    }

    pub fn scanner(&self) -> &PagedScanner<S> {
        &self.scanner
    }

    // ---------------------------------------------------------------------
    // Batched writes
    // ---------------------------------------------------------------------

    /// Map, group by partition and submit every entity as a `kind` operation.
    ///
    /// Returns the number of operations applied. On failure, partitions other
    /// than the failing one may already have been written.
    #[instrument(skip(self, items, map, cancel), fields(table = %self.table_name(), operation = %kind))]
    pub async fn execute_in_batches<I, E, M>(
        &self,
        kind: OperationKind,
        items: I,
        map: M,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        I: IntoIterator,
        E: TableEntity + 'static,
        M: FnMut(I::Item) -> E,
    {
        let groups = group_by_partition(items, map)?;
        debug!(partitions = groups.len(), entities = groups.item_count(), "Grouped entities");
        self.executor.execute_grouped(groups, kind, cancel).await
    }

    /// Like [`execute_in_batches`](Self::execute_in_batches), with a map that can reject an item
    pub async fn try_execute_in_batches<I, E, M>(
        &self,
        kind: OperationKind,
        items: I,
        map: M,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        I: IntoIterator,
        E: TableEntity + 'static,
        M: FnMut(I::Item) -> Result<E>,
    {
        let groups = try_group_by_partition(items, map)?;
        self.executor.execute_grouped(groups, kind, cancel).await
    }

    pub async fn insert_or_merge_in_batches<I, E, M>(
        &self,
        items: I,
        map: M,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        I: IntoIterator,
        E: TableEntity + 'static,
        M: FnMut(I::Item) -> E,
    {
        self.execute_in_batches(OperationKind::InsertOrMerge, items, map, cancel)
            .await
    }

    pub async fn insert_in_batches<I, E, M>(
        &self,
        items: I,
        map: M,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        I: IntoIterator,
        E: TableEntity + 'static,
        M: FnMut(I::Item) -> E,
    {
        self.execute_in_batches(OperationKind::Insert, items, map, cancel)
            .await
    }

    pub async fn insert_or_replace_in_batches<I, E, M>(
        &self,
        items: I,
        map: M,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        I: IntoIterator,
        E: TableEntity + 'static,
        M: FnMut(I::Item) -> E,
    {
        self.execute_in_batches(OperationKind::InsertOrReplace, items, map, cancel)
            .await
    }

    /// Merge into existing rows; a missing row fails its whole batch
    pub async fn merge_in_batches<I, E, M>(
        &self,
        items: I,
        map: M,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        I: IntoIterator,
        E: TableEntity + 'static,
        M: FnMut(I::Item) -> E,
    {
        self.execute_in_batches(OperationKind::Merge, items, map, cancel)
            .await
    }

    /// Delete rows, honouring each entity's ETag (`None` deletes unconditionally)
    pub async fn delete_in_batches<I, E, M>(
        &self,
        items: I,
        map: M,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        I: IntoIterator,
        E: TableEntity + 'static,
        M: FnMut(I::Item) -> E,
    {
        self.execute_in_batches(OperationKind::Delete, items, map, cancel)
            .await
    }

    // ---------------------------------------------------------------------
    // Scans
    // ---------------------------------------------------------------------

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
        self.scanner
            .scan_partitions(partition_keys, map, cancel)
            .await
    }

    pub async fn scan_table<T, M>(&self, map: M, cancel: &CancellationToken) -> Result<ScanOutcome<T>>
    where
        T: Send + 'static,
        M: Fn(DynamicEntity) -> T + Send + Sync + 'static,
    {
        self.scanner.scan_table(map, cancel).await
    }

    /// Every page of an arbitrary query
    pub async fn execute_query(
        &self,
        query: TableQuery,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome<DynamicEntity>> {
        self.scanner.execute_query(query, cancel).await
    }

    /// Every row of one partition
    pub async fn get_all_entities_in_partition(&self, partition_key: &str) -> Result<Vec<DynamicEntity>> {
        validate_key("partition_key", partition_key)?;
        let outcome = self
            .scanner
            .execute_query(TableQuery::for_partition(partition_key), &CancellationToken::new())
            .await?;
        Ok(outcome.into_rows())
    }

    /// Start loading `partition_keys` in the background
    pub fn load_partitions<T, M>(&self, partition_keys: Vec<String>, map: M) -> TableLoader<T>
    where
        T: Send + Sync + 'static,
        M: Fn(DynamicEntity) -> Result<T> + Send + Sync + 'static,
    {
        TableLoader::for_partitions(self.scanner.clone(), partition_keys, map)
    }

    // ---------------------------------------------------------------------
    // Single rows
    // ---------------------------------------------------------------------

    /// Point lookup by both keys
    #[instrument(skip(self), fields(table = %self.table_name()))]
    pub async fn get_entity(&self, partition_key: &str, row_key: &str) -> Result<Option<DynamicEntity>> {
        validate_key("partition_key", partition_key)?;
        validate_key("row_key", row_key)?;
        self.first_row(TableQuery::point(partition_key, row_key)).await
    }

    /// Fails with status 409 when the row already exists
    pub async fn insert_entity(&self, entity: impl TableEntity) -> Result<OperationResult> {
        self.execute_single(TableOperation::insert(entity)).await
    }

    pub async fn insert_or_merge_entity(&self, entity: impl TableEntity) -> Result<OperationResult> {
        self.execute_single(TableOperation::insert_or_merge(entity)).await
    }

    pub async fn insert_or_replace_entity(&self, entity: impl TableEntity) -> Result<OperationResult> {
        self.execute_single(TableOperation::insert_or_replace(entity)).await
    }

    /// Merge into an existing row. The caller sets the ETag; a stale one fails with 412.
    pub async fn update_entity(&self, entity: impl TableEntity) -> Result<OperationResult> {
        self.execute_single(TableOperation::merge(entity)).await
    }

    /// Delete a row regardless of its current version
    pub async fn delete(&self, partition_key: &str, row_key: &str) -> Result<()> {
        let operation = TableOperation::delete_by_key(partition_key, row_key)?;
        self.execute_single(operation).await.map(|_| ())
    }

    pub async fn row_exists_for_partition_key(&self, partition_key: &str) -> Result<bool> {
        validate_key("partition_key", partition_key)?;
        self.any_row(TableQuery::for_partition(partition_key)).await
    }

    pub async fn row_exists_for_row_key(&self, row_key: &str) -> Result<bool> {
        validate_key("row_key", row_key)?;
        self.any_row(TableQuery::with_filter(crate::query::row_key_filter(row_key)))
            .await
    }

    pub async fn row_exists(&self, partition_key: &str, row_key: &str) -> Result<bool> {
        validate_key("partition_key", partition_key)?;
        validate_key("row_key", row_key)?;
        self.any_row(TableQuery::point(partition_key, row_key)).await
    }

    async fn execute_single(&self, operation: TableOperation) -> Result<OperationResult> {
        validate_key("partition_key", operation.partition_key())?;
        validate_key("row_key", operation.row_key())?;
        debug!(
            table = %self.table_name(),
            operation = %operation.kind,
            partition_key = %operation.partition_key(),
            row_key = %operation.row_key(),
            "Executing single operation"
        );
        self.pool()
            .execute(move |store| async move { store.execute(operation).await })
            .await
    }

    async fn any_row(&self, query: TableQuery) -> Result<bool> {
        Ok(self.first_row(query.keys_only()).await?.is_some())
    }

    /// First row of `query`, following continuation tokens past empty pages
    async fn first_row(&self, query: TableQuery) -> Result<Option<DynamicEntity>> {
        let query = Arc::new(query.take(1));
        let mut token: Option<ContinuationToken> = None;

        loop {
            let page_query = query.clone();
            let resume = token.take();
            let segment = self
                .pool()
                .execute(move |store| async move { store.query_segment(&page_query, resume).await })
                .await?;

            if let Some(row) = segment.rows.into_iter().next() {
                return Ok(Some(row));
            }
            match segment.continuation_token {
                Some(next) => token = Some(next),
                None => return Ok(None),
            }
        }
    }
}
