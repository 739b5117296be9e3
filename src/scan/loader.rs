//! # Background Table Loader
//!
//! Starts a partition (or whole-table) scan on construction and hands out the
//! finished rows as a shared, immutable slice. Every reader waits for the same
//! load and receives the same rows or the same error. Dropping the loader stops
//! an unfinished load.

use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::entity::DynamicEntity;
use crate::error::{BatchError, Result};
use crate::scan::accumulator::ScanOutcome;
use crate::scan::scanner::PagedScanner;
use crate::store::TableStore;

type LoadResult<T> = Result<Arc<[T]>>;

/// Rows of a scan started in the background
pub struct TableLoader<T> {
    task: Mutex<Option<JoinHandle<LoadResult<T>>>>,
    abort: AbortHandle,
    cancel: CancellationToken,
    loaded: OnceCell<LoadResult<T>>,
}

impl<T> std::fmt::Debug for TableLoader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableLoader")
            .field("loaded", &self.loaded.initialized())
            .finish()
    }
}

impl<T: Send + Sync + 'static> TableLoader<T> {
    /// Start loading `partition_keys`. Must be called inside a tokio runtime.
    pub fn for_partitions<S, M>(scanner: PagedScanner<S>, partition_keys: Vec<String>, map: M) -> Self
    where
        S: TableStore,
        M: Fn(DynamicEntity) -> Result<T> + Send + Sync + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let outcome = scanner.try_scan_partitions(partition_keys, map, &token).await?;
            finish(outcome)
        });
        Self::from_task(task, cancel)
    }

    /// Start loading every row of the table. Must be called inside a tokio runtime.
    pub fn for_table<S, M>(scanner: PagedScanner<S>, map: M) -> Self
    where
        S: TableStore,
        M: Fn(DynamicEntity) -> Result<T> + Send + Sync + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let outcome = scanner.try_scan_table(map, &token).await?;
            finish(outcome)
        });
        Self::from_task(task, cancel)
    }

    fn from_task(task: JoinHandle<LoadResult<T>>, cancel: CancellationToken) -> Self {
        Self {
            abort: task.abort_handle(),
            task: Mutex::new(Some(task)),
            cancel,
            loaded: OnceCell::new(),
        }
    }

    /// Wait for the load, then return the shared rows
    pub async fn all_entities(&self) -> Result<Arc<[T]>> {
        self.loaded
            .get_or_init(|| async {
                // The handle stays in place while awaited, so a reader dropped
                // mid-load leaves it for the next one
                let mut task = self.task.lock().await;
                let Some(handle) = task.as_mut() else {
                    return Err(BatchError::task_join("Table load task is no longer available"));
                };
                let joined = handle.await;
                task.take();
                match joined {
                    Ok(result) => result,
                    Err(join_error) => {
                        warn!(error = %join_error, "Table load task failed");
                        Err(BatchError::task_join(format!("Table load failed: {join_error}")))
                    }
                }
            })
            .await
            .clone()
    }

    /// Whether a reader has already observed the finished load
    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }
}

impl<T> Drop for TableLoader<T> {
    fn drop(&mut self) {
        if !self.loaded.initialized() {
            debug!("Stopping unfinished table load");
        }
        self.cancel.cancel();
        self.abort.abort();
    }
}

fn finish<T>(outcome: ScanOutcome<T>) -> LoadResult<T> {
    if !outcome.is_complete() {
        return Err(BatchError::cancelled("table load"));
    }
    Ok(Arc::from(outcome.into_rows()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::TableOperation;
    use crate::pool::TablePool;
    use crate::store::MemoryTableStore;

    async fn scanner_with_rows(rows: usize) -> PagedScanner<MemoryTableStore> {
        let store = Arc::new(MemoryTableStore::new("cards").with_max_page_size(4));
        store.create_if_not_exists().await.unwrap();
        let ops = (0..rows)
            .map(|i| TableOperation::insert(DynamicEntity::new("A", format!("{i:03}")).unwrap()))
            .collect();
        store.submit_batch("A", ops).await.unwrap();

        let pool = Arc::new(TablePool::shared(store, 2).unwrap());
        PagedScanner::with_settings(pool, None, 2).unwrap()
    }

    #[tokio::test]
    async fn test_readers_share_the_same_rows() {
        let scanner = scanner_with_rows(10).await;
        let loader = TableLoader::for_partitions(scanner, vec!["A".to_string()], |row| Ok(row.row_key));

        let first = loader.all_entities().await.unwrap();
        let second = loader.all_entities().await.unwrap();
        assert_eq!(first.len(), 10);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(loader.is_loaded());
    }

    #[tokio::test]
    async fn test_empty_table_loads_no_rows() {
        let store = Arc::new(MemoryTableStore::new("cards"));
        let pool = Arc::new(TablePool::shared(store, 1).unwrap());
        let scanner = PagedScanner::with_settings(pool, None, 1).unwrap();

        let loader = TableLoader::for_table(scanner, |row: DynamicEntity| {
            Err::<String, _>(BatchError::invalid_argument("row", format!("rejected {}", row.row_key)))
        });

        // The pool creates the missing table; there is nothing for the map to reject
        assert_eq!(loader.all_entities().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_map_failure_reaches_every_reader() {
        let scanner = scanner_with_rows(3).await;
        let loader = TableLoader::for_table(scanner, |row: DynamicEntity| {
            Err::<String, _>(BatchError::invalid_argument("row", format!("rejected {}", row.row_key)))
        });

        let first = loader.all_entities().await.unwrap_err();
        let second = loader.all_entities().await.unwrap_err();
        assert!(matches!(first, BatchError::MapFailed { .. }));
        assert_eq!(first, second);
    }
}
