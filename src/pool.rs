//! # Table Pool
//!
//! A bounded set of store handles for one table. Callers borrow a handle for the
//! duration of one async closure; when every handle is out, further callers wait.
//! The table is created (if missing) exactly once, before the first handle is
//! lent out.

use crossbeam::queue::ArrayQueue;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info};

use crate::entity::validate_key;
use crate::error::{BatchError, Result};
use crate::store::TableStore;

/// Pool of handles to one table
pub struct TablePool<S: TableStore> {
    table_name: String,
    primary: Arc<S>,
    handles: ArrayQueue<Arc<S>>,
    permits: Semaphore,
    created: OnceCell<()>,
}

impl<S: TableStore> TablePool<S> {
    /// Build a pool of `pool_size` handles produced by `factory`
    pub fn with_factory(pool_size: usize, factory: impl Fn() -> S) -> Result<Self> {
        if pool_size == 0 {
            return Err(BatchError::invalid_argument(
                "pool_size",
                "A table pool needs at least one handle",
            ));
        }
        let handles = (0..pool_size).map(|_| Arc::new(factory())).collect();
        Self::from_handles(handles)
    }

    /// Share one thread-safe handle `pool_size` times
    pub fn shared(store: Arc<S>, pool_size: usize) -> Result<Self> {
        if pool_size == 0 {
            return Err(BatchError::invalid_argument(
                "pool_size",
                "A table pool needs at least one handle",
            ));
        }
        Self::from_handles(vec![store; pool_size])
    }

    /// Build a pool from existing handles, which must all target the same table
    pub fn from_handles(handles: Vec<Arc<S>>) -> Result<Self> {
        let Some(primary) = handles.first().cloned() else {
            return Err(BatchError::invalid_argument(
                "handles",
                "A table pool needs at least one handle",
            ));
        };

        let table_name = primary.table_name().to_string();
        validate_key("table_name", &table_name)?;
        if let Some(other) = handles.iter().find(|h| h.table_name() != table_name) {
            return Err(BatchError::invalid_argument(
                "handles",
                format!(
                    "All handles must target table '{table_name}', found '{}'",
                    other.table_name()
                ),
            ));
        }

        let queue = ArrayQueue::new(handles.len());
        let size = handles.len();
        for handle in handles {
            // Capacity equals the handle count
            let _ = queue.push(handle);
        }

        debug!(table = %table_name, pool_size = size, "Table pool created");

        Ok(Self {
            table_name,
            primary,
            handles: queue,
            permits: Semaphore::new(size),
            created: OnceCell::new(),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Total number of handles
    pub fn size(&self) -> usize {
        self.handles.capacity()
    }

    /// Handles currently not lent out
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Make sure the table exists. Runs the store call at most once per pool.
    pub async fn ensure_table(&self) -> Result<()> {
        self.created
            .get_or_try_init(|| async {
                let created = self.primary.create_if_not_exists().await?;
                if created {
                    info!(table = %self.table_name, "Table created");
                }
                Ok::<(), BatchError>(())
            })
            .await
            .map(|_| ())
    }

    /// Run `operation` with a borrowed handle, waiting for one to become free
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<S>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.ensure_table().await?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| BatchError::task_join(format!("Table pool closed: {e}")))?;

        let handle = self.handles.pop().ok_or_else(|| {
            BatchError::task_join("Table pool permit granted without an available handle")
        })?;
        let lease = Lease {
            queue: &self.handles,
            handle: Some(handle.clone()),
        };

        let result = operation(handle).await;
        drop(lease);
        result
    }
}

/// Returns a borrowed handle to the pool, even when the borrowing future is dropped
struct Lease<'a, S> {
    queue: &'a ArrayQueue<Arc<S>>,
    handle: Option<Arc<S>>,
}

impl<S> Drop for Lease<'_, S> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.queue.push(handle);
        }
    }
}
