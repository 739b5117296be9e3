//! In-memory table store.
//!
//! Rows are kept ordered by (partition key, row key). Batches are checked in full
//! before any row is touched, so a rejected batch leaves the table unchanged.
//! Status codes follow the usual table-service conventions: 404 for a missing
//! table or row, 409 for an insert conflict, 412 for an ETag mismatch.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use uuid::Uuid;

use super::TableStore;
use crate::constants::limits::MAX_ROWS_PER_SEGMENT;
use crate::entity::{DynamicEntity, ETag};
use crate::error::{BatchError, Result};
use crate::operation::{validate_batch, BatchResult, OperationKind, OperationResult, TableOperation};
use crate::query::{ContinuationToken, QuerySegment, TableQuery};

type RowKey = (String, String);

/// In-process store with atomic batches and continuation-token paging
#[derive(Debug)]
pub struct MemoryTableStore {
    table_name: String,
    rows: RwLock<BTreeMap<RowKey, DynamicEntity>>,
    exists: AtomicBool,
    max_page_size: u32,
}

impl MemoryTableStore {
    /// Create a handle for a table that does not exist yet
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            rows: RwLock::new(BTreeMap::new()),
            exists: AtomicBool::new(false),
            max_page_size: MAX_ROWS_PER_SEGMENT,
        }
    }

    /// Cap the number of rows returned per segment, regardless of the query's `take`
    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size.clamp(1, MAX_ROWS_PER_SEGMENT);
        self
    }

    pub fn table_exists(&self) -> bool {
        self.exists.load(Ordering::Acquire)
    }

    /// Total number of stored rows
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Number of stored rows in one partition
    pub fn partition_len(&self, partition_key: &str) -> usize {
        self.rows
            .read()
            .range(partition_start(partition_key)..)
            .take_while(|((pk, _), _)| pk == partition_key)
            .count()
    }

    /// Direct lookup, bypassing the query path
    pub fn get(&self, partition_key: &str, row_key: &str) -> Option<DynamicEntity> {
        self.rows
            .read()
            .get(&(partition_key.to_string(), row_key.to_string()))
            .cloned()
    }

    fn ensure_exists(&self, partition_key: &str, operation: &str) -> Result<()> {
        if !self.table_exists() {
            return Err(BatchError::store_status(
                partition_key,
                operation,
                404,
                format!("TableNotFound: table '{}' does not exist", self.table_name),
            ));
        }
        Ok(())
    }

    /// Compute the stored row (or removal) an operation results in, without applying it
    fn plan(
        rows: &BTreeMap<RowKey, DynamicEntity>,
        index: usize,
        operation: &TableOperation,
    ) -> Result<(RowKey, Option<DynamicEntity>, OperationResult)> {
        let key = (
            operation.partition_key().to_string(),
            operation.row_key().to_string(),
        );
        let existing = rows.get(&key);
        let fail = |status: u16, message: &str| {
            BatchError::store_status(
                operation.partition_key(),
                operation.kind.name(),
                status,
                format!("{index}:{message}"),
            )
        };

        if operation.kind.requires_existing() {
            let Some(stored) = existing else {
                return Err(fail(404, "ResourceNotFound: the specified resource does not exist."));
            };
            if let Some(expected) = operation.entity.etag.as_ref() {
                if !expected.is_any() && stored.etag.as_ref() != Some(expected) {
                    return Err(fail(
                        412,
                        "UpdateConditionNotSatisfied: the ETag does not match the stored version.",
                    ));
                }
            }
        }

        let new_row = match operation.kind {
            OperationKind::Delete => None,
            OperationKind::Insert if existing.is_some() => {
                return Err(fail(409, "EntityAlreadyExists: the specified entity already exists."));
            }
            OperationKind::Insert | OperationKind::InsertOrReplace => {
                Some(stamp(operation.entity.clone()))
            }
            OperationKind::InsertOrMerge | OperationKind::Merge => {
                let mut merged = existing.cloned().unwrap_or_else(|| operation.entity.clone());
                merged
                    .properties
                    .extend(operation.entity.properties.clone());
                Some(stamp(merged))
            }
        };

        let result = OperationResult {
            kind: operation.kind,
            row_key: operation.row_key().to_string(),
            status: if operation.kind == OperationKind::Insert { 201 } else { 204 },
            etag: new_row.as_ref().and_then(|row| row.etag.clone()),
        };
        Ok((key, new_row, result))
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn create_if_not_exists(&self) -> Result<bool> {
        let created = !self.exists.swap(true, Ordering::AcqRel);
        if created {
            debug!(table = %self.table_name, "Created table");
        }
        Ok(created)
    }

    async fn submit_batch(
        &self,
        partition_key: &str,
        operations: Vec<TableOperation>,
    ) -> Result<BatchResult> {
        validate_batch(partition_key, &operations)?;
        self.ensure_exists(partition_key, "submit_batch")?;

        let mut rows = self.rows.write();
        let planned = operations
            .iter()
            .enumerate()
            .map(|(index, operation)| Self::plan(&rows, index, operation))
            .collect::<Result<Vec<_>>>()?;

        let mut results = Vec::with_capacity(planned.len());
        for (key, new_row, result) in planned {
            match new_row {
                Some(row) => {
                    rows.insert(key, row);
                }
                None => {
                    rows.remove(&key);
                }
            }
            results.push(result);
        }

        Ok(BatchResult {
            partition_key: partition_key.to_string(),
            results,
        })
    }

    async fn execute(&self, operation: TableOperation) -> Result<OperationResult> {
        self.ensure_exists(operation.partition_key(), operation.kind.name())?;

        let mut rows = self.rows.write();
        let (key, new_row, result) = Self::plan(&rows, 0, &operation)?;
        match new_row {
            Some(row) => {
                rows.insert(key, row);
            }
            None => {
                rows.remove(&key);
            }
        }
        Ok(result)
    }

    async fn query_segment(
        &self,
        query: &TableQuery,
        continuation_token: Option<ContinuationToken>,
    ) -> Result<QuerySegment<DynamicEntity>> {
        let pinned = query
            .filter
            .as_ref()
            .and_then(|filter| filter.pinned_partition_key());
        self.ensure_exists(pinned.unwrap_or_default(), "query_segment")?;

        let page_size = query
            .take
            .unwrap_or(self.max_page_size)
            .clamp(1, self.max_page_size) as usize;

        let start: Bound<RowKey> = match (&continuation_token, pinned) {
            (Some(token), _) => Bound::Included((
                token.next_partition_key.clone(),
                token.next_row_key.clone(),
            )),
            (None, Some(partition_key)) => Bound::Included(partition_start(partition_key)),
            (None, None) => Bound::Unbounded,
        };

        let rows = self.rows.read();
        let mut matching = rows
            .range((start, Bound::Unbounded))
            .take_while(|((pk, _), _)| pinned.map_or(true, |pinned| pk == pinned))
            .filter(|(_, row)| query.filter.as_ref().map_or(true, |f| f.matches(row)));

        let page: Vec<DynamicEntity> = matching
            .by_ref()
            .take(page_size)
            .map(|(_, row)| project(row, query.select_columns.as_deref()))
            .collect();

        let next = matching
            .next()
            .map(|((pk, rk), _)| ContinuationToken::new(pk.clone(), rk.clone()));

        Ok(QuerySegment::new(page, next))
    }
}

fn partition_start(partition_key: &str) -> RowKey {
    (partition_key.to_string(), String::new())
}

fn stamp(mut row: DynamicEntity) -> DynamicEntity {
    row.etag = Some(ETag::new(format!("W/\"{}\"", Uuid::new_v4())));
    row.timestamp = Some(Utc::now());
    row
}

fn project(row: &DynamicEntity, columns: Option<&[String]>) -> DynamicEntity {
    let mut projected = row.clone();
    if let Some(columns) = columns {
        projected
            .properties
            .retain(|name, _| columns.iter().any(|column| column == name));
    }
    projected
}
