//! # Table Operations
//!
//! Write operations and the client-side checks every batch must pass before it is
//! handed to the store: non-empty, bounded in size, one partition key, and no row
//! addressed twice.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::constants::limits::MAX_OPERATIONS_PER_BATCH;
use crate::entity::{DynamicEntity, ETag, TableEntity};
use crate::error::{BatchError, Result};

/// Kind of write applied to a single row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Fails when the row already exists
    Insert,
    /// Creates the row or unions its properties into the stored row
    InsertOrMerge,
    /// Creates the row or overwrites the stored row
    InsertOrReplace,
    /// Unions properties into an existing row, honouring the ETag
    Merge,
    /// Removes an existing row, honouring the ETag
    Delete,
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::InsertOrMerge => "insert_or_merge",
            Self::InsertOrReplace => "insert_or_replace",
            Self::Merge => "merge",
            Self::Delete => "delete",
        }
    }

    /// Whether the operation needs the row to exist already
    pub fn requires_existing(&self) -> bool {
        matches!(self, Self::Merge | Self::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One write against one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableOperation {
    pub kind: OperationKind,
    pub entity: DynamicEntity,
}

impl TableOperation {
    pub fn new(kind: OperationKind, entity: impl TableEntity) -> Self {
        Self {
            kind,
            entity: entity.into_dynamic(),
        }
    }

    pub fn insert(entity: impl TableEntity) -> Self {
        Self::new(OperationKind::Insert, entity)
    }

    pub fn insert_or_merge(entity: impl TableEntity) -> Self {
        Self::new(OperationKind::InsertOrMerge, entity)
    }

    pub fn insert_or_replace(entity: impl TableEntity) -> Self {
        Self::new(OperationKind::InsertOrReplace, entity)
    }

    /// Merge; the caller is responsible for setting the ETag on the entity
    pub fn merge(entity: impl TableEntity) -> Self {
        Self::new(OperationKind::Merge, entity)
    }

    pub fn delete(entity: impl TableEntity) -> Self {
        Self::new(OperationKind::Delete, entity)
    }

    /// Unconditional ("hard") delete of a row by key, using the wildcard ETag
    pub fn delete_by_key(partition_key: &str, row_key: &str) -> Result<Self> {
        let entity = DynamicEntity::new(partition_key, row_key)?.with_etag(ETag::any());
        Ok(Self::delete(entity))
    }

    pub fn partition_key(&self) -> &str {
        &self.entity.partition_key
    }

    pub fn row_key(&self) -> &str {
        &self.entity.row_key
    }
}

/// Outcome of one operation inside a successful batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub kind: OperationKind,
    pub row_key: String,
    pub status: u16,
    /// ETag of the stored version; `None` for deletes
    pub etag: Option<ETag>,
}

/// Outcome of an atomically applied batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub partition_key: String,
    pub results: Vec<OperationResult>,
}

impl BatchResult {
    /// Number of operations the store applied
    pub fn count(&self) -> usize {
        self.results.len()
    }
}

/// Check the store-enforced batch invariants without touching the store
pub fn validate_batch(partition_key: &str, operations: &[TableOperation]) -> Result<()> {
    if partition_key.trim().is_empty() {
        return Err(BatchError::blank_argument("partition_key"));
    }

    if operations.is_empty() {
        return Err(BatchError::invalid_argument(
            "operations",
            "A batch must contain at least one operation",
        ));
    }

    if operations.len() > MAX_OPERATIONS_PER_BATCH {
        return Err(BatchError::invalid_argument(
            "operations",
            format!(
                "A batch may contain at most {MAX_OPERATIONS_PER_BATCH} operations, got {}",
                operations.len()
            ),
        ));
    }

    let mut seen_rows = HashSet::with_capacity(operations.len());
    for operation in operations {
        if operation.partition_key() != partition_key {
            return Err(BatchError::invalid_argument(
                "operations",
                format!(
                    "All operations in a batch must share partition key '{partition_key}', found '{}'",
                    operation.partition_key()
                ),
            ));
        }

        if !seen_rows.insert(operation.row_key()) {
            return Err(BatchError::invalid_argument(
                "operations",
                format!(
                    "Row key '{}' appears more than once in the batch",
                    operation.row_key()
                ),
            ));
        }
    }

    Ok(())
}
