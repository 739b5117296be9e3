//! # Table Store Seam
//!
//! The batching and scanning engine does not talk to any particular service. It
//! issues four primitives against a [`TableStore`]: create the table, submit a
//! single-partition batch, execute one operation, and fetch one query segment.
//! Transport, authentication and retry policy belong to the implementation.
//!
//! [`MemoryTableStore`] is an in-process implementation with the same batch and
//! paging semantics, used for tests and local runs.

pub mod memory;

use async_trait::async_trait;

use crate::entity::DynamicEntity;
use crate::error::Result;
use crate::operation::{BatchResult, OperationResult, TableOperation};
use crate::query::{ContinuationToken, QuerySegment, TableQuery};

pub use memory::MemoryTableStore;

/// Primitive operations of a partitioned table store
#[async_trait]
pub trait TableStore: Send + Sync + 'static {
    /// Name of the table this handle targets
    fn table_name(&self) -> &str;

    /// Create the table when missing. Returns `true` when it was created by this call.
    async fn create_if_not_exists(&self) -> Result<bool>;

    /// Apply every operation atomically. All operations must target `partition_key`.
    async fn submit_batch(
        &self,
        partition_key: &str,
        operations: Vec<TableOperation>,
    ) -> Result<BatchResult>;

    /// Apply a single operation
    async fn execute(&self, operation: TableOperation) -> Result<OperationResult>;

    /// Fetch one segment of `query`, resuming at `continuation_token` when given
    async fn query_segment(
        &self,
        query: &TableQuery,
        continuation_token: Option<ContinuationToken>,
    ) -> Result<QuerySegment<DynamicEntity>>;
}
