#![allow(clippy::doc_markdown)] // Allow technical terms like PartitionKey, RowKey in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Partition Batch
//!
//! Partition-aware batch execution and paged scanning for partitioned key-value
//! table stores.
//!
//! ## Overview
//!
//! Tables in a partitioned store are addressed by a (partition key, row key) pair.
//! The store only accepts atomic batches whose operations share one partition key
//! and caps their size, and it answers queries one segment at a time with a
//! continuation token. This crate turns "write these ten thousand entities" and
//! "read these partitions" into correctly shaped, bounded-parallel store calls.
//!
//! ## Architecture
//!
//! Writes flow grouper → executor → slicer → pool → store:
//! entities are bucketed by partition key, each bucket becomes one job (at most
//! `max_parallelism` at a time), each job cuts its bucket into batches of at most
//! `batch_size` operations and submits them in order. Reads fan out one
//! continuation chain per partition into a lock-free accumulator.
//!
//! ## Module Organization
//!
//! - [`batch`] - batch slicing, partition grouping and the parallel executor
//! - [`scan`] - paged partition and table scans, background table loader
//! - [`client`] - per-table facade over batches, scans and single-row helpers
//! - [`store`] - the store seam and an in-memory implementation
//! - [`pool`] - bounded pool of store handles with once-only table creation
//! - [`query`] - filters, segmented queries, continuation tokens
//! - [`entity`] / [`operation`] - rows and write operations
//! - [`config`] - configuration and loading
//! - [`error`] - structured error handling
//! - [`logging`] - structured tracing setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use partition_batch::{BatchConfig, DynamicEntity, MemoryTableStore, TableBatchClient};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> partition_batch::Result<()> {
//! partition_batch::logging::init_structured_logging();
//!
//! let config = BatchConfig::default().with_max_parallelism(4);
//! let client = TableBatchClient::from_store(MemoryTableStore::new("scores"), config)?;
//!
//! let scores: Vec<(String, u32, i64)> = vec![("eu".into(), 1, 120), ("us".into(), 7, 95)];
//! let applied = client
//!     .insert_or_merge_in_batches(
//!         scores,
//!         |(region, player, score)| {
//!             DynamicEntity::new(region, player.to_string())
//!                 .expect("non-blank keys")
//!                 .with_property("score", score)
//!         },
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//!
//! let rows = client
//!     .scan_partitions(vec!["eu", "us"], |row| row.row_key, &CancellationToken::new())
//!     .await?;
//! assert_eq!(applied, rows.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! ```

pub mod batch;
pub mod client;
pub mod config;
pub mod constants;
pub mod entity;
pub mod error;
pub mod logging;
pub mod operation;
pub mod pool;
pub mod query;
pub mod scan;
pub mod store;

pub use batch::{
    execute_in_batches, group_by_partition, try_group_by_partition, BatchSlicer,
    ExecutionSummary, ParallelPartitionExecutor, PartitionGroups, SliceSummary,
};
pub use client::TableBatchClient;
pub use config::{BatchConfig, ConfigManager};
pub use constants::{DEFAULT_BATCH_SIZE, DEFAULT_TABLE_POOL_SIZE};
pub use entity::{DynamicEntity, ETag, EntityProperty, TableEntity};
pub use error::{BatchError, Result};
pub use operation::{BatchResult, OperationKind, OperationResult, TableOperation};
pub use pool::TablePool;
pub use query::{ContinuationToken, Filter, QuerySegment, TableQuery};
pub use scan::{Completeness, PagedScanner, ScanAccumulator, ScanOutcome, ScanState, TableLoader};
pub use store::{MemoryTableStore, TableStore};
