//! # Batch Execution
//!
//! Partition-aware batched writes:
//!
//! - [`slicer`] - fixed-size batching with skip-on-`None` mapping
//! - [`grouper`] - bucketing entities by partition key
//! - [`executor`] - bounded-parallel submission of partition groups

pub mod executor;
pub mod grouper;
pub mod slicer;

pub use executor::{ExecutionSummary, ParallelPartitionExecutor};
pub use grouper::{group_by_partition, try_group_by_partition, PartitionGroups};
pub use slicer::{execute_in_batches, BatchSlicer, SliceSummary};
