//! # System Constants
//!
//! Field names, filter operators and store limits that define the operational
//! boundaries of the partitioned table store this crate talks to.

/// Well-known system property names present on every row
pub mod fields {
    pub const PARTITION_KEY: &str = "PartitionKey";
    pub const ROW_KEY: &str = "RowKey";
    pub const TIMESTAMP: &str = "Timestamp";
    pub const ETAG: &str = "ETag";
}

/// Operators understood by the store's filter-string dialect
pub mod operators {
    pub const EQUAL: &str = "eq";
    pub const NOT_EQUAL: &str = "ne";
    pub const GREATER_THAN: &str = "gt";
    pub const GREATER_THAN_OR_EQUAL: &str = "ge";
    pub const LESS_THAN: &str = "lt";
    pub const LESS_THAN_OR_EQUAL: &str = "le";
    pub const AND: &str = "and";
    pub const OR: &str = "or";
}

/// Hard limits enforced by the store itself
pub mod limits {
    /// Maximum number of operations in one entity group transaction
    pub const MAX_OPERATIONS_PER_BATCH: usize = 100;

    /// Maximum number of rows the store returns for a single query segment
    pub const MAX_ROWS_PER_SEGMENT: u32 = 1000;
}

/// Default number of operations per submitted batch
pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// Default number of store handles kept by a table pool
pub const DEFAULT_TABLE_POOL_SIZE: usize = 16;

/// Environment variable prefix for configuration overrides
pub const CONFIG_ENV_PREFIX: &str = "PARTITION_BATCH";

/// ETag value that matches any stored version
pub const ANY_ETAG: &str = "*";
