//! # Batch Engine Configuration
//!
//! Explicit, validated configuration for the batching and scanning engine.
//! Nothing here is ambient global state: the degree of parallelism defaults to a
//! value derived from the processor count, computed at the point where an
//! executor is constructed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use partition_batch::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::from_env()?;
//! let batch_size = manager.config().effective_batch_size();
//! let parallelism = manager.config().effective_max_parallelism();
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};

use crate::constants::{limits, DEFAULT_BATCH_SIZE, DEFAULT_TABLE_POOL_SIZE};
use crate::error::{BatchError, Result};

pub use loader::ConfigManager;

/// Root configuration for batch execution and paged scans
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Operations per submitted batch. Values below 1 are treated as 1.
    pub batch_size: i64,

    /// Maximum number of partitions processed concurrently.
    /// `None` derives the value from the processor count.
    pub max_parallelism: Option<usize>,

    /// Number of store handles kept by a table pool
    pub table_pool_size: usize,

    /// Rows requested per query segment; `None` lets the store decide
    pub scan_page_size: Option<u32>,

    /// Cancel not-yet-started batches of sibling partitions once one partition fails
    pub cancel_siblings_on_failure: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_parallelism: None,
            table_pool_size: DEFAULT_TABLE_POOL_SIZE,
            scan_page_size: None,
            cancel_siblings_on_failure: false,
        }
    }
}

impl BatchConfig {
    /// Batch size with the clamp law applied
    pub fn effective_batch_size(&self) -> usize {
        clamp_batch_size(self.batch_size)
    }

    /// Configured parallelism, or the processor-derived default
    pub fn effective_max_parallelism(&self) -> usize {
        self.max_parallelism
            .unwrap_or_else(|| default_max_parallelism(processor_count()))
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = Some(max_parallelism);
        self
    }

    pub fn with_table_pool_size(mut self, table_pool_size: usize) -> Self {
        self.table_pool_size = table_pool_size;
        self
    }

    pub fn with_scan_page_size(mut self, scan_page_size: u32) -> Self {
        self.scan_page_size = Some(scan_page_size);
        self
    }

    pub fn with_cancel_siblings_on_failure(mut self, enabled: bool) -> Self {
        self.cancel_siblings_on_failure = enabled;
        self
    }

    /// Validate values the store would reject or that cannot be scheduled
    pub fn validate(&self) -> Result<()> {
        if self.effective_batch_size() > limits::MAX_OPERATIONS_PER_BATCH {
            return Err(BatchError::configuration(format!(
                "batch_size {} exceeds the store limit of {} operations per batch",
                self.batch_size,
                limits::MAX_OPERATIONS_PER_BATCH
            )));
        }

        if self.max_parallelism == Some(0) {
            return Err(BatchError::configuration(
                "max_parallelism must be at least 1 when set",
            ));
        }

        if self.table_pool_size == 0 {
            return Err(BatchError::configuration(
                "table_pool_size must be at least 1",
            ));
        }

        match self.scan_page_size {
            Some(0) => Err(BatchError::configuration(
                "scan_page_size must be at least 1 when set",
            )),
            Some(size) if size > limits::MAX_ROWS_PER_SEGMENT => {
                Err(BatchError::configuration(format!(
                    "scan_page_size {size} exceeds the store limit of {} rows per segment",
                    limits::MAX_ROWS_PER_SEGMENT
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Apply the clamp law: any batch size below 1 behaves as 1
pub fn clamp_batch_size(batch_size: i64) -> usize {
    if batch_size < 1 {
        1
    } else {
        usize::try_from(batch_size).unwrap_or(usize::MAX)
    }
}

/// Default degree of parallelism for a machine with `processor_count` cores.
///
/// Leaves two cores free on larger machines and never drops below 2.
pub fn default_max_parallelism(processor_count: usize) -> usize {
    if processor_count > 4 {
        processor_count - 2
    } else {
        2
    }
}

/// Detect available processors, falling back to 1 when unknown
pub fn processor_count() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_parallelism() {
        assert_eq!(default_max_parallelism(1), 2);
        assert_eq!(default_max_parallelism(4), 2);
        assert_eq!(default_max_parallelism(5), 3);
        assert_eq!(default_max_parallelism(16), 14);
    }

    #[test]
    fn test_batch_size_clamp() {
        assert_eq!(clamp_batch_size(-10), 1);
        assert_eq!(clamp_batch_size(0), 1);
        assert_eq!(clamp_batch_size(1), 1);
        assert_eq!(clamp_batch_size(100), 100);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = BatchConfig::default();
        assert_eq!(config.effective_batch_size(), 100);
        assert!(config.effective_max_parallelism() >= 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_out_of_range_values() {
        assert!(BatchConfig::default().with_batch_size(101).validate().is_err());
        assert!(BatchConfig::default().with_batch_size(-5).validate().is_ok());
        assert!(BatchConfig::default().with_max_parallelism(0).validate().is_err());
        assert!(BatchConfig::default().with_table_pool_size(0).validate().is_err());
        assert!(BatchConfig::default().with_scan_page_size(0).validate().is_err());
        assert!(BatchConfig::default().with_scan_page_size(1001).validate().is_err());
        assert!(BatchConfig::default().with_scan_page_size(1000).validate().is_ok());
    }

    #[test]
    fn test_explicit_parallelism_wins() {
        let config = BatchConfig::default().with_max_parallelism(7);
        assert_eq!(config.effective_max_parallelism(), 7);
    }
}
