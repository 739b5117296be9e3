//! # Error Types
//!
//! Structured error handling for batch execution and paged scanning using
//! thiserror. Every failure surfaces to the nearest awaited caller; nothing in
//! this crate retries or swallows errors.

use thiserror::Error;

/// Errors produced by the batching, grouping and scanning engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    /// A required parameter was missing or blank. Raised before any I/O.
    #[error("Invalid argument '{parameter}': {reason}")]
    InvalidArgument { parameter: String, reason: String },

    /// An input item handed to the batch slicer was itself absent.
    #[error(
        "Item is null at index {index} (items so far in current batch: {batch_len}, total items: {total})"
    )]
    NullItem {
        index: usize,
        batch_len: usize,
        total: usize,
    },

    /// The store rejected a batch, a page fetch or a single operation.
    #[error("Store operation '{operation}' failed for partition '{partition_key}' (status {status:?}): {message}")]
    StoreOperationFailed {
        partition_key: String,
        operation: String,
        message: String,
        status: Option<u16>,
    },

    /// A fallible map function returned an error for the item at `index`.
    #[error("Map function failed at index {index}: {message}")]
    MapFailed { index: usize, message: String },

    /// Cooperative cancellation was observed at a batch or page boundary.
    #[error("Operation cancelled during {stage}")]
    Cancelled { stage: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A worker task panicked or was aborted before reporting a result.
    #[error("Worker task failed: {message}")]
    TaskJoin { message: String },
}

impl BatchError {
    /// Create an invalid argument error
    pub fn invalid_argument(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error for a blank required string
    pub fn blank_argument(parameter: impl Into<String>) -> Self {
        Self::invalid_argument(parameter, "Value cannot be null or whitespace.")
    }

    /// Create a store operation error without a status code
    pub fn store_operation(
        partition_key: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::StoreOperationFailed {
            partition_key: partition_key.into(),
            operation: operation.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a store operation error carrying the status code the store returned
    pub fn store_status(
        partition_key: impl Into<String>,
        operation: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self::StoreOperationFailed {
            partition_key: partition_key.into(),
            operation: operation.into(),
            message: message.into(),
            status: Some(status),
        }
    }

    /// Create a map failure error
    pub fn map_failed(index: usize, message: impl Into<String>) -> Self {
        Self::MapFailed {
            index,
            message: message.into(),
        }
    }

    /// Create a cancellation error for the given stage
    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled {
            stage: stage.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a task join error
    pub fn task_join(message: impl Into<String>) -> Self {
        Self::TaskJoin {
            message: message.into(),
        }
    }

    /// Status code reported by the store, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::StoreOperationFailed { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether an external retry policy could reasonably retry this failure.
    ///
    /// Only throttling, timeouts and transient server errors qualify. This crate
    /// never acts on it; retrying is the store client's responsibility.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status(), Some(408 | 429 | 500 | 503))
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;

/// Remember the first real failure of a fan-out; a cancellation is replaced by
/// any later real failure
pub(crate) fn keep_first_failure(first: &mut Option<BatchError>, error: BatchError) {
    match first {
        None => *first = Some(error),
        Some(existing) if existing.is_cancelled() && !error.is_cancelled() => *first = Some(error),
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = BatchError::NullItem {
            index: 3,
            batch_len: 1,
            total: 5,
        };
        assert_eq!(
            err.to_string(),
            "Item is null at index 3 (items so far in current batch: 1, total items: 5)"
        );

        let err = BatchError::store_status("pk-1", "submit_batch", 409, "EntityAlreadyExists");
        assert!(err.to_string().contains("pk-1"));
        assert!(err.to_string().contains("409"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BatchError::store_status("a", "query_segment", 503, "busy").is_retryable());
        assert!(BatchError::store_status("a", "submit_batch", 429, "throttled").is_retryable());
        assert!(!BatchError::store_status("a", "submit_batch", 409, "conflict").is_retryable());
        assert!(!BatchError::store_operation("a", "submit_batch", "unknown").is_retryable());
        assert!(!BatchError::cancelled("scan").is_retryable());
    }

    #[test]
    fn test_first_failure_prefers_real_errors() {
        let mut first = None;
        keep_first_failure(&mut first, BatchError::cancelled("batch submission"));
        keep_first_failure(&mut first, BatchError::store_status("A", "submit_batch", 409, "conflict"));
        keep_first_failure(&mut first, BatchError::store_status("B", "submit_batch", 500, "later"));
        assert_eq!(first.and_then(|e| e.status()), Some(409));
    }

    #[test]
    fn test_blank_argument_message() {
        let err = BatchError::blank_argument("table_name");
        assert_eq!(
            err,
            BatchError::InvalidArgument {
                parameter: "table_name".to_string(),
                reason: "Value cannot be null or whitespace.".to_string(),
            }
        );
    }
}
