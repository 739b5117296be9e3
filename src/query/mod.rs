//! # Segmented Queries
//!
//! Queries against the table are answered one segment (page) at a time. Each
//! segment carries an optional continuation token; feeding it back into the next
//! request resumes the same query, and `None` means the query is exhausted.
//!
//! - [`conditions`] - filter conditions and the canonical partition / point filters

pub mod conditions;

use serde::{Deserialize, Serialize};

use crate::constants::fields;
use crate::error::{BatchError, Result};

pub use conditions::{
    partition_filter, point_query_filter, row_key_filter, ComparisonOp, Filter, FilterCondition,
};

/// Filter, projection and page size of a segmented query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableQuery {
    pub filter: Option<Filter>,
    pub select_columns: Option<Vec<String>>,
    /// Maximum rows per segment; the store may return fewer
    pub take: Option<u32>,
}

impl TableQuery {
    /// Query every row of the table
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }

    /// Every row of one partition
    pub fn for_partition(partition_key: &str) -> Self {
        Self::with_filter(partition_filter(partition_key))
    }

    /// At most one row, addressed by both keys
    pub fn point(partition_key: &str, row_key: &str) -> Self {
        Self::with_filter(point_query_filter(partition_key, row_key))
    }

    /// Restrict the projection to `PartitionKey` and `RowKey`
    pub fn keys_only(mut self) -> Self {
        self.select_columns = Some(vec![
            fields::PARTITION_KEY.to_string(),
            fields::ROW_KEY.to_string(),
        ]);
        self
    }

    pub fn take(mut self, take: u32) -> Self {
        self.take = Some(take);
        self
    }

    /// Apply a page size only when none is set yet
    pub fn with_default_take(mut self, take: Option<u32>) -> Self {
        if self.take.is_none() {
            self.take = take;
        }
        self
    }

    /// Filter string sent to the store, if the query is filtered
    pub fn filter_string(&self) -> Option<String> {
        self.filter.as_ref().map(Filter::to_filter_string)
    }
}

/// Store-issued cursor identifying where a segmented query resumes.
///
/// Only valid for the query that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContinuationToken {
    pub next_partition_key: String,
    pub next_row_key: String,
}

impl ContinuationToken {
    pub fn new(next_partition_key: impl Into<String>, next_row_key: impl Into<String>) -> Self {
        Self {
            next_partition_key: next_partition_key.into(),
            next_row_key: next_row_key.into(),
        }
    }

    /// Serialize for handing to a caller that resumes the query later
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| BatchError::invalid_argument("continuation_token", e.to_string()))
    }

    pub fn from_json(value: &str) -> Result<Self> {
        serde_json::from_str(value)
            .map_err(|e| BatchError::invalid_argument("continuation_token", e.to_string()))
    }
}

/// One page of query results
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySegment<R> {
    pub rows: Vec<R>,
    pub continuation_token: Option<ContinuationToken>,
}

impl<R> QuerySegment<R> {
    pub fn new(rows: Vec<R>, continuation_token: Option<ContinuationToken>) -> Self {
        Self {
            rows,
            continuation_token,
        }
    }

    /// A segment after which the query is exhausted
    pub fn last(rows: Vec<R>) -> Self {
        Self::new(rows, None)
    }

    pub fn is_last(&self) -> bool {
        self.continuation_token.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_shapes() {
        assert_eq!(TableQuery::all().filter_string(), None);
        assert_eq!(
            TableQuery::for_partition("A").filter_string().as_deref(),
            Some("PartitionKey eq 'A'")
        );

        let keys_only = TableQuery::point("A", "1").keys_only();
        assert_eq!(
            keys_only.select_columns,
            Some(vec!["PartitionKey".to_string(), "RowKey".to_string()])
        );
    }

    #[test]
    fn test_default_take_does_not_override() {
        assert_eq!(TableQuery::all().with_default_take(Some(50)).take, Some(50));
        assert_eq!(TableQuery::all().take(10).with_default_take(Some(50)).take, Some(10));
        assert_eq!(TableQuery::all().with_default_take(None).take, None);
    }

    #[test]
    fn test_segment_exhaustion() {
        let last: QuerySegment<u8> = QuerySegment::last(vec![1, 2]);
        assert!(last.is_last());

        let more = QuerySegment::new(vec![1], Some(ContinuationToken::new("A", "2")));
        assert!(!more.is_last());
    }

    #[test]
    fn test_continuation_token_json() {
        let token = ContinuationToken::new("A", "row-'7'");
        let json = token.to_json().unwrap();
        assert_eq!(ContinuationToken::from_json(&json).unwrap(), token);

        let err = ContinuationToken::from_json("{\"next_partition_key\": 1}").unwrap_err();
        assert!(matches!(err, BatchError::InvalidArgument { .. }));
    }
}
