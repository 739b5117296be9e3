//! Filter conditions in the store's filter-string dialect.
//!
//! A condition renders as `Field op 'value'` with embedded single quotes doubled,
//! and two filters combine as `(left) and (right)`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::constants::{fields, operators};
use crate::entity::{DynamicEntity, EntityProperty};

/// Comparison operators supported in a filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl ComparisonOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => operators::EQUAL,
            Self::NotEqual => operators::NOT_EQUAL,
            Self::GreaterThan => operators::GREATER_THAN,
            Self::GreaterThanOrEqual => operators::GREATER_THAN_OR_EQUAL,
            Self::LessThan => operators::LESS_THAN,
            Self::LessThanOrEqual => operators::LESS_THAN_OR_EQUAL,
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Self::Equal => ordering == Ordering::Equal,
            Self::NotEqual => ordering != Ordering::Equal,
            Self::GreaterThan => ordering == Ordering::Greater,
            Self::GreaterThanOrEqual => ordering != Ordering::Less,
            Self::LessThan => ordering == Ordering::Less,
            Self::LessThanOrEqual => ordering != Ordering::Greater,
        }
    }
}

/// A single `(field, op, value)` triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub op: ComparisonOp,
    pub value: String,
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, op: ComparisonOp, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Render as a filter string
    pub fn to_filter_string(&self) -> String {
        format!(
            "{} {} {}",
            self.field,
            self.op.as_str(),
            quote_value(&self.value)
        )
    }

    /// Evaluate against a row. Non-string properties never match.
    pub fn matches(&self, entity: &DynamicEntity) -> bool {
        let actual = match self.field.as_str() {
            fields::PARTITION_KEY => Some(entity.partition_key.as_str()),
            fields::ROW_KEY => Some(entity.row_key.as_str()),
            name => match entity.properties.get(name) {
                Some(EntityProperty::String(value)) => Some(value.as_str()),
                _ => None,
            },
        };

        actual.is_some_and(|actual| self.op.accepts(actual.cmp(self.value.as_str())))
    }
}

/// Logical composition of conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    Condition(FilterCondition),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
}

impl Filter {
    pub fn condition(field: impl Into<String>, op: ComparisonOp, value: impl Into<String>) -> Self {
        Self::Condition(FilterCondition::new(field, op, value))
    }

    pub fn and(self, other: Filter) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    pub fn to_filter_string(&self) -> String {
        match self {
            Self::Condition(condition) => condition.to_filter_string(),
            Self::And(left, right) => combine(left, operators::AND, right),
            Self::Or(left, right) => combine(left, operators::OR, right),
        }
    }

    pub fn matches(&self, entity: &DynamicEntity) -> bool {
        match self {
            Self::Condition(condition) => condition.matches(entity),
            Self::And(left, right) => left.matches(entity) && right.matches(entity),
            Self::Or(left, right) => left.matches(entity) || right.matches(entity),
        }
    }

    /// The partition key this filter pins with an `eq` condition on every match path, if any
    pub fn pinned_partition_key(&self) -> Option<&str> {
        match self {
            Self::Condition(FilterCondition {
                field,
                op: ComparisonOp::Equal,
                value,
            }) if field == fields::PARTITION_KEY => Some(value),
            Self::Condition(_) => None,
            Self::And(left, right) => left
                .pinned_partition_key()
                .or_else(|| right.pinned_partition_key()),
            Self::Or(left, right) => match (left.pinned_partition_key(), right.pinned_partition_key()) {
                (Some(l), Some(r)) if l == r => Some(l),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_filter_string())
    }
}

fn combine(left: &Filter, op: &str, right: &Filter) -> String {
    format!(
        "({}) {} ({})",
        left.to_filter_string(),
        op,
        right.to_filter_string()
    )
}

fn quote_value(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `PartitionKey eq '<pk>'`
pub fn partition_filter(partition_key: &str) -> Filter {
    Filter::condition(fields::PARTITION_KEY, ComparisonOp::Equal, partition_key)
}

/// `RowKey eq '<rk>'`
pub fn row_key_filter(row_key: &str) -> Filter {
    Filter::condition(fields::ROW_KEY, ComparisonOp::Equal, row_key)
}

/// `(PartitionKey eq '<pk>') and (RowKey eq '<rk>')`
pub fn point_query_filter(partition_key: &str, row_key: &str) -> Filter {
    partition_filter(partition_key).and(row_key_filter(row_key))
}
