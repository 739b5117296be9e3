//! # Table Entities
//!
//! Rows are addressed by a two-part key: a partition key and a row key unique
//! within that partition. Everything else is an opaque property bag plus a
//! concurrency token (ETag).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::constants::ANY_ETAG;
use crate::error::{BatchError, Result};

/// Opaque concurrency token issued by the store for each stored version of a row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ETag(String);

impl ETag {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The wildcard ETag, matching whatever version is stored
    pub fn any() -> Self {
        Self(ANY_ETAG.to_string())
    }

    pub fn is_any(&self) -> bool {
        self.0 == ANY_ETAG
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EntityProperty {
    String(String),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Guid(Uuid),
    Binary(Vec<u8>),
}

impl From<&str> for EntityProperty {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for EntityProperty {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i32> for EntityProperty {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<i64> for EntityProperty {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for EntityProperty {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for EntityProperty {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for EntityProperty {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl From<Uuid> for EntityProperty {
    fn from(value: Uuid) -> Self {
        Self::Guid(value)
    }
}

/// Anything addressable by a (partition key, row key) pair that can be written to the store
pub trait TableEntity: Send + Sync {
    fn partition_key(&self) -> &str;

    fn row_key(&self) -> &str;

    fn etag(&self) -> Option<&ETag> {
        None
    }

    /// Convert into the untyped representation submitted to the store
    fn into_dynamic(self) -> DynamicEntity
    where
        Self: Sized;
}

/// Untyped row: keys, concurrency metadata and a property bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicEntity {
    pub partition_key: String,
    pub row_key: String,
    pub etag: Option<ETag>,
    pub timestamp: Option<DateTime<Utc>>,
    pub properties: BTreeMap<String, EntityProperty>,
}

impl DynamicEntity {
    /// Create an entity with no properties. Blank keys are rejected.
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Result<Self> {
        let partition_key = partition_key.into();
        let row_key = row_key.into();
        validate_key("partition_key", &partition_key)?;
        validate_key("row_key", &row_key)?;

        Ok(Self {
            partition_key,
            row_key,
            etag: None,
            timestamp: None,
            properties: BTreeMap::new(),
        })
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<EntityProperty>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_etag(mut self, etag: ETag) -> Self {
        self.etag = Some(etag);
        self
    }

    pub fn property(&self, name: &str) -> Option<&EntityProperty> {
        self.properties.get(name)
    }

    /// String property value, if present and a string
    pub fn string_property(&self, name: &str) -> Option<&str> {
        match self.properties.get(name) {
            Some(EntityProperty::String(value)) => Some(value),
            _ => None,
        }
    }
}

impl TableEntity for DynamicEntity {
    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn row_key(&self) -> &str {
        &self.row_key
    }

    fn etag(&self) -> Option<&ETag> {
        self.etag.as_ref()
    }

    fn into_dynamic(self) -> DynamicEntity {
        self
    }
}

/// Reject keys that are empty or whitespace only
pub fn validate_key(parameter: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BatchError::blank_argument(parameter));
    }
    Ok(())
}
