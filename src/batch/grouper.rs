//! # Partition Grouping
//!
//! Buckets entities by partition key so that each bucket can be submitted as a
//! series of single-partition batches. Buckets live in a [`DashMap`], so `push`
//! takes `&self` and is safe to call from many tasks at once; per-partition order
//! follows the order of `push` calls.

use dashmap::DashMap;

use crate::entity::{validate_key, TableEntity};
use crate::error::{BatchError, Result};

/// Entities bucketed by partition key
#[derive(Debug)]
pub struct PartitionGroups<T> {
    groups: DashMap<String, Vec<T>>,
}

impl<T> Default for PartitionGroups<T> {
    fn default() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }
}

impl<T> PartitionGroups<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the bucket for `partition_key`, creating it on first use
    pub fn push(&self, partition_key: impl Into<String>, item: T) -> Result<()> {
        let partition_key = partition_key.into();
        validate_key("partition_key", &partition_key)?;
        self.groups.entry(partition_key).or_default().push(item);
        Ok(())
    }

    /// Number of distinct partitions
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of items across all partitions
    pub fn item_count(&self) -> usize {
        self.groups.iter().map(|entry| entry.value().len()).sum()
    }

    /// Items in the bucket for `partition_key`
    pub fn partition_len(&self, partition_key: &str) -> usize {
        self.groups
            .get(partition_key)
            .map(|entry| entry.value().len())
            .unwrap_or(0)
    }

    /// Partition keys in ascending order
    pub fn partition_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.groups.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Consume the groups, ordered by partition key
    pub fn into_groups(self) -> Vec<(String, Vec<T>)> {
        let mut groups: Vec<(String, Vec<T>)> = self.groups.into_iter().collect();
        groups.sort_by(|a, b| a.0.cmp(&b.0));
        groups
    }
}

impl<T: TableEntity> PartitionGroups<T> {
    /// Append an entity to the bucket named by its own partition key
    pub fn insert(&self, entity: T) -> Result<()> {
        let partition_key = entity.partition_key().to_string();
        self.push(partition_key, entity)
    }
}

/// Map every item to an entity and bucket the entities by partition key
pub fn group_by_partition<In, Out, M>(
    items: impl IntoIterator<Item = In>,
    mut map: M,
) -> Result<PartitionGroups<Out>>
where
    Out: TableEntity,
    M: FnMut(In) -> Out,
{
    try_group_by_partition(items, |item| Ok(map(item)))
}

/// Like [`group_by_partition`], with a map that can reject an item
pub fn try_group_by_partition<In, Out, M>(
    items: impl IntoIterator<Item = In>,
    mut map: M,
) -> Result<PartitionGroups<Out>>
where
    Out: TableEntity,
    M: FnMut(In) -> Result<Out>,
{
    let groups = PartitionGroups::new();
    for (index, item) in items.into_iter().enumerate() {
        let entity = map(item).map_err(|e| match e {
            BatchError::MapFailed { .. } => e,
            other => BatchError::map_failed(index, other.to_string()),
        })?;
        groups.insert(entity)?;
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::DynamicEntity;
    use std::sync::Arc;

    fn entity(pk: &str, rk: &str) -> DynamicEntity {
        DynamicEntity::new(pk, rk).unwrap()
    }

    #[test]
    fn test_groups_preserve_partition_order() {
        let input = vec![("A", "1"), ("B", "1"), ("A", "2"), ("C", "1"), ("A", "3")];
        let groups = group_by_partition(input, |(pk, rk)| entity(pk, rk)).unwrap();

        assert_eq!(groups.len(), 3);
        assert_eq!(groups.item_count(), 5);
        assert_eq!(groups.partition_keys(), vec!["A", "B", "C"]);

        let groups = groups.into_groups();
        let row_keys: Vec<&str> = groups[0].1.iter().map(|e| e.row_key.as_str()).collect();
        assert_eq!(groups[0].0, "A");
        assert_eq!(row_keys, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_empty_input_has_no_groups() {
        let groups = group_by_partition(Vec::<DynamicEntity>::new(), |e| e).unwrap();
        assert!(groups.is_empty());
        assert_eq!(groups.item_count(), 0);
    }

    #[test]
    fn test_blank_partition_key_is_rejected() {
        let groups: PartitionGroups<u32> = PartitionGroups::new();
        assert!(matches!(
            groups.push("  ", 1),
            Err(BatchError::InvalidArgument { .. })
        ));
        assert!(groups.is_empty());
    }

    #[test]
    fn test_map_failure_reports_index() {
        let err = try_group_by_partition(vec!["A", "", "B"], |pk| DynamicEntity::new(pk, "1"))
            .unwrap_err();
        assert!(matches!(err, BatchError::MapFailed { index: 1, .. }));
    }

    #[test]
    fn test_insert_rejects_blank_entity_partition_key() {
        let groups = PartitionGroups::new();
        groups.insert(entity("B", "1")).unwrap();
        groups.insert(entity("B", "2")).unwrap();

        let mut blank = entity("A", "1");
        blank.partition_key = " ".to_string();
        assert!(matches!(
            groups.insert(blank),
            Err(BatchError::InvalidArgument { .. })
        ));
        assert_eq!(groups.partition_len("B"), 2);
        assert_eq!(groups.item_count(), 2);
    }

    #[test]
    fn test_concurrent_push_loses_nothing() {
        let groups = Arc::new(PartitionGroups::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let groups = groups.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        groups.push(format!("P{}", i % 5), (worker, i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(groups.len(), 5);
        assert_eq!(groups.item_count(), 2000);
        assert_eq!(groups.partition_len("P0"), 400);
    }
}
