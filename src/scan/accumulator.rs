//! Append-only, lock-free collection shared by concurrent scan tasks.

use crossbeam::queue::SegQueue;
use serde::{Deserialize, Serialize};

/// Rows deposited by many scan tasks; read once after all of them finish.
///
/// Insertion order across tasks is not meaningful.
#[derive(Debug)]
pub struct ScanAccumulator<T> {
    rows: SegQueue<T>,
}

impl<T> Default for ScanAccumulator<T> {
    fn default() -> Self {
        Self {
            rows: SegQueue::new(),
        }
    }
}

impl<T> ScanAccumulator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, row: T) {
        self.rows.push(row);
    }

    pub fn extend(&self, rows: impl IntoIterator<Item = T>) {
        for row in rows {
            self.rows.push(row);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Take every deposited row. Call once writers are done.
    pub fn freeze(&self) -> Vec<T> {
        let mut rows = Vec::with_capacity(self.rows.len());
        while let Some(row) = self.rows.pop() {
            rows.push(row);
        }
        rows
    }
}

/// Whether a scan observed the end of every continuation chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Completeness {
    /// Every chain reached a `None` continuation token
    Complete,
    /// The scan was cancelled; rows are well formed but some may be missing
    Indeterminate,
}

/// Mapped rows of a scan plus whether they are the whole result
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome<T> {
    pub rows: Vec<T>,
    pub completeness: Completeness,
}

impl<T> ScanOutcome<T> {
    pub fn complete(rows: Vec<T>) -> Self {
        Self {
            rows,
            completeness: Completeness::Complete,
        }
    }

    pub fn indeterminate(rows: Vec<T>) -> Self {
        Self {
            rows,
            completeness: Completeness::Indeterminate,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completeness == Completeness::Complete
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        let accumulator = Arc::new(ScanAccumulator::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let accumulator = accumulator.clone();
                std::thread::spawn(move || accumulator.extend((0..500).map(|i| w * 1000 + i)))
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let mut rows = accumulator.freeze();
        rows.sort_unstable();
        rows.dedup();
        assert_eq!(rows.len(), 2000);
        assert!(accumulator.is_empty());
    }

    #[test]
    fn test_outcome_completeness() {
        assert!(ScanOutcome::complete(vec![1]).is_complete());
        let partial = ScanOutcome::indeterminate(vec![1, 2]);
        assert!(!partial.is_complete());
        assert_eq!(partial.into_rows(), vec![1, 2]);
    }
}
