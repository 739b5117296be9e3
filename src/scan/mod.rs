//! # Paged Scans
//!
//! Continuation-token scans over partitions or the whole table:
//!
//! - [`accumulator`] - lock-free row collection and scan outcomes
//! - [`scanner`] - per-partition and single-chain paged scans
//! - [`loader`] - a scan started in the background with a shared result

pub mod accumulator;
pub mod loader;
pub mod scanner;

pub use accumulator::{Completeness, ScanAccumulator, ScanOutcome};
pub use loader::TableLoader;
pub use scanner::{PagedScanner, ScanState};
