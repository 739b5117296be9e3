#![allow(dead_code)]

pub mod fixtures;
pub mod recording_store;
pub mod strategies;

pub use fixtures::*;
pub use recording_store::*;
