//! Indexing of partitions along the time dimension

pub mod temporal;

pub use temporal::*;
