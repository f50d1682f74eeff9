//! Temporal-Graph: time-partitioned fact graph with entity timelines
//!
//! Facts are stored in partitions, one per validity span, and an index maps
//! each partition to its span. Reading at an instant or over a span flattens
//! the matching partitions into a snapshot, which is materialized into typed
//! entities and folded into per-property timelines.
//!
//! # Core Concepts
//!
//! - **Instants and spans**: calendar points of year, month or day precision,
//!   and the intervals between them
//! - **Partitions**: fact sets holding the facts valid during one span
//! - **Snapshots**: every fact valid at an instant or throughout a span
//! - **Entities**: typed objects built from a snapshot by a schema registry
//! - **Timelines**: an entity's property values over its whole lifespan
//!
//! # Example
//!
//! ```no_run
//! use temporal_graph::prelude::*;
//!
//! # async fn example() -> temporal_graph::error::Result<()> {
//! let registry = SchemaRegistry::from_path("schema.json")?;
//! let db = TemporalDB::in_memory(registry)?;
//!
//! db.add("1900/1950".parse()?, Fact::literal("ex:alice", "ex:name", "Alice")).await?;
//!
//! let entities = db.materialize_at(TimeInstant::from_year(1925)).await?;
//! let timeline = db.timeline("ex:alice", TimeSpan::universal()).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod entity;
pub mod error;
pub mod index;
pub mod storage;
pub mod vocab;

/// Main database type
pub mod db;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::StoreConfig;
    pub use crate::core::*;
    pub use crate::db::TemporalDB;
    pub use crate::entity::*;
    pub use crate::error::{Error, Result};
    pub use crate::index::{PartitionId, TimeDimensionIndex};
    pub use crate::storage::*;
}
