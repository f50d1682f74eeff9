//! Typed entities materialized from graph snapshots

pub mod filter;
pub mod model;
pub mod pool;
pub mod schema;

pub use filter::*;
pub use model::*;
pub use pool::*;
pub use schema::*;
