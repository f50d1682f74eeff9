//! Storage layer: fact sets, the temporal graph store and store images

pub mod fact_set;
pub mod graph_store;
pub mod image;

pub use fact_set::*;
pub use graph_store::*;
pub use image::*;
