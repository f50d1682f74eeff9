//! Core data types: calendar time, facts and timelines

pub mod fact;
pub mod temporal;
pub mod timeline;

pub use fact::*;
pub use temporal::*;
pub use timeline::*;
