//! Concept classification rules

pub mod loader;
pub mod table;

pub use table::*;
