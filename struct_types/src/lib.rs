//! Record Declaration Types
//!
//! This crate contains the declaration-level types for the struct layout
//! system. It provides pure data structures for describing records and
//! their members without any layout computation or buffer access.

pub mod types;

// Re-export commonly used types at the crate root
pub use types::*;
