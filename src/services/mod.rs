//! Services Layer
//!
//! Business logic built on top of the storage layer.

pub mod memory;
