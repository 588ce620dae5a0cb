//! Utilities
//!
//! Common utilities used throughout the crate.

pub mod error;
pub mod paths;
