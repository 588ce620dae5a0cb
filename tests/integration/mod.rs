//! Integration tests for the session memory engine.
//!
//! These exercise the public crate API end to end against real on-disk
//! stores in temporary directories.

mod retention_test;
mod store_test;
