//! Storage Layer
//!
//! SQLite persistence: connection pooling, schema, and the full-text index
//! virtual table.

pub mod database;

pub use database::{Database, DbPool};
