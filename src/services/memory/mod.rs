//! Session Memory Engine
//!
//! Local persistence and retention for session memory records:
//! - `store`: durable CRUD with an always-consistent full-text index
//! - `search`: query composition and ranking over the store
//! - `retention`: archival, transcript compression, and quota enforcement

pub mod retention;
pub mod search;
pub mod store;

pub use retention::{RetentionConfig, RetentionManager};
pub use search::SearchOptions;
pub use store::SessionStore;
