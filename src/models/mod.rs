//! Data Models
//!
//! Contains all data structures used throughout the crate.

pub mod session;

pub use session::{
    CleanupReport, SearchHit, SearchSnippets, SessionMemory, StorageStats, Task, TaskStatus,
};
