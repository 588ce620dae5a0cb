//! Session Memory
//!
//! Local persistence and retention engine for structured session memory
//! records. Sessions are stored durably in SQLite with a full-text index
//! kept in lockstep with the canonical rows; a retention manager archives,
//! compresses, and evicts records over time to honor configured storage
//! limits.
//!
//! ```no_run
//! use session_memory::{RetentionConfig, RetentionManager, SessionMemory, SessionStore};
//!
//! # fn main() -> session_memory::AppResult<()> {
//! let store = SessionStore::open(session_memory::utils::paths::database_path()?)?;
//!
//! let session = SessionMemory::new("session-1", "/work/my-project", chrono::Utc::now());
//! store.save(&session)?;
//!
//! let hits = store.search("refactor", 10)?;
//!
//! let manager = RetentionManager::new(store, RetentionConfig::default());
//! let report = manager.run_cleanup()?;
//! println!("archived {} sessions", report.sessions_archived);
//! # Ok(())
//! # }
//! ```

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::session::{
    CleanupReport, SearchHit, SearchSnippets, SessionMemory, StorageStats, Task, TaskStatus,
};
pub use services::memory::retention::{parse_retention_days, RetentionConfig, RetentionManager};
pub use services::memory::search::SearchOptions;
pub use services::memory::store::SessionStore;
pub use storage::database::Database;
pub use utils::error::{AppError, AppResult};
