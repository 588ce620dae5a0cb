//! SQLite Database
//!
//! Embedded database for persistent storage using rusqlite with r2d2
//! connection pooling. Owns the canonical `session_memories` table and the
//! `session_fts` full-text index kept in lockstep with it by the store's
//! write paths.

use std::path::{Path, PathBuf};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::utils::error::{AppError, AppResult};

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database handle for managing SQLite operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) a database file at the given path.
    ///
    /// The parent directory is created if missing. WAL journaling gives
    /// durable writes and lets a concurrent reader never observe a
    /// partially-applied write; a busy timeout makes a locked database
    /// wait briefly instead of failing immediately.
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )
        });
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self {
            pool,
            path: Some(path),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database for testing.
    ///
    /// Each in-memory connection is its own database, so the pool is
    /// capped at a single connection.
    pub fn new_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool, path: None };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> AppResult<()> {
        let conn = self.get_connection()?;

        // Canonical session memory table. List-valued fields are stored as
        // JSON TEXT; timestamps are RFC 3339 UTC TEXT so lexicographic
        // order matches chronological order.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_memories (
                id TEXT PRIMARY KEY,
                source_session_id TEXT NOT NULL DEFAULT '',
                project_path TEXT NOT NULL,
                project_name TEXT NOT NULL DEFAULT '',
                started_at TEXT NOT NULL,
                ended_at TEXT,
                duration_minutes INTEGER NOT NULL DEFAULT 0,
                summary TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                tasks TEXT NOT NULL DEFAULT '[]',
                files_created TEXT NOT NULL DEFAULT '[]',
                files_modified TEXT NOT NULL DEFAULT '[]',
                files_deleted TEXT NOT NULL DEFAULT '[]',
                next_steps TEXT NOT NULL DEFAULT '[]',
                key_decisions TEXT NOT NULL DEFAULT '[]',
                blockers TEXT NOT NULL DEFAULT '[]',
                tags TEXT NOT NULL DEFAULT '[]',
                last_user_message TEXT,
                last_assistant_message TEXT,
                tokens_used INTEGER NOT NULL DEFAULT 0,
                messages_count INTEGER NOT NULL DEFAULT 0,
                tool_calls_count INTEGER NOT NULL DEFAULT 0,
                archived INTEGER NOT NULL DEFAULT 0,
                archived_at TEXT,
                synced INTEGER NOT NULL DEFAULT 0,
                synced_at TEXT,
                log_file TEXT,
                log_file_archived TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_session_memories_project
             ON session_memories(project_path)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_session_memories_started_at
             ON session_memories(started_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_session_memories_archived
             ON session_memories(archived)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_session_memories_synced
             ON session_memories(synced)",
            [],
        )?;

        // FTS5 virtual table mirroring the searchable projection of each
        // record. Content-bearing (not contentless) so snippet() can
        // produce highlights. session_id is UNINDEXED: it joins back to
        // the canonical row but never matches queries.
        // tokenize: unicode61 with diacritic removal and underscore as a
        // token char (keeps snake_case identifiers together).
        conn.execute_batch(
            "CREATE VIRTUAL TABLE IF NOT EXISTS session_fts USING fts5(
                session_id UNINDEXED,
                summary,
                description,
                task_text,
                file_text,
                message_text,
                tag_text,
                tokenize=\"unicode61 remove_diacritics 2 tokenchars '_'\"
            )",
        )?;

        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Get the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// On-disk path of the database file, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// On-disk size of the database artifact in bytes (main file plus WAL
    /// sidecar). Zero for in-memory databases.
    pub fn file_size(&self) -> u64 {
        let Some(path) = &self.path else {
            return 0;
        };

        let mut total = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let mut wal = path.as_os_str().to_os_string();
        wal.push("-wal");
        total += std::fs::metadata(&wal).map(|m| m.len()).unwrap_or(0);
        total
    }

    /// Flush the WAL into the main file and rebuild it so pages freed by
    /// deletes are returned to the filesystem. Until this runs, deleting
    /// rows does not shrink `file_size`.
    pub fn compact(&self) -> AppResult<()> {
        let conn = self.get_connection()?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        conn.execute("VACUUM", [])?;
        Ok(())
    }

    /// Check if the database is healthy
    pub fn is_healthy(&self) -> bool {
        if let Ok(conn) = self.pool.get() {
            conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
        } else {
            false
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}
