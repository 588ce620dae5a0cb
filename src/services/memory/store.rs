//! Session Memory Store
//!
//! Durable CRUD over `SessionMemory` records in SQLite with a full-text
//! index kept in lockstep. The index is a derived projection of a fixed
//! subset of fields (summary, description, task text, created+modified
//! file paths, last user/assistant messages, tags) and is rewritten inside
//! the same transaction as every canonical-row mutation, so a search
//! always reflects the latest committed row.

use std::path::Path;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::params;

use crate::models::session::{SearchHit, SearchSnippets, SessionMemory, StorageStats, Task};
use crate::storage::database::{Database, DbPool};
use crate::utils::error::{AppError, AppResult};

/// Column list shared by every SELECT over session_memories. Order must
/// match `row_to_session`.
const SESSION_COLUMNS: &str = "id, source_session_id, project_path, project_name, \
     started_at, ended_at, duration_minutes, summary, description, \
     tasks, files_created, files_modified, files_deleted, \
     next_steps, key_decisions, blockers, tags, \
     last_user_message, last_assistant_message, \
     tokens_used, messages_count, tool_calls_count, \
     archived, archived_at, synced, synced_at, log_file, log_file_archived";

/// Store for session memory records
#[derive(Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    /// Create a store over an existing database handle
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open (or create) a file-backed store at the given path
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> AppResult<Self> {
        Ok(Self::new(Database::new_in_memory()?))
    }

    /// Access the underlying database handle
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Access the underlying connection pool
    pub fn pool(&self) -> &DbPool {
        self.db.pool()
    }

    // ========================================================================
    // Write Operations
    // ========================================================================

    /// Upsert a session record by id (full replace).
    ///
    /// The canonical row and its full-text index entry are replaced in one
    /// transaction: after `save` returns, a search for a token present in
    /// the indexed fields finds this record, and a token removed by this
    /// write no longer matches it.
    pub fn save(&self, session: &SessionMemory) -> AppResult<()> {
        let tasks_json = serde_json::to_string(&session.tasks)?;
        let files_created_json = serde_json::to_string(&session.files_created)?;
        let files_modified_json = serde_json::to_string(&session.files_modified)?;
        let files_deleted_json = serde_json::to_string(&session.files_deleted)?;
        let next_steps_json = serde_json::to_string(&session.next_steps)?;
        let key_decisions_json = serde_json::to_string(&session.key_decisions)?;
        let blockers_json = serde_json::to_string(&session.blockers)?;
        let tags_json = serde_json::to_string(&session.tags)?;

        let task_text = session
            .tasks
            .iter()
            .map(|t| t.description.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let file_text = session
            .files_created
            .iter()
            .chain(session.files_modified.iter())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let message_text = [
            session.last_user_message.as_deref().unwrap_or(""),
            session.last_assistant_message.as_deref().unwrap_or(""),
        ]
        .join("\n");
        let tag_text = session.tags.join(" ");

        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM session_fts WHERE session_id = ?1",
            params![session.id],
        )?;

        tx.execute(
            "INSERT OR REPLACE INTO session_memories (
                id, source_session_id, project_path, project_name,
                started_at, ended_at, duration_minutes, summary, description,
                tasks, files_created, files_modified, files_deleted,
                next_steps, key_decisions, blockers, tags,
                last_user_message, last_assistant_message,
                tokens_used, messages_count, tool_calls_count,
                archived, archived_at, synced, synced_at,
                log_file, log_file_archived
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                       ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24,
                       ?25, ?26, ?27, ?28)",
            params![
                session.id,
                session.source_session_id,
                session.project_path,
                session.project_name,
                to_ts(&session.started_at),
                session.ended_at.as_ref().map(to_ts),
                session.duration_minutes.max(0),
                session.summary,
                session.description,
                tasks_json,
                files_created_json,
                files_modified_json,
                files_deleted_json,
                next_steps_json,
                key_decisions_json,
                blockers_json,
                tags_json,
                session.last_user_message,
                session.last_assistant_message,
                session.tokens_used as i64,
                session.messages_count as i64,
                session.tool_calls_count as i64,
                session.archived as i32,
                session.archived_at.as_ref().map(to_ts),
                session.synced as i32,
                session.synced_at.as_ref().map(to_ts),
                session.log_file,
                session.log_file_archived,
            ],
        )?;

        tx.execute(
            "INSERT INTO session_fts (
                session_id, summary, description, task_text, file_text,
                message_text, tag_text
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.summary,
                session.description,
                task_text,
                file_text,
                message_text,
                tag_text,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Set `log_file_archived` for a record. Returns false if the id is
    /// unknown (no-op).
    pub fn update_archive_path(&self, id: &str, path: &str) -> AppResult<bool> {
        let conn = self.get_connection()?;
        let affected = conn.execute(
            "UPDATE session_memories SET log_file_archived = ?2 WHERE id = ?1",
            params![id, path],
        )?;
        Ok(affected > 0)
    }

    /// Mark a record as synced now. Returns false if the id is unknown.
    pub fn mark_synced(&self, id: &str) -> AppResult<bool> {
        let conn = self.get_connection()?;
        let affected = conn.execute(
            "UPDATE session_memories SET synced = 1, synced_at = ?2 WHERE id = ?1",
            params![id, to_ts(&Utc::now())],
        )?;
        Ok(affected > 0)
    }

    /// Archive every non-archived record whose `started_at` is older than
    /// `now - days`. Returns the count affected; re-running with the same
    /// cutoff affects zero additional rows.
    pub fn archive_old(&self, days: u32) -> AppResult<usize> {
        let cutoff = to_ts(&(Utc::now() - Duration::days(days as i64)));
        let now = to_ts(&Utc::now());

        let conn = self.get_connection()?;
        let affected = conn.execute(
            "UPDATE session_memories SET archived = 1, archived_at = ?2
             WHERE archived = 0 AND started_at < ?1",
            params![cutoff, now],
        )?;
        Ok(affected)
    }

    /// Hard-delete every record older than `now - days`, archived or not.
    /// Returns the count deleted.
    pub fn delete_old(&self, days: u32) -> AppResult<usize> {
        let cutoff = to_ts(&(Utc::now() - Duration::days(days as i64)));

        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM session_fts WHERE session_id IN
             (SELECT id FROM session_memories WHERE started_at < ?1)",
            params![cutoff],
        )?;
        let deleted = tx.execute(
            "DELETE FROM session_memories WHERE started_at < ?1",
            params![cutoff],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Hard-delete one record. Returns whether a row existed.
    pub fn delete(&self, id: &str) -> AppResult<bool> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM session_fts WHERE session_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM session_memories WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    // ========================================================================
    // Read Operations
    // ========================================================================

    /// Point lookup by id
    pub fn get_by_id(&self, id: &str) -> AppResult<Option<SessionMemory>> {
        let conn = self.get_connection()?;
        let result = conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM session_memories WHERE id = ?1"),
            params![id],
            row_to_session,
        );

        match result {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::database(e.to_string())),
        }
    }

    /// Most recent record for an exact project path, archived included
    pub fn get_last_for_project(&self, project_path: &str) -> AppResult<Option<SessionMemory>> {
        let conn = self.get_connection()?;
        let result = conn.query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM session_memories
                 WHERE project_path = ?1
                 ORDER BY started_at DESC
                 LIMIT 1"
            ),
            params![project_path],
            row_to_session,
        );

        match result {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::database(e.to_string())),
        }
    }

    /// Non-archived records, most recent first, optionally filtered by
    /// exact project path
    pub fn get_recent(
        &self,
        limit: usize,
        project_path: Option<&str>,
    ) -> AppResult<Vec<SessionMemory>> {
        let conn = self.get_connection()?;

        if let Some(project) = project_path {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM session_memories
                 WHERE archived = 0 AND project_path = ?1
                 ORDER BY started_at DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![project, limit as i64], row_to_session)?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM session_memories
                 WHERE archived = 0
                 ORDER BY started_at DESC
                 LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map(params![limit as i64], row_to_session)?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        }
    }

    /// Full scan, most recent first. `include_archived = false` skips
    /// archived records.
    pub fn get_all(&self, include_archived: bool) -> AppResult<Vec<SessionMemory>> {
        let conn = self.get_connection()?;
        let where_clause = if include_archived {
            ""
        } else {
            "WHERE archived = 0"
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM session_memories
             {where_clause}
             ORDER BY started_at DESC"
        ))?;
        let rows = stmt
            .query_map([], row_to_session)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// All archived records, most recently archived first
    pub fn get_archived(&self) -> AppResult<Vec<SessionMemory>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM session_memories
             WHERE archived = 1
             ORDER BY archived_at DESC"
        ))?;
        let rows = stmt
            .query_map([], row_to_session)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// All unsynced records, oldest first (sync in causal order)
    pub fn get_unsynced(&self) -> AppResult<Vec<SessionMemory>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM session_memories
             WHERE synced = 0
             ORDER BY started_at ASC"
        ))?;
        let rows = stmt
            .query_map([], row_to_session)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Ranked full-text search over the indexed fields.
    ///
    /// The strict path hands the query to FTS5 (so callers get phrase and
    /// boolean syntax) ranked by bm25 with per-field snippets. If SQLite
    /// rejects the query syntax, falls back to an unranked substring match
    /// over summary/description/last_user_message with a constant score.
    pub fn search(&self, query: &str, limit: usize) -> AppResult<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        match self.fts_search(query, limit) {
            Err(AppError::Sqlite(e)) if is_fts_query_error(&e) => {
                tracing::debug!(query, error = %e, "FTS query rejected, using substring fallback");
                self.substring_search(query, limit)
            }
            result => result,
        }
    }

    /// Strict search path: FTS5 MATCH ranked by bm25 (lower = more
    /// relevant) with highlighted snippets.
    fn fts_search(&self, query: &str, limit: usize) -> AppResult<Vec<SearchHit>> {
        let conn = self.get_connection()?;

        // m.* yields the table's columns in creation order, which matches
        // `row_to_session`; the FTS columns stay qualified to avoid
        // colliding with the canonical summary/description columns.
        let mut stmt = conn.prepare(
            "SELECT m.*,
                    bm25(session_fts) AS score,
                    snippet(session_fts, 1, '[', ']', '…', 12),
                    snippet(session_fts, 2, '[', ']', '…', 12),
                    snippet(session_fts, 5, '[', ']', '…', 12)
             FROM session_fts
             JOIN session_memories m ON m.id = session_fts.session_id
             WHERE session_fts MATCH ?1
             ORDER BY bm25(session_fts)
             LIMIT ?2",
        )?;

        let hits: Vec<SearchHit> = stmt
            .query_map(params![query, limit as i64], |row| {
                let session = row_to_session(row)?;
                let score: f64 = row.get(28)?;
                let summary: String = row.get(29)?;
                let description: String = row.get(30)?;
                let message: String = row.get(31)?;
                Ok(SearchHit {
                    session,
                    score,
                    snippets: SearchSnippets {
                        summary: non_empty(summary),
                        description: non_empty(description),
                        message: non_empty(message),
                    },
                })
            })?
            .collect::<Result<_, _>>()?;

        Ok(hits)
    }

    /// Fallback search path: case-insensitive substring match, constant
    /// score, no snippets.
    fn substring_search(&self, query: &str, limit: usize) -> AppResult<Vec<SearchHit>> {
        let conn = self.get_connection()?;
        let pattern = format!("%{}%", query);

        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM session_memories
             WHERE summary LIKE ?1
                OR description LIKE ?1
                OR last_user_message LIKE ?1
             ORDER BY started_at DESC
             LIMIT ?2"
        ))?;

        let hits = stmt
            .query_map(params![pattern, limit as i64], row_to_session)?
            .filter_map(|r| r.ok())
            .map(|session| SearchHit {
                session,
                score: 0.0,
                snippets: SearchSnippets::default(),
            })
            .collect();

        Ok(hits)
    }

    /// Aggregate counts, storage artifact size, and the oldest/newest
    /// `started_at` across all rows (archived included)
    pub fn get_stats(&self) -> AppResult<StorageStats> {
        let conn = self.get_connection()?;

        let (total, archived): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(archived), 0) FROM session_memories",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let (oldest, newest): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(started_at), MAX(started_at) FROM session_memories",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(StorageStats {
            total_sessions: total as usize,
            active_sessions: (total - archived) as usize,
            archived_sessions: archived as usize,
            storage_used_bytes: self.db.file_size(),
            oldest_session: oldest.as_deref().map(parse_ts),
            newest_session: newest.as_deref().map(parse_ts),
        })
    }

    /// Release underlying resources. No further calls are valid after
    /// `close` (the handle is consumed).
    pub fn close(self) {
        drop(self.db);
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn get_connection(
        &self,
    ) -> AppResult<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.db.get_connection()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish()
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Format a timestamp for storage. Fixed-width RFC 3339 UTC with
/// microsecond precision, so lexicographic order is chronological order.
pub(crate) fn to_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. A malformed value degrades to the epoch
/// rather than failing the whole read.
pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// FTS5 reports a malformed MATCH expression as a generic SQLITE_ERROR
/// with an explanatory message. Only those reroute to the substring
/// fallback; I/O, corruption, and other medium failures stay fatal.
fn is_fts_query_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == rusqlite::ErrorCode::Unknown
                && (msg.contains("fts5: syntax error")
                    || msg.contains("unterminated string")
                    || msg.contains("unknown special query")
                    || msg.contains("no such column")
                    || msg.contains("malformed MATCH"))
        }
        _ => false,
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Convert a database row to a SessionMemory. Column order matches
/// `SESSION_COLUMNS`. Malformed JSON in a list column degrades to an
/// empty collection.
fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<SessionMemory> {
    let tasks_json: String = row.get(9)?;
    let files_created_json: String = row.get(10)?;
    let files_modified_json: String = row.get(11)?;
    let files_deleted_json: String = row.get(12)?;
    let next_steps_json: String = row.get(13)?;
    let key_decisions_json: String = row.get(14)?;
    let blockers_json: String = row.get(15)?;
    let tags_json: String = row.get(16)?;

    let tasks: Vec<Task> = serde_json::from_str(&tasks_json).unwrap_or_default();

    Ok(SessionMemory {
        id: row.get(0)?,
        source_session_id: row.get(1)?,
        project_path: row.get(2)?,
        project_name: row.get(3)?,
        started_at: parse_ts(&row.get::<_, String>(4)?),
        ended_at: row.get::<_, Option<String>>(5)?.as_deref().map(parse_ts),
        duration_minutes: row.get::<_, i64>(6)?.max(0),
        summary: row.get(7)?,
        description: row.get(8)?,
        tasks,
        files_created: serde_json::from_str(&files_created_json).unwrap_or_default(),
        files_modified: serde_json::from_str(&files_modified_json).unwrap_or_default(),
        files_deleted: serde_json::from_str(&files_deleted_json).unwrap_or_default(),
        next_steps: serde_json::from_str(&next_steps_json).unwrap_or_default(),
        key_decisions: serde_json::from_str(&key_decisions_json).unwrap_or_default(),
        blockers: serde_json::from_str(&blockers_json).unwrap_or_default(),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        last_user_message: row.get(17)?,
        last_assistant_message: row.get(18)?,
        tokens_used: row.get::<_, i64>(19)?.max(0) as u64,
        messages_count: row.get::<_, i64>(20)?.max(0) as u64,
        tool_calls_count: row.get::<_, i64>(21)?.max(0) as u64,
        archived: row.get::<_, i32>(22)? != 0,
        archived_at: row.get::<_, Option<String>>(23)?.as_deref().map(parse_ts),
        synced: row.get::<_, i32>(24)? != 0,
        synced_at: row.get::<_, Option<String>>(25)?.as_deref().map(parse_ts),
        log_file: row.get(26)?,
        log_file_archived: row.get(27)?,
    })
}

// ============================================================================
// Tests
// ============================================================================
