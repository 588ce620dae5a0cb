//! Session Memory Models
//!
//! Canonical record types for the session memory engine: the persisted
//! `SessionMemory` record, its structured sub-entities, and the summary
//! values computed from the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::error::{AppError, AppResult};

/// Status of a task captured during a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl TaskStatus {
    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }

    /// Parse from database string representation
    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "blocked" => Ok(TaskStatus::Blocked),
            _ => Err(AppError::validation(format!("Invalid task status: {}", s))),
        }
    }

    /// Whether the task still needs work
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single task recorded within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The canonical session memory record.
///
/// Ids are caller-generated and stable for the life of the record; writing
/// an existing id replaces the whole record (checkpoint semantics).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMemory {
    pub id: String,
    pub source_session_id: String,
    pub project_path: String,
    pub project_name: String,

    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Duration in minutes, derived by the caller, non-negative
    pub duration_minutes: i64,

    pub summary: String,
    pub description: String,

    pub tasks: Vec<Task>,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub files_deleted: Vec<String>,
    pub next_steps: Vec<String>,
    pub key_decisions: Vec<String>,
    pub blockers: Vec<String>,
    pub tags: Vec<String>,

    pub last_user_message: Option<String>,
    pub last_assistant_message: Option<String>,

    pub tokens_used: u64,
    pub messages_count: u64,
    pub tool_calls_count: u64,

    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub synced: bool,
    pub synced_at: Option<DateTime<Utc>>,

    /// Path to the original raw transcript
    pub log_file: Option<String>,
    /// Path to the compressed transcript copy, set only after a successful
    /// compression of `log_file`
    pub log_file_archived: Option<String>,
}

impl SessionMemory {
    /// Create a record with the required identity and temporal fields set
    /// and everything else empty. Useful for callers that fill fields
    /// incrementally (and for tests).
    pub fn new(
        id: impl Into<String>,
        project_path: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            source_session_id: String::new(),
            project_path: project_path.into(),
            project_name: String::new(),
            started_at,
            ended_at: None,
            duration_minutes: 0,
            summary: String::new(),
            description: String::new(),
            tasks: Vec::new(),
            files_created: Vec::new(),
            files_modified: Vec::new(),
            files_deleted: Vec::new(),
            next_steps: Vec::new(),
            key_decisions: Vec::new(),
            blockers: Vec::new(),
            tags: Vec::new(),
            last_user_message: None,
            last_assistant_message: None,
            tokens_used: 0,
            messages_count: 0,
            tool_calls_count: 0,
            archived: false,
            archived_at: None,
            synced: false,
            synced_at: None,
            log_file: None,
            log_file_archived: None,
        }
    }
}

/// Per-field highlighted snippets for a full-text search hit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSnippets {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub message: Option<String>,
}

/// A single full-text search result.
///
/// `score` is the FTS5 bm25 rank: lower (more negative) means more
/// relevant. The substring fallback path reports a constant 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub session: SessionMemory,
    pub score: f64,
    pub snippets: SearchSnippets,
}

/// Summary of one retention run. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub sessions_archived: usize,
    pub sessions_deleted: usize,
    pub bytes_freed: u64,
    pub log_files_backed_up: usize,
}

/// Aggregate storage statistics, computed on demand
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub archived_sessions: usize,
    pub storage_used_bytes: u64,
    pub oldest_session: Option<DateTime<Utc>>,
    pub newest_session: Option<DateTime<Utc>>,
}
