//! Cross-Platform Path Utilities
//!
//! Default storage locations for the session memory engine. Components take
//! their storage paths by injection; these functions only supply the
//! conventional defaults under the user's home directory.

use std::path::PathBuf;

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the session memory directory (~/.session-memory/)
pub fn memory_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".session-memory"))
}

/// Get the database file path (~/.session-memory/sessions.db)
pub fn database_path() -> AppResult<PathBuf> {
    Ok(memory_dir()?.join("sessions.db"))
}

/// Get the archive directory for compressed transcripts (~/.session-memory/archive/)
pub fn archive_dir() -> AppResult<PathBuf> {
    Ok(memory_dir()?.join("archive"))
}
