//! Retention Manager
//!
//! Drives each record's lifecycle (active → archived → compressed →
//! deleted) from time-based thresholds and a storage quota. All mutations
//! go through `SessionStore`'s contract; the manager's own state is the
//! archive directory of compressed transcript copies.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::models::session::CleanupReport;
use crate::services::memory::store::SessionStore;
use crate::utils::error::AppResult;

/// Per-record byte estimate used when reporting space freed by deleted
/// rows. Exact accounting of variable-length stored content is not
/// required; this proxy keeps the report stable.
const SESSION_SIZE_ESTIMATE: u64 = 10 * 1024;

/// Retention policy and storage locations, injected at construction
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// How long full (active) sessions are kept, e.g. "30d", "forever"
    pub session_retention: String,
    /// How long archived sessions are kept before hard deletion
    pub archive_retention: String,
    /// Hard ceiling on total on-disk usage (store artifact + archive dir)
    pub max_storage_bytes: u64,
    /// Directory receiving compressed transcript copies, `<id>.gz`
    pub archive_dir: PathBuf,
    /// Settings file of the host application whose own log retention
    /// should be extended; None disables the override
    pub host_settings_path: Option<PathBuf>,
    /// Minimum `cleanupPeriodDays` to write into the host settings
    pub host_retention_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            session_retention: "30d".into(),
            archive_retention: "1y".into(),
            max_storage_bytes: 500 * 1024 * 1024,
            archive_dir: crate::utils::paths::archive_dir().unwrap_or_else(|_| {
                PathBuf::from(".session-memory/archive")
            }),
            host_settings_path: None,
            host_retention_days: 365,
        }
    }
}

/// Orchestrates archival, transcript compression, hard deletion, and
/// quota enforcement over a `SessionStore`
pub struct RetentionManager {
    store: SessionStore,
    config: RetentionConfig,
}

impl RetentionManager {
    /// Create a manager. Always succeeds: if a host settings path is
    /// configured, the retention override is attempted here and failures
    /// are logged rather than returned.
    pub fn new(store: SessionStore, config: RetentionConfig) -> Self {
        if let Some(path) = &config.host_settings_path {
            if !extend_host_log_retention(path, config.host_retention_days) {
                tracing::warn!(
                    path = %path.display(),
                    "could not extend host log retention setting"
                );
            }
        }
        Self { store, config }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Run one cleanup pass: archive by age, compress archived
    /// transcripts, hard-delete by age, then trim to the storage quota.
    ///
    /// Idempotent: a second run immediately after the first reports zero
    /// additional work. The report reflects only completed work; skipped
    /// items (missing transcripts, absent archive files) are simply not
    /// counted.
    pub fn run_cleanup(&self) -> AppResult<CleanupReport> {
        let mut report = CleanupReport::default();

        // Phase 1: archive full sessions past their retention window
        if let Some(days) = parse_retention_days(&self.config.session_retention) {
            report.sessions_archived = self.store.archive_old(days)?;
        }

        // Phase 2: compress transcripts of archived records
        report.log_files_backed_up = self.compress_archived_logs()?;

        // Phase 3: hard-delete archived records past the archive window
        if let Some(days) = parse_retention_days(&self.config.archive_retention) {
            let deleted = self.store.delete_old(days)?;
            report.sessions_deleted += deleted;
            report.bytes_freed += deleted as u64 * SESSION_SIZE_ESTIMATE;
        }

        // Phase 4: enforce the byte ceiling
        let trimmed = self.trim_to_quota()?;
        report.sessions_deleted += trimmed.0;
        report.bytes_freed += trimmed.1;

        Ok(report)
    }

    /// Compress the raw transcript of every archived record that does not
    /// yet have a compressed copy. A missing transcript is a skip.
    fn compress_archived_logs(&self) -> AppResult<usize> {
        let mut backed_up = 0;

        for session in self.store.get_archived()? {
            if session.log_file_archived.is_some() {
                continue;
            }
            let Some(log_file) = &session.log_file else {
                continue;
            };
            let log_path = Path::new(log_file);
            if !log_path.exists() {
                tracing::debug!(id = %session.id, path = %log_file, "transcript missing, skipping");
                continue;
            }

            let archive_path = self.archive_path_for(&session.id);
            match compress_file(log_path, &archive_path) {
                Ok(()) => {
                    self.store
                        .update_archive_path(&session.id, &archive_path.to_string_lossy())?;
                    backed_up += 1;
                }
                Err(e) => {
                    tracing::warn!(id = %session.id, error = %e, "transcript compression failed");
                }
            }
        }

        Ok(backed_up)
    }

    /// Delete oldest records (archive file first, then the row) until
    /// measured usage fits under the ceiling. May evict active records:
    /// the byte ceiling is a hard bound that outranks the nominal
    /// retention window.
    ///
    /// Row deletes alone do not shrink the database file, so work happens
    /// in estimate-sized batches with a compaction and a fresh usage
    /// measurement between batches. The loop ends when usage fits or no
    /// deletable record remains.
    fn trim_to_quota(&self) -> AppResult<(usize, u64)> {
        let mut usage = self.current_usage()?;
        if usage <= self.config.max_storage_bytes {
            return Ok((0, 0));
        }

        let mut sessions = self.store.get_all(true)?;
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        let mut sessions = sessions.into_iter();

        let mut deleted = 0usize;
        let mut bytes_freed = 0u64;

        while usage > self.config.max_storage_bytes {
            let overage = usage - self.config.max_storage_bytes;
            let batch = (overage / SESSION_SIZE_ESTIMATE).max(1) as usize;

            let mut progressed = false;
            for session in sessions.by_ref().take(batch) {
                if let Some(archive_file) = &session.log_file_archived {
                    let path = Path::new(archive_file);
                    let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                    if fs::remove_file(path).is_ok() {
                        bytes_freed += size;
                    }
                }

                if self.store.delete(&session.id)? {
                    deleted += 1;
                    bytes_freed += SESSION_SIZE_ESTIMATE;
                }
                progressed = true;
            }

            if !progressed {
                // Ceiling unreachable: everything deletable is gone
                break;
            }

            self.store.database().compact()?;
            usage = self.current_usage()?;
        }

        Ok((deleted, bytes_freed))
    }

    /// Total on-disk usage: store artifact plus archive directory
    fn current_usage(&self) -> AppResult<u64> {
        let stats = self.store.get_stats()?;
        Ok(stats.storage_used_bytes + dir_size(&self.config.archive_dir))
    }

    fn archive_path_for(&self, id: &str) -> PathBuf {
        self.config.archive_dir.join(format!("{}.gz", id))
    }

    /// Reproduce the original transcript text from a compressed archive
    /// file. A missing file is `Ok(None)`.
    pub fn decompress_log(&self, path: impl AsRef<Path>) -> AppResult<Option<String>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let file = fs::File::open(path)?;
        let mut decoder = GzDecoder::new(file);
        let mut content = String::new();
        decoder.read_to_string(&mut content)?;
        Ok(Some(content))
    }
}

impl std::fmt::Debug for RetentionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionManager")
            .field("config", &self.config)
            .finish()
    }
}

/// Parse a retention string ("7d", "2w", "2m", "3y", "forever") into a
/// day count. "forever" means unbounded (None); an unrecognized format
/// defaults to 30 days rather than failing.
pub fn parse_retention_days(retention: &str) -> Option<u32> {
    let retention = retention.trim().to_lowercase();
    if retention == "forever" {
        return None;
    }

    let (number, unit) = retention.split_at(retention.len().saturating_sub(1));
    let n: u32 = match number.parse() {
        Ok(n) => n,
        Err(_) => return Some(30),
    };

    match unit {
        "d" => Some(n),
        "w" => Some(n * 7),
        "m" => Some(n * 30),
        "y" => Some(n * 365),
        _ => Some(30),
    }
}

/// Raise the host application's own `cleanupPeriodDays` setting so it
/// does not delete transcripts this engine still wants to archive. Never
/// lowers an already-larger value. Returns whether the file now carries
/// at least the requested value.
fn extend_host_log_retention(settings_path: &Path, days: u32) -> bool {
    let content = match fs::read_to_string(settings_path) {
        Ok(c) => c,
        Err(_) => return false,
    };
    let mut settings: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(_) => return false,
    };
    let Some(obj) = settings.as_object_mut() else {
        return false;
    };

    let current = obj
        .get("cleanupPeriodDays")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    if current >= days as u64 {
        return true;
    }

    obj.insert("cleanupPeriodDays".into(), serde_json::json!(days));
    let Ok(updated) = serde_json::to_string_pretty(&settings) else {
        return false;
    };
    fs::write(settings_path, updated).is_ok()
}

/// Gzip-compress a file to the given destination, creating parent
/// directories as needed
fn compress_file(source: &Path, dest: &Path) -> AppResult<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = fs::read(source)?;
    let file = fs::File::create(dest)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&content)?;
    encoder.finish()?;
    Ok(())
}

/// Recursive size of a directory in bytes; 0 if it does not exist
fn dir_size(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    entries
        .filter_map(|e| e.ok())
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                dir_size(&path)
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}
