//! Session Search
//!
//! Query composition over `SessionStore`: option-rich filtered search,
//! file/tag lookups, date-range scans, similarity ranking, and
//! natural-language date phrase parsing. Filtering happens after the
//! store's ranked search (over-fetch then post-filter), which keeps the
//! index schema flat at the cost of discarding some over-fetched rows.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use crate::models::session::{SearchHit, SessionMemory};
use crate::services::memory::store::SessionStore;
use crate::utils::error::AppResult;

/// How many times the requested limit to over-fetch from the ranked
/// search before post-filtering. Callers needing guaranteed completeness
/// under heavy filters should query the store directly.
const PREFILTER_MULTIPLIER: usize = 4;

/// Options for a filtered full-text search
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub query: String,
    /// Substring match against `project_path`
    pub project: Option<String>,
    /// Inclusive lower bound on `started_at`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `started_at`
    pub to: Option<DateTime<Utc>>,
    pub include_archived: bool,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            query: String::new(),
            project: None,
            from: None,
            to: None,
            include_archived: false,
            limit: 20,
        }
    }
}

/// Ranked full-text search with project, date, and archived-state filters
pub fn search(store: &SessionStore, options: &SearchOptions) -> AppResult<Vec<SearchHit>> {
    let fetch = options.limit.saturating_mul(PREFILTER_MULTIPLIER).max(1);
    let mut hits = store.search(&options.query, fetch)?;

    hits.retain(|hit| {
        let s = &hit.session;
        if !options.include_archived && s.archived {
            return false;
        }
        if let Some(project) = &options.project {
            if !s.project_path.contains(project.as_str()) {
                return false;
            }
        }
        if let Some(from) = &options.from {
            if s.started_at < *from {
                return false;
            }
        }
        if let Some(to) = &options.to {
            if s.started_at > *to {
                return false;
            }
        }
        true
    });

    // bm25 rank: lower = more relevant, so ascending keeps the best first
    hits.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(options.limit);
    Ok(hits)
}

/// Records whose created/modified/deleted file lists contain an entry
/// containing `path` as a substring. Archived records included.
pub fn search_by_file(store: &SessionStore, path: &str) -> AppResult<Vec<SessionMemory>> {
    let sessions = store.get_all(true)?;
    Ok(sessions
        .into_iter()
        .filter(|s| {
            s.files_created
                .iter()
                .chain(s.files_modified.iter())
                .chain(s.files_deleted.iter())
                .any(|f| f.contains(path))
        })
        .collect())
}

/// Records tagged with `tag` (case-insensitive exact match). Archived
/// records included.
pub fn search_by_tag(store: &SessionStore, tag: &str) -> AppResult<Vec<SessionMemory>> {
    let tag_lower = tag.to_lowercase();
    let sessions = store.get_all(true)?;
    Ok(sessions
        .into_iter()
        .filter(|s| s.tags.iter().any(|t| t.to_lowercase() == tag_lower))
        .collect())
}

/// Records whose `started_at` falls within the inclusive bounds,
/// optionally filtered by project path substring
pub fn get_by_date_range(
    store: &SessionStore,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    project_path: Option<&str>,
) -> AppResult<Vec<SessionMemory>> {
    let sessions = store.get_all(true)?;
    Ok(sessions
        .into_iter()
        .filter(|s| s.started_at >= from && s.started_at <= to)
        .filter(|s| project_path.map_or(true, |p| s.project_path.contains(p)))
        .collect())
}

/// Non-archived records similar to the given one, ranked by an additive
/// score: +5 same project, +3 per shared created/modified file path,
/// +2 per shared tag (case-insensitive). Zero-score records are excluded;
/// ties keep the store's recency order.
pub fn get_related(
    store: &SessionStore,
    id: &str,
    limit: usize,
) -> AppResult<Vec<(SessionMemory, u32)>> {
    let Some(target) = store.get_by_id(id)? else {
        return Ok(Vec::new());
    };

    let target_files: Vec<&str> = target
        .files_created
        .iter()
        .chain(target.files_modified.iter())
        .map(|s| s.as_str())
        .collect();
    let target_tags: Vec<String> = target.tags.iter().map(|t| t.to_lowercase()).collect();

    let mut scored: Vec<(SessionMemory, u32)> = store
        .get_all(false)?
        .into_iter()
        .filter(|s| s.id != target.id)
        .filter_map(|s| {
            let mut score = 0u32;
            if s.project_path == target.project_path {
                score += 5;
            }
            for file in s.files_created.iter().chain(s.files_modified.iter()) {
                if target_files.contains(&file.as_str()) {
                    score += 3;
                }
            }
            for tag in &s.tags {
                if target_tags.contains(&tag.to_lowercase()) {
                    score += 2;
                }
            }
            if score > 0 {
                Some((s, score))
            } else {
                None
            }
        })
        .collect();

    // Stable sort preserves the store's recency order for equal scores
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(limit);
    Ok(scored)
}

/// Non-archived records with at least one pending or in-progress task
pub fn get_with_pending_tasks(
    store: &SessionStore,
    project_path: Option<&str>,
) -> AppResult<Vec<SessionMemory>> {
    let sessions = store.get_all(false)?;
    Ok(sessions
        .into_iter()
        .filter(|s| s.tasks.iter().any(|t| t.status.is_open()))
        .filter(|s| project_path.map_or(true, |p| s.project_path.contains(p)))
        .collect())
}

/// Non-archived records with at least one recorded blocker
pub fn get_with_blockers(
    store: &SessionStore,
    project_path: Option<&str>,
) -> AppResult<Vec<SessionMemory>> {
    let sessions = store.get_all(false)?;
    Ok(sessions
        .into_iter()
        .filter(|s| !s.blockers.is_empty())
        .filter(|s| project_path.map_or(true, |p| s.project_path.contains(p)))
        .collect())
}

/// Parse a natural-language date phrase or absolute date into a point in
/// time. Relative phrases resolve against the start of today (UTC).
/// Returns None for unrecognized input; callers choose their own fallback.
pub fn parse_date_phrase(phrase: &str) -> Option<DateTime<Utc>> {
    let phrase = phrase.trim().to_lowercase();
    let today = start_of_day(Utc::now());

    match phrase.as_str() {
        "today" => return Some(today),
        "yesterday" => return Some(today - Duration::days(1)),
        "last week" => return Some(today - Duration::days(7)),
        "last month" => return Some(today - Duration::days(30)),
        "last year" => return Some(today - Duration::days(365)),
        _ => {}
    }

    // "N days ago" / "N weeks ago" / "N months ago"
    if let Some(rest) = phrase.strip_suffix(" ago") {
        let mut parts = rest.split_whitespace();
        if let (Some(n), Some(unit), None) = (parts.next(), parts.next(), parts.next()) {
            if let Ok(n) = n.parse::<i64>() {
                let days = match unit {
                    "day" | "days" => Some(n),
                    "week" | "weeks" => Some(n * 7),
                    "month" | "months" => Some(n * 30),
                    _ => None,
                };
                if let Some(days) = days {
                    return Some(today - Duration::days(days));
                }
            }
        }
    }

    if let Ok(date) = chrono::NaiveDate::parse_from_str(&phrase, "%Y-%m-%d") {
        return Utc
            .with_ymd_and_hms(date.year(), date.month(), date.day(), 0, 0, 0)
            .single();
    }

    DateTime::parse_from_rfc3339(&phrase)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn start_of_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(dt.year(), dt.month(), dt.day(), 0, 0, 0)
        .single()
        .unwrap_or(dt)
}
