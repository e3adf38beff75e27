//! Timestamped snapshots of the feature list and progress log.
//!
//! An archive is a directory under `.pace/archives/` named from the feature
//! list's own `last_updated` stamp (`YYYY-MM-DD_HH-MM-SS`, with `-N` appended
//! on collision). Files are moved in, not copied, so the caller can write a
//! fresh backlog in their place. Archiving never blocks that caller: a file
//! that cannot be moved falls back to a `.bak` copy next to the original.

use crate::cache::TtlCache;
use crate::error::{PaceError, Result};
use crate::io::{self, MoveMethod};
use crate::paths;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const MAX_SUFFIX: u32 = 10_000;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn archive_name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2}(-\d+)?$").unwrap())
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Parse an RFC 3339 stamp (converted to UTC) or a zone-less ISO stamp.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc).naive_utc());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| PaceError::InvalidTimestamp(raw.to_string()))
}

/// Render `raw` as a directory-safe `YYYY-MM-DD_HH-MM-SS`. Missing or
/// unparsable input falls back to the current time.
pub fn normalize_timestamp(raw: Option<&str>) -> String {
    raw.and_then(|r| parse_timestamp(r).ok())
        .unwrap_or_else(|| Utc::now().naive_utc())
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

fn timestamp_from_name(name: &str) -> Option<DateTime<Utc>> {
    let stamp = name.get(..19)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|n| n.and_utc())
}

// ---------------------------------------------------------------------------
// Archive operation types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub reason: String,
    pub include_progress: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            reason: "reinitialize".to_string(),
            include_progress: true,
        }
    }
}

/// Recovery strategies tried in order for each file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Archive,
    BackupCopy,
}

const RECOVERY_CHAIN: &[Strategy] = &[Strategy::Archive, Strategy::BackupCopy];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivedFile {
    pub name: String,
    pub strategy: Strategy,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveOutcome {
    pub timestamp: String,
    /// Set once the archive directory has been created.
    pub archive_dir: Option<PathBuf>,
    pub files: Vec<ArchivedFile>,
    /// Files for which every strategy failed.
    pub failed: Vec<String>,
}

impl ArchiveOutcome {
    /// Names of files that ended up inside the archive directory.
    pub fn archived_names(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| f.strategy == Strategy::Archive)
            .map(|f| f.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveInfo {
    pub archive: ArchiveInfoBody,
    #[serde(rename = "originalMetadata")]
    pub original_metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveInfoBody {
    pub timestamp: String,
    pub reason: String,
    pub files: Vec<String>,
}

// ---------------------------------------------------------------------------
// Listing / validation / cleanup types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveEntry {
    pub name: String,
    pub path: PathBuf,
    /// From the directory name, else the directory's mtime.
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveStatus {
    Valid,
    Warning,
    Invalid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveCheck {
    pub name: String,
    pub status: ArchiveStatus,
    pub problems: Vec<String>,
}

impl ArchiveCheck {
    /// Record a problem; the status only ever gets worse.
    fn note(&mut self, severity: ArchiveStatus, problem: String) {
        if severity == ArchiveStatus::Invalid || self.status == ArchiveStatus::Valid {
            self.status = severity;
        }
        self.problems.push(problem);
    }
}

#[derive(Debug, Clone, Default)]
pub struct CleanupPolicy {
    pub older_than: Option<chrono::Duration>,
    /// Always keep this many of the newest archives.
    pub keep: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupPlan {
    pub remove: Vec<ArchiveEntry>,
    pub retained: usize,
}

// ---------------------------------------------------------------------------
// ArchiveManager
// ---------------------------------------------------------------------------

pub struct ArchiveManager {
    root: PathBuf,
    archives_dir: PathBuf,
    feature_file: String,
    progress_file: String,
    /// Only positive results are stored; a path that didn't exist is re-checked.
    exists_cache: Mutex<TtlCache<PathBuf, bool>>,
    timestamp_cache: Mutex<TtlCache<String, String>>,
}

impl ArchiveManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_cache_ttl(root, DEFAULT_CACHE_TTL)
    }

    pub fn with_cache_ttl(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        let root = root.into();
        Self {
            archives_dir: paths::archives_dir(&root),
            root,
            feature_file: paths::FEATURE_FILE.to_string(),
            progress_file: paths::PROGRESS_FILE.to_string(),
            exists_cache: Mutex::new(TtlCache::new(ttl)),
            timestamp_cache: Mutex::new(TtlCache::new(ttl)),
        }
    }

    /// Override the archived file names (from `.pace/config.yaml`).
    pub fn with_files(mut self, feature_file: impl Into<String>, progress_file: impl Into<String>) -> Self {
        self.feature_file = feature_file.into();
        self.progress_file = progress_file.into();
        self
    }

    pub fn archives_dir(&self) -> &Path {
        &self.archives_dir
    }

    fn exists_cache(&self) -> MutexGuard<'_, TtlCache<PathBuf, bool>> {
        self.exists_cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn timestamp_cache(&self) -> MutexGuard<'_, TtlCache<String, String>> {
        self.timestamp_cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn path_exists(&self, path: &Path) -> bool {
        if self.exists_cache().get(&path.to_path_buf()).is_some() {
            return true;
        }
        let exists = path.exists();
        if exists {
            self.exists_cache().insert(path.to_path_buf(), true);
        }
        exists
    }

    /// Cached [`normalize_timestamp`]. Fallbacks to the current time are not
    /// cached.
    pub fn normalize_timestamp(&self, raw: Option<&str>) -> String {
        let Some(raw) = raw else {
            return normalize_timestamp(None);
        };
        let key = raw.to_string();
        if let Some(hit) = self.timestamp_cache().get(&key) {
            return hit;
        }
        match parse_timestamp(raw) {
            Ok(parsed) => {
                let formatted = parsed.format(TIMESTAMP_FORMAT).to_string();
                self.timestamp_cache().insert(key, formatted.clone());
                formatted
            }
            Err(_) => {
                tracing::debug!(raw, "unparsable timestamp; using current time");
                normalize_timestamp(None)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Naming and moving
    // -----------------------------------------------------------------------

    /// First of `<ts>`, `<ts>-1`, `<ts>-2`, … that doesn't exist.
    pub fn resolve_unique_archive_path(&self, timestamp: &str) -> Result<PathBuf> {
        paths::validate_file_name(timestamp)?;
        let base = self.archives_dir.join(timestamp);
        if !self.path_exists(&base) {
            return Ok(base);
        }
        for n in 1..=MAX_SUFFIX {
            let candidate = self.archives_dir.join(format!("{timestamp}-{n}"));
            if !self.path_exists(&candidate) {
                return Ok(candidate);
            }
        }
        Err(PaceError::ArchiveFailed(format!(
            "no free archive name for {timestamp} after {MAX_SUFFIX} attempts"
        )))
    }

    /// Move `source` to `archive_dir/dest_name`. The name must be a plain file
    /// name and the destination must resolve inside the project root.
    pub fn move_to_archive(&self, source: &Path, archive_dir: &Path, dest_name: &str) -> Result<MoveMethod> {
        paths::validate_file_name(dest_name)?;
        let dest = paths::ensure_within(&self.root, &archive_dir.join(dest_name))?;
        let method = io::move_file(source, &dest)?;
        if method == MoveMethod::CopiedAndRemoved {
            tracing::info!(file = dest_name, "cross-device archive; copied and removed original");
        }
        Ok(method)
    }

    fn backup_copy(&self, source: &Path) -> Result<PathBuf> {
        let dest = paths::ensure_within(&self.root, &paths::backup_path(source))?;
        std::fs::copy(source, &dest)?;
        Ok(dest)
    }

    fn create_archive_dir(&self, timestamp: &str) -> Result<PathBuf> {
        let dir = self.resolve_unique_archive_path(timestamp)?;
        let dir = paths::ensure_within(&self.root, &dir)?;
        io::ensure_dir(&dir)?;
        self.exists_cache().insert(dir.clone(), true);
        Ok(dir)
    }

    // -----------------------------------------------------------------------
    // Archive
    // -----------------------------------------------------------------------

    /// Snapshot the current feature list (and optionally the progress log).
    ///
    /// Only a path-safety violation is returned as an error. Every other
    /// failure degrades through the recovery chain and is reported in the
    /// outcome.
    pub fn archive(&self, opts: &ArchiveOptions) -> Result<ArchiveOutcome> {
        paths::validate_file_name(&self.feature_file)?;
        paths::validate_file_name(&self.progress_file)?;

        let mut names = vec![self.feature_file.clone()];
        if opts.include_progress {
            names.push(self.progress_file.clone());
        }
        let sources: Vec<(String, PathBuf)> = names
            .into_iter()
            .map(|n| {
                let path = self.root.join(&n);
                (n, path)
            })
            .filter(|(_, p)| p.is_file())
            .collect();

        let original_metadata = read_metadata(&self.root.join(&self.feature_file));
        let recorded = original_metadata
            .get("last_updated")
            .and_then(Value::as_str);
        let timestamp = self.normalize_timestamp(recorded);

        let mut outcome = ArchiveOutcome {
            timestamp: timestamp.clone(),
            ..Default::default()
        };
        if sources.is_empty() {
            tracing::debug!("nothing to archive");
            return Ok(outcome);
        }

        let archive_dir = match self.create_archive_dir(&timestamp) {
            Ok(dir) => Some(dir),
            Err(e @ PaceError::UnsafePath(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "could not create archive directory");
                None
            }
        };
        outcome.archive_dir = archive_dir.clone();

        for (name, source) in &sources {
            match self.run_chain(name, source, archive_dir.as_deref())? {
                Some(file) => outcome.files.push(file),
                None => {
                    tracing::warn!(file = %name, "every archive strategy failed; file left in place");
                    outcome.failed.push(name.clone());
                }
            }
        }

        if let Some(dir) = &archive_dir {
            let info = ArchiveInfo {
                archive: ArchiveInfoBody {
                    timestamp: timestamp.clone(),
                    reason: opts.reason.clone(),
                    files: outcome.archived_names(),
                },
                original_metadata,
            };
            if let Err(e) = io::write_json_pretty(&dir.join(paths::ARCHIVE_INFO_FILE), &info) {
                tracing::warn!(error = %e, "could not write archive sidecar");
            }
        }

        tracing::info!(
            timestamp = %outcome.timestamp,
            archived = outcome.files.len(),
            failed = outcome.failed.len(),
            "archive complete"
        );
        Ok(outcome)
    }

    fn run_chain(&self, name: &str, source: &Path, archive_dir: Option<&Path>) -> Result<Option<ArchivedFile>> {
        for strategy in RECOVERY_CHAIN {
            let attempt = match (strategy, archive_dir) {
                (Strategy::Archive, Some(dir)) => self
                    .move_to_archive(source, dir, name)
                    .map(|_| dir.join(name)),
                (Strategy::Archive, None) => continue,
                (Strategy::BackupCopy, _) => self.backup_copy(source),
            };
            match attempt {
                Ok(destination) => {
                    tracing::debug!(file = name, ?strategy, "archived");
                    return Ok(Some(ArchivedFile {
                        name: name.to_string(),
                        strategy: *strategy,
                        destination,
                    }));
                }
                Err(e @ PaceError::UnsafePath(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(file = name, ?strategy, error = %e, "archive strategy failed");
                }
            }
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Listing / validation / cleanup
    // -----------------------------------------------------------------------

    /// All archive directories, newest first.
    pub fn list(&self) -> Result<Vec<ArchiveEntry>> {
        if !self.archives_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries: Vec<ArchiveEntry> = std::fs::read_dir(&self.archives_dir)?
            .filter_map(|e| e.ok())
            // DirEntry::file_type does not follow links; linked entries are never archives.
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let created = timestamp_from_name(&name).or_else(|| {
                    e.metadata()
                        .and_then(|m| m.modified())
                        .ok()
                        .map(DateTime::<Utc>::from)
                });
                ArchiveEntry {
                    path: e.path(),
                    name,
                    created,
                }
            })
            .collect();
        entries.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| b.name.cmp(&a.name)));
        Ok(entries)
    }

    pub fn validate(&self, entry: &ArchiveEntry) -> ArchiveCheck {
        let mut check = ArchiveCheck {
            name: entry.name.clone(),
            status: ArchiveStatus::Valid,
            problems: Vec::new(),
        };

        if !archive_name_re().is_match(&entry.name) {
            check.note(ArchiveStatus::Warning, "name does not follow YYYY-MM-DD_HH-MM-SS".to_string());
        }

        match std::fs::read_to_string(entry.path.join(&self.feature_file)) {
            Err(_) => check.note(ArchiveStatus::Invalid, format!("missing {}", self.feature_file)),
            Ok(raw) => {
                if let Err(e) = serde_json::from_str::<Value>(&raw) {
                    check.note(
                        ArchiveStatus::Invalid,
                        format!("{} is not valid JSON: {e}", self.feature_file),
                    );
                }
            }
        }

        match std::fs::read_to_string(entry.path.join(paths::ARCHIVE_INFO_FILE)) {
            Err(_) => check.note(
                ArchiveStatus::Warning,
                format!("missing {}", paths::ARCHIVE_INFO_FILE),
            ),
            Ok(raw) => {
                if serde_json::from_str::<ArchiveInfo>(&raw).is_err() {
                    check.note(
                        ArchiveStatus::Warning,
                        format!("{} is malformed", paths::ARCHIVE_INFO_FILE),
                    );
                }
            }
        }

        check
    }

    /// Archives a policy would delete. Nothing is touched.
    pub fn plan_cleanup(&self, policy: &CleanupPolicy, now: DateTime<Utc>) -> Result<CleanupPlan> {
        let entries = self.list()?;
        // An age reaching past the earliest representable instant matches nothing.
        let cutoff = policy.older_than.and_then(|age| now.checked_sub_signed(age));
        let mut plan = CleanupPlan::default();
        for (index, entry) in entries.into_iter().enumerate() {
            let over_count = policy.keep.is_some_and(|keep| index >= keep);
            let too_old = match (cutoff, entry.created) {
                (Some(cutoff), Some(created)) => created < cutoff,
                _ => false,
            };
            if over_count || too_old {
                plan.remove.push(entry);
            } else {
                plan.retained += 1;
            }
        }
        Ok(plan)
    }

    /// Delete the archives in `plan`. Returns the names removed.
    ///
    /// Every entry must be a real directory directly under the archives
    /// directory. The first entry that is not aborts the cleanup with
    /// [`PaceError::UnsafePath`] and is left untouched.
    pub fn cleanup(&self, plan: &CleanupPlan) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        if plan.remove.is_empty() {
            return Ok(removed);
        }
        if std::fs::symlink_metadata(&self.archives_dir)?.file_type().is_symlink() {
            return Err(PaceError::UnsafePath(format!(
                "{} is a symbolic link",
                self.archives_dir.display()
            )));
        }
        let archives = paths::ensure_within(&self.root, &self.archives_dir)?;
        for entry in &plan.remove {
            let path = self.removable_archive(&archives, entry)?;
            std::fs::remove_dir_all(&path)?;
            tracing::info!(archive = %entry.name, "archive removed");
            removed.push(entry.name.clone());
        }
        self.exists_cache().clear();
        Ok(removed)
    }

    /// The on-disk directory for `entry`, provided it is a plain directory
    /// whose parent is the (resolved) archives directory.
    fn removable_archive(&self, archives: &Path, entry: &ArchiveEntry) -> Result<PathBuf> {
        let unsafe_entry = |why: &str| {
            PaceError::UnsafePath(format!("{}: {why}", entry.path.display()))
        };
        let name = entry
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| unsafe_entry("no file name"))?;
        paths::validate_file_name(name)?;
        if entry.path.parent() != Some(self.archives_dir.as_path()) {
            return Err(unsafe_entry("is not inside the archives directory"));
        }

        let path = archives.join(name);
        let meta = std::fs::symlink_metadata(&path)?;
        if meta.file_type().is_symlink() {
            return Err(unsafe_entry("is a symbolic link"));
        }
        if !meta.is_dir() {
            return Err(unsafe_entry("is not a directory"));
        }
        let resolved = paths::ensure_within(&self.root, &path)?;
        if resolved.parent() != Some(archives) {
            return Err(unsafe_entry("is not inside the archives directory"));
        }
        Ok(path)
    }
}

/// The `metadata` object of a feature list, or `null` when absent or corrupt.
fn read_metadata(path: &Path) -> Value {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|mut doc| doc.get_mut("metadata").map(Value::take))
        .unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
