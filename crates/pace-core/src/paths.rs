use crate::error::{PaceError, Result};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

// ---------------------------------------------------------------------------
// File and directory constants
// ---------------------------------------------------------------------------

pub const FEATURE_FILE: &str = "feature_list.json";
pub const PROGRESS_FILE: &str = "progress.txt";
pub const BACKUP_SUFFIX: &str = ".bak";

pub const PACE_DIR: &str = ".pace";
pub const CONFIG_FILE: &str = ".pace/config.yaml";
pub const ARCHIVES_DIR: &str = ".pace/archives";
pub const ARCHIVE_INFO_FILE: &str = ".archive-info.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn feature_list_path(root: &Path) -> PathBuf {
    root.join(FEATURE_FILE)
}

pub fn progress_path(root: &Path) -> PathBuf {
    root.join(PROGRESS_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn archives_dir(root: &Path) -> PathBuf {
    root.join(ARCHIVES_DIR)
}

/// `feature_list.json` -> `feature_list.json.bak`, next to the original.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("backup"));
    name.push(BACKUP_SUFFIX);
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Path safety
// ---------------------------------------------------------------------------

/// Reject any file or directory name that could escape its parent.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(PaceError::UnsafePath(format!(
            "'{name}' is not a plain file name"
        )));
    }
    Ok(())
}

/// Resolve `candidate` and require it to be a strict descendant of `root`.
///
/// Both sides are resolved before comparison: `root` is canonicalized, and the
/// candidate has `.`/`..` folded lexically and its deepest existing ancestor
/// canonicalized (so symlinks are followed). Containment is then decided by
/// component-wise prefix stripping, never by string comparison.
pub fn ensure_within(root: &Path, candidate: &Path) -> Result<PathBuf> {
    let root = root.canonicalize()?;
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let normalized = normalize_lexically(&joined).ok_or_else(|| {
        PaceError::UnsafePath(format!("{} climbs above the filesystem root", joined.display()))
    })?;
    let resolved = canonicalize_existing_prefix(&normalized)?;

    let inside = match resolved.strip_prefix(&root) {
        Ok(rel) => {
            !rel.as_os_str().is_empty() && rel.components().all(|c| matches!(c, Component::Normal(_)))
        }
        Err(_) => false,
    };
    if !inside {
        return Err(PaceError::UnsafePath(format!(
            "{} is outside project root {}",
            resolved.display(),
            root.display()
        )));
    }
    Ok(resolved)
}

fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

fn canonicalize_existing_prefix(path: &Path) -> Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut rest: Vec<OsString> = Vec::new();
    while !existing.exists() {
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => break,
        }
    }
    let mut resolved = existing.canonicalize()?;
    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
