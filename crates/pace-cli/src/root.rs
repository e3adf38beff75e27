use std::path::{Path, PathBuf};

use pace_core::paths::FEATURE_FILE;

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `PACE_ROOT` env var (passed in as `explicit`)
/// 2. Nearest ancestor of `cwd` holding `feature_list.json`
/// 3. Nearest ancestor of `cwd` holding `.git/`
/// 4. `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    discover(&cwd)
}

fn discover(start: &Path) -> PathBuf {
    find_upward(start, |dir| dir.join(FEATURE_FILE).is_file())
        .or_else(|| find_upward(start, |dir| dir.join(".git").is_dir()))
        .unwrap_or_else(|| start.to_path_buf())
}

fn find_upward(start: &Path, is_root: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start.ancestors().find(|dir| is_root(dir)).map(Path::to_path_buf)
}
