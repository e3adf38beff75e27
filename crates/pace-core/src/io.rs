use crate::error::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting state files.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serialize `value` as pretty-printed JSON with a trailing newline.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value)?;
    payload.push('\n');
    atomic_write(path, payload.as_bytes())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// How [`move_file`] relocated a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMethod {
    Renamed,
    CopiedAndRemoved,
}

/// Move `src` to `dst`: atomic rename first, copy-then-delete when the two
/// paths live on different filesystems.
pub fn move_file(src: &Path, dst: &Path) -> Result<MoveMethod> {
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(MoveMethod::Renamed),
        Err(e) if is_cross_device(&e) => {
            std::fs::copy(src, dst)?;
            std::fs::remove_file(src)?;
            Ok(MoveMethod::CopiedAndRemoved)
        }
        Err(e) => Err(e.into()),
    }
}

fn is_cross_device(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::CrossesDevices
}
