use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// `<path>.<suffix>`, keeping the full original file name.
pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Replace `path` with `contents` so readers only ever see the old file or
/// the complete new one.
///
/// Writes `<path>.tmp`, copies the current file to `<path>.backup` when
/// `backup` is set, then renames the temp file over `path`. On any failure
/// the published file is left as it was.
pub fn replace_atomically(path: &Path, contents: &[u8], backup: bool) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let tmp = sibling(path, "tmp");
    fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;

    if backup && path.exists() {
        let bak = sibling(path, "backup");
        if let Err(e) = fs::copy(path, &bak) {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("Failed to back up {}", path.display()));
        }
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to move {} into place", tmp.display()));
    }
    Ok(())
}
