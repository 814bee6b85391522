//! Retention: find rotated siblings of a base path that exceed the limit

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use regex::bytes::Regex;

use crate::fs::creation_time;

static ROTATED_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\.[0-9_-]+$").expect("rotated suffix pattern is valid"));

/// A rotated file and its creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedFile {
    /// Full path of the file.
    pub path: PathBuf,
    /// Creation time (modification time where birth time is unavailable).
    pub created: SystemTime,
}

/// Whether `candidate` is `base_name` followed by `.` and one or more
/// digits, underscores or hyphens.
///
/// Names are compared as raw bytes, so non-UTF-8 names are matched too.
pub fn is_rotated_name(base_name: impl AsRef<OsStr>, candidate: impl AsRef<OsStr>) -> bool {
    candidate
        .as_ref()
        .as_encoded_bytes()
        .strip_prefix(base_name.as_ref().as_encoded_bytes())
        .is_some_and(|rest| ROTATED_SUFFIX.is_match(rest))
}

/// Rotated siblings of `base_path`, oldest first.
///
/// Only regular files whose name matches [`is_rotated_name`] are listed.
/// Entries that disappear or cannot be inspected mid-scan are skipped.
pub fn rotated_files(base_path: &Path) -> io::Result<Vec<RotatedFile>> {
    let Some(base_name) = base_path.file_name() else {
        return Ok(Vec::new());
    };
    let dir = match base_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries.flatten() {
        if !is_rotated_name(base_name, entry.file_name()) {
            continue;
        }
        let path = entry.path();
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "stat of rotated file failed");
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        files.push(RotatedFile {
            created: creation_time(&metadata),
            path,
        });
    }

    files.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.path.cmp(&b.path)));
    Ok(files)
}

/// Rotated files beyond the `keep` most recently created, oldest first.
///
/// `keep == 0` means unlimited retention and never yields anything.
pub fn expired_files(base_path: &Path, keep: usize) -> io::Result<Vec<PathBuf>> {
    if keep == 0 {
        return Ok(Vec::new());
    }
    let files = rotated_files(base_path)?;
    let excess = files.len().saturating_sub(keep);
    Ok(files.into_iter().take(excess).map(|f| f.path).collect())
}
