//! Filesystem helpers: file identity, directory preparation, append-open

use std::fs::{self, File, Metadata, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset};

/// Platform identity of a file, used to tell "same file" from "replaced".
///
/// Device and inode on unix. Elsewhere the creation timestamp stands in,
/// which cannot tell apart two files created within the same clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
    #[cfg(not(unix))]
    created: SystemTime,
}

impl FileIdentity {
    /// Identity described by `metadata`.
    pub fn of(metadata: &Metadata) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Self {
                dev: metadata.dev(),
                ino: metadata.ino(),
            }
        }
        #[cfg(not(unix))]
        {
            Self {
                created: creation_time(metadata),
            }
        }
    }

    /// Identity of the file currently at `path`.
    pub fn of_path(path: &Path) -> io::Result<Self> {
        fs::metadata(path).map(|m| Self::of(&m))
    }
}

/// Creation time of a file, falling back to modification time where the
/// platform or filesystem does not record birth time.
pub fn creation_time(metadata: &Metadata) -> SystemTime {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .unwrap_or(UNIX_EPOCH)
}

/// Open `path` for appending, creating it with mode `rw-r--r--`.
pub fn open_append(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path)
}

/// Make sure `dir` exists as a directory.
///
/// A non-directory entry occupying `dir` is renamed to
/// `<dir>.old<YYYY-MM-DDTHH:MM:SS>` before the directory is created, so
/// user data is never overwritten. Losing a race against another creator
/// is not an error.
pub fn ensure_dir(dir: &Path, now: &DateTime<FixedOffset>) -> io::Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    if let Ok(metadata) = fs::metadata(dir) {
        if metadata.is_dir() {
            return Ok(());
        }
        let aside = moved_aside_path(dir, now);
        match fs::rename(dir, &aside) {
            Ok(()) => {
                tracing::warn!(
                    path = %dir.display(),
                    moved_to = %aside.display(),
                    "non-directory entry in the way of log directory moved aside"
                );
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    match fs::create_dir_all(dir) {
        Err(e) if e.kind() != io::ErrorKind::AlreadyExists => Err(e),
        _ => Ok(()),
    }
}

fn moved_aside_path(dir: &Path, now: &DateTime<FixedOffset>) -> PathBuf {
    let mut name = dir.as_os_str().to_owned();
    name.push(format!(".old{}", now.format("%Y-%m-%dT%H:%M:%S")));
    PathBuf::from(name)
}
