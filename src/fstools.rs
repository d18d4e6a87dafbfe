use std::fs;
use std::path::Path;

use tracing::{debug, warn};

pub enum DirEntryCategory {
    DoesNotExist,
    RegularFile,
    SymbolicLink,
    Directory,
    Unknown,
}

pub fn classify_file(path: &Path) -> DirEntryCategory {
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.is_symlink() {
                DirEntryCategory::SymbolicLink
            } else if metadata.is_file() {
                DirEntryCategory::RegularFile
            } else if metadata.is_dir() {
                DirEntryCategory::Directory
            } else {
                DirEntryCategory::Unknown
            }
        },
        Err(_) => DirEntryCategory::DoesNotExist,
    }
}

/// Best-effort removal of a temporary artifact. A file that is already gone
/// counts as removed.
pub fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = ?path, "removed"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => (),
        Err(err) => warn!(path = ?path, error = %err, "unable to remove"),
    }
}

pub fn file_size(path: &Path) -> u64 {
    match fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(_) => 0,
    }
}
