//! Low-level filesystem operations.
//!
//! Shared side-effecting helpers used by the operation executor: streaming
//! copy with metadata preservation, the verified copy-then-delete fallback
//! for cross-device renames, directory creation with a permission retry,
//! free-space checking, and source-tree enumeration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::checksums::{digest_file, DigestAlgorithm};
use crate::error::EngineError;

/// Copy a file's content and metadata.
///
/// Streams the content, flushes it to stable storage, duplicates the
/// source's permission bits onto the destination and preserves the source
/// modification time. Returns the number of bytes copied.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    let mut src_file = fs::File::open(src).map_err(|e| EngineError::Read {
        path: src.to_path_buf(),
        source: e,
    })?;

    let src_metadata = src_file.metadata().map_err(|e| EngineError::Read {
        path: src.to_path_buf(),
        source: e,
    })?;

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::Write {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(&mut src_file, &mut dst_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied || e.kind() == io::ErrorKind::StorageFull {
            EngineError::Write {
                path: dst.to_path_buf(),
                source: e,
            }
        } else {
            EngineError::Read {
                path: src.to_path_buf(),
                source: e,
            }
        }
    })?;

    dst_file.sync_all().map_err(|e| EngineError::Write {
        path: dst.to_path_buf(),
        source: e,
    })?;

    fs::set_permissions(dst, src_metadata.permissions()).map_err(|e| EngineError::Write {
        path: dst.to_path_buf(),
        source: e,
    })?;

    // Best effort, as in the original engine: a file that cannot carry its
    // mtime is still a correct copy.
    if let Ok(mtime) = src_metadata.modified() {
        let _ = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime));
    }

    Ok(bytes_copied)
}

/// Cross-device fallback for rename: copy, verify, then delete the source.
///
/// On a digest mismatch (or a failure to read the destination back) the
/// partial destination is deleted and the source is left untouched.
pub fn copy_then_delete(
    src: &Path,
    dst: &Path,
    algorithm: DigestAlgorithm,
) -> Result<(), EngineError> {
    copy_file(src, dst)?;

    let src_digest = digest_file(src, algorithm)?;
    let dst_digest = match digest_file(dst, algorithm) {
        Ok(digest) => digest,
        Err(e) => {
            let _ = fs::remove_file(dst);
            return Err(e);
        }
    };

    if src_digest != dst_digest {
        let _ = fs::remove_file(dst);
        return Err(EngineError::DigestMismatch {
            path: dst.to_path_buf(),
        });
    }

    fs::remove_file(src).map_err(|e| EngineError::Remove {
        path: src.to_path_buf(),
        source: e,
    })
}

#[cfg(unix)]
fn create_dir_all_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true).mode(mode);
    builder.create(path)
}

#[cfg(not(unix))]
fn create_dir_all_mode(path: &Path, _mode: u32) -> io::Result<()> {
    fs::create_dir_all(path)
}

/// Create a directory tree.
///
/// Attempts mode 0755 first; a permission failure is retried once with the
/// more restrictive 0750 before the error surfaces.
pub fn ensure_dir(path: &Path) -> Result<(), EngineError> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(EngineError::DirectoryCreation {
                path: path.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "path exists but is not a directory",
                ),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(EngineError::DirectoryCreation {
                path: path.to_path_buf(),
                source: e,
            })
        }
    }

    match create_dir_all_mode(path, 0o755) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            create_dir_all_mode(path, 0o750).map_err(|e| EngineError::DirectoryCreation {
                path: path.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreation {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Remove a pre-existing destination file, if any.
pub fn remove_existing(path: &Path) -> Result<(), EngineError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Check that the destination volume can hold the source file.
///
/// Requires the file size plus a safety margin of 10% of the free space.
/// When free space cannot be determined the check is skipped, matching the
/// reference behavior.
pub fn check_disk_space(src: &Path, dst: &Path) -> Result<(), EngineError> {
    let file_size = fs::metadata(src)
        .map_err(|e| EngineError::Read {
            path: src.to_path_buf(),
            source: e,
        })?
        .len();

    let volume = dst.parent().unwrap_or_else(|| Path::new("."));
    let available = match fs2::available_space(volume) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(path = %volume.display(), error = %e, "free space unknown; skipping disk space check");
            return Ok(());
        }
    };

    let safety_margin = available / 10;
    let required = file_size.saturating_add(safety_margin);

    if available < required {
        return Err(EngineError::DiskSpaceFull {
            path: dst.to_path_buf(),
            required,
            available,
        });
    }

    Ok(())
}

/// Recursively enumerate all regular files under a root.
///
/// A root that is itself a regular file yields just that file. Used by the
/// front-end to build the task list; the engine applies no filtering of its
/// own.
pub fn collect_files(root: &Path) -> Result<Vec<PathBuf>, EngineError> {
    let metadata = fs::metadata(root).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            EngineError::SourceNotFound {
                path: root.to_path_buf(),
            }
        } else {
            EngineError::Read {
                path: root.to_path_buf(),
                source: e,
            }
        }
    })?;

    if metadata.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();
    collect_into(root, &mut files)?;
    Ok(files)
}

fn collect_into(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), EngineError> {
    let entries = fs::read_dir(dir).map_err(|e| EngineError::Read {
        path: dir.to_path_buf(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| EngineError::Read {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| EngineError::Read {
            path: path.clone(),
            source: e,
        })?;

        if file_type.is_dir() {
            collect_into(&path, files)?;
        } else if file_type.is_file() {
            files.push(path);
        }
    }

    Ok(())
}
