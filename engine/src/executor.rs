//! Per-task operation executor.
//!
//! `execute` performs one unit of work for a single file and produces the
//! task's `TaskResult`. Failures are recorded in the result (classified, with
//! whatever partial state was already gathered) rather than aborting the
//! batch; batch-level decisions belong to the policy engine.
//!
//! Every transfer operation computes the source digest before touching the
//! destination and re-reads the destination afterwards, so `verified` always
//! reflects an end-to-end content comparison.

use std::fs;
use std::io;
use std::path::Path;

use crate::checksums::digest_file;
use crate::error::{ClassifiedError, EngineError};
use crate::fs_ops;
use crate::model::{Operation, Task, TaskResult};
use crate::paths::resolve_destination;

/// Execute a single task.
pub fn execute(task: &Task) -> TaskResult {
    match task.operation {
        Operation::Checksum => checksum(task),
        Operation::Rename => rename(task),
        Operation::Copy => copy(task, false),
        Operation::CopyWithRename => copy(task, true),
        Operation::Move => relocate(task),
    }
}

fn fail(mut result: TaskResult, err: EngineError, task: &Task) -> TaskResult {
    result.error = Some(ClassifiedError::from_engine(&err, &task.source));
    result
}

/// Verify the source exists before any work starts.
fn require_source(task: &Task) -> Result<(), EngineError> {
    match fs::metadata(&task.source) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(EngineError::SourceNotFound {
            path: task.source.clone(),
        }),
        Err(e) => Err(EngineError::Read {
            path: task.source.clone(),
            source: e,
        }),
    }
}

fn resolve_for(task: &Task, apply_rename: bool) -> Result<std::path::PathBuf, EngineError> {
    resolve_destination(
        &task.source,
        task.source_root.as_deref(),
        task.dest_root.as_deref(),
        &task.prefix,
        &task.suffix,
        apply_rename,
    )
}

fn ensure_parent(dest: &Path) -> Result<(), EngineError> {
    match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs_ops::ensure_dir(parent),
        _ => Ok(()),
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices || err.to_string().contains("cross-device")
}

/// Success for a transfer whose destination resolved to the source itself.
///
/// The file already holds the destination name and content, so no side
/// effects are performed; the digest comparison is trivially true.
fn already_in_place(
    mut result: TaskResult,
    src_digest: String,
    dest: std::path::PathBuf,
) -> TaskResult {
    tracing::debug!(path = %dest.display(), "destination equals source; nothing to do");
    result.dest_digest = Some(src_digest);
    result.verified = true;
    result.new_name = Some(dest);
    result
}

fn checksum(task: &Task) -> TaskResult {
    let mut result = TaskResult::for_task(task);

    if let Err(e) = require_source(task) {
        return fail(result, e, task);
    }

    let digest = match digest_file(&task.source, task.algorithm) {
        Ok(digest) => digest,
        Err(e) => return fail(result, e, task),
    };

    result.source_digest = Some(digest);
    result.new_name = Some(task.source.clone());
    result
}

fn rename(task: &Task) -> TaskResult {
    let mut result = TaskResult::for_task(task);

    if let Err(e) = require_source(task) {
        return fail(result, e, task);
    }

    let src_digest = match digest_file(&task.source, task.algorithm) {
        Ok(digest) => digest,
        Err(e) => return fail(result, e, task),
    };
    result.source_digest = Some(src_digest.clone());

    let dest = match resolve_for(task, true) {
        Ok(path) => path,
        Err(e) => return fail(result, e, task),
    };

    // The rule collapsed to the current name; removing the "existing"
    // destination would delete the source itself.
    if dest == task.source {
        return already_in_place(result, src_digest, dest);
    }

    if let Err(e) = ensure_parent(&dest) {
        return fail(result, e, task);
    }
    if let Err(e) = fs_ops::remove_existing(&dest) {
        return fail(result, e, task);
    }
    if let Err(e) = fs_ops::check_disk_space(&task.source, &dest) {
        return fail(result, e, task);
    }

    if let Err(e) = fs::rename(&task.source, &dest) {
        if is_cross_device(&e) {
            tracing::debug!(
                from = %task.source.display(),
                to = %dest.display(),
                "rename crossed devices; falling back to copy-then-delete"
            );
            if let Err(e) = fs_ops::copy_then_delete(&task.source, &dest, task.algorithm) {
                return fail(result, e, task);
            }
        } else {
            return fail(
                result,
                EngineError::Rename {
                    from: task.source.clone(),
                    to: dest,
                    source: e,
                },
                task,
            );
        }
    }

    let dst_digest = match digest_file(&dest, task.algorithm) {
        Ok(digest) => digest,
        Err(e) => return fail(result, e, task),
    };

    result.verified = src_digest == dst_digest;
    result.dest_digest = Some(dst_digest);
    result.new_name = Some(dest);
    result
}

fn copy(task: &Task, apply_rename: bool) -> TaskResult {
    let mut result = TaskResult::for_task(task);

    if let Err(e) = require_source(task) {
        return fail(result, e, task);
    }

    let src_digest = match digest_file(&task.source, task.algorithm) {
        Ok(digest) => digest,
        Err(e) => return fail(result, e, task),
    };
    result.source_digest = Some(src_digest.clone());

    let dest = match resolve_for(task, apply_rename) {
        Ok(path) => path,
        Err(e) => return fail(result, e, task),
    };

    // Copying a file onto itself would truncate it before the read starts.
    if dest == task.source {
        return already_in_place(result, src_digest, dest);
    }

    if let Err(e) = ensure_parent(&dest) {
        return fail(result, e, task);
    }
    if let Err(e) = fs_ops::check_disk_space(&task.source, &dest) {
        return fail(result, e, task);
    }
    if let Err(e) = fs_ops::copy_file(&task.source, &dest) {
        return fail(result, e, task);
    }

    let dst_digest = match digest_file(&dest, task.algorithm) {
        Ok(digest) => digest,
        Err(e) => return fail(result, e, task),
    };

    result.verified = src_digest == dst_digest;
    result.dest_digest = Some(dst_digest);
    result.new_name = Some(dest);
    result
}

fn relocate(task: &Task) -> TaskResult {
    let mut result = TaskResult::for_task(task);

    if let Err(e) = require_source(task) {
        return fail(result, e, task);
    }

    let src_digest = match digest_file(&task.source, task.algorithm) {
        Ok(digest) => digest,
        Err(e) => return fail(result, e, task),
    };
    result.source_digest = Some(src_digest.clone());

    let dest = match resolve_for(task, true) {
        Ok(path) => path,
        Err(e) => return fail(result, e, task),
    };

    // Already at the destination; removing the "existing" destination would
    // delete the source itself.
    if dest == task.source {
        return already_in_place(result, src_digest, dest);
    }

    if let Err(e) = ensure_parent(&dest) {
        return fail(result, e, task);
    }
    if let Err(e) = fs_ops::check_disk_space(&task.source, &dest) {
        return fail(result, e, task);
    }
    if let Err(e) = fs_ops::remove_existing(&dest) {
        return fail(result, e, task);
    }

    match fs::rename(&task.source, &dest) {
        Ok(()) => {
            let dst_digest = match digest_file(&dest, task.algorithm) {
                Ok(digest) => digest,
                Err(e) => return fail(result, e, task),
            };
            result.verified = src_digest == dst_digest;
            result.dest_digest = Some(dst_digest);
        }
        Err(e) if is_cross_device(&e) => {
            tracing::debug!(
                from = %task.source.display(),
                to = %dest.display(),
                "move crossed devices; copying with verification"
            );
            if let Err(e) = fs_ops::copy_file(&task.source, &dest) {
                return fail(result, e, task);
            }

            let dst_digest = match digest_file(&dest, task.algorithm) {
                Ok(digest) => digest,
                Err(e) => {
                    let _ = fs::remove_file(&dest);
                    return fail(result, e, task);
                }
            };

            // The source is deleted only after the destination proves
            // identical; a mismatch discards the partial destination.
            if dst_digest != src_digest {
                let _ = fs::remove_file(&dest);
                return fail(result, EngineError::DigestMismatch { path: dest }, task);
            }

            if let Err(e) = fs::remove_file(&task.source) {
                return fail(
                    result,
                    EngineError::Remove {
                        path: task.source.clone(),
                        source: e,
                    },
                    task,
                );
            }

            result.dest_digest = Some(dst_digest);
            result.verified = true;
        }
        Err(e) => {
            return fail(
                result,
                EngineError::Rename {
                    from: task.source.clone(),
                    to: dest,
                    source: e,
                },
                task,
            );
        }
    }

    result.new_name = Some(dest);
    result
}
