//! Error types and error classification.
//!
//! `EngineError` is the single error type for every fallible engine
//! operation. Each variant records the failing path and, where one exists,
//! the underlying `io::Error`, with read-phase and write-phase failures kept
//! in separate variants so classification stays deterministic.
//!
//! `classify` reduces any `EngineError` to one of the seven `ErrorKind`
//! categories the policy engine dispatches on. It never fails: unrecognized
//! failures classify as `Unknown`.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source file does not exist.
    #[error("source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Failed to read from a file.
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    /// Failed to write to a file.
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreation { path: PathBuf, source: io::Error },

    /// Failed to remove a file.
    #[error("failed to remove {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },

    /// A rename syscall failed.
    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// Source path is not located under the configured source root.
    #[error("{path} is not under source root {root}")]
    PathOutsideRoot { path: PathBuf, root: PathBuf },

    /// Path cannot be used for the requested operation.
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    /// Destination volume does not have enough free space.
    #[error("insufficient disk space for {path}: {required} bytes required, {available} available")]
    DiskSpaceFull {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    /// Destination content did not match the source after a transfer.
    #[error("digest mismatch after transfer to {path}")]
    DigestMismatch { path: PathBuf },

    /// Catch-all for unexpected errors.
    #[error("engine error: {message}")]
    Unknown { message: String },
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::Unknown {
            message: err.to_string(),
        }
    }
}

/// Closed set of error categories the policy engine dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    FileNotFound,
    PermissionDenied,
    DiskSpaceFull,
    #[serde(rename = "io-read")]
    IORead,
    #[serde(rename = "io-write")]
    IOWrite,
    CrossDevice,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileNotFound => write!(f, "file-not-found"),
            Self::PermissionDenied => write!(f, "permission-denied"),
            Self::DiskSpaceFull => write!(f, "disk-space-full"),
            Self::IORead => write!(f, "io-read"),
            Self::IOWrite => write!(f, "io-write"),
            Self::CrossDevice => write!(f, "cross-device"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file-not-found" => Ok(Self::FileNotFound),
            "permission-denied" => Ok(Self::PermissionDenied),
            "disk-space-full" => Ok(Self::DiskSpaceFull),
            "io-read" => Ok(Self::IORead),
            "io-write" => Ok(Self::IOWrite),
            "cross-device" => Ok(Self::CrossDevice),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unrecognized error kind: {other}")),
        }
    }
}

/// A classified failure, as carried in a `TaskResult`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub path: PathBuf,
}

impl ClassifiedError {
    /// Classify an engine error against the task's source path.
    pub fn from_engine(err: &EngineError, path: &Path) -> Self {
        ClassifiedError {
            kind: classify(err),
            message: err.to_string(),
            path: path.to_path_buf(),
        }
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Whether an io::Error came from the read or write side of an operation.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Read,
    Write,
}

/// Map an `EngineError` to its `ErrorKind`. Total and deterministic.
pub fn classify(err: &EngineError) -> ErrorKind {
    match err {
        EngineError::SourceNotFound { .. } => ErrorKind::FileNotFound,
        EngineError::DiskSpaceFull { .. } => ErrorKind::DiskSpaceFull,
        EngineError::Read { source, .. } => classify_io(source, Phase::Read),
        EngineError::Write { source, .. }
        | EngineError::DirectoryCreation { source, .. }
        | EngineError::Remove { source, .. } => classify_io(source, Phase::Write),
        EngineError::Rename { source, .. } => match source.kind() {
            io::ErrorKind::CrossesDevices => ErrorKind::CrossDevice,
            io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::StorageFull => ErrorKind::DiskSpaceFull,
            _ => classify_message(&source.to_string()).unwrap_or(ErrorKind::Unknown),
        },
        // Mismatch is detected after the write phase completed.
        EngineError::DigestMismatch { .. } => ErrorKind::IOWrite,
        EngineError::PathOutsideRoot { .. } | EngineError::InvalidPath { .. } => ErrorKind::Unknown,
        EngineError::Unknown { message } => classify_message(message).unwrap_or(ErrorKind::Unknown),
    }
}

fn classify_io(err: &io::Error, phase: Phase) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::FileNotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        io::ErrorKind::StorageFull => ErrorKind::DiskSpaceFull,
        io::ErrorKind::CrossesDevices => ErrorKind::CrossDevice,
        _ => classify_message(&err.to_string()).unwrap_or(match phase {
            Phase::Read => ErrorKind::IORead,
            Phase::Write => ErrorKind::IOWrite,
        }),
    }
}

/// Message probes for raw OS errors that don't surface a typed kind.
fn classify_message(message: &str) -> Option<ErrorKind> {
    let message = message.to_lowercase();
    if message.contains("no space left") {
        Some(ErrorKind::DiskSpaceFull)
    } else if message.contains("cross-device") {
        Some(ErrorKind::CrossDevice)
    } else if message.contains("read") {
        Some(ErrorKind::IORead)
    } else if message.contains("write") {
        Some(ErrorKind::IOWrite)
    } else {
        None
    }
}
