//! Core data model for batch file processing.
//!
//! This module defines the main data structures for representing batch work:
//! - Task: one requested file operation with its parameters
//! - TaskResult: the recorded outcome of executing a Task
//! - Operation: the closed set of supported operation kinds
//! - BatchSummary: aggregate counts built by the result consumer

use std::path::PathBuf;

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::checksums::DigestAlgorithm;
use crate::error::ClassifiedError;

/// The operation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Compute the source digest; no transfer.
    Checksum,
    /// Rename the file, falling back to copy-and-delete across devices.
    Rename,
    /// Copy the file to the destination root.
    Copy,
    /// Copy the file and apply the prefix/suffix rename rule.
    CopyWithRename,
    /// Move the file, falling back to verified copy-then-delete across devices.
    Move,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Checksum => write!(f, "checksum"),
            Operation::Rename => write!(f, "rename"),
            Operation::Copy => write!(f, "copy"),
            Operation::CopyWithRename => write!(f, "copy-rename"),
            Operation::Move => write!(f, "move"),
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "checksum" => Ok(Operation::Checksum),
            "rename" => Ok(Operation::Rename),
            "copy" => Ok(Operation::Copy),
            "copy-rename" | "copy_rename" => Ok(Operation::CopyWithRename),
            "move" => Ok(Operation::Move),
            other => Err(format!("unsupported operation: {other}")),
        }
    }
}

/// One unit of work: a single file operation with its parameters.
///
/// Immutable once created. Built by the caller while enumerating files and
/// consumed exactly once by a pool worker.
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique identifier for this task within the batch.
    pub id: Uuid,

    /// Full path of the source file.
    pub source: PathBuf,

    /// Root the source was enumerated under, for relative-path preservation.
    /// `None` means the operation works on the base name alone.
    pub source_root: Option<PathBuf>,

    /// Destination root. `None` means the operation is in-place.
    pub dest_root: Option<PathBuf>,

    /// Rename rule: prepended to the file stem when the rule applies.
    pub prefix: String,

    /// Rename rule: appended to the file stem when the rule applies.
    pub suffix: String,

    /// Which operation to perform.
    pub operation: Operation,

    /// Digest algorithm used for integrity verification.
    pub algorithm: DigestAlgorithm,
}

impl Task {
    /// Create a task with no roots and no rename rule.
    pub fn new(operation: Operation, source: impl Into<PathBuf>) -> Self {
        Task {
            id: Uuid::new_v4(),
            source: source.into(),
            source_root: None,
            dest_root: None,
            prefix: String::new(),
            suffix: String::new(),
            operation,
            algorithm: DigestAlgorithm::default(),
        }
    }

    /// Set the source and destination roots.
    pub fn with_roots(
        mut self,
        source_root: impl Into<PathBuf>,
        dest_root: impl Into<PathBuf>,
    ) -> Self {
        self.source_root = Some(source_root.into());
        self.dest_root = Some(dest_root.into());
        self
    }

    /// Set the prefix/suffix rename rule.
    pub fn with_rename_rule(mut self, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self.suffix = suffix.into();
        self
    }

    /// Select the digest algorithm used for verification.
    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }
}

/// The recorded outcome of executing one task.
///
/// Produced exactly once per dispatched task; read-only once it reaches the
/// result consumer.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Id of the task this result belongs to.
    pub task_id: Uuid,

    /// Original source path.
    pub old_name: PathBuf,

    /// Resulting path, when the operation produced one.
    pub new_name: Option<PathBuf>,

    /// Digest of the source content, computed before any transfer.
    pub source_digest: Option<String>,

    /// Digest of the destination content after the transfer.
    pub dest_digest: Option<String>,

    /// True iff source and destination digests matched after a transfer.
    pub verified: bool,

    /// The classified failure, if the task did not succeed.
    pub error: Option<ClassifiedError>,

    /// Number of re-attempts performed by the retry loop.
    pub retried: u32,

    /// True when a failure was converted to a skip by policy.
    pub skipped: bool,
}

impl TaskResult {
    /// Blank result for a task, before execution populates it.
    pub fn for_task(task: &Task) -> Self {
        TaskResult {
            task_id: task.id,
            old_name: task.source.clone(),
            new_name: None,
            source_digest: None,
            dest_digest: None,
            verified: false,
            error: None,
            retried: 0,
            skipped: false,
        }
    }

    /// True when the task completed without error and was not skipped.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.skipped
    }
}

/// Aggregate counts over one batch, built by the single result consumer.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub verified: usize,
    pub retries: u64,
    pub aborted: bool,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
}

impl BatchSummary {
    pub fn new() -> Self {
        BatchSummary {
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            verified: 0,
            retries: 0,
            aborted: false,
            started_at: Local::now(),
            finished_at: None,
        }
    }

    /// Fold one result into the counts.
    pub fn record(&mut self, result: &TaskResult) {
        self.total += 1;
        self.retries += u64::from(result.retried);
        if result.skipped {
            self.skipped += 1;
        } else if result.error.is_some() {
            self.failed += 1;
        } else {
            self.succeeded += 1;
            if result.verified {
                self.verified += 1;
            }
        }
    }

    /// Close the summary once the result stream has drained.
    pub fn finish(&mut self, aborted: bool) {
        self.aborted = aborted;
        self.finished_at = Some(Local::now());
    }

    /// True when the batch should be reported as failed overall.
    pub fn has_failures(&self) -> bool {
        self.aborted || self.failed > 0
    }

    /// Wall-clock duration of the batch, once finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

impl Default for BatchSummary {
    fn default() -> Self {
        Self::new()
    }
}
