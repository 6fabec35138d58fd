//! Fault-handling policy and the retry loop.
//!
//! A `PolicyEngine` maps each classified error kind to a disposition
//! (skip, retry, abort), holds the retry limits, and owns the batch's
//! set-once abort flag. One engine instance is shared by every worker of a
//! batch via `Arc`; independent batches use independent engines, so an abort
//! in one never leaks into another.
//!
//! `run_with_retry` drives a single task through the attempt/classify/decide
//! loop. The operation and the sleeper are parameters, so tests exercise the
//! state machine with a fake operation and a fake clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClassifiedError, ErrorKind};
use crate::model::{Task, TaskResult};

/// Disposition applied to a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Record the failure for this file only and carry on.
    Skip,
    /// Re-attempt after the configured interval, up to the retry limit.
    Retry,
    /// Stop dispatching further tasks for the whole batch.
    Abort,
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Policy::Skip => write!(f, "skip"),
            Policy::Retry => write!(f, "retry"),
            Policy::Abort => write!(f, "abort"),
        }
    }
}

impl std::str::FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(Policy::Skip),
            "retry" => Ok(Policy::Retry),
            "abort" => Ok(Policy::Abort),
            other => Err(format!("unrecognized policy: {other}")),
        }
    }
}

#[derive(Debug)]
struct PolicyTable {
    policies: HashMap<ErrorKind, Policy>,
    max_retries: u32,
    retry_interval: Duration,
}

/// Per-batch fault-handling engine shared by all workers.
#[derive(Debug)]
pub struct PolicyEngine {
    table: Mutex<PolicyTable>,
    aborted: AtomicBool,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        let mut policies = HashMap::new();
        policies.insert(ErrorKind::FileNotFound, Policy::Skip);
        policies.insert(ErrorKind::PermissionDenied, Policy::Retry);
        policies.insert(ErrorKind::DiskSpaceFull, Policy::Abort);
        policies.insert(ErrorKind::IORead, Policy::Retry);
        policies.insert(ErrorKind::IOWrite, Policy::Retry);
        policies.insert(ErrorKind::CrossDevice, Policy::Skip);
        policies.insert(ErrorKind::Unknown, Policy::Retry);

        PolicyEngine {
            table: Mutex::new(PolicyTable {
                policies,
                max_retries: 3,
                retry_interval: Duration::from_secs(2),
            }),
            aborted: AtomicBool::new(false),
        }
    }
}

impl PolicyEngine {
    /// Engine with the default policy table (3 retries, 2 s interval).
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the policy for an error kind; unmapped kinds retry.
    pub fn policy_for(&self, kind: ErrorKind) -> Policy {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.policies.get(&kind).copied().unwrap_or(Policy::Retry)
    }

    /// Decide the disposition of a classified failure.
    ///
    /// Once the abort flag is set this always answers `Abort`. When the
    /// resolved policy is `Abort` the flag is set first-writer-wins; it stays
    /// set until `reset`.
    pub fn handle(&self, error: &ClassifiedError) -> Policy {
        if self.aborted.load(Ordering::Acquire) {
            return Policy::Abort;
        }

        let policy = self.policy_for(error.kind);
        if policy == Policy::Abort && !self.aborted.swap(true, Ordering::AcqRel) {
            tracing::warn!(
                kind = %error.kind,
                path = %error.path.display(),
                "abort policy triggered; no further tasks will be dispatched"
            );
        }
        policy
    }

    pub fn set_policy(&self, kind: ErrorKind, policy: Policy) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.policies.insert(kind, policy);
    }

    pub fn set_max_retries(&self, max_retries: u32) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.max_retries = max_retries;
    }

    pub fn set_retry_interval(&self, interval: Duration) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.retry_interval = interval;
    }

    pub fn max_retries(&self) -> u32 {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).max_retries
    }

    pub fn retry_interval(&self) -> Duration {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retry_interval
    }

    /// True once any failure resolved to `Abort` in this batch.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Clear the abort flag so the engine can serve a new batch.
    pub fn reset(&self) {
        self.aborted.store(false, Ordering::Release);
    }
}

/// Drive one task through the attempt/classify/decide loop.
///
/// The operation and sleeper are injected: workers pass the real executor
/// and `thread::sleep`, tests pass fakes. Terminal states are success, skip,
/// abort, and retries-exhausted; `retried` on the returned result counts the
/// re-attempts that were performed.
pub fn run_with_retry<E, S>(
    task: &Task,
    engine: &PolicyEngine,
    mut operation: E,
    mut sleep: S,
) -> TaskResult
where
    E: FnMut(&Task) -> TaskResult,
    S: FnMut(Duration),
{
    let mut retries = 0u32;

    loop {
        let mut result = operation(task);
        result.retried = retries;

        let error = match &result.error {
            Some(error) => error.clone(),
            None => return result,
        };

        match engine.handle(&error) {
            Policy::Skip => {
                result.skipped = true;
                return result;
            }
            Policy::Abort => return result,
            Policy::Retry => {
                if retries < engine.max_retries() {
                    retries += 1;
                    sleep(engine.retry_interval());
                } else {
                    return result;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Operation;
    use std::cell::Cell;
    use std::path::PathBuf;

    fn classified(kind: ErrorKind) -> ClassifiedError {
        ClassifiedError {
            kind,
            message: format!("synthetic {kind} failure"),
            path: PathBuf::from("/tmp/file"),
        }
    }

    /// Operation that fails `failures` times, then succeeds.
    fn flaky_operation(
        failures: u32,
        kind: ErrorKind,
    ) -> impl FnMut(&Task) -> TaskResult {
        let remaining = Cell::new(failures);
        move |task: &Task| {
            let mut result = TaskResult::for_task(task);
            if remaining.get() > 0 {
                remaining.set(remaining.get() - 1);
                result.error = Some(classified(kind));
            }
            result
        }
    }

    #[test]
    fn test_default_policy_table() {
        let engine = PolicyEngine::new();
        assert_eq!(engine.policy_for(ErrorKind::FileNotFound), Policy::Skip);
        assert_eq!(engine.policy_for(ErrorKind::DiskSpaceFull), Policy::Abort);
        assert_eq!(engine.policy_for(ErrorKind::IORead), Policy::Retry);
        assert_eq!(engine.policy_for(ErrorKind::CrossDevice), Policy::Skip);
        assert_eq!(engine.max_retries(), 3);
        assert_eq!(engine.retry_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_handle_sets_abort_flag_once() {
        let engine = PolicyEngine::new();
        assert!(!engine.is_aborted());

        assert_eq!(engine.handle(&classified(ErrorKind::DiskSpaceFull)), Policy::Abort);
        assert!(engine.is_aborted());

        // Every kind now short-circuits to Abort.
        assert_eq!(engine.handle(&classified(ErrorKind::FileNotFound)), Policy::Abort);

        engine.reset();
        assert!(!engine.is_aborted());
        assert_eq!(engine.handle(&classified(ErrorKind::FileNotFound)), Policy::Skip);
    }

    #[test]
    fn test_skip_policy_leaves_abort_flag_clear() {
        let engine = PolicyEngine::new();
        assert_eq!(engine.handle(&classified(ErrorKind::FileNotFound)), Policy::Skip);
        assert!(!engine.is_aborted());
    }

    #[test]
    fn test_any_abort_mapped_kind_sets_the_flag() {
        let engine = PolicyEngine::new();
        engine.set_policy(ErrorKind::IOWrite, Policy::Abort);

        assert_eq!(engine.handle(&classified(ErrorKind::IOWrite)), Policy::Abort);
        assert!(engine.is_aborted());
    }

    #[test]
    fn test_retry_until_success_reports_retry_count() {
        let engine = PolicyEngine::new();
        engine.set_max_retries(5);
        engine.set_retry_interval(Duration::from_millis(10));

        let task = Task::new(Operation::Checksum, "/tmp/file");
        let mut slept = Vec::new();

        let result = run_with_retry(
            &task,
            &engine,
            flaky_operation(3, ErrorKind::IORead),
            |interval| slept.push(interval),
        );

        assert!(result.error.is_none());
        assert!(!result.skipped);
        assert_eq!(result.retried, 3);
        assert_eq!(slept, vec![Duration::from_millis(10); 3]);
    }

    #[test]
    fn test_retries_exhausted_returns_last_failure() {
        let engine = PolicyEngine::new();
        engine.set_max_retries(2);

        let task = Task::new(Operation::Checksum, "/tmp/file");
        let mut sleeps = 0;

        let result = run_with_retry(
            &task,
            &engine,
            flaky_operation(10, ErrorKind::IOWrite),
            |_| sleeps += 1,
        );

        let error = result.error.expect("Expected a final error");
        assert_eq!(error.kind, ErrorKind::IOWrite);
        assert!(!result.skipped);
        assert_eq!(result.retried, 2);
        assert_eq!(sleeps, 2);
    }

    #[test]
    fn test_skip_policy_marks_result_skipped() {
        let engine = PolicyEngine::new();
        let task = Task::new(Operation::Checksum, "/tmp/file");

        let result = run_with_retry(
            &task,
            &engine,
            flaky_operation(1, ErrorKind::FileNotFound),
            |_| panic!("skip must not sleep"),
        );

        assert!(result.skipped);
        assert!(result.error.is_some());
        assert_eq!(result.retried, 0);
        assert!(!engine.is_aborted());
    }

    #[test]
    fn test_abort_policy_propagates_failure_and_sets_flag() {
        let engine = PolicyEngine::new();
        let task = Task::new(Operation::Checksum, "/tmp/file");

        let result = run_with_retry(
            &task,
            &engine,
            flaky_operation(1, ErrorKind::DiskSpaceFull),
            |_| panic!("abort must not sleep"),
        );

        assert!(!result.skipped);
        assert_eq!(
            result.error.expect("Expected an error").kind,
            ErrorKind::DiskSpaceFull
        );
        assert!(engine.is_aborted());
    }

    #[test]
    fn test_zero_max_retries_fails_immediately() {
        let engine = PolicyEngine::new();
        engine.set_max_retries(0);

        let task = Task::new(Operation::Checksum, "/tmp/file");
        let result = run_with_retry(
            &task,
            &engine,
            flaky_operation(1, ErrorKind::IORead),
            |_| panic!("no retries allowed"),
        );

        assert!(result.error.is_some());
        assert_eq!(result.retried, 0);
    }

    #[test]
    fn test_unmapped_kind_defaults_to_retry() {
        let engine = PolicyEngine::new();
        {
            let mut table = engine.table.lock().expect("policy table poisoned");
            table.policies.clear();
        }
        assert_eq!(engine.policy_for(ErrorKind::Unknown), Policy::Retry);
    }

    #[test]
    fn test_policy_display_round_trip() {
        for policy in [Policy::Skip, Policy::Retry, Policy::Abort] {
            let parsed: Policy = policy.to_string().parse().expect("Failed to parse policy");
            assert_eq!(parsed, policy);
        }
        assert!("panic".parse::<Policy>().is_err());
    }
}
