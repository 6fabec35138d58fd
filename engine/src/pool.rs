//! Fixed-size worker pool over bounded task and result queues.
//!
//! Workers are OS threads; file I/O and retry sleeps block only the worker
//! performing them. `submit` applies backpressure when the task queue is
//! full. `close` consumes the pool, so submitting after shutdown is a
//! compile-time impossibility rather than a runtime contract.
//!
//! With an attached `PolicyEngine`, failures route through the retry loop
//! and workers stop dispatching new tasks once the batch abort flag is set;
//! a task already in flight still completes and delivers its result. Tasks
//! received after the flag is set produce no result at all, so the consumer
//! reconciles against the submitted count.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, SendError, Sender};

use crate::executor;
use crate::model::{Task, TaskResult};
use crate::policy::{run_with_retry, PolicyEngine};

/// A pool of concurrent workers executing file-operation tasks.
pub struct WorkerPool {
    task_tx: Sender<Task>,
    result_rx: Receiver<TaskResult>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `worker_count` workers with queues of `queue_capacity` slots.
    ///
    /// Failures are reported as-is: every failed task produces a failed
    /// result with no retries, skips, or aborts.
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        Self::build(worker_count, queue_capacity, None)
    }

    /// Start a pool whose workers route failures through a policy engine.
    pub fn with_policy(
        worker_count: usize,
        queue_capacity: usize,
        policy: Arc<PolicyEngine>,
    ) -> Self {
        Self::build(worker_count, queue_capacity, Some(policy))
    }

    fn build(
        worker_count: usize,
        queue_capacity: usize,
        policy: Option<Arc<PolicyEngine>>,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let queue_capacity = queue_capacity.max(1);

        let (task_tx, task_rx) = bounded::<Task>(queue_capacity);
        let (result_tx, result_rx) = bounded::<TaskResult>(queue_capacity);

        let workers = (0..worker_count)
            .map(|_| {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let policy = policy.clone();
                thread::spawn(move || worker_loop(task_rx, result_tx, policy))
            })
            .collect();

        // Workers hold the only result senders; once they exit, the result
        // channel disconnects and the consumer's iteration ends.
        drop(result_tx);

        WorkerPool {
            task_tx,
            result_rx,
            workers,
        }
    }

    /// Enqueue a task, blocking while the queue is full.
    ///
    /// Fails only if every worker has terminated.
    pub fn submit(&self, task: Task) -> Result<(), SendError<Task>> {
        self.task_tx.send(task)
    }

    /// Receiver for the result stream.
    ///
    /// Intended for a single designated consumer, which should drain it
    /// until the channel disconnects after `close`.
    pub fn results(&self) -> Receiver<TaskResult> {
        self.result_rx.clone()
    }

    /// Shut the pool down: no more tasks, drain the queue, join workers.
    ///
    /// Blocks until every in-flight and queued task has finished. Results
    /// must be consumed concurrently or the bounded result queue fills up
    /// and shutdown waits for the consumer.
    pub fn close(self) {
        drop(self.task_tx);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    tasks: Receiver<Task>,
    results: Sender<TaskResult>,
    policy: Option<Arc<PolicyEngine>>,
) {
    for task in tasks.iter() {
        if let Some(engine) = policy.as_deref() {
            if engine.is_aborted() {
                tracing::debug!(task = %task.id, path = %task.source.display(), "batch aborted; task not dispatched");
                continue;
            }
        }

        let result = match policy.as_deref() {
            Some(engine) => run_with_retry(&task, engine, executor::execute, thread::sleep),
            None => executor::execute(&task),
        };

        if results.send(result).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksums::{digest_file, DigestAlgorithm};
    use crate::error::ErrorKind;
    use crate::model::Operation;
    use crate::policy::Policy;
    use std::fs;
    use std::io::Write;
    use std::path::Path;

    fn write_file(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        let mut file = fs::File::create(path).expect("Failed to create file");
        file.write_all(content).expect("Failed to write file");
    }

    fn drain(results: Receiver<TaskResult>) -> thread::JoinHandle<Vec<TaskResult>> {
        thread::spawn(move || results.iter().collect())
    }

    #[test]
    fn test_concurrent_copy_batch_is_verified() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_root = dir.path().join("src");
        let dst_root = dir.path().join("dst");
        write_file(&src_root.join("a.txt"), b"hello");
        write_file(&src_root.join("b").join("c.txt"), b"world");

        let pool = WorkerPool::new(2, 8);
        let consumer = drain(pool.results());

        for file in [src_root.join("a.txt"), src_root.join("b").join("c.txt")] {
            let task = Task::new(Operation::Copy, file).with_roots(&src_root, &dst_root);
            pool.submit(task).expect("Failed to submit");
        }
        pool.close();

        let results = consumer.join().expect("Consumer panicked");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_success() && r.verified));

        assert_eq!(
            fs::read(dst_root.join("a.txt")).expect("Failed to read a.txt"),
            b"hello"
        );
        assert_eq!(
            fs::read(dst_root.join("b").join("c.txt")).expect("Failed to read c.txt"),
            b"world"
        );
    }

    #[test]
    fn test_one_result_per_submitted_task() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut files = Vec::new();
        for i in 0..20 {
            let path = dir.path().join(format!("file-{i}.txt"));
            write_file(&path, format!("content {i}").as_bytes());
            files.push(path);
        }

        let pool = WorkerPool::new(4, 4);
        let consumer = drain(pool.results());

        for file in &files {
            pool.submit(Task::new(Operation::Checksum, file))
                .expect("Failed to submit");
        }
        pool.close();

        let results = consumer.join().expect("Consumer panicked");
        assert_eq!(results.len(), files.len());
        assert!(results.iter().all(|r| r.is_success()));
    }

    #[test]
    fn test_preset_abort_flag_suppresses_all_execution() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = dir.path().join("victim.txt");
        write_file(&src, b"should never move");

        let policy = Arc::new(PolicyEngine::new());
        // Simulate a disk-full abort observed before this submission round.
        policy.handle(&crate::error::ClassifiedError {
            kind: ErrorKind::DiskSpaceFull,
            message: "no space left on device".to_string(),
            path: src.clone(),
        });
        assert!(policy.is_aborted());

        let pool = WorkerPool::with_policy(2, 8, policy);
        let consumer = drain(pool.results());

        for _ in 0..6 {
            let task = Task::new(Operation::Move, &src)
                .with_roots(dir.path(), dir.path().join("out"));
            pool.submit(task).expect("Failed to submit");
        }
        pool.close();

        let results = consumer.join().expect("Consumer panicked");
        assert!(results.is_empty(), "aborted batch must not execute tasks");
        assert!(src.exists(), "source must be untouched");
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_skip_policy_flows_through_pool() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");

        let policy = Arc::new(PolicyEngine::new());
        policy.set_policy(ErrorKind::FileNotFound, Policy::Skip);

        let pool = WorkerPool::with_policy(2, 4, Arc::clone(&policy));
        let consumer = drain(pool.results());

        pool.submit(Task::new(
            Operation::Checksum,
            dir.path().join("missing.txt"),
        ))
        .expect("Failed to submit");
        pool.close();

        let results = consumer.join().expect("Consumer panicked");
        assert_eq!(results.len(), 1);
        assert!(results[0].skipped);
        assert!(!policy.is_aborted());
    }

    #[test]
    fn test_rename_content_unchanged_through_pool() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = dir.path().join("report.txt");
        write_file(&src, b"ledger");
        let before = digest_file(&src, DigestAlgorithm::Md5).expect("Failed to digest");

        let pool = WorkerPool::new(1, 2);
        let consumer = drain(pool.results());

        pool.submit(Task::new(Operation::Rename, &src).with_rename_rule("new_", ""))
            .expect("Failed to submit");
        pool.close();

        let results = consumer.join().expect("Consumer panicked");
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(result.is_success(), "rename failed: {:?}", result.error);
        assert!(result.verified);
        assert_eq!(result.new_name, Some(dir.path().join("new_report.txt")));
        assert_eq!(result.dest_digest.as_deref(), Some(before.as_str()));
        assert!(!src.exists());
    }

    #[test]
    fn test_zero_worker_request_still_runs() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = dir.path().join("a.txt");
        write_file(&src, b"x");

        let pool = WorkerPool::new(0, 0);
        let consumer = drain(pool.results());
        pool.submit(Task::new(Operation::Checksum, &src))
            .expect("Failed to submit");
        pool.close();

        let results = consumer.join().expect("Consumer panicked");
        assert_eq!(results.len(), 1);
    }
}
