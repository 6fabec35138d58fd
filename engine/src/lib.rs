//! # BatchOps Engine - Concurrent Batch File Processing
//!
//! A headless engine for applying file operations (checksum, rename, copy,
//! copy-with-rename, move) across many files with a bounded pool of
//! concurrent workers. Designed as the foundation for multiple front-ends
//! (CLI, automation).
//!
//! ## Overview
//!
//! The engine provides:
//! - A fixed-size worker pool over bounded task and result queues
//! - Digest-verified transfers with cross-device fallbacks
//! - Deterministic error classification into a closed set of kinds
//! - A per-batch fault policy (skip / retry with backoff / abort)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use engine::{Operation, PolicyEngine, Task, WorkerPool};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = Arc::new(PolicyEngine::new());
//! let pool = WorkerPool::with_policy(4, 64, Arc::clone(&policy));
//!
//! // A single consumer drains results while tasks are submitted.
//! let results = pool.results();
//! let consumer = std::thread::spawn(move || {
//!     for result in results.iter() {
//!         println!("{:?}: verified={}", result.old_name, result.verified);
//!     }
//! });
//!
//! for file in engine::fs_ops::collect_files("/data/in".as_ref())? {
//!     let task = Task::new(Operation::Copy, file).with_roots("/data/in", "/data/out");
//!     pool.submit(task)?;
//! }
//! pool.close();
//! consumer.join().expect("result consumer panicked");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (Task, TaskResult, Operation, BatchSummary)
//! - **error**: Error types and classification
//! - **checksums**: Content digest computation
//! - **paths**: Destination path resolution
//! - **fs_ops**: Low-level filesystem operations
//! - **executor**: Per-task operation execution
//! - **policy**: Fault policy and the retry loop
//! - **pool**: The concurrent worker pool

pub mod checksums;
pub mod error;
pub mod executor;
pub mod fs_ops;
pub mod model;
pub mod paths;
pub mod policy;
pub mod pool;

// Re-export main types and functions
pub use checksums::{digest_file, DigestAlgorithm};
pub use error::{classify, ClassifiedError, EngineError, ErrorKind};
pub use executor::execute;
pub use model::{BatchSummary, Operation, Task, TaskResult};
pub use paths::resolve_destination;
pub use policy::{run_with_retry, Policy, PolicyEngine};
pub use pool::WorkerPool;
