//! BatchOps - Command-line interface for the batch processing engine.
//!
//! This is a thin front-end: it parses arguments and an optional JSON config
//! file, enumerates the source files, feeds tasks to the engine's worker
//! pool, and consumes the result stream into a printed summary. All the
//! interesting logic lives in the engine crate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use engine::{
    fs_ops, BatchSummary, DigestAlgorithm, ErrorKind, Operation, Policy, PolicyEngine, Task,
    WorkerPool,
};

/// BatchOps - concurrent batch file processing
#[derive(Parser, Debug)]
#[command(name = "batchops")]
#[command(version = "0.1.0")]
#[command(about = "Checksum, rename, copy and move files with a concurrent worker pool")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Number of concurrent workers
    #[arg(long, short = 'w', global = true, value_name = "N")]
    workers: Option<usize>,

    /// Capacity of the task and result queues (default: one slot per file)
    #[arg(long, global = true, value_name = "N")]
    queue_capacity: Option<usize>,

    /// Path to a JSON config file (also: BATCHOPS_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Maximum retry attempts per task
    #[arg(long, global = true, value_name = "N")]
    max_retries: Option<u32>,

    /// Interval between retry attempts, in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    retry_interval_ms: Option<u64>,

    /// Policy override for an error kind, e.g. --on disk-space-full=abort
    #[arg(long = "on", global = true, value_name = "KIND=POLICY")]
    policy_overrides: Vec<String>,

    /// Digest algorithm: md5, sha256, blake3
    #[arg(long, global = true, value_name = "ALGORITHM")]
    algorithm: Option<String>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Concurrently compute content digests
    Checksum {
        /// File or directory to digest
        path: PathBuf,
    },
    /// Rename files in place, applying a prefix/suffix to each name
    Rename {
        /// File or directory whose files are renamed
        path: PathBuf,
        #[arg(long, default_value = "")]
        prefix: String,
        #[arg(long, default_value = "")]
        suffix: String,
    },
    /// Copy a source tree into a destination root
    Copy {
        src: PathBuf,
        dst: PathBuf,
        /// Apply the prefix/suffix rename rule while copying
        #[arg(long)]
        rename: bool,
        #[arg(long, default_value = "")]
        prefix: String,
        #[arg(long, default_value = "")]
        suffix: String,
    },
    /// Move a source tree into a destination root
    Move {
        src: PathBuf,
        dst: PathBuf,
        #[arg(long, default_value = "")]
        prefix: String,
        #[arg(long, default_value = "")]
        suffix: String,
    },
}

/// Optional JSON config file; flags take precedence over every field.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct FileConfig {
    workers: Option<usize>,
    queue_capacity: Option<usize>,
    max_retries: Option<u32>,
    retry_interval_ms: Option<u64>,
    algorithm: Option<String>,
    policies: HashMap<ErrorKind, Policy>,
}

impl FileConfig {
    fn load(args: &Args) -> Result<Self, String> {
        let path = match &args.config {
            Some(path) => path.clone(),
            None => match std::env::var_os("BATCHOPS_CONFIG") {
                Some(path) => PathBuf::from(path),
                None => return Ok(FileConfig::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("failed to read config {}: {e}", path.display()))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("failed to parse config {}: {e}", path.display()))
    }
}

/// Parse one `--on kind=policy` override.
fn parse_policy_override(raw: &str) -> Result<(ErrorKind, Policy), String> {
    let (kind, policy) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid policy override '{raw}': expected KIND=POLICY"))?;
    Ok((kind.trim().parse()?, policy.trim().parse()?))
}

/// Settings after merging flags, config file, and defaults.
struct Settings {
    workers: usize,
    queue_capacity: Option<usize>,
    max_retries: u32,
    retry_interval: Duration,
    algorithm: DigestAlgorithm,
    policies: Vec<(ErrorKind, Policy)>,
}

impl Settings {
    fn resolve(args: &Args) -> Result<Self, String> {
        let file = FileConfig::load(args)?;

        let algorithm = match args.algorithm.as_deref().or(file.algorithm.as_deref()) {
            Some(raw) => raw.parse::<DigestAlgorithm>()?,
            None => DigestAlgorithm::default(),
        };

        let mut policies: Vec<(ErrorKind, Policy)> = file.policies.into_iter().collect();
        for raw in &args.policy_overrides {
            policies.push(parse_policy_override(raw)?);
        }

        Ok(Settings {
            workers: args.workers.or(file.workers).unwrap_or(4),
            queue_capacity: args.queue_capacity.or(file.queue_capacity),
            max_retries: args.max_retries.or(file.max_retries).unwrap_or(3),
            retry_interval: Duration::from_millis(
                args.retry_interval_ms.or(file.retry_interval_ms).unwrap_or(2000),
            ),
            algorithm,
            policies,
        })
    }

    fn build_policy_engine(&self) -> Arc<PolicyEngine> {
        let engine = PolicyEngine::new();
        engine.set_max_retries(self.max_retries);
        engine.set_retry_interval(self.retry_interval);
        for (kind, policy) in &self.policies {
            engine.set_policy(*kind, *policy);
        }
        Arc::new(engine)
    }
}

/// Build the task list for a subcommand from the enumerated files.
fn build_tasks(command: &Command, files: Vec<PathBuf>, algorithm: DigestAlgorithm) -> Vec<Task> {
    files
        .into_iter()
        .map(|file| match command {
            Command::Checksum { .. } => Task::new(Operation::Checksum, file),
            Command::Rename { prefix, suffix, .. } => Task::new(Operation::Rename, file)
                .with_rename_rule(prefix.clone(), suffix.clone()),
            Command::Copy {
                src,
                dst,
                rename,
                prefix,
                suffix,
            } => {
                let operation = if *rename {
                    Operation::CopyWithRename
                } else {
                    Operation::Copy
                };
                Task::new(operation, file)
                    .with_roots(src.clone(), dst.clone())
                    .with_rename_rule(prefix.clone(), suffix.clone())
            }
            Command::Move {
                src,
                dst,
                prefix,
                suffix,
            } => Task::new(Operation::Move, file)
                .with_roots(src.clone(), dst.clone())
                .with_rename_rule(prefix.clone(), suffix.clone()),
        })
        .map(|task| task.with_algorithm(algorithm))
        .collect()
}

fn source_root(command: &Command) -> &PathBuf {
    match command {
        Command::Checksum { path } | Command::Rename { path, .. } => path,
        Command::Copy { src, .. } | Command::Move { src, .. } => src,
    }
}

fn run_cli(args: &Args) -> Result<BatchSummary, String> {
    if let Command::Rename { prefix, suffix, .. } = &args.command {
        if prefix.is_empty() && suffix.is_empty() {
            return Err("rename requires --prefix and/or --suffix".to_string());
        }
    }

    let settings = Settings::resolve(args)?;
    let print_digests = matches!(args.command, Command::Checksum { .. });
    let verbose = args.verbose;

    let files =
        fs_ops::collect_files(source_root(&args.command)).map_err(|e| e.to_string())?;
    if files.is_empty() {
        eprintln!("No files to process.");
        return Ok(BatchSummary::new());
    }

    let submitted = files.len();
    let tasks = build_tasks(&args.command, files, settings.algorithm);

    let policy = settings.build_policy_engine();
    let capacity = settings.queue_capacity.unwrap_or(submitted);
    let pool = WorkerPool::with_policy(settings.workers, capacity, Arc::clone(&policy));

    // Single consumer: counts outcomes and prints as results stream in.
    let results = pool.results();
    let consumer = thread::spawn(move || {
        let mut summary = BatchSummary::new();
        for result in results.iter() {
            if let Some(error) = &result.error {
                if result.skipped {
                    eprintln!("skipped {}: {error}", result.old_name.display());
                } else {
                    eprintln!("failed  {}: {error}", result.old_name.display());
                }
            } else if print_digests {
                if let Some(digest) = &result.source_digest {
                    println!("{digest}  {}", result.old_name.display());
                }
            } else if verbose {
                if let Some(new_name) = &result.new_name {
                    eprintln!(
                        "done    {} -> {} (verified: {})",
                        result.old_name.display(),
                        new_name.display(),
                        result.verified
                    );
                }
            }
            summary.record(&result);
        }
        summary
    });

    for task in tasks {
        if pool.submit(task).is_err() {
            break;
        }
    }
    pool.close();

    let mut summary = consumer
        .join()
        .map_err(|_| "result consumer panicked".to_string())?;
    summary.finish(policy.is_aborted());

    // Tasks dropped after an abort produce no result; surface the gap.
    if summary.total < submitted {
        eprintln!(
            "{} of {} tasks were not dispatched (batch aborted)",
            submitted - summary.total,
            submitted
        );
    }

    eprintln!(
        "Summary: {} done, {} skipped, {} failed ({} verified, {} retries){}",
        summary.succeeded,
        summary.skipped,
        summary.failed,
        summary.verified,
        summary.retries,
        if summary.aborted { " [aborted]" } else { "" }
    );
    if let Some(elapsed) = summary.elapsed() {
        eprintln!("Elapsed: {:.2}s", elapsed.num_milliseconds() as f64 / 1000.0);
    }

    Ok(summary)
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let exit_code = match run_cli(&args) {
        Ok(summary) if summary.has_failures() => 1,
        Ok(_) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}
