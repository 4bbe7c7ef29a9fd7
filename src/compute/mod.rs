//! Compute gateway: pools, jobs and tasks on the batch service.
//!
//! The [`ComputeGateway`] trait covers the lifecycle this client drives:
//!
//! ```text
//!   ensure_pool() ──→ ensure_job() ──→ submit_tasks() ──→ wait_for_completion() ──→ task_output()
//!                                                                                     │
//!                                                        delete_job() / delete_pool() ◄┘
//! ```
//!
//! | Method | Kind | Required | Returns |
//! |--------|------|----------|---------|
//! | `ensure_pool()` | async | yes | `QuickstartResult<CreateOutcome>` |
//! | `ensure_job()` | async | yes | `QuickstartResult<CreateOutcome>` |
//! | `submit_tasks()` | async | yes | `QuickstartResult<()>` |
//! | `list_tasks()` | async | yes | `QuickstartResult<Vec<TaskInfo>>` |
//! | `task_output()` | async | yes | `QuickstartResult<String>` |
//! | `delete_job()` | async | yes | `QuickstartResult<DeleteOutcome>` |
//! | `delete_pool()` | async | yes | `QuickstartResult<DeleteOutcome>` |
//! | `wait_for_completion()` | async | provided | `QuickstartResult<WaitOutcome>` |
//!
//! [`batch::BatchServiceClient`] is the HTTP implementation.

pub mod batch;
mod types;

use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::error::{QuickstartError, QuickstartResult};
use crate::outcome::{CreateOutcome, DeleteOutcome};

pub use types::{
    ImageReference, JobSpec, NodeInfo, OutputStream, PoolSpec, TaskExecutionInfo,
    TaskExecutionResult, TaskFailureInfo, TaskInfo, TaskSpec, TaskState,
    VirtualMachineConfiguration,
};

/// Operations consumed from the batch compute control API.
///
/// # Contract
///
/// - `ensure_pool()` / `ensure_job()` MUST report an existing resource with
///   the same id as `CreateOutcome::AlreadyExists`, never as an error.
/// - `submit_tasks()` MUST fail if any task in the batch was rejected.
/// - `delete_job()` / `delete_pool()` MUST report a missing resource as
///   `DeleteOutcome::NotFound`.
#[async_trait]
pub trait ComputeGateway: Send + Sync {
    /// Create a pool unless one with the same id exists.
    async fn ensure_pool(&self, pool: &PoolSpec) -> QuickstartResult<CreateOutcome>;

    /// Create a job unless one with the same id exists.
    async fn ensure_job(&self, job: &JobSpec) -> QuickstartResult<CreateOutcome>;

    /// Add a batch of tasks to a job.
    async fn submit_tasks(&self, job_id: &str, tasks: &[TaskSpec]) -> QuickstartResult<()>;

    /// List every task of a job with its current state.
    async fn list_tasks(&self, job_id: &str) -> QuickstartResult<Vec<TaskInfo>>;

    /// Read a captured output stream of a task from the node it ran on.
    async fn task_output(
        &self,
        job_id: &str,
        task_id: &str,
        stream: OutputStream,
    ) -> QuickstartResult<String>;

    async fn delete_job(&self, job_id: &str) -> QuickstartResult<DeleteOutcome>;

    async fn delete_pool(&self, pool_id: &str) -> QuickstartResult<DeleteOutcome>;

    /// Wait until every task in `task_ids` is `Completed`, or `options.timeout`
    /// elapses.
    ///
    /// Polls `list_tasks()` every `options.poll_interval`, sleeping between
    /// polls. Running out of time is reported as [`WaitOutcome::TimedOut`]
    /// with the last snapshot; a remote error while polling is returned as is.
    async fn wait_for_completion(
        &self,
        job_id: &str,
        task_ids: &[String],
        options: &WaitOptions,
    ) -> QuickstartResult<WaitOutcome> {
        let mut last_seen: Vec<TaskInfo> = Vec::new();

        let poll = async {
            loop {
                let tasks = self.list_tasks(job_id).await?;
                let pending = pending_task_ids(task_ids, &tasks);
                if pending.is_empty() {
                    return Ok::<_, QuickstartError>(tasks);
                }
                debug!(
                    job_id = %job_id,
                    pending = pending.len(),
                    total = task_ids.len(),
                    "Tasks still running"
                );
                last_seen = tasks;
                sleep(options.poll_interval).await;
            }
        };

        let waited = timeout(options.timeout, poll).await;
        match waited {
            Ok(tasks) => Ok(WaitOutcome::Completed(tasks?)),
            Err(_) => Ok(WaitOutcome::TimedOut {
                pending: pending_task_ids(task_ids, &last_seen),
                tasks: last_seen,
            }),
        }
    }
}

/// Ids from `task_ids` that are not `Completed` in `tasks`, in `task_ids` order.
///
/// A tracked id missing from the listing counts as pending.
pub fn pending_task_ids(task_ids: &[String], tasks: &[TaskInfo]) -> Vec<String> {
    let by_id: FxHashMap<&str, &TaskInfo> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    task_ids
        .iter()
        .filter(|id| !by_id.get(id.as_str()).is_some_and(|t| t.is_completed()))
        .cloned()
        .collect()
}

/// How long, and how often, to poll for task completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    /// 30 minute deadline, polled every 10 seconds.
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// Result of waiting for tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every tracked task reached `Completed`.
    Completed(Vec<TaskInfo>),
    /// The deadline passed first.
    TimedOut {
        /// Tracked task ids that had not completed.
        pending: Vec<String>,
        /// Last listing seen before the deadline.
        tasks: Vec<TaskInfo>,
    },
}

impl WaitOutcome {
    /// Check if every tracked task completed in time.
    pub fn is_completed(&self) -> bool {
        matches!(self, WaitOutcome::Completed(_))
    }

    /// The most recent task listing, whichever way the wait ended.
    pub fn tasks(&self) -> &[TaskInfo] {
        match self {
            WaitOutcome::Completed(tasks) | WaitOutcome::TimedOut { tasks, .. } => tasks,
        }
    }
}
