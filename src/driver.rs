//! Orchestration driver.
//!
//! The run is a forward-only sequence of stages:
//!
//! ```text
//!   Configuring ──→ Uploading ──→ ProvisioningPool ──→ ProvisioningJob ──→ Submitting
//!                                                                             │
//!          Done ◄── Cleanup ◄── Reporting ◄── Awaiting ◄──────────────────────┘
//! ```
//!
//! **Invariants:**
//! - A stage is entered at most once and never revisited.
//! - A gateway error aborts the main sequence but never skips `Cleanup`.
//! - `Cleanup` only touches what this run ensured: the container if it was
//!   ensured, the job and pool if they were ensured and the
//!   [`ConfirmDeletion`] policy agrees.
//! - A cleanup failure is recorded, never returned in place of the error
//!   that aborted the run.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::compute::{ComputeGateway, OutputStream, TaskInfo, WaitOutcome};
use crate::config::QuickstartConfig;
use crate::error::{QuickstartError, QuickstartResult};
use crate::outcome::{CreateOutcome, DeleteOutcome};
use crate::prompt::{ConfirmDeletion, DeletionTarget};
use crate::resource::build_tasks;
use crate::storage::{ContainerHandle, InputFileReference, StorageGateway};

/// Stage of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Configuring,
    Uploading,
    ProvisioningPool,
    ProvisioningJob,
    Submitting,
    Awaiting,
    Reporting,
    Cleanup,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Configuring => "configuring",
            Stage::Uploading => "uploading",
            Stage::ProvisioningPool => "provisioning pool",
            Stage::ProvisioningJob => "provisioning job",
            Stage::Submitting => "submitting",
            Stage::Awaiting => "awaiting",
            Stage::Reporting => "reporting",
            Stage::Cleanup => "cleanup",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Standard output of one completed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    pub task_id: String,
    pub node_id: Option<String>,
    pub exit_code: Option<i32>,
    pub stdout: String,
}

impl std::fmt::Display for TaskOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Task: {}", self.task_id)?;
        writeln!(f, "Node: {}", self.node_id.as_deref().unwrap_or("(unknown)"))?;
        writeln!(f, "Standard out:")?;
        write!(f, "{}", self.stdout)
    }
}

/// How the awaited tasks ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every task reached `Completed` before the deadline.
    AllCompleted,
    /// The deadline passed; these task ids had not completed.
    Incomplete { pending: Vec<String> },
}

/// What happened to one resource during cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CleanupStep {
    /// The run never got as far as ensuring it.
    #[default]
    NotNeeded,
    /// The confirmation policy said no.
    Declined,
    Done(DeleteOutcome),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CleanupReport {
    pub container: CleanupStep,
    pub job: CleanupStep,
    pub pool: CleanupStep,
}

impl CleanupReport {
    pub fn has_failures(&self) -> bool {
        [&self.container, &self.job, &self.pool]
            .iter()
            .any(|step| matches!(step, CleanupStep::Failed(_)))
    }
}

/// Summary of a run that got through every stage.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub inputs: Vec<InputFileReference>,
    pub outputs: Vec<TaskOutput>,
    pub cleanup: CleanupReport,
    pub elapsed: Duration,
}

/// A run aborted by a gateway error. Cleanup has already been attempted.
#[derive(Debug, Error)]
#[error("run failed while {stage}: {source}")]
pub struct RunFailure {
    pub stage: Stage,
    #[source]
    pub source: QuickstartError,
    pub cleanup: CleanupReport,
}

/// Resources this run has ensured and may therefore clean up.
#[derive(Debug, Default)]
struct Provisioned {
    container: Option<ContainerHandle>,
    job: bool,
    pool: bool,
}

/// What the main sequence produced before cleanup.
struct Completion {
    outcome: RunOutcome,
    inputs: Vec<InputFileReference>,
    outputs: Vec<TaskOutput>,
}

/// Sequences the storage and compute gateways through one quickstart run.
pub struct Orchestrator<S, C> {
    config: QuickstartConfig,
    storage: S,
    compute: C,
    stage: Stage,
}

impl<S: StorageGateway, C: ComputeGateway> Orchestrator<S, C> {
    /// Validate the configuration and take ownership of the gateways.
    ///
    /// Nothing is contacted here; an invalid configuration fails before the
    /// first remote call.
    pub fn new(config: QuickstartConfig, storage: S, compute: C) -> QuickstartResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage,
            compute,
            stage: Stage::Configuring,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "stage {next} after {}", self.stage);
        self.stage = next;
    }

    /// Run every stage, then clean up whatever was provisioned.
    ///
    /// An orchestrator runs once; stages never repeat.
    pub async fn run(
        &mut self,
        confirm: &mut dyn ConfirmDeletion,
    ) -> Result<RunReport, RunFailure> {
        let started = Instant::now();
        let mut provisioned = Provisioned::default();

        let result = self.execute(&mut provisioned).await;
        let failed_at = self.stage;

        self.advance(Stage::Cleanup);
        let cleanup = self.cleanup(&provisioned, confirm).await;
        self.advance(Stage::Done);

        match result {
            Ok(done) => Ok(RunReport {
                outcome: done.outcome,
                inputs: done.inputs,
                outputs: done.outputs,
                cleanup,
                elapsed: started.elapsed(),
            }),
            Err(source) => Err(RunFailure {
                stage: failed_at,
                source,
                cleanup,
            }),
        }
    }

    async fn execute(&mut self, provisioned: &mut Provisioned) -> QuickstartResult<Completion> {
        self.advance(Stage::Uploading);
        let container_name = self.config.container_name.clone();
        let (container, outcome) = self.storage.ensure_container(&container_name).await?;
        if outcome == CreateOutcome::AlreadyExists {
            info!(container = %container_name, "Container already existed");
        }
        provisioned.container = Some(container.clone());

        let inputs = self.upload_inputs(&container).await?;

        self.advance(Stage::ProvisioningPool);
        let pool = self.config.pool.clone();
        info!(pool_id = %pool.id, "Creating pool [{}]...", pool.id);
        let outcome = self.compute.ensure_pool(&pool).await?;
        provisioned.pool = true;
        if outcome == CreateOutcome::AlreadyExists {
            info!(pool_id = %pool.id, "The pool {} already existed when we tried to create it", pool.id);
        }

        self.advance(Stage::ProvisioningJob);
        let job = self.config.job();
        info!(job_id = %job.id, "Creating job [{}]...", job.id);
        let outcome = self.compute.ensure_job(&job).await?;
        provisioned.job = true;
        if outcome == CreateOutcome::AlreadyExists {
            info!(job_id = %job.id, "The job {} already existed when we tried to create it", job.id);
        }

        self.advance(Stage::Submitting);
        let tasks = build_tasks(&inputs, &self.config.command);
        info!(job_id = %job.id, "Adding {} tasks to job [{}]...", tasks.len(), job.id);
        self.compute.submit_tasks(&job.id, &tasks).await?;
        let task_ids: Vec<String> = tasks.into_iter().map(|t| t.id).collect();

        self.advance(Stage::Awaiting);
        let wait = self.config.wait;
        info!(
            timeout_secs = wait.timeout.as_secs(),
            "Monitoring all tasks for 'Completed' state, timeout in {:?}...",
            wait.timeout
        );
        let waited = self
            .compute
            .wait_for_completion(&job.id, &task_ids, &wait)
            .await?;
        let outcome = match &waited {
            WaitOutcome::Completed(_) => {
                info!("All tasks reached state Completed.");
                RunOutcome::AllCompleted
            }
            WaitOutcome::TimedOut { pending, .. } => {
                warn!(
                    pending = pending.len(),
                    "Tasks did not reach state Completed within the timeout: {}",
                    pending.join(", ")
                );
                RunOutcome::Incomplete {
                    pending: pending.clone(),
                }
            }
        };

        self.advance(Stage::Reporting);
        let outputs = self.collect_outputs(&job.id, &task_ids, waited.tasks()).await?;

        Ok(Completion {
            outcome,
            inputs,
            outputs,
        })
    }

    async fn upload_inputs(
        &self,
        container: &ContainerHandle,
    ) -> QuickstartResult<Vec<InputFileReference>> {
        let mut inputs = Vec::with_capacity(self.config.input_files.len());
        for path in &self.config.input_files {
            info!(
                path = %path.display(),
                "Uploading file {} to container [{}]...",
                path.display(),
                container.name()
            );
            inputs.push(self.storage.upload_file(container, path).await?);
        }
        Ok(inputs)
    }

    /// Stdout of every completed task, in submission order.
    async fn collect_outputs(
        &self,
        job_id: &str,
        task_ids: &[String],
        tasks: &[TaskInfo],
    ) -> QuickstartResult<Vec<TaskOutput>> {
        let by_id: FxHashMap<&str, &TaskInfo> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

        println!();
        println!("Printing task output...");
        let mut outputs = Vec::new();
        for id in task_ids {
            let Some(task) = by_id.get(id.as_str()).filter(|t| t.is_completed()) else {
                continue;
            };
            let stdout = self
                .compute
                .task_output(job_id, id, OutputStream::Stdout)
                .await?;
            let output = TaskOutput {
                task_id: id.clone(),
                node_id: task.node_id().map(str::to_string),
                exit_code: task.exit_code(),
                stdout,
            };
            if !task.succeeded() {
                warn!(task_id = %id, exit_code = ?output.exit_code, "Task completed with a failure");
            }
            println!("{output}");
            outputs.push(output);
        }
        Ok(outputs)
    }

    async fn cleanup(
        &self,
        provisioned: &Provisioned,
        confirm: &mut dyn ConfirmDeletion,
    ) -> CleanupReport {
        let mut report = CleanupReport::default();

        if let Some(container) = &provisioned.container {
            report.container = match self.storage.delete_container_if_exists(container).await {
                Ok(outcome) => {
                    info!(container = %container.name(), "Container [{}] {}.", container.name(), outcome);
                    CleanupStep::Done(outcome)
                }
                Err(e) => {
                    warn!(container = %container.name(), error = %e, "Container cleanup failed");
                    CleanupStep::Failed(e.to_string())
                }
            };
        }

        if provisioned.job {
            let target = DeletionTarget::Job(self.config.job_id.clone());
            report.job = if confirm.confirm(&target).await {
                step(self.compute.delete_job(target.id()).await, &target)
            } else {
                CleanupStep::Declined
            };
        }

        if provisioned.pool {
            let target = DeletionTarget::Pool(self.config.pool.id.clone());
            report.pool = if confirm.confirm(&target).await {
                step(self.compute.delete_pool(target.id()).await, &target)
            } else {
                CleanupStep::Declined
            };
        }

        report
    }
}

fn step(result: QuickstartResult<DeleteOutcome>, target: &DeletionTarget) -> CleanupStep {
    match result {
        Ok(outcome) => {
            info!(kind = target.kind(), id = target.id(), "{} [{}] {}.", target.kind(), target.id(), outcome);
            CleanupStep::Done(outcome)
        }
        Err(e) => {
            warn!(kind = target.kind(), id = target.id(), error = %e, "Cleanup failed");
            CleanupStep::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let stages = [
            Stage::Configuring,
            Stage::Uploading,
            Stage::ProvisioningPool,
            Stage::ProvisioningJob,
            Stage::Submitting,
            Stage::Awaiting,
            Stage::Reporting,
            Stage::Cleanup,
            Stage::Done,
        ];
        assert!(stages.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_task_output_display() {
        let output = TaskOutput {
            task_id: "Task0".into(),
            node_id: Some("tvm-1".into()),
            exit_code: Some(0),
            stdout: "hello\n".into(),
        };
        assert_eq!(
            output.to_string(),
            "Task: Task0\nNode: tvm-1\nStandard out:\nhello\n"
        );
    }

    #[test]
    fn test_cleanup_report_failures() {
        let mut report = CleanupReport::default();
        assert!(!report.has_failures());
        report.pool = CleanupStep::Failed("boom".into());
        assert!(report.has_failures());
    }
}
