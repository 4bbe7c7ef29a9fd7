//! batch-quickstart: run a handful of tasks on a managed batch service
//!
//! This crate drives two external services over their HTTP control APIs:
//! a blob store that holds task inputs and a batch service that runs the
//! tasks. Nothing is scheduled or stored locally; every step is a call to
//! one of the two services.
//!
//! # Overview
//!
//! - [`StorageGateway`] ensures the input container, uploads files and
//!   issues read-only signed URLs ([`storage::sas`]).
//! - [`build_tasks`] turns each uploaded file into exactly one task.
//! - [`ComputeGateway`] ensures the pool and job, submits tasks, waits for
//!   them with a deadline and reads their output.
//! - [`Orchestrator`] sequences the two and always attempts cleanup,
//!   asking a [`ConfirmDeletion`] policy before deleting the job and pool.
//! - [`QuickstartError`] categorizes failures; expected conflicts are
//!   [`CreateOutcome::AlreadyExists`], not errors.
//!
//! # Lifecycle
//!
//! ```text
//!   ensure_container() ──→ upload_file()* ──→ ensure_pool() ──→ ensure_job()
//!        ──→ submit_tasks() ──→ wait_for_completion() ──→ task_output()*
//!        ──→ delete_container_if_exists() ──→ [confirm] delete_job() / delete_pool()
//! ```
//!
//! ```ignore
//! use batch_quickstart::{BatchServiceClient, BlobServiceClient, FixedAnswer, Orchestrator};
//!
//! let storage = BlobServiceClient::from_credentials(&config.storage)?;
//! let compute = BatchServiceClient::from_credentials(&config.batch)?;
//! let mut run = Orchestrator::new(config, storage, compute)?;
//! let report = run.run(&mut FixedAnswer(true)).await?;
//! ```

pub mod auth;
pub mod compute;
pub mod config;
pub mod driver;
pub mod error;
pub mod outcome;
pub mod prompt;
pub mod resource;
pub mod storage;

pub use auth::SharedKeyCredential;
pub use compute::batch::BatchServiceClient;
pub use compute::{
    ComputeGateway, JobSpec, OutputStream, PoolSpec, TaskInfo, TaskSpec, TaskState, WaitOptions,
    WaitOutcome,
};
pub use config::{BatchCredentials, QuickstartConfig, StorageCredentials};
pub use driver::{
    CleanupReport, CleanupStep, Orchestrator, RunFailure, RunOutcome, RunReport, Stage, TaskOutput,
};
pub use error::{ConfigError, QuickstartError, QuickstartResult};
pub use outcome::{CreateOutcome, DeleteOutcome};
pub use prompt::{ConfirmDeletion, ConsolePrompt, DeletionTarget, FixedAnswer};
pub use resource::{CommandTemplate, ResourceFile, build_tasks};
pub use storage::blob::{BlobServiceClient, StorageAuth};
pub use storage::{ContainerHandle, InputFileReference, StorageGateway};
