//! batch-quickstart - upload inputs, run one task per file, print the output

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use secrecy::SecretString;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use batch_quickstart::config::{
    DEFAULT_CONTAINER_NAME, DEFAULT_INPUT_FILES, DEFAULT_JOB_ID, DEFAULT_POOL_ID,
    DEFAULT_POOL_NODE_COUNT, DEFAULT_POOL_VM_SIZE, parse_seconds,
};
use batch_quickstart::{
    BatchCredentials, BatchServiceClient, BlobServiceClient, CleanupStep, CommandTemplate,
    ConfirmDeletion, ConsolePrompt, FixedAnswer, Orchestrator, QuickstartConfig, RunOutcome,
    StorageCredentials, WaitOptions,
};

/// Run a few tasks on a batch pool, with inputs staged through blob storage
#[derive(Parser, Debug)]
#[command(name = "batch-quickstart", version, about, long_about = None)]
struct Cli {
    /// Batch account name
    #[arg(long, env = "BATCH_ACCOUNT_NAME", default_value = "")]
    batch_account_name: String,

    /// Batch account key (base64)
    #[arg(long, env = "BATCH_ACCOUNT_KEY", default_value = "", hide_env_values = true)]
    batch_account_key: String,

    /// Batch account URL, e.g. https://<account>.<region>.batch.azure.com
    #[arg(long, env = "BATCH_ACCOUNT_URL", default_value = "")]
    batch_account_url: String,

    /// Storage account name
    #[arg(long, env = "STORAGE_ACCOUNT_NAME", default_value = "")]
    storage_account_name: String,

    /// Storage account key (base64)
    #[arg(long, env = "STORAGE_ACCOUNT_KEY", default_value = "", hide_env_values = true)]
    storage_account_key: String,

    /// Pool to create (or reuse)
    #[arg(long, env = "POOL_ID", default_value = DEFAULT_POOL_ID)]
    pool_id: String,

    /// Job to create (or reuse)
    #[arg(long, env = "JOB_ID", default_value = DEFAULT_JOB_ID)]
    job_id: String,

    /// Dedicated nodes in the pool
    #[arg(long, env = "POOL_NODE_COUNT", default_value_t = DEFAULT_POOL_NODE_COUNT)]
    pool_node_count: u32,

    /// VM size of the pool's nodes
    #[arg(long, env = "POOL_VM_SIZE", default_value = DEFAULT_POOL_VM_SIZE)]
    pool_vm_size: String,

    /// Blob container that receives the input files
    #[arg(long, env = "INPUT_CONTAINER", default_value = DEFAULT_CONTAINER_NAME)]
    container: String,

    /// Command each task runs; `{file}` is replaced with its input file name
    #[arg(long, default_value = "cmd /c type {file}")]
    command: String,

    /// Seconds to wait for all tasks to complete
    #[arg(long, default_value = "1800", value_parser = parse_seconds)]
    timeout: Duration,

    /// Seconds between task state polls
    #[arg(long, default_value = "10", value_parser = parse_seconds)]
    poll_interval: Duration,

    /// Delete the job and pool without asking
    #[arg(long, short = 'y', conflicts_with = "keep_resources")]
    yes: bool,

    /// Keep the job and pool without asking
    #[arg(long)]
    keep_resources: bool,

    /// Input files, one task per file
    #[arg(default_values = DEFAULT_INPUT_FILES)]
    inputs: Vec<PathBuf>,
}

impl Cli {
    fn into_config(self) -> QuickstartConfig {
        let mut config = QuickstartConfig::new(
            StorageCredentials {
                account_name: self.storage_account_name,
                account_key: SecretString::from(self.storage_account_key.trim().to_string()),
            },
            BatchCredentials {
                account_name: self.batch_account_name,
                account_key: SecretString::from(self.batch_account_key.trim().to_string()),
                account_url: self.batch_account_url,
            },
        );
        config.container_name = self.container;
        config.input_files = self.inputs;
        config.pool.id = self.pool_id;
        config.pool.vm_size = self.pool_vm_size;
        config.pool.target_dedicated_nodes = self.pool_node_count;
        config.job_id = self.job_id;
        config.command = CommandTemplate::new(self.command);
        config.wait = WaitOptions {
            timeout: self.timeout,
            poll_interval: self.poll_interval,
        };
        config
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("batch_quickstart=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut confirm: Box<dyn ConfirmDeletion> = if cli.yes {
        Box::new(FixedAnswer(true))
    } else if cli.keep_resources {
        Box::new(FixedAnswer(false))
    } else {
        Box::new(ConsolePrompt::new())
    };

    let config = cli.into_config();
    config.validate().context(
        "one or more account settings are missing; set the batch and storage account credentials",
    )?;

    let storage = BlobServiceClient::from_credentials(&config.storage)?;
    let compute = BatchServiceClient::from_credentials(&config.batch)?;
    let mut orchestrator = Orchestrator::new(config, storage, compute)?;

    println!("Sample start: {}", Local::now());
    println!();

    let result = orchestrator.run(confirm.as_mut()).await;

    println!();
    println!("Sample end: {}", Local::now());

    match result {
        Ok(report) => {
            println!("Elapsed time: {:?}", report.elapsed);
            report_cleanup_failures(&report.cleanup);
            match report.outcome {
                RunOutcome::AllCompleted => Ok(ExitCode::SUCCESS),
                RunOutcome::Incomplete { pending } => {
                    eprintln!(
                        "Tasks did not complete within the timeout: {}",
                        pending.join(", ")
                    );
                    Ok(ExitCode::from(2))
                }
            }
        }
        Err(failure) => {
            report_cleanup_failures(&failure.cleanup);
            if failure.source.is_transient() {
                eprintln!("The failure looks transient; running again may succeed.");
            }
            Err(failure.into())
        }
    }
}

fn report_cleanup_failures(cleanup: &batch_quickstart::CleanupReport) {
    for (what, step) in [
        ("container", &cleanup.container),
        ("job", &cleanup.job),
        ("pool", &cleanup.pool),
    ] {
        if let CleanupStep::Failed(reason) = step {
            eprintln!("Could not delete {what}: {reason}");
        }
    }
}
