//! Pool, job and task types.
//!
//! The task state machine is driven entirely by the batch service:
//!
//! ```text
//!   add ──→ Active ──→ Preparing ──→ Running ──→ Completed
//!             │                        ▲
//!             └────────────────────────┘
//! ```
//!
//! **Invariants:**
//! - Transitions are monotonic; a task never moves backward.
//! - `Completed` is terminal. A failed task is still `Completed`; the failure
//!   lives in its [`TaskExecutionInfo`].

use serde::{Deserialize, Serialize};

use crate::resource::ResourceFile;

/// Marketplace image the pool's nodes boot from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

impl ImageReference {
    /// Windows Server 2016 Datacenter with a small OS disk.
    pub fn windows_server_2016() -> Self {
        Self {
            publisher: "MicrosoftWindowsServer".into(),
            offer: "WindowsServer".into(),
            sku: "2016-datacenter-smalldisk".into(),
            version: "latest".into(),
        }
    }
}

/// VM configuration of a pool: image plus the matching node agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineConfiguration {
    pub image_reference: ImageReference,
    #[serde(rename = "nodeAgentSKUId")]
    pub node_agent_sku_id: String,
}

impl VirtualMachineConfiguration {
    pub fn windows_server_2016() -> Self {
        Self {
            image_reference: ImageReference::windows_server_2016(),
            node_agent_sku_id: "batch.node.windows amd64".into(),
        }
    }
}

/// Everything needed to create a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    pub id: String,
    pub vm_size: String,
    pub virtual_machine_configuration: VirtualMachineConfiguration,
    pub target_dedicated_nodes: u32,
}

/// A job bound to a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub id: String,
    pub pool_id: String,
}

/// A task to add to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub id: String,
    pub command_line: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_files: Vec<ResourceFile>,
}

/// State of a task as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Queued, waiting for a node.
    Active,
    /// Assigned to a node, job preparation running.
    Preparing,
    /// Executing on a node.
    Running,
    /// Finished, successfully or not.
    Completed,
}

impl TaskState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Active => write!(f, "Active"),
            TaskState::Preparing => write!(f, "Preparing"),
            TaskState::Running => write!(f, "Running"),
            TaskState::Completed => write!(f, "Completed"),
        }
    }
}

/// Whether a completed task succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskExecutionResult {
    Success,
    Failure,
}

/// Why a task failed to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailureInfo {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Execution details of a task that has started.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionInfo {
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub result: Option<TaskExecutionResult>,
    #[serde(default)]
    pub failure_info: Option<TaskFailureInfo>,
}

/// The node a task was scheduled on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    #[serde(default)]
    pub pool_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
}

/// A task as returned by list-tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub id: String,
    pub state: TaskState,
    #[serde(default)]
    pub node_info: Option<NodeInfo>,
    #[serde(default)]
    pub execution_info: Option<TaskExecutionInfo>,
}

impl TaskInfo {
    pub fn is_completed(&self) -> bool {
        self.state.is_terminal()
    }

    /// Id of the node the task ran on, once scheduled.
    pub fn node_id(&self) -> Option<&str> {
        self.node_info.as_ref()?.node_id.as_deref()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.execution_info.as_ref()?.exit_code
    }

    /// Completed without a failure record and with a zero exit code.
    pub fn succeeded(&self) -> bool {
        let Some(info) = self.execution_info.as_ref() else {
            return false;
        };
        self.is_completed()
            && info.failure_info.is_none()
            && info.result != Some(TaskExecutionResult::Failure)
            && info.exit_code == Some(0)
    }
}

/// Captured output stream of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    /// File name of the stream in the task's working directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout.txt",
            OutputStream::Stderr => "stderr.txt",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_terminal() {
        assert!(!TaskState::Active.is_terminal());
        assert!(!TaskState::Preparing.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Completed.is_terminal());
    }

    #[test]
    fn test_pool_spec_wire_shape() {
        let pool = PoolSpec {
            id: "pool".into(),
            vm_size: "STANDARD_A1_v2".into(),
            virtual_machine_configuration: VirtualMachineConfiguration::windows_server_2016(),
            target_dedicated_nodes: 2,
        };
        let json = serde_json::to_value(&pool).unwrap();
        assert_eq!(json["vmSize"], "STANDARD_A1_v2");
        assert_eq!(json["targetDedicatedNodes"], 2);
        assert_eq!(
            json["virtualMachineConfiguration"]["nodeAgentSKUId"],
            "batch.node.windows amd64"
        );
        assert_eq!(
            json["virtualMachineConfiguration"]["imageReference"]["sku"],
            "2016-datacenter-smalldisk"
        );
    }

    #[test]
    fn test_task_info_decode() {
        let json = r#"{
            "id": "Task0",
            "url": "https://acct.region.batch.azure.com/jobs/job/tasks/Task0",
            "state": "completed",
            "nodeInfo": { "poolId": "pool", "nodeId": "tvm-1" },
            "executionInfo": { "exitCode": 0, "result": "success", "retryCount": 0 }
        }"#;
        let task: TaskInfo = serde_json::from_str(json).unwrap();
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.node_id(), Some("tvm-1"));
        assert!(task.succeeded());
    }

    #[test]
    fn test_task_failure_is_still_completed() {
        let task = TaskInfo {
            id: "Task1".into(),
            state: TaskState::Completed,
            node_info: None,
            execution_info: Some(TaskExecutionInfo {
                exit_code: Some(1),
                result: Some(TaskExecutionResult::Failure),
                ..Default::default()
            }),
        };
        assert!(task.is_completed());
        assert!(!task.succeeded());
        assert_eq!(task.exit_code(), Some(1));
    }
}
