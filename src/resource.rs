//! Turning uploaded blobs into task inputs.
//!
//! Every uploaded [`InputFileReference`] becomes exactly one
//! [`ResourceFile`], and every resource file becomes exactly one task.
//! Task `i` downloads input `i` and nothing else.

use serde::{Deserialize, Serialize};

use crate::compute::TaskSpec;
use crate::storage::InputFileReference;

/// A file the batch service downloads onto the node before running a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFile {
    /// Signed URL the node downloads from.
    pub http_url: String,
    /// Path relative to the task's working directory.
    pub file_path: String,
}

impl ResourceFile {
    pub fn from_input(input: &InputFileReference) -> Self {
        Self {
            http_url: input.signed_url.clone(),
            file_path: input.blob_name.clone(),
        }
    }
}

/// Command line run by each task; `{file}` is replaced by the input's file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate(String);

impl CommandTemplate {
    pub const FILE_PLACEHOLDER: &'static str = "{file}";

    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, file_name: &str) -> String {
        self.0.replace(Self::FILE_PLACEHOLDER, file_name)
    }
}

impl Default for CommandTemplate {
    /// Print the input file on a Windows node.
    fn default() -> Self {
        Self::new("cmd /c type {file}")
    }
}

/// Build one task per input, in input order, with ids `Task0`, `Task1`, ...
pub fn build_tasks(inputs: &[InputFileReference], command: &CommandTemplate) -> Vec<TaskSpec> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let resource = ResourceFile::from_input(input);
            TaskSpec {
                id: format!("Task{i}"),
                command_line: command.render(&resource.file_path),
                resource_files: vec![resource],
            }
        })
        .collect()
}
