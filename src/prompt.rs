//! Deletion confirmation policies.
//!
//! The driver never reads the terminal itself; it asks a [`ConfirmDeletion`]
//! before deleting the job and the pool.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};

/// Something the driver may delete at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionTarget {
    Job(String),
    Pool(String),
}

impl DeletionTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            DeletionTarget::Job(_) => "job",
            DeletionTarget::Pool(_) => "pool",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            DeletionTarget::Job(id) | DeletionTarget::Pool(id) => id,
        }
    }
}

/// Decides whether a provisioned resource is torn down.
#[async_trait]
pub trait ConfirmDeletion: Send {
    async fn confirm(&mut self, target: &DeletionTarget) -> bool;
}

/// Always answers the same way (`--yes` / `--keep-resources`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedAnswer(pub bool);

#[async_trait]
impl ConfirmDeletion for FixedAnswer {
    async fn confirm(&mut self, _target: &DeletionTarget) -> bool {
        self.0
    }
}

/// Asks on the terminal: `Delete job? [yes] no: `.
#[derive(Debug)]
pub struct ConsolePrompt {
    reader: BufReader<Stdin>,
}

impl ConsolePrompt {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
        }
    }
}

impl Default for ConsolePrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfirmDeletion for ConsolePrompt {
    async fn confirm(&mut self, target: &DeletionTarget) -> bool {
        let mut stdout = tokio::io::stdout();
        let question = format!("Delete {}? [yes] no: ", target.kind());
        if stdout.write_all(question.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            return true;
        }

        let mut input = String::new();
        match self.reader.read_line(&mut input).await {
            Ok(_) => parse_answer(&input),
            // Unreadable stdin behaves like an empty answer.
            Err(_) => true,
        }
    }
}

/// Anything but `n` / `no` (any case) means yes, including an empty line.
pub fn parse_answer(input: &str) -> bool {
    let answer = input.trim().to_lowercase();
    answer != "n" && answer != "no"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer_defaults_to_yes() {
        assert!(parse_answer(""));
        assert!(parse_answer("\n"));
        assert!(parse_answer("yes"));
        assert!(parse_answer("Y"));
        assert!(parse_answer("whatever"));
        assert!(!parse_answer("n"));
        assert!(!parse_answer("No\n"));
        assert!(!parse_answer("  NO "));
    }

    #[test]
    fn test_deletion_target() {
        let target = DeletionTarget::Pool("DotNetQuickstartPool".into());
        assert_eq!(target.kind(), "pool");
        assert_eq!(target.id(), "DotNetQuickstartPool");
    }

    #[tokio::test]
    async fn test_fixed_answer() {
        let target = DeletionTarget::Job("job".into());
        assert!(FixedAnswer(true).confirm(&target).await);
        assert!(!FixedAnswer(false).confirm(&target).await);
    }
}
