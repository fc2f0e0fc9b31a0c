//! Public types for the command queue.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use hublink_protocol::Command;

use crate::QueueError;

/// Queue sizing and per-command execution defaults.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of pending (not yet started) commands.
    pub capacity: usize,
    /// Number of worker tasks draining the queue. Hubs handle one command
    /// at a time reliably, so this stays at 1 unless a firmware says
    /// otherwise.
    pub concurrency: usize,
    /// Delay between the press and release sends.
    pub hold: Duration,
    /// Deadline for one full press/hold/release attempt.
    pub attempt_timeout: Duration,
    /// Extra attempts after the first failure.
    pub retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            concurrency: 1,
            hold: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(5),
            retries: 2,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// A command submitted for execution. `None` fields fall back to the
/// queue defaults.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: Command,
    pub hold: Option<Duration>,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
}

impl CommandRequest {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            hold: None,
            timeout: None,
            retries: None,
        }
    }
}

/// Lifecycle of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Queued,
    Executing,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl CommandStatus {
    /// Whether this status is final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandStatus::Queued | CommandStatus::Executing)
    }
}

/// Execution record for a submitted command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub id: String,
    pub status: CommandStatus,
    /// Attempts actually made (0 when cancelled before starting).
    pub attempts: u32,
    /// Last error message, for `Failed` and `TimedOut`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub queued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CommandResult {
    pub(crate) fn queued(id: String) -> Self {
        Self {
            id,
            status: CommandStatus::Queued,
            attempts: 0,
            error: None,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Resolves to the terminal [`CommandResult`] of one submitted command.
pub struct CommandHandle {
    pub(crate) id: String,
    pub(crate) rx: oneshot::Receiver<CommandResult>,
}

impl CommandHandle {
    /// Queue-assigned id of the command, usable against
    /// [`CommandQueue::results`](crate::CommandQueue::results).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the command to reach a terminal status.
    pub async fn wait(self) -> Result<CommandResult, QueueError> {
        self.rx.await.map_err(|_| QueueError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_hub_limits() {
        let config = QueueConfig::default();
        assert_eq!(config.capacity, 100);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.hold, Duration::from_millis(100));
        assert_eq!(config.attempt_timeout, Duration::from_secs(5));
        assert_eq!(config.retries, 2);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!CommandStatus::Queued.is_terminal());
        assert!(!CommandStatus::Executing.is_terminal());
        assert!(CommandStatus::Completed.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
        assert!(CommandStatus::Cancelled.is_terminal());
        assert!(CommandStatus::TimedOut.is_terminal());
    }

    #[test]
    fn result_serializes_camel_case() {
        let result = CommandResult::queued("c1".into());
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"queuedAt\""));
        assert!(json.contains("\"status\":\"queued\""));
        assert!(!json.contains("startedAt"));
    }
}
