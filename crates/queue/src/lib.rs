//! Serialized command execution against a hub.
//!
//! Hubs mis-order or drop IR blasts when commands arrive concurrently,
//! so every command goes through a bounded FIFO queue drained by a small
//! worker pool (one worker by default). Each command is a press/release
//! pair with a hold delay, retried on failure.

pub mod queue;
pub mod sender;
pub mod types;

pub use queue::CommandQueue;
pub use sender::CommandSender;
pub use types::{CommandHandle, CommandRequest, CommandResult, CommandStatus, QueueConfig};

/// Errors from queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("command queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    #[error("command queue shut down before the command finished")]
    Closed,
}
