//! Bounded FIFO command queue with a worker pool.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hublink_protocol::Command;
use hublink_protocol::messages::HoldActionRequest;

use crate::QueueError;
use crate::sender::CommandSender;
use crate::types::{CommandHandle, CommandRequest, CommandResult, CommandStatus, QueueConfig};

struct Job {
    id: String,
    request: CommandRequest,
    done: oneshot::Sender<CommandResult>,
}

struct Inner {
    sender: Arc<dyn CommandSender>,
    config: QueueConfig,
    pending: Mutex<VecDeque<Job>>,
    results: Mutex<HashMap<String, CommandResult>>,
    wakeup: Notify,
    cancel: CancellationToken,
}

/// Executes commands against a hub one at a time, in submission order.
pub struct CommandQueue {
    inner: Arc<Inner>,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl CommandQueue {
    pub fn new(sender: Arc<dyn CommandSender>) -> Self {
        Self::with_config(sender, QueueConfig::default())
    }

    pub fn with_config(sender: Arc<dyn CommandSender>, config: QueueConfig) -> Self {
        let inner = Arc::new(Inner {
            sender,
            config,
            pending: Mutex::new(VecDeque::new()),
            results: Mutex::new(HashMap::new()),
            wakeup: Notify::new(),
            cancel: CancellationToken::new(),
        });

        let workers = (0..inner.config.concurrency.max(1))
            .map(|n| {
                let inner = inner.clone();
                tokio::spawn(async move { worker_loop(n, inner).await })
            })
            .collect();

        Self {
            inner,
            workers: Mutex::new(workers),
        }
    }

    /// Enqueues a command.
    ///
    /// Fails with [`QueueError::QueueFull`] when `capacity` commands are
    /// already waiting; in-flight commands do not count against capacity.
    pub fn submit(&self, request: CommandRequest) -> Result<CommandHandle, QueueError> {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.inner.pending.lock().expect("pending lock poisoned");
            if pending.len() >= self.inner.config.capacity {
                warn!(
                    capacity = self.inner.config.capacity,
                    action = %request.command.action,
                    "queue full, rejecting command"
                );
                return Err(QueueError::QueueFull {
                    capacity: self.inner.config.capacity,
                });
            }

            self.inner
                .results
                .lock()
                .expect("results lock poisoned")
                .insert(id.clone(), CommandResult::queued(id.clone()));

            pending.push_back(Job {
                id: id.clone(),
                request,
                done: tx,
            });
        }

        self.inner.wakeup.notify_one();
        debug!(command = %id, "command queued");
        Ok(CommandHandle { id, rx })
    }

    /// Snapshot of every command seen since startup, keyed by id.
    pub fn results(&self) -> HashMap<String, CommandResult> {
        self.inner
            .results
            .lock()
            .expect("results lock poisoned")
            .clone()
    }

    /// Number of commands waiting to start.
    pub fn pending_len(&self) -> usize {
        self.inner
            .pending
            .lock()
            .expect("pending lock poisoned")
            .len()
    }

    /// Cancels every command that has not started executing. In-flight
    /// commands run to completion.
    pub fn cancel_all(&self) {
        let drained: Vec<Job> = {
            let mut pending = self.inner.pending.lock().expect("pending lock poisoned");
            pending.drain(..).collect()
        };

        if drained.is_empty() {
            return;
        }

        info!(count = drained.len(), "cancelling queued commands");
        let mut results = self.inner.results.lock().expect("results lock poisoned");
        for job in drained {
            if let Some(entry) = results.get_mut(&job.id) {
                entry.status = CommandStatus::Cancelled;
                entry.completed_at = Some(Utc::now());
                let _ = job.done.send(entry.clone());
            }
        }
    }

    /// Stops the workers. Queued commands that never started are dropped;
    /// their handles resolve to [`QueueError::Closed`].
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let workers: Vec<_> = {
            let mut guard = self.workers.lock().expect("workers lock poisoned");
            guard.drain(..).collect()
        };
        for handle in workers {
            let _ = handle.await;
        }
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

async fn worker_loop(worker: usize, inner: Arc<Inner>) {
    debug!(worker, "command worker started");
    loop {
        if inner.cancel.is_cancelled() {
            break;
        }

        let job = {
            let mut pending = inner.pending.lock().expect("pending lock poisoned");
            pending.pop_front()
        };

        match job {
            Some(job) => execute(&inner, job).await,
            None => {
                tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    _ = inner.wakeup.notified() => {}
                }
            }
        }
    }
    debug!(worker, "command worker stopped");
}

/// Runs one command to a terminal status and publishes the result.
async fn execute(inner: &Inner, job: Job) {
    let hold = job.request.hold.unwrap_or(inner.config.hold);
    let attempt_timeout = job.request.timeout.unwrap_or(inner.config.attempt_timeout);
    let retries = job.request.retries.unwrap_or(inner.config.retries);
    let max_attempts = retries + 1;

    {
        let mut results = inner.results.lock().expect("results lock poisoned");
        if let Some(entry) = results.get_mut(&job.id) {
            entry.status = CommandStatus::Executing;
            entry.started_at = Some(Utc::now());
        }
    }

    let mut last_error: Option<String> = None;
    let mut last_timed_out = false;
    let mut status = CommandStatus::Failed;
    let mut attempts = 0;

    for attempt in 1..=max_attempts {
        attempts = attempt;
        let outcome = tokio::time::timeout(
            attempt_timeout,
            run_attempt(inner.sender.as_ref(), &job.request.command, hold),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                status = CommandStatus::Completed;
                last_error = None;
                break;
            }
            Ok(Err(e)) => {
                warn!(command = %job.id, attempt, error = %e, "command attempt failed");
                last_error = Some(e.to_string());
                last_timed_out = false;
            }
            Err(_) => {
                warn!(command = %job.id, attempt, "command attempt timed out");
                last_error = Some(format!("attempt timed out after {attempt_timeout:?}"));
                last_timed_out = true;
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(inner.config.retry_delay).await;
        }
    }

    if status != CommandStatus::Completed && last_timed_out {
        status = CommandStatus::TimedOut;
    }

    let result = {
        let mut results = inner.results.lock().expect("results lock poisoned");
        match results.get_mut(&job.id) {
            Some(entry) => {
                entry.status = status;
                entry.attempts = attempts;
                entry.error = last_error;
                entry.completed_at = Some(Utc::now());
                entry.clone()
            }
            None => return,
        }
    };

    debug!(command = %job.id, status = ?result.status, attempts, "command finished");
    let _ = job.done.send(result);
}

/// One press/hold/release round trip.
async fn run_attempt(
    sender: &dyn CommandSender,
    command: &Command,
    hold: std::time::Duration,
) -> Result<(), hublink_session::SessionError> {
    sender.ensure().await?;

    sender.send_action(&press_action(command, true)).await?;
    tokio::time::sleep(hold).await;
    sender.send_action(&press_action(command, false)).await?;
    Ok(())
}

fn press_action(command: &Command, press: bool) -> HoldActionRequest {
    HoldActionRequest {
        action: command.action.clone(),
        device_id: command.device_id.clone(),
        press,
        command_group: command.command_group.clone(),
    }
}
