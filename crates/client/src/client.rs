//! The composition root: one façade over discovery, the session, the
//! command queue, and the snapshot cache.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use hublink_cache::SnapshotCache;
use hublink_discovery::{DiscoveryCoordinator, DiscoveryError};
use hublink_protocol::{Activity, CachedSnapshot, Command, Device, Hub};
use hublink_queue::{CommandQueue, CommandRequest, CommandResult, CommandStatus};
use hublink_session::{ConnectionManager, ConnectionState};

use crate::ClientError;
use crate::notify::{NoticeLevel, Notifier};

/// High-level hub client.
///
/// Every collaborator is injected; tests swap in fake transports and
/// in-memory stores without touching the network or disk.
pub struct HubClient {
    coordinator: Arc<DiscoveryCoordinator>,
    manager: Arc<ConnectionManager>,
    queue: CommandQueue,
    cache: SnapshotCache,
    notifier: Arc<dyn Notifier>,
    /// Last snapshot handed out, kept for command-token resolution.
    snapshot: Mutex<Option<CachedSnapshot>>,
}

impl HubClient {
    pub fn new(
        coordinator: Arc<DiscoveryCoordinator>,
        manager: Arc<ConnectionManager>,
        queue: CommandQueue,
        cache: SnapshotCache,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            coordinator,
            manager,
            queue,
            cache,
            notifier,
            snapshot: Mutex::new(None),
        }
    }

    /// Runs (or joins) a hub discovery. `on_found` fires once per unique
    /// hub as it answers.
    pub async fn discover_hubs<F>(&self, on_found: F) -> Result<Vec<Hub>, ClientError>
    where
        F: Fn(&Hub) + Send + Sync + 'static,
    {
        match self.coordinator.discover(on_found).await {
            Ok(hubs) => {
                self.notifier.notify(
                    NoticeLevel::Success,
                    "Discovery finished",
                    Some(&format!("{} hub(s) found", hubs.len())),
                );
                Ok(hubs)
            }
            Err(e) => {
                if let DiscoveryError::Interrupted { hubs, reason } = &e {
                    self.notifier.notify(
                        NoticeLevel::Warning,
                        "Discovery interrupted",
                        Some(&format!("{} hub(s) found before: {reason}", hubs.len())),
                    );
                } else {
                    self.notifier
                        .notify(NoticeLevel::Error, "Discovery failed", Some(&e.to_string()));
                }
                Err(e.into())
            }
        }
    }

    /// Hubs observed across all discovery runs.
    pub fn known_hubs(&self) -> Vec<Hub> {
        self.coordinator.known_hubs()
    }

    pub async fn connect(&self, hub: &Hub) -> Result<(), ClientError> {
        self.manager.connect(hub).await?;
        self.notifier
            .notify(NoticeLevel::Success, "Connected", Some(&hub.name));
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.manager.disconnect().await?;
        Ok(())
    }

    /// Verifies the session, reconnecting if needed.
    pub async fn ensure_connected(&self) -> Result<(), ClientError> {
        Ok(self.manager.ensure_connected().await?)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn current_hub(&self) -> Option<Hub> {
        self.manager.current_hub()
    }

    pub async fn get_devices(&self) -> Result<Vec<Device>, ClientError> {
        Ok(self.manager.fetch_devices().await?)
    }

    pub async fn get_activities(&self) -> Result<Vec<Activity>, ClientError> {
        Ok(self.manager.fetch_activities().await?)
    }

    pub async fn start_activity(&self, activity_id: &str) -> Result<(), ClientError> {
        self.manager.start_activity(activity_id).await?;
        self.notifier
            .notify(NoticeLevel::Success, "Activity started", Some(activity_id));
        Ok(())
    }

    /// Loads devices and activities for a hub.
    ///
    /// Served from the cache when a fresh snapshot for this hub exists and
    /// `force_refresh` is false. Otherwise connects, fetches devices and
    /// activities concurrently, and caches the pair only after both
    /// succeed, so a failed fetch never leaves a half-written entry.
    pub async fn get_session_data(
        &self,
        hub: &Hub,
        force_refresh: bool,
    ) -> Result<CachedSnapshot, ClientError> {
        if !force_refresh
            && let Some(snapshot) = self.cache.get(&hub.id)?
        {
            debug!(hub = %hub.id, "serving session data from cache");
            *self.snapshot.lock().expect("snapshot lock poisoned") = Some(snapshot.clone());
            return Ok(snapshot);
        }

        self.manager.connect(hub).await?;

        let (devices, activities) = match tokio::try_join!(
            self.manager.fetch_devices(),
            self.manager.fetch_activities(),
        ) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(hub = %hub.id, error = %e, "session data fetch failed");
                self.notifier.notify(
                    NoticeLevel::Error,
                    "Failed to load hub data",
                    Some(&e.to_string()),
                );
                return Err(e.into());
            }
        };

        let snapshot = CachedSnapshot {
            hub: hub.clone(),
            devices,
            activities,
            fetched_at: Utc::now(),
        };
        self.cache.set(&snapshot)?;
        *self.snapshot.lock().expect("snapshot lock poisoned") = Some(snapshot.clone());

        info!(
            hub = %hub.id,
            devices = snapshot.devices.len(),
            activities = snapshot.activities.len(),
            "session data loaded"
        );
        Ok(snapshot)
    }

    /// Executes a device command end to end: resolves the wire token from
    /// the loaded session data, queues it, and waits for the terminal
    /// result.
    pub async fn execute_command(
        &self,
        device_id: &str,
        command_id: &str,
    ) -> Result<CommandResult, ClientError> {
        let command = self.resolve_command(device_id, command_id)?;

        let handle = self.queue.submit(CommandRequest::new(command))?;
        let result = handle.wait().await?;

        match result.status {
            CommandStatus::Completed => {}
            status => {
                self.notifier.notify(
                    NoticeLevel::Error,
                    "Command failed",
                    Some(&format!(
                        "{command_id} on {device_id}: {status:?} after {} attempt(s)",
                        result.attempts
                    )),
                );
            }
        }
        Ok(result)
    }

    /// Cancels every queued (not yet started) command.
    pub fn cancel_commands(&self) {
        self.queue.cancel_all();
    }

    /// Execution records of every command submitted so far.
    pub fn command_results(&self) -> std::collections::HashMap<String, CommandResult> {
        self.queue.results()
    }

    /// Drops the cached snapshot and disconnects, so the next
    /// `get_session_data` is a full re-fetch against a fresh session.
    pub async fn clear_cache(&self) -> Result<(), ClientError> {
        self.cache.clear()?;
        self.snapshot.lock().expect("snapshot lock poisoned").take();
        self.manager.disconnect().await?;
        self.notifier
            .notify(NoticeLevel::Info, "Cache cleared", None);
        Ok(())
    }

    /// Stops the command workers and closes the session.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.queue.shutdown().await;
        self.manager.disconnect().await?;
        Ok(())
    }

    fn resolve_command(&self, device_id: &str, command_id: &str) -> Result<Command, ClientError> {
        let snapshot = self.snapshot.lock().expect("snapshot lock poisoned");
        let snapshot = snapshot.as_ref().ok_or(ClientError::NoSessionData)?;

        snapshot
            .devices
            .iter()
            .filter(|d| d.id == device_id)
            .flat_map(|d| d.commands.iter())
            .find(|c| c.action == command_id)
            .cloned()
            .ok_or_else(|| ClientError::UnknownCommand {
                device_id: device_id.into(),
                command_id: command_id.into(),
            })
    }
}
