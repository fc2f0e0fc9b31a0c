//! Discovery coordinator: one in-flight run, shared by all callers.
//!
//! Hub announcements have no completion signal — any number of hubs may
//! answer at any point. The coordinator bounds the wait to a fixed window,
//! extends it once by a grace period when the first hub answers (slower
//! responders tend to trail the first by a few seconds), deduplicates by
//! hub id, and streams each unique hub to every caller's callback.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use hublink_protocol::Hub;

use crate::DiscoveryError;
use crate::listener::AnnouncementListener;

/// Timing configuration for a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Base listening window.
    pub window: Duration,
    /// Extra wait added once after the first hub is found.
    pub grace: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30),
            grace: Duration::from_secs(10),
        }
    }
}

/// Callback invoked synchronously for every unique hub observed.
///
/// Callers must not block significantly inside it; it runs on the
/// discovery task.
pub type OnFound = Box<dyn Fn(&Hub) + Send + Sync>;

/// State shared between the run loop and callers joining mid-run.
struct InflightShared {
    /// Hubs accumulated so far, in observation order.
    found: std::sync::Mutex<Vec<Hub>>,
    /// Callbacks of every caller attached to this run.
    callbacks: std::sync::Mutex<Vec<OnFound>>,
}

struct Inflight {
    done_tx: broadcast::Sender<Result<Vec<Hub>, DiscoveryError>>,
    shared: Arc<InflightShared>,
}

/// Coordinates discovery runs over an announcement listener.
pub struct DiscoveryCoordinator {
    listener: Arc<dyn AnnouncementListener>,
    config: DiscoveryConfig,
    inflight: Arc<Mutex<Option<Inflight>>>,
    /// All hubs ever observed, deduplicated by id. Append-only.
    known: Arc<std::sync::Mutex<Vec<Hub>>>,
}

impl DiscoveryCoordinator {
    pub fn new(listener: Arc<dyn AnnouncementListener>) -> Self {
        Self::with_config(listener, DiscoveryConfig::default())
    }

    pub fn with_config(listener: Arc<dyn AnnouncementListener>, config: DiscoveryConfig) -> Self {
        Self {
            listener,
            config,
            inflight: Arc::new(Mutex::new(None)),
            known: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Returns every hub observed across all runs, deduplicated by id.
    pub fn known_hubs(&self) -> Vec<Hub> {
        self.known.lock().expect("known hubs lock poisoned").clone()
    }

    /// Runs (or joins) a discovery and returns the deduplicated hub list.
    ///
    /// Concurrent callers are coalesced onto the single in-flight run: the
    /// listener is started exactly once, and every caller resolves to the
    /// same result set. A caller joining mid-run has `on_found` replayed
    /// with the hubs found so far, then receives the rest as they arrive.
    pub async fn discover<F>(&self, on_found: F) -> Result<Vec<Hub>, DiscoveryError>
    where
        F: Fn(&Hub) + Send + Sync + 'static,
    {
        let mut guard = self.inflight.lock().await;

        if let Some(inflight) = guard.as_ref() {
            debug!("joining in-flight discovery");
            let mut done_rx = inflight.done_tx.subscribe();
            {
                // Replay and register under the found lock so no hub can
                // slip between the replay and the registration.
                let found = inflight
                    .shared
                    .found
                    .lock()
                    .expect("found lock poisoned");
                for hub in found.iter() {
                    on_found(hub);
                }
                inflight
                    .shared
                    .callbacks
                    .lock()
                    .expect("callbacks lock poisoned")
                    .push(Box::new(on_found));
            }
            drop(guard);

            return match done_rx.recv().await {
                Ok(result) => result,
                Err(_) => Err(DiscoveryError::Network(
                    "in-flight discovery was dropped".into(),
                )),
            };
        }

        // This caller leads the run. The run itself is a detached task: a
        // leader whose future is dropped mid-window must not strand the
        // in-flight slot or the joiners waiting on it. The leader waits on
        // the broadcast channel like any other caller.
        let (done_tx, mut done_rx) = broadcast::channel(1);
        let shared = Arc::new(InflightShared {
            found: std::sync::Mutex::new(Vec::new()),
            callbacks: std::sync::Mutex::new(vec![Box::new(on_found)]),
        });
        *guard = Some(Inflight {
            done_tx: done_tx.clone(),
            shared: shared.clone(),
        });
        drop(guard);

        let listener = self.listener.clone();
        let config = self.config.clone();
        let inflight = self.inflight.clone();
        let known = self.known.clone();
        tokio::spawn(async move {
            let result = run(listener, &config, &shared).await;

            if let Ok(hubs) | Err(DiscoveryError::Interrupted { hubs, .. }) = &result {
                remember(&known, hubs);
            }

            // Clear the in-flight slot before waking waiters so a caller
            // racing in right after completion starts a fresh run instead
            // of joining a finished one.
            *inflight.lock().await = None;
            let _ = done_tx.send(result);
        });

        match done_rx.recv().await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::Network("discovery run was dropped".into())),
        }
    }
}

async fn run(
    listener: Arc<dyn AnnouncementListener>,
    config: &DiscoveryConfig,
    shared: &InflightShared,
) -> Result<Vec<Hub>, DiscoveryError> {
    let mut announcements = listener.start().await?;

    let start = Instant::now();
    let mut deadline = start + config.window;
    let mut extended = false;
    let mut seen: HashSet<String> = HashSet::new();
    let mut interrupted: Option<String> = None;

    info!(window_secs = config.window.as_secs(), "discovery started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,

            announcement = announcements.recv() => match announcement {
                Some(announcement) => {
                    if !seen.insert(announcement.id.clone()) {
                        continue; // duplicate announcement from a known hub
                    }
                    let hub = announcement.into_hub();
                    debug!(hub = %hub.id, address = %hub.address, "hub found");

                    {
                        let mut found =
                            shared.found.lock().expect("found lock poisoned");
                        found.push(hub.clone());
                        let callbacks = shared
                            .callbacks
                            .lock()
                            .expect("callbacks lock poisoned");
                        for callback in callbacks.iter() {
                            callback(&hub);
                        }
                    }

                    if !extended {
                        extended = true;
                        deadline = start + config.window + config.grace;
                        debug!(
                            grace_secs = config.grace.as_secs(),
                            "first hub found, extending window"
                        );
                    }
                }
                None => {
                    interrupted = Some(
                        "announcement stream closed before the window elapsed".into(),
                    );
                    break;
                }
            },
        }
    }

    // Teardown is unconditional and idempotent; a failed stop does not
    // invalidate hubs already collected.
    if let Err(e) = listener.stop().await {
        warn!("listener stop failed: {e}");
    }

    let hubs = shared.found.lock().expect("found lock poisoned").clone();
    match interrupted {
        Some(reason) => {
            warn!(found = hubs.len(), "discovery interrupted: {reason}");
            Err(DiscoveryError::Interrupted { hubs, reason })
        }
        None => {
            info!(found = hubs.len(), "discovery finished");
            Ok(hubs)
        }
    }
}

fn remember(known: &std::sync::Mutex<Vec<Hub>>, hubs: &[Hub]) {
    let mut known = known.lock().expect("known hubs lock poisoned");
    for hub in hubs {
        if !known.iter().any(|k| k.id == hub.id) {
            known.push(hub.clone());
        }
    }
}
