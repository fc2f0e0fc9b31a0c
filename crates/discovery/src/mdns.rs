//! mDNS-backed announcement listener.
//!
//! Browses for `_hublink-hub._tcp` services and converts resolved records
//! into [`HubAnnouncement`]s. One `ServiceDaemon` lives for the whole
//! listen, avoiding the create/destroy cycle that makes the `mdns_sd`
//! crate log noisy shutdown errors.

use std::net::IpAddr;
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::DiscoveryError;
use crate::listener::AnnouncementListener;
use crate::types::{HubAnnouncement, SERVICE_NAME};

struct Running {
    daemon: ServiceDaemon,
    cancel: CancellationToken,
}

/// Listens for hub announcements via mDNS/DNS-SD.
pub struct MdnsListener {
    running: Mutex<Option<Running>>,
    channel_size: usize,
}

impl MdnsListener {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(None),
            channel_size: 16,
        }
    }
}

impl Default for MdnsListener {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnouncementListener for MdnsListener {
    fn start(
        &self,
    ) -> std::pin::Pin<
        Box<
            dyn std::future::Future<Output = Result<mpsc::Receiver<HubAnnouncement>, DiscoveryError>>
                + Send
                + '_,
        >,
    > {
        Box::pin(async move {
            let mut running = self.running.lock().await;
            if running.is_some() {
                return Err(DiscoveryError::ListenerStart(
                    "listener already started".into(),
                ));
            }

            let daemon = ServiceDaemon::new().map_err(|e| {
                DiscoveryError::ListenerStart(format!("failed to create mDNS daemon: {e}"))
            })?;

            let service_type = format!("{SERVICE_NAME}.local.");
            let event_rx = match daemon.browse(&service_type) {
                Ok(rx) => rx,
                Err(e) => {
                    let _ = daemon.shutdown();
                    return Err(DiscoveryError::ListenerStart(format!(
                        "failed to browse mDNS: {e}"
                    )));
                }
            };

            let (tx, rx) = mpsc::channel(self.channel_size);
            let cancel = CancellationToken::new();

            let task_cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        // mDNS recv is blocking — poll it off the runtime.
                        result = tokio::task::spawn_blocking({
                            let rx = event_rx.clone();
                            move || rx.recv_timeout(Duration::from_millis(500))
                        }) => {
                            if let Ok(Ok(event)) = result
                                && let Some(ann) = announcement_from_event(&event)
                                && tx.send(ann).await.is_err()
                            {
                                debug!("announcement channel closed, stopping mDNS pump");
                                break;
                            }
                        }
                        _ = task_cancel.cancelled() => break,
                    }
                }
            });

            *running = Some(Running { daemon, cancel });
            Ok(rx)
        })
    }

    fn stop(
        &self,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<(), DiscoveryError>> + Send + '_>,
    > {
        Box::pin(async move {
            // Idempotent: stopping a listener that isn't running is a no-op.
            if let Some(running) = self.running.lock().await.take() {
                running.cancel.cancel();
                if let Err(e) = running.daemon.shutdown() {
                    warn!("mDNS daemon shutdown: {e}");
                }
            }
            Ok(())
        })
    }
}

/// Converts a resolved mDNS service into a hub announcement.
fn announcement_from_event(event: &ServiceEvent) -> Option<HubAnnouncement> {
    let ServiceEvent::ServiceResolved(info) = event else {
        return None;
    };
    Some(announcement_from_info(info))
}

fn announcement_from_info(info: &ServiceInfo) -> HubAnnouncement {
    let mut id = String::new();
    let mut display_name = String::new();
    let mut firmware_version = None;
    let mut remote_id = None;

    for property in info.get_properties().iter() {
        match property.key() {
            "id" => id = property.val_str().to_string(),
            "name" => display_name = property.val_str().to_string(),
            "fw" => firmware_version = Some(property.val_str().to_string()),
            "remoteId" => remote_id = Some(property.val_str().to_string()),
            _ => {}
        }
    }

    // Fall back to mDNS names when TXT records are incomplete.
    if id.is_empty() {
        id = info.get_fullname().to_string();
    }
    if display_name.is_empty() {
        display_name = info.get_hostname().to_string();
    }

    let address = match usable_ip(info) {
        Some(ip) => format!("{ip}:{}", info.get_port()),
        None => format!("{}:{}", info.get_hostname(), info.get_port()),
    };

    HubAnnouncement {
        id,
        address,
        display_name,
        firmware_version,
        remote_id,
    }
}

/// Picks the first usable IPv4 address (loopback and link-local excluded).
fn usable_ip(info: &ServiceInfo) -> Option<IpAddr> {
    info.get_addresses().iter().find_map(|ip| {
        let IpAddr::V4(ip4) = ip else {
            return None;
        };
        if ip4.is_loopback() || ip4.is_link_local() {
            return None;
        }
        Some(IpAddr::V4(*ip4))
    })
}
