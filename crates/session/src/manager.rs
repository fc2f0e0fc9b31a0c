//! Connection manager owning the single live hub session.
//!
//! Tracks the `Disconnected → Connecting → Connected` state machine,
//! verifies liveness with a cheap read, and recovers from drops with a
//! capped, backed-off reconnect loop. The session handle never leaves
//! this type.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use hublink_protocol::envelope::Message;
use hublink_protocol::messages::{
    ActivityListResponse, ActivityStartedResponse, DeviceListResponse, HoldActionRequest,
    StartActivityRequest,
};
use hublink_protocol::model::normalize_current_activity;
use hublink_protocol::{Activity, Device, Hub, MessageType};

use crate::SessionError;
use crate::transport::{HubSession, SessionTransport};
use crate::types::{ConnectionState, SessionConfig};

/// Manages the one live session with a hub.
pub struct ConnectionManager {
    transport: Arc<dyn SessionTransport>,
    config: SessionConfig,
    state: std::sync::Mutex<ConnectionState>,
    /// The hub this manager is (or was last) connected to. Survives an
    /// unexpected drop so the reconnect loop has a target; cleared only
    /// by an explicit disconnect.
    current: std::sync::Mutex<Option<Hub>>,
    session: Mutex<Option<Box<dyn HubSession>>>,
    /// Serializes connection attempts: only one may be in flight.
    connect_gate: Mutex<()>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn SessionTransport>) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    pub fn with_config(transport: Arc<dyn SessionTransport>, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            state: std::sync::Mutex::new(ConnectionState::Disconnected),
            current: std::sync::Mutex::new(None),
            session: Mutex::new(None),
            connect_gate: Mutex::new(()),
        }
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Returns the hub of the current (or last) session, if any.
    pub fn current_hub(&self) -> Option<Hub> {
        self.current.lock().expect("current lock poisoned").clone()
    }

    fn set_state(&self, new_state: ConnectionState) {
        *self.state.lock().expect("state lock poisoned") = new_state;
    }

    /// Connects to a hub.
    ///
    /// A no-op when already connected to the same hub id. When connected
    /// to a *different* hub, that session is closed first — the manager
    /// owns at most one session.
    pub async fn connect(&self, hub: &Hub) -> Result<(), SessionError> {
        let _gate = self.connect_gate.lock().await;

        if self.state() == ConnectionState::Connected
            && self.current_hub().is_some_and(|c| c.id == hub.id)
        {
            debug!(hub = %hub.id, "already connected");
            return Ok(());
        }

        self.disconnect_inner().await;
        self.open_session(hub).await
    }

    /// Opens a session to `hub` with the configured attempt timeout.
    /// Callers must hold the connect gate.
    async fn open_session(&self, hub: &Hub) -> Result<(), SessionError> {
        self.set_state(ConnectionState::Connecting);
        info!(hub = %hub.id, address = %hub.address, "connecting to hub");

        let opened =
            tokio::time::timeout(self.config.connect_timeout, self.transport.open(hub)).await;

        match opened {
            Ok(Ok(session)) => {
                *self.session.lock().await = Some(session);
                *self.current.lock().expect("current lock poisoned") = Some(hub.clone());
                self.set_state(ConnectionState::Connected);
                info!(hub = %hub.id, "connected");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(hub = %hub.id, error = %e, "connection failed");
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
            Err(_) => {
                warn!(hub = %hub.id, "connection attempt timed out");
                self.set_state(ConnectionState::Disconnected);
                Err(SessionError::ConnectTimeout)
            }
        }
    }

    /// Disconnects from the current hub.
    ///
    /// Local state is cleared unconditionally: a failing remote close
    /// never leaves the manager believing it is still connected. Safe to
    /// call when already disconnected.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.current.lock().expect("current lock poisoned").take();
        self.disconnect_inner().await;
        Ok(())
    }

    /// Clears the session handle and state. Keeps the current hub so a
    /// reconnect still has a target.
    async fn disconnect_inner(&self) {
        if let Some(session) = self.session.lock().await.take() {
            if let Err(e) = session.close().await {
                warn!("session close failed: {e}");
            }
            debug!("session closed");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Verifies the session is alive, reconnecting if it is not.
    ///
    /// The transport exposes no reliable liveness signal, so this issues
    /// the cheap activity-list read and treats any failure as a dead
    /// session: state is forced to `Disconnected`, the handle is dropped,
    /// and the capped reconnect loop runs against the current hub.
    pub async fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.session.lock().await.is_some() {
            match self.send_raw(MessageType::GetActivities, None).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(error = %e, "liveness check failed, dropping session");
                    self.disconnect_inner().await;
                }
            }
        }

        let hub = self.current_hub().ok_or(SessionError::NotConnected)?;
        self.reconnect(&hub).await
    }

    /// Reconnect loop: up to `reconnect_attempts` tries with exponential
    /// delay between them. Exhaustion surfaces a terminal error and
    /// leaves the state `Disconnected`.
    async fn reconnect(&self, hub: &Hub) -> Result<(), SessionError> {
        let _gate = self.connect_gate.lock().await;

        // Another caller may have reconnected while we waited on the gate.
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        let mut last_error: Option<SessionError> = None;
        for attempt in 1..=self.config.reconnect_attempts {
            info!(hub = %hub.id, attempt, "reconnecting");

            match self.open_session(hub).await {
                Ok(()) => {
                    info!(hub = %hub.id, attempt, "reconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(hub = %hub.id, attempt, error = %e, "reconnect attempt failed");
                    last_error = Some(e);
                }
            }

            // The first try goes out immediately; backoff applies between
            // failed attempts only.
            if attempt < self.config.reconnect_attempts {
                tokio::time::sleep(self.config.reconnect_delay(attempt)).await;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        Err(SessionError::ReconnectExhausted {
            hub: hub.id.clone(),
            attempts: self.config.reconnect_attempts,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".into()),
        })
    }

    /// Sends a request over the current session.
    ///
    /// A closed-session failure drops the handle and forces
    /// `Disconnected`; the next `ensure_connected` will reconnect.
    pub async fn send_raw(
        &self,
        msg_type: MessageType,
        payload: Option<&serde_json::Value>,
    ) -> Result<Message, SessionError> {
        let result = {
            let session = self.session.lock().await;
            let session = session.as_ref().ok_or(SessionError::NotConnected)?;
            session.send(msg_type, payload).await
        };

        if let Err(SessionError::Closed) = &result {
            warn!("session closed unexpectedly");
            self.disconnect_inner().await;
        }
        result
    }

    /// Fetches the hub's device configuration.
    pub async fn fetch_devices(&self) -> Result<Vec<Device>, SessionError> {
        let resp = self.send_raw(MessageType::GetDevices, None).await?;
        let devices: DeviceListResponse = resp
            .parse_payload()?
            .ok_or(SessionError::EmptyResponse("device list"))?;
        Ok(devices.into_model())
    }

    /// Fetches the hub's activities, normalized so at most one is current.
    pub async fn fetch_activities(&self) -> Result<Vec<Activity>, SessionError> {
        let resp = self.send_raw(MessageType::GetActivities, None).await?;
        let list: ActivityListResponse = resp
            .parse_payload()?
            .ok_or(SessionError::EmptyResponse("activity list"))?;
        let mut activities = list.activities;
        normalize_current_activity(&mut activities);
        Ok(activities)
    }

    /// Asks the hub to switch to an activity.
    pub async fn start_activity(&self, activity_id: &str) -> Result<(), SessionError> {
        let req = StartActivityRequest {
            activity_id: activity_id.into(),
        };
        let payload = serde_json::to_value(&req)?;
        let resp = self.send_raw(MessageType::StartActivity, Some(&payload)).await?;

        if let Some(ack) = resp.parse_payload::<ActivityStartedResponse>()?
            && !ack.success
        {
            return Err(SessionError::Hub {
                code: hublink_protocol::constants::ERR_CODE_INTERNAL,
                message: format!("hub refused to start activity {activity_id}"),
            });
        }
        Ok(())
    }

    /// Sends one half of a hold action (press or release).
    pub async fn send_action(&self, action: &HoldActionRequest) -> Result<(), SessionError> {
        let payload = serde_json::to_value(action)?;
        self.send_raw(MessageType::HoldAction, Some(&payload)).await?;
        Ok(())
    }
}
