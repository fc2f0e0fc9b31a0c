//! WebSocket session implementation.
//!
//! Implements request-response over the hub's persistent socket with UUID
//! correlation, ping/pong keepalive, and silence-based death detection.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tracing::debug;

use hublink_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_REQUEST_TIMEOUT};
use hublink_protocol::envelope::Message;
use hublink_protocol::{Hub, MessageType};

use crate::SessionError;
use crate::pumps::read::PendingMap;
use crate::transport::{HubSession, SessionTransport};

/// Opens WebSocket sessions to hubs.
#[derive(Debug, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }

    /// Builds the session URL for a hub. Firmwares that issued a remote id
    /// expect it back as a query parameter.
    fn session_url(hub: &Hub) -> String {
        match &hub.remote_id {
            Some(remote_id) => format!("ws://{}/session?remoteId={remote_id}", hub.address),
            None => format!("ws://{}/session", hub.address),
        }
    }
}

impl SessionTransport for WsTransport {
    fn open<'a>(
        &'a self,
        hub: &'a Hub,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn HubSession>, SessionError>> + Send + 'a>> {
        Box::pin(async move {
            let session = WsSession::connect(&Self::session_url(hub)).await?;
            Ok(Box::new(session) as Box<dyn HubSession>)
        })
    }
}

/// A live WebSocket session with a single hub.
pub struct WsSession {
    write_tx: mpsc::Sender<tungstenite::Message>,
    pending: PendingMap,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
    cancel: tokio_util::sync::CancellationToken,
}

impl WsSession {
    /// Connects to a hub session endpoint and starts the pumps.
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(64);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = tokio_util::sync::CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let pending = pending.clone();
            let cancel = cancel.clone();
            let write_tx = write_tx.clone();
            tokio::spawn(crate::pumps::read::read_pump(read, pending, write_tx, cancel))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(write_tx, cancel))
        };

        debug!(%url, "session opened");

        Ok(Self {
            write_tx,
            pending,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
            cancel,
        })
    }

    /// Sends a request and waits for the correlated response.
    pub async fn send_request(
        &self,
        msg_type: MessageType,
        payload: Option<&serde_json::Value>,
    ) -> Result<Message, SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Closed);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let msg = Message::new(&id, msg_type, payload)?;
        let json = serde_json::to_string(&msg)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        self.write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .map_err(|_| SessionError::Closed)?;

        let result = tokio::time::timeout(WS_REQUEST_TIMEOUT, rx).await;

        // Clean up the pending entry on any exit path.
        self.pending.lock().await.remove(&id);

        match result {
            Ok(Ok(resp)) => {
                if let Some(err) = &resp.error {
                    return Err(SessionError::Hub {
                        code: err.code,
                        message: err.message.clone(),
                    });
                }
                Ok(resp)
            }
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => Err(SessionError::Timeout),
        }
    }

    /// Gracefully closes the session.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let _ = self.write_tx.send(tungstenite::Message::Close(None)).await;
    }
}

impl HubSession for WsSession {
    fn send<'a>(
        &'a self,
        msg_type: MessageType,
        payload: Option<&'a serde_json::Value>,
    ) -> Pin<Box<dyn Future<Output = Result<Message, SessionError>> + Send + 'a>> {
        Box::pin(self.send_request(msg_type, payload))
    }

    fn close<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>> {
        Box::pin(async move {
            self.shutdown().await;
            Ok(())
        })
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}
