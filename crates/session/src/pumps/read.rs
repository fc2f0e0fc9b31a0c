//! WebSocket read pump — dispatches incoming messages.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use hublink_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_SILENCE_WAIT};
use hublink_protocol::envelope::Message;

pub(crate) type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>;

/// Reads messages from the WebSocket and routes responses to their
/// pending requests by envelope id.
///
/// A silence deadline detects dead connections: if *nothing* arrives
/// within [`WS_SILENCE_WAIT`] — no pong, no response, no push event —
/// the session is considered dead and the loop exits. Pending requests
/// are failed by dropping their response senders on exit.
pub(crate) async fn read_pump<S>(
    mut read: S,
    pending: PendingMap,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let silence_deadline = tokio::time::sleep(WS_SILENCE_WAIT);
    tokio::pin!(silence_deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut silence_deadline => {
                warn!("silence timeout, session considered dead");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        // Any incoming traffic resets the deadline.
                        silence_deadline
                            .as_mut()
                            .reset(tokio::time::Instant::now() + WS_SILENCE_WAIT);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_text_message(&text, &pending).await;
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(_) => {
                                debug!("received close frame");
                                break;
                            }
                            _ => {} // Binary — the hub protocol is text-only
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Fail anything still waiting for a response.
    pending.lock().await.clear();
    cancel.cancel();
}

/// Handles a text message from the WebSocket.
async fn handle_text_message(text: &str, pending: &PendingMap) {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return;
    }

    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("failed to parse message: {e}");
            return;
        }
    };

    trace!(msg_type = ?msg.msg_type, id = %msg.id, "received message");

    let mut map = pending.lock().await;
    if let Some(tx) = map.remove(&msg.id) {
        let _ = tx.send(msg);
        return;
    }
    drop(map);

    // Hubs push unsolicited state events (activity changes); the manager
    // refetches state instead of tracking them, so just note them.
    debug!(msg_type = ?msg.msg_type, id = %msg.id, "unsolicited hub event");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use hublink_protocol::constants::MessageType;

    #[tokio::test]
    async fn handle_text_routes_response_to_pending() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert("req-1".into(), tx);

        let msg = Message::new::<()>("req-1", MessageType::Pong, None).unwrap();
        let json = serde_json::to_string(&msg).unwrap();

        handle_text_message(&json, &pending).await;

        let resp = rx.await.unwrap();
        assert_eq!(resp.id, "req-1");
        assert_eq!(resp.msg_type, MessageType::Pong);
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn handle_text_ignores_malformed_json() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        handle_text_message("not valid json {{{", &pending).await;
    }

    #[tokio::test]
    async fn handle_text_rejects_oversized_message() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let huge = "x".repeat(WS_MAX_MESSAGE_SIZE + 1);
        handle_text_message(&huge, &pending).await;
    }

    #[tokio::test]
    async fn read_pump_cancels_token_on_stream_end() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();
        let (write_tx, _write_rx) = mpsc::channel(16);
        let empty = stream::empty::<Result<tungstenite::Message, tungstenite::Error>>();

        read_pump(empty, pending.clone(), write_tx, cancel.clone()).await;

        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn read_pump_fails_pending_on_exit() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert("req-9".into(), tx);

        let cancel = CancellationToken::new();
        let (write_tx, _write_rx) = mpsc::channel(16);
        let empty = stream::empty::<Result<tungstenite::Message, tungstenite::Error>>();

        read_pump(empty, pending.clone(), write_tx, cancel).await;

        // Sender was dropped — the waiter resolves with an error.
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn read_pump_exits_on_silence_timeout() {
        tokio::time::pause();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();
        let (write_tx, _write_rx) = mpsc::channel(16);

        // A stream that never yields — pure silence.
        let silent = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();

        read_pump(silent, pending, write_tx, cancel.clone()).await;

        assert!(cancel.is_cancelled());
    }
}
