use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use shared::{
    domain::RoomId,
    protocol::{ChatMessage, OutboundFrame},
};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::frame::coding::CloseCode, Message},
};
use tracing::{info, warn};

use crate::{config::Settings, error::SendError};

/// Sentinel text frame the server sends once the credential handshake is
/// accepted. Everything after it is a JSON chat frame.
const AUTH_ACK: &str = "Authentication successful!";
/// Sentinel for an explicitly rejected credential.
const AUTH_REJECTED: &str = "Authentication failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Reconnecting,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// `open` was called without a session credential.
    MissingCredential,
    /// The configured server URL cannot yield a websocket endpoint.
    InvalidEndpoint,
    /// The server rejected the credential handshake. Retrying with the same
    /// credential is pointless, so no reconnect attempt is consumed.
    AuthRejected,
}

/// Connection status changes, broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Connected {
        room: RoomId,
    },
    /// The channel is gone. Emitted before any reconnection attempt.
    Disconnected {
        room: RoomId,
    },
    Reconnecting {
        room: RoomId,
        attempt: u32,
        delay: Duration,
    },
    /// Terminal give-up after the bounded reconnect attempts are spent;
    /// distinct from an ordinary disconnect so the UI can prompt a manual
    /// retry instead of looping silently.
    ReconnectsExhausted {
        room: RoomId,
    },
    Failed {
        room: RoomId,
        reason: FailReason,
    },
}

struct Inner {
    state: ConnectionState,
    room: Option<RoomId>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    supervisor: Option<JoinHandle<()>>,
}

enum AttemptOutcome {
    /// Server closed with code 1000.
    NormalClose,
    /// Credential rejected during the handshake; terminal.
    AuthRejected,
    /// Connect failure, handshake timeout, or abnormal close.
    Abnormal { was_connected: bool },
}

enum HandshakeResult {
    Accepted,
    Rejected,
    TransportLost,
}

/// Owns at most one authenticated live channel and routes traffic on it.
///
/// Inbound chat frames and status changes fan out over broadcast channels:
/// [`subscribe_messages`](Self::subscribe_messages) /
/// [`subscribe_status`](Self::subscribe_status) return receivers that
/// unsubscribe when dropped, and one slow or panicking consumer cannot
/// affect delivery to the others.
pub struct ConnectionManager {
    settings: Settings,
    inner: Mutex<Inner>,
    messages: broadcast::Sender<ChatMessage>,
    status: broadcast::Sender<StatusEvent>,
}

impl ConnectionManager {
    pub fn new(settings: Settings) -> Arc<Self> {
        let (messages, _) = broadcast::channel(256);
        let (status, _) = broadcast::channel(64);
        Arc::new(Self {
            settings,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                room: None,
                outbound: None,
                supervisor: None,
            }),
            messages,
            status,
        })
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<ChatMessage> {
        self.messages.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    pub async fn room(&self) -> Option<RoomId> {
        self.inner.lock().await.room
    }

    /// Opens the live channel for `room`, tearing down any previous channel
    /// first. Never returns an error: failures settle into the `Failed`
    /// state and surface as status events.
    pub async fn open(self: &Arc<Self>, room: RoomId, token: &str) {
        self.close().await;

        let token = token.trim().trim_start_matches("Bearer ").trim().to_string();
        if token.is_empty() {
            self.settle_failed(room, FailReason::MissingCredential).await;
            return;
        }

        let endpoint = match self.settings.ws_endpoint(room) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                warn!(room = room.0, error = %err, "cannot derive websocket endpoint");
                self.settle_failed(room, FailReason::InvalidEndpoint).await;
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        inner.room = Some(room);
        inner.state = ConnectionState::Connecting;
        let manager = Arc::clone(self);
        inner.supervisor = Some(tokio::spawn(async move {
            manager.run_channel(room, token, endpoint).await;
        }));
    }

    /// Explicit teardown: cancels any pending reconnection timer and settles
    /// in `Disconnected`.
    pub async fn close(&self) {
        let (supervisor, room, was_active) = {
            let mut inner = self.inner.lock().await;
            let supervisor = inner.supervisor.take();
            inner.outbound = None;
            let was_active = !matches!(
                inner.state,
                ConnectionState::Disconnected | ConnectionState::Failed
            );
            inner.state = ConnectionState::Disconnected;
            (supervisor, inner.room, was_active)
        };

        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }
        if was_active {
            if let Some(room) = room {
                let _ = self.status.send(StatusEvent::Disconnected { room });
            }
        }
    }

    /// Sends a chat frame. Only permitted while `Connected`; there is no
    /// queuing, so the caller decides how to handle the failure.
    pub async fn send(&self, frame: &OutboundFrame) -> Result<(), SendError> {
        let inner = self.inner.lock().await;
        if inner.state != ConnectionState::Connected {
            return Err(SendError::NotConnected);
        }
        let Some(outbound) = inner.outbound.as_ref() else {
            return Err(SendError::NotConnected);
        };
        let text =
            serde_json::to_string(frame).map_err(|err| SendError::Encode(err.to_string()))?;
        outbound.send(text).map_err(|_| SendError::NotConnected)
    }

    async fn settle_failed(&self, room: RoomId, reason: FailReason) {
        {
            let mut inner = self.inner.lock().await;
            inner.room = Some(room);
            inner.state = ConnectionState::Failed;
        }
        let _ = self.status.send(StatusEvent::Failed { room, reason });
    }

    async fn set_state(&self, state: ConnectionState) {
        self.inner.lock().await.state = state;
    }

    async fn clear_outbound(&self) {
        self.inner.lock().await.outbound = None;
    }

    async fn run_channel(self: Arc<Self>, room: RoomId, token: String, endpoint: String) {
        let policy = self.settings.reconnect.clone();
        let mut attempts: u32 = 0;

        loop {
            let outcome = self.run_attempt(room, &token, &endpoint).await;
            self.clear_outbound().await;

            match outcome {
                AttemptOutcome::NormalClose => {
                    self.set_state(ConnectionState::Disconnected).await;
                    let _ = self.status.send(StatusEvent::Disconnected { room });
                    return;
                }
                AttemptOutcome::AuthRejected => {
                    self.set_state(ConnectionState::Failed).await;
                    let _ = self.status.send(StatusEvent::Failed {
                        room,
                        reason: FailReason::AuthRejected,
                    });
                    return;
                }
                AttemptOutcome::Abnormal { was_connected } => {
                    let _ = self.status.send(StatusEvent::Disconnected { room });
                    if was_connected {
                        attempts = 0;
                    }
                    if attempts >= policy.max_attempts {
                        info!(room = room.0, "reconnect attempts exhausted");
                        self.set_state(ConnectionState::Failed).await;
                        let _ = self.status.send(StatusEvent::ReconnectsExhausted { room });
                        return;
                    }
                    attempts += 1;
                    let delay = policy.delay_for(attempts);
                    self.set_state(ConnectionState::Reconnecting).await;
                    let _ = self.status.send(StatusEvent::Reconnecting {
                        room,
                        attempt: attempts,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                    self.set_state(ConnectionState::Connecting).await;
                }
            }
        }
    }

    async fn run_attempt(&self, room: RoomId, token: &str, endpoint: &str) -> AttemptOutcome {
        let ws = match connect_async(endpoint.to_string()).await {
            Ok((ws, _response)) => ws,
            Err(err) => {
                warn!(room = room.0, error = %err, "websocket connect failed");
                return AttemptOutcome::Abnormal {
                    was_connected: false,
                };
            }
        };
        let (mut writer, mut reader) = ws.split();

        // Credential handshake: the first frame on the channel is plain
        // text, never JSON.
        self.set_state(ConnectionState::Authenticating).await;
        if writer
            .send(Message::Text(format!("Bearer {token}")))
            .await
            .is_err()
        {
            return AttemptOutcome::Abnormal {
                was_connected: false,
            };
        }

        let handshake = tokio::time::timeout(self.settings.handshake_timeout, async {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if text == AUTH_ACK {
                            return HandshakeResult::Accepted;
                        }
                        if text == AUTH_REJECTED {
                            return HandshakeResult::Rejected;
                        }
                        // Anything else before the ack is unexpected; drop it.
                    }
                    Ok(Message::Close(_)) => return HandshakeResult::Rejected,
                    Ok(_) => {}
                    Err(_) => return HandshakeResult::TransportLost,
                }
            }
            HandshakeResult::TransportLost
        })
        .await;

        match handshake {
            Ok(HandshakeResult::Accepted) => {}
            Ok(HandshakeResult::Rejected) => {
                warn!(room = room.0, "credential handshake rejected");
                return AttemptOutcome::AuthRejected;
            }
            Ok(HandshakeResult::TransportLost) => {
                return AttemptOutcome::Abnormal {
                    was_connected: false,
                }
            }
            Err(_elapsed) => {
                warn!(room = room.0, "credential handshake timed out");
                return AttemptOutcome::Abnormal {
                    was_connected: false,
                };
            }
        }

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        // Held so the recv arm below stays pending (instead of yielding
        // `None` in a loop) once the manager clears its sender.
        let _outbound_guard = outbound_tx.clone();
        {
            let mut inner = self.inner.lock().await;
            inner.state = ConnectionState::Connected;
            inner.outbound = Some(outbound_tx);
        }
        info!(room = room.0, "live channel connected");
        let _ = self.status.send(StatusEvent::Connected { room });

        loop {
            tokio::select! {
                outgoing = outbound_rx.recv() => {
                    if let Some(text) = outgoing {
                        if writer.send(Message::Text(text)).await.is_err() {
                            return AttemptOutcome::Abnormal { was_connected: true };
                        }
                    }
                }
                incoming = reader.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ChatMessage>(&text) {
                                Ok(message) => {
                                    let _ = self.messages.send(message);
                                }
                                Err(err) => {
                                    warn!(room = room.0, error = %err, "dropping malformed frame");
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let normal = frame
                                .as_ref()
                                .is_some_and(|close| close.code == CloseCode::Normal);
                            return if normal {
                                AttemptOutcome::NormalClose
                            } else {
                                AttemptOutcome::Abnormal { was_connected: true }
                            };
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(room = room.0, error = %err, "websocket receive failed");
                            return AttemptOutcome::Abnormal { was_connected: true };
                        }
                        None => {
                            return AttemptOutcome::Abnormal { was_connected: true };
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
