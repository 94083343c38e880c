use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::{RoomId, UserId},
    protocol::OutboundFrame,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::warn;
use uuid::Uuid;

use crate::{
    config::Settings,
    connection::{ConnectionManager, ConnectionState, StatusEvent},
    error::{HistoryError, SendError},
    history::HistoryLoader,
    timeline::{Timeline, TimelineEntry},
};

/// Events a view layer subscribes to on an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The ordered message list changed; re-read the snapshot.
    TimelineChanged,
    /// Connection status change, forwarded from the live channel.
    Status(StatusEvent),
}

/// One user's view of one open chat room.
///
/// The session is the sole mutator of its [`Timeline`]: live frames arrive
/// through the connection's broadcast, history pages through the loader,
/// and optimistic entries through [`send`](Self::send) — all merged here.
/// Dropping the session (navigating away) discards any in-flight history
/// result with it.
pub struct ChatSession {
    settings: Settings,
    room: RoomId,
    me: UserId,
    connection: Arc<ConnectionManager>,
    history: HistoryLoader,
    timeline: Mutex<Timeline>,
    events: broadcast::Sender<SessionEvent>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ChatSession {
    /// Opens the live channel for `room` and returns the session. History
    /// is not fetched implicitly; call [`load_recent`](Self::load_recent).
    pub async fn open(settings: Settings, room: RoomId, me: UserId, token: &str) -> Arc<Self> {
        let connection = ConnectionManager::new(settings.clone());
        let history = HistoryLoader::new(&settings, room, token);
        let (events, _) = broadcast::channel(256);
        let timeline = Mutex::new(Timeline::new(settings.dedup_tolerance));

        let session = Arc::new(Self {
            settings,
            room,
            me,
            connection,
            history,
            timeline,
            events,
            listener: Mutex::new(None),
        });
        session.spawn_listener().await;
        session.connection.open(room, token).await;
        session
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    /// Snapshot of the ordered message list.
    pub async fn timeline(&self) -> Vec<TimelineEntry> {
        self.timeline.lock().await.entries().to_vec()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.state().await
    }

    pub async fn has_more_history(&self) -> bool {
        self.history.has_more().await
    }

    /// Fetches the most recent history page and merges it.
    pub async fn load_recent(&self) -> Result<(), HistoryError> {
        let rows = self.history.load_recent().await?;
        let changed = self.timeline.lock().await.merge_page(rows);
        if changed {
            let _ = self.events.send(SessionEvent::TimelineChanged);
        }
        Ok(())
    }

    /// Fetches the page older than the oldest loaded message and merges
    /// it. Returns whether an older page may still remain.
    pub async fn load_older(&self) -> Result<bool, HistoryError> {
        let cursor = { self.timeline.lock().await.oldest_confirmed_id() };
        let Some(cursor) = cursor else {
            // Nothing loaded yet; there is no cursor to page from.
            return Ok(self.history.has_more().await);
        };

        let rows = self.history.load_before(cursor).await?;
        let changed = self.timeline.lock().await.merge_page(rows);
        if changed {
            let _ = self.events.send(SessionEvent::TimelineChanged);
        }
        Ok(self.history.has_more().await)
    }

    /// Submits a message: the timeline immediately shows a `Pending` entry,
    /// which the matching server broadcast later promotes to `Confirmed`.
    /// When the channel is down the entry is marked `Failed` right away and
    /// the error returned; it stays visible for an explicit
    /// [`retry`](Self::retry).
    pub async fn send(self: &Arc<Self>, text: &str) -> Result<Uuid, SendError> {
        let content = text.trim();
        if content.is_empty() {
            return Err(SendError::EmptyContent);
        }

        let local_id = {
            let mut timeline = self.timeline.lock().await;
            timeline.insert_pending(self.me, content.to_string(), Utc::now())
        };
        let _ = self.events.send(SessionEvent::TimelineChanged);

        let frame = OutboundFrame {
            chat_room_id: self.room,
            sender_id: self.me,
            content: content.to_string(),
        };
        if let Err(err) = self.connection.send(&frame).await {
            self.timeline.lock().await.mark_failed(local_id);
            let _ = self.events.send(SessionEvent::TimelineChanged);
            return Err(err);
        }

        self.arm_send_timeout(local_id);
        Ok(local_id)
    }

    /// Explicit re-submission of a failed send. There is no automatic
    /// retry: a user-initiated resend is the only path, to avoid duplicate
    /// sends on transient errors.
    pub async fn retry(self: &Arc<Self>, local_id: Uuid) -> Result<Uuid, SendError> {
        let content = {
            let mut timeline = self.timeline.lock().await;
            timeline
                .remove_failed(local_id)
                .ok_or(SendError::UnknownMessage)?
                .content
        };
        let _ = self.events.send(SessionEvent::TimelineChanged);
        self.send(&content).await
    }

    /// Tears down the live channel and stops dispatching events.
    pub async fn close(&self) {
        self.connection.close().await;
        if let Some(listener) = self.listener.lock().await.take() {
            listener.abort();
        }
    }

    fn arm_send_timeout(self: &Arc<Self>, local_id: Uuid) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(session.settings.send_timeout).await;
            let expired = session.timeline.lock().await.mark_failed(local_id);
            if expired {
                warn!(room = session.room.0, %local_id, "send confirmation timed out");
                let _ = session.events.send(SessionEvent::TimelineChanged);
            }
        });
    }

    async fn spawn_listener(self: &Arc<Self>) {
        let mut messages = self.connection.subscribe_messages();
        let mut status = self.connection.subscribe_status();
        let session = Arc::clone(self);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    incoming = messages.recv() => match incoming {
                        Ok(message) => {
                            if message.chat_room_id != session.room {
                                continue;
                            }
                            let changed =
                                session.timeline.lock().await.apply_confirmed(message);
                            if changed {
                                let _ = session.events.send(SessionEvent::TimelineChanged);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(room = session.room.0, skipped, "live listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    update = status.recv() => match update {
                        Ok(event) => {
                            let _ = session.events.send(SessionEvent::Status(event));
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(room = session.room.0, skipped, "status listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        *self.listener.lock().await = Some(handle);
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
