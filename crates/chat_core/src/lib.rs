//! Realtime messaging core for the marketplace chat client.
//!
//! One [`session::ChatSession`] per open room ties the pieces together: the
//! [`connection::ConnectionManager`] owns the live websocket channel and its
//! reconnection policy, the [`history::HistoryLoader`] pages older messages
//! out of the REST backend, and the [`timeline::Timeline`] merges both inputs
//! (plus locally created optimistic entries) into the single ordered,
//! duplicate-free message list the view layer renders. The
//! [`rooms::RoomDirectory`] is a thin REST consumer for listing, creating,
//! and leaving rooms.

pub mod config;
pub mod connection;
pub mod error;
pub mod history;
pub mod rooms;
pub mod session;
pub mod timeline;

pub use config::{ReconnectPolicy, Settings};
pub use connection::{ConnectionManager, ConnectionState, FailReason, StatusEvent};
pub use error::{ConnectError, DirectoryError, HistoryError, SendError};
pub use history::HistoryLoader;
pub use rooms::RoomDirectory;
pub use session::{ChatSession, SessionEvent};
pub use timeline::{DeliveryState, Timeline, TimelineEntry};
