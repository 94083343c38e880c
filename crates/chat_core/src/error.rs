use shared::error::ApiError;
use thiserror::Error;

/// Failures establishing a live channel. Transport-level problems never
/// surface here; they drive the connection state machine instead.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("server url is not http(s): {0}")]
    InvalidUrl(String),
}

/// Per-message send failures. These mark the affected timeline entry
/// `Failed`; they never close the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("message content is empty")]
    EmptyContent,
    #[error("not connected")]
    NotConnected,
    #[error("failed to encode outbound frame: {0}")]
    Encode(String),
    #[error("no failed message with that id to retry")]
    UnknownMessage,
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("another history page load is already in flight")]
    AlreadyLoading,
    #[error("history request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("history request rejected with status {status}")]
    Api { status: u16, body: Option<ApiError> },
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("room request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("room request rejected with status {status}")]
    Api { status: u16, body: Option<ApiError> },
}
