use reqwest::{header, Client, Response};
use shared::{
    domain::{MessageId, RoomId},
    error::ApiError,
    protocol::ChatMessage,
};
use tokio::sync::Mutex;
use tracing::info;

use crate::{config::Settings, error::HistoryError};

struct HistoryState {
    has_more: bool,
}

/// Cursor-based fetch of older messages for one room, independent of the
/// live connection. At most one page load per room is in flight at a time;
/// a second call while one is running gets
/// [`HistoryError::AlreadyLoading`] instead of queuing.
pub struct HistoryLoader {
    http: Client,
    base: String,
    token: String,
    room: RoomId,
    page_size: u32,
    state: Mutex<HistoryState>,
}

impl HistoryLoader {
    pub fn new(settings: &Settings, room: RoomId, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base: settings.rest_base(),
            token: token.into(),
            room,
            page_size: settings.page_size,
            state: Mutex::new(HistoryState { has_more: true }),
        }
    }

    /// Whether an older page may still exist on the server.
    pub async fn has_more(&self) -> bool {
        self.state.lock().await.has_more
    }

    /// Fetches the most recent page, re-sorted ascending for merging. The
    /// server returns newest-first.
    pub async fn load_recent(&self) -> Result<Vec<ChatMessage>, HistoryError> {
        let mut state = self
            .state
            .try_lock()
            .map_err(|_| HistoryError::AlreadyLoading)?;

        let url = format!("{}/api/chatroom/{}/recent", self.base, self.room.0);
        let rows = self.fetch_page(&url).await?;
        state.has_more = rows.len() as u32 >= self.page_size;
        info!(room = self.room.0, count = rows.len(), "loaded recent messages");
        Ok(rows)
    }

    /// Fetches the page strictly older than `cursor` (the oldest loaded
    /// message id). Never re-pages ranges the caller already holds.
    pub async fn load_before(&self, cursor: MessageId) -> Result<Vec<ChatMessage>, HistoryError> {
        let mut state = self
            .state
            .try_lock()
            .map_err(|_| HistoryError::AlreadyLoading)?;
        if !state.has_more {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/api/chatroom/{}/before/{}",
            self.base, self.room.0, cursor.0
        );
        let rows = self.fetch_page(&url).await?;
        state.has_more = rows.len() as u32 >= self.page_size;
        Ok(rows)
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<ChatMessage>, HistoryError> {
        let response = self
            .http
            .get(url)
            .query(&[("size", self.page_size)])
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?;

        let mut rows: Vec<ChatMessage> = expect_success(response)
            .await
            .map_err(|(status, body)| HistoryError::Api { status, body })?
            .json()
            .await?;
        rows.sort_by_key(|row| (row.sent_at, row.id));
        Ok(rows)
    }
}

/// Splits off non-2xx responses, decoding the JSON error body when the
/// server sent one.
pub(crate) async fn expect_success(
    response: Response,
) -> Result<Response, (u16, Option<ApiError>)> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.json::<ApiError>().await.ok();
    Err((status.as_u16(), body))
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
