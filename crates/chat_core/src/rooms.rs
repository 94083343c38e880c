use reqwest::{header, Client, StatusCode};
use shared::{
    domain::{PostId, RoomId, UserId},
    protocol::RoomSummary,
};

use crate::{config::Settings, error::DirectoryError, history::expect_success};

/// Thin REST consumer for room management: listing a user's rooms, finding
/// or creating the room for a listing, and leaving a room. Refresh is
/// on-demand only; there are no polling timers here.
pub struct RoomDirectory {
    http: Client,
    base: String,
    token: String,
}

impl RoomDirectory {
    pub fn new(settings: &Settings, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base: settings.rest_base(),
            token: token.into(),
        }
    }

    pub async fn list_rooms(&self, user: UserId) -> Result<Vec<RoomSummary>, DirectoryError> {
        let url = format!("{}/api/users/{}/chatrooms", self.base, user.0);
        let response = self.authorized(self.http.get(&url)).send().await?;
        let rooms = expect_success(response)
            .await
            .map_err(|(status, body)| DirectoryError::Api { status, body })?
            .json()
            .await?;
        Ok(rooms)
    }

    /// The existing room for a listing, if the current user already has
    /// one. A 404 means no room yet.
    pub async fn find_room_for_post(
        &self,
        post: PostId,
    ) -> Result<Option<RoomSummary>, DirectoryError> {
        let url = format!("{}/api/posts/{}/chatroom", self.base, post.0);
        let response = self.authorized(self.http.get(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let room = expect_success(response)
            .await
            .map_err(|(status, body)| DirectoryError::Api { status, body })?
            .json()
            .await?;
        Ok(Some(room))
    }

    /// Creates the buyer-side room for a listing.
    pub async fn create_room(&self, post: PostId) -> Result<RoomSummary, DirectoryError> {
        let url = format!("{}/api/posts/{}/chatroom", self.base, post.0);
        let response = self.authorized(self.http.post(&url)).send().await?;
        let room = expect_success(response)
            .await
            .map_err(|(status, body)| DirectoryError::Api { status, body })?
            .json()
            .await?;
        Ok(room)
    }

    pub async fn leave_room(&self, room: RoomId) -> Result<(), DirectoryError> {
        let url = format!("{}/api/chatroom/{}", self.base, room.0);
        let response = self.authorized(self.http.delete(&url)).send().await?;
        expect_success(response)
            .await
            .map_err(|(status, body)| DirectoryError::Api { status, body })?;
        Ok(())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(header::AUTHORIZATION, format!("Bearer {}", self.token))
    }
}

#[cfg(test)]
#[path = "tests/rooms_tests.rs"]
mod tests;
