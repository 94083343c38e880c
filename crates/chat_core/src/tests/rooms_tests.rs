use super::*;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use shared::error::{ApiError, ErrorCode};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Clone)]
struct RoomServerState {
    rooms: Arc<Vec<RoomSummary>>,
    left_rooms: Arc<Mutex<Vec<i64>>>,
    auth_headers: Arc<Mutex<Vec<String>>>,
}

fn sample_rooms() -> Vec<RoomSummary> {
    vec![
        RoomSummary {
            id: RoomId(1),
            post_id: PostId(10),
            post_title: Some("used bicycle".to_string()),
            buyer_id: UserId(7),
            seller_id: UserId(5),
            last_message: Some("is it still available?".to_string()),
            last_message_at: Some("2025-05-02T10:00:00Z".parse().expect("timestamp")),
            unread_count: 2,
        },
        RoomSummary {
            id: RoomId(2),
            post_id: PostId(11),
            post_title: None,
            buyer_id: UserId(7),
            seller_id: UserId(9),
            last_message: None,
            last_message_at: None,
            unread_count: 0,
        },
    ]
}

async fn record_auth(state: &RoomServerState, headers: &HeaderMap) {
    if let Some(value) = headers.get("authorization") {
        let header = value.to_str().unwrap_or_default().to_string();
        state.auth_headers.lock().await.push(header);
    }
}

async fn list_route(
    State(state): State<RoomServerState>,
    Path(_user): Path<i64>,
    headers: HeaderMap,
) -> Json<Vec<RoomSummary>> {
    record_auth(&state, &headers).await;
    Json(state.rooms.as_ref().clone())
}

async fn find_route(
    State(state): State<RoomServerState>,
    Path(post): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<RoomSummary>, StatusCode> {
    record_auth(&state, &headers).await;
    state
        .rooms
        .iter()
        .find(|room| room.post_id.0 == post)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_route(
    State(state): State<RoomServerState>,
    Path(post): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<RoomSummary>, (StatusCode, Json<ApiError>)> {
    record_auth(&state, &headers).await;
    if post == 99 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError::new(ErrorCode::NotFound, "no such post")),
        ));
    }
    Ok(Json(RoomSummary {
        id: RoomId(42),
        post_id: PostId(post),
        post_title: Some("new listing".to_string()),
        buyer_id: UserId(7),
        seller_id: UserId(5),
        last_message: None,
        last_message_at: None,
        unread_count: 0,
    }))
}

async fn leave_route(
    State(state): State<RoomServerState>,
    Path(room): Path<i64>,
    headers: HeaderMap,
) -> StatusCode {
    record_auth(&state, &headers).await;
    state.left_rooms.lock().await.push(room);
    StatusCode::NO_CONTENT
}

async fn spawn_room_server() -> (String, RoomServerState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = RoomServerState {
        rooms: Arc::new(sample_rooms()),
        left_rooms: Arc::new(Mutex::new(Vec::new())),
        auth_headers: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/api/users/:user/chatrooms", get(list_route))
        .route("/api/posts/:post/chatroom", get(find_route).post(create_route))
        .route("/api/chatroom/:room", delete(leave_route))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn directory_for(server_url: String) -> RoomDirectory {
    let settings = Settings {
        server_url,
        ..Settings::default()
    };
    RoomDirectory::new(&settings, "rooms-token")
}

#[tokio::test]
async fn lists_rooms_with_preview_metadata() {
    let (server_url, state) = spawn_room_server().await;
    let directory = directory_for(server_url);

    let rooms = directory.list_rooms(UserId(7)).await.expect("list");

    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0].id, RoomId(1));
    assert_eq!(rooms[0].unread_count, 2);
    assert_eq!(rooms[0].other_party(UserId(7)), UserId(5));

    let headers = state.auth_headers.lock().await.clone();
    assert_eq!(headers, vec!["Bearer rooms-token".to_string()]);
}

#[tokio::test]
async fn finds_the_existing_room_for_a_post() {
    let (server_url, _state) = spawn_room_server().await;
    let directory = directory_for(server_url);

    let room = directory
        .find_room_for_post(PostId(10))
        .await
        .expect("lookup");
    assert_eq!(room.map(|room| room.id), Some(RoomId(1)));
}

#[tokio::test]
async fn missing_room_for_a_post_is_none_not_an_error() {
    let (server_url, _state) = spawn_room_server().await;
    let directory = directory_for(server_url);

    let room = directory
        .find_room_for_post(PostId(77))
        .await
        .expect("lookup");
    assert!(room.is_none());
}

#[tokio::test]
async fn creates_a_room_for_a_listing() {
    let (server_url, _state) = spawn_room_server().await;
    let directory = directory_for(server_url);

    let room = directory.create_room(PostId(15)).await.expect("create");
    assert_eq!(room.id, RoomId(42));
    assert_eq!(room.post_id, PostId(15));
}

#[tokio::test]
async fn create_failure_carries_the_decoded_error_body() {
    let (server_url, _state) = spawn_room_server().await;
    let directory = directory_for(server_url);

    let err = directory.create_room(PostId(99)).await.expect_err("fails");
    match err {
        DirectoryError::Api { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body.expect("body").code, ErrorCode::NotFound);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn leaving_a_room_deletes_it_server_side() {
    let (server_url, state) = spawn_room_server().await;
    let directory = directory_for(server_url);

    directory.leave_room(RoomId(1)).await.expect("leave");
    assert_eq!(state.left_rooms.lock().await.clone(), vec![1]);
}
