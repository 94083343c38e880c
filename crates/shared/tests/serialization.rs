use serde_json::{self as json, Value};
use shared::domain::{MessageId, PostId, RoomId, UserId};
use shared::protocol::{ChatMessage, OutboundFrame, RoomSummary};

fn parse(s: &str) -> Value {
    json::from_str(s).expect("valid json")
}

#[test]
fn chat_message_uses_camel_case_on_the_wire() {
    let raw = r#"{
        "id": 42,
        "chatRoomId": 7,
        "senderId": 3,
        "senderNickname": "minsu",
        "content": "is this still for sale?",
        "sentAt": "2025-05-02T10:20:30Z"
    }"#;

    let msg: ChatMessage = json::from_str(raw).expect("deserialize");
    assert_eq!(msg.id, MessageId(42));
    assert_eq!(msg.chat_room_id, RoomId(7));
    assert_eq!(msg.sender_id, UserId(3));
    assert_eq!(msg.sender_nickname.as_deref(), Some("minsu"));

    let v = parse(&json::to_string(&msg).expect("serialize"));
    assert_eq!(v["chatRoomId"], 7);
    assert_eq!(v["senderId"], 3);
    assert_eq!(v["sentAt"], "2025-05-02T10:20:30Z");
}

#[test]
fn chat_message_tolerates_missing_nickname() {
    let raw = r#"{
        "id": 1,
        "chatRoomId": 7,
        "senderId": 3,
        "content": "hi",
        "sentAt": "2025-05-02T10:20:30Z"
    }"#;

    let msg: ChatMessage = json::from_str(raw).expect("deserialize");
    assert!(msg.sender_nickname.is_none());

    let v = parse(&json::to_string(&msg).expect("serialize"));
    assert!(v.get("senderNickname").is_none());
}

#[test]
fn outbound_frame_shape() {
    let frame = OutboundFrame {
        chat_room_id: RoomId(7),
        sender_id: UserId(3),
        content: "hello".to_string(),
    };

    let v = parse(&json::to_string(&frame).expect("serialize"));
    assert_eq!(v["chatRoomId"], 7);
    assert_eq!(v["senderId"], 3);
    assert_eq!(v["content"], "hello");
}

#[test]
fn room_summary_other_party() {
    let room = RoomSummary {
        id: RoomId(1),
        post_id: PostId(9),
        post_title: Some("used bicycle".to_string()),
        buyer_id: UserId(3),
        seller_id: UserId(5),
        last_message: None,
        last_message_at: None,
        unread_count: 0,
    };

    assert_eq!(room.other_party(UserId(3)), UserId(5));
    assert_eq!(room.other_party(UserId(5)), UserId(3));
}
