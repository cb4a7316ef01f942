//! Wire event types for the real-time transport
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization.

use jobchat_shared::{Message, RoomId, UserId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events emitted by the client over the real-time transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Join a chat room
    JoinRoom { room_id: RoomId },

    /// Leave a chat room
    LeaveRoom { room_id: RoomId },

    /// Send a message to the joined room
    SendMessage {
        room_id: RoomId,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        receiver_id: Option<UserId>,
    },

    /// Signal peers that the user started composing
    StartTyping { room_id: RoomId },

    /// Signal peers that the user stopped composing
    StopTyping { room_id: RoomId },

    /// Acknowledge all messages in a room as read
    MarkAsRead { room_id: RoomId },
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events delivered by the server over the real-time transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A message was appended to a room (including the echo of our own sends)
    NewMessage {
        #[serde(flatten)]
        message: Message,
    },

    /// History snapshot pushed after a join
    ChatHistory {
        room_id: RoomId,
        messages: Vec<Message>,
    },

    /// A peer started composing in a room
    UserTyping { room_id: RoomId, user_id: UserId },

    /// A peer stopped composing in a room
    UserStoppedTyping { room_id: RoomId, user_id: UserId },

    /// Server acknowledged a room join
    RoomJoined { room_id: RoomId },

    /// Server acknowledged a room leave
    RoomLeft { room_id: RoomId },

    /// Server-side error notice
    Error { msg: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_serialization() {
        let event = ClientEvent::JoinRoom {
            room_id: RoomId::from("r1"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"join_room","room_id":"r1"}"#);
    }

    #[test]
    fn test_send_message_omits_absent_receiver() {
        let event = ClientEvent::SendMessage {
            room_id: RoomId::from("r1"),
            content: "hello".to_string(),
            receiver_id: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("receiver_id"));
    }

    #[test]
    fn test_new_message_deserialization() {
        let json = r#"{
            "type": "new_message",
            "id": "m1",
            "room_id": "r1",
            "sender_id": "bob",
            "receiver_id": "alice",
            "content": "hi",
            "message_type": "text",
            "timestamp": "2024-03-01T10:00:00Z",
            "read": false
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::NewMessage { message } => {
                assert_eq!(message.id.as_deref(), Some("m1"));
                assert_eq!(message.room_id, RoomId::from("r1"));
                assert_eq!(message.content, "hi");
            }
            other => panic!("Expected NewMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_chat_history_deserialization() {
        let json = r#"{"type":"chat_history","room_id":"r1","messages":[]}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ServerEvent::ChatHistory {
                room_id: RoomId::from("r1"),
                messages: vec![],
            }
        );
    }

    #[test]
    fn test_error_event_deserialization() {
        let json = r#"{"type":"error","msg":"Not in this room"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ServerEvent::Error {
                msg: "Not in this room".to_string()
            }
        );
    }
}
