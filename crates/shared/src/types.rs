//! Domain types shared between the chat client and its callers

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Chat room ID wrapper (opaque server-assigned identifier)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// User ID wrapper (username or server-assigned identifier)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Role of the authenticated user; decides which room-list endpoint is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Recruiter,
}

/// Identity handed to the session by the (external) auth provider
#[derive(Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub role: Role,
    pub token: String,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<UserId>, role: Role, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            token: token.into(),
        }
    }
}

// Token is a bearer credential; keep it out of debug output
impl fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserIdentity")
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .field("token", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Message kind as stored by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    File,
    System,
}

/// A single chat message; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<String>,
    pub room_id: RoomId,
    pub sender_id: UserId,
    #[serde(default)]
    pub receiver_id: Option<UserId>,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub read: bool,
}

// =============================================================================
// Rooms
// =============================================================================

/// Denormalized summary of the most recent message in a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub sender_id: Option<UserId>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

/// A two-party conversation scoped to a job application.
///
/// Rooms are created by the backend when a student applies to a job; the
/// client only ever fetches them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: RoomId,
    pub job_id: String,
    #[serde(default)]
    pub student_id: Option<UserId>,
    #[serde(default)]
    pub recruiter_id: Option<UserId>,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub participants: Vec<UserId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub unread_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_deserialization_with_defaults() {
        let json = r#"{
            "room_id": "r1",
            "sender_id": "alice",
            "content": "hello",
            "timestamp": "2024-03-01T10:00:00Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.room_id, RoomId::from("r1"));
        assert_eq!(msg.message_type, MessageType::Text);
        assert!(!msg.read);
        assert!(msg.id.is_none());
        assert!(msg.receiver_id.is_none());
    }

    #[test]
    fn test_chat_room_deserialization() {
        let json = r#"{
            "id": "65f1a2b3c4d5e6f7a8b9c0d1",
            "job_id": "job-42",
            "recruiter_id": "bob",
            "job_title": "Backend Engineer",
            "company_name": "Acme",
            "created_at": "2024-03-01T09:00:00Z",
            "last_message": {
                "content": "see you then",
                "sender_id": "bob",
                "timestamp": "2024-03-01T10:00:00Z"
            },
            "unread_count": 2,
            "participants": ["alice", "bob"]
        }"#;
        let room: ChatRoom = serde_json::from_str(json).unwrap();
        assert_eq!(room.unread_count, 2);
        assert_eq!(room.participants.len(), 2);
        assert_eq!(
            room.last_message.unwrap().sender_id,
            Some(UserId::from("bob"))
        );
        assert!(room.student_id.is_none());
    }

    #[test]
    fn test_identity_debug_redacts_token() {
        let identity = UserIdentity::new("alice", Role::Student, "secret-token");
        let rendered = format!("{identity:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("alice"));
    }
}
