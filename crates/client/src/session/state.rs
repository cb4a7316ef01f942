//! Session state and its transition functions
//!
//! This module is the pure core of the session manager: every inbound
//! transport event and every caller operation maps to one transition on
//! [`SessionState`]. Nothing in here performs I/O, which keeps the state
//! machine testable without a live connection.

use std::collections::HashMap;

use jobchat_shared::{ChatRoom, LastMessage, Message, RoomId, UserId};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// In-memory view of one chat session.
///
/// Invariants:
/// - at most one room is joined at any time
/// - the message log belongs to the joined room only and is cleared on switch
/// - typing entries carry a generation so a stale expiry timer never removes
///   a re-asserted entry
#[derive(Debug, Default)]
pub struct SessionState {
    pub connection: ConnectionState,
    pub rooms: Vec<ChatRoom>,
    pub current_room: Option<RoomId>,
    pub messages: Vec<Message>,
    typing: HashMap<UserId, u64>,
    typing_seq: u64,
    pub unread: u64,
    self_user: Option<UserId>,
}

/// Outcome of applying an inbound message (used for logging)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Appended,
    UnreadIncremented,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record who this session belongs to (used to ignore self-typing echoes)
    pub fn set_self_user(&mut self, user_id: UserId) {
        self.self_user = Some(user_id);
    }

    pub fn set_connecting(&mut self) {
        self.connection = ConnectionState::Connecting;
    }

    pub fn set_connected(&mut self) {
        self.connection = ConnectionState::Connected;
    }

    /// Transport dropped or was torn down. Room membership and the message
    /// log are server-owned state and will be rebuilt on reconnect.
    pub fn set_disconnected(&mut self) {
        self.connection = ConnectionState::Disconnected;
        self.current_room = None;
        self.messages.clear();
        self.typing.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Wholesale replacement of the room list (no incremental merge)
    pub fn replace_rooms(&mut self, rooms: Vec<ChatRoom>) {
        self.rooms = rooms;
    }

    /// Switch the joined room. Returns false (and changes nothing) when the
    /// room is already current; otherwise clears the log and typing set.
    pub fn begin_join(&mut self, room_id: RoomId) -> bool {
        if self.current_room.as_ref() == Some(&room_id) {
            return false;
        }
        self.current_room = Some(room_id);
        self.messages.clear();
        self.typing.clear();
        true
    }

    /// Clear the joined room, but only if it still matches `room_id`
    pub fn end_leave(&mut self, room_id: &RoomId) {
        if self.current_room.as_ref() == Some(room_id) {
            self.current_room = None;
            self.messages.clear();
            self.typing.clear();
        }
    }

    /// Apply a history snapshot. Discarded when the session has moved to a
    /// different room since the snapshot was requested.
    pub fn apply_history(&mut self, room_id: &RoomId, messages: Vec<Message>) -> bool {
        if self.current_room.as_ref() != Some(room_id) {
            return false;
        }
        self.messages = messages;
        true
    }

    /// Apply an inbound message: append when it targets the joined room,
    /// otherwise count it as unread. Room-list bookkeeping (last-message
    /// summary, per-room unread) is updated either way.
    pub fn apply_message(&mut self, message: Message) -> MessageOutcome {
        let for_current = self.current_room.as_ref() == Some(&message.room_id);

        if let Some(room) = self.rooms.iter_mut().find(|r| r.id == message.room_id) {
            room.last_message = Some(LastMessage {
                content: Some(message.content.clone()),
                sender_id: Some(message.sender_id.clone()),
                timestamp: Some(message.timestamp),
            });
            if !for_current {
                room.unread_count += 1;
            }
        }

        if for_current {
            self.messages.push(message);
            MessageOutcome::Appended
        } else {
            self.unread += 1;
            MessageOutcome::UnreadIncremented
        }
    }

    /// A peer started composing. Returns the expiry generation to arm the
    /// auto-removal timer with, or None when the signal is irrelevant
    /// (foreign room, or our own echo).
    pub fn typing_started(&mut self, room_id: &RoomId, user_id: UserId) -> Option<u64> {
        if self.current_room.as_ref() != Some(room_id) {
            return None;
        }
        if self.self_user.as_ref() == Some(&user_id) {
            return None;
        }
        self.typing_seq += 1;
        let seq = self.typing_seq;
        self.typing.insert(user_id, seq);
        Some(seq)
    }

    /// A peer stopped composing; removes the entry immediately
    pub fn typing_stopped(&mut self, user_id: &UserId) {
        self.typing.remove(user_id);
    }

    /// Expire a typing entry, but only if it still carries the generation the
    /// timer was armed with. A newer start or an explicit stop wins.
    pub fn expire_typing(&mut self, user_id: &UserId, seq: u64) -> bool {
        if self.typing.get(user_id) == Some(&seq) {
            self.typing.remove(user_id);
            true
        } else {
            false
        }
    }

    /// Reset the session unread counter and the target room's count;
    /// other rooms are untouched.
    pub fn mark_read(&mut self, room_id: &RoomId) {
        self.unread = 0;
        if let Some(room) = self.rooms.iter_mut().find(|r| r.id == *room_id) {
            room.unread_count = 0;
        }
    }

    /// Users currently believed to be composing in the joined room
    pub fn typing_users(&self) -> Vec<UserId> {
        self.typing.keys().cloned().collect()
    }

    /// Immutable snapshot for observers (UI render, tests)
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.connection,
            rooms: self.rooms.clone(),
            current_room: self.current_room.clone(),
            messages: self.messages.clone(),
            typing: self.typing_users(),
            unread: self.unread,
        }
    }
}

/// Point-in-time copy of the session state handed to observers
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub rooms: Vec<ChatRoom>,
    pub current_room: Option<RoomId>,
    pub messages: Vec<Message>,
    pub typing: Vec<UserId>,
    pub unread: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn message(id: &str, room: &str, sender: &str, content: &str) -> Message {
        Message {
            id: Some(id.to_string()),
            room_id: RoomId::from(room),
            sender_id: UserId::from(sender),
            receiver_id: None,
            content: content.to_string(),
            message_type: Default::default(),
            timestamp: datetime!(2024-03-01 10:00 UTC),
            read: false,
        }
    }

    fn room(id: &str, unread: u64) -> ChatRoom {
        ChatRoom {
            id: RoomId::from(id),
            job_id: "job-1".to_string(),
            student_id: Some(UserId::from("alice")),
            recruiter_id: Some(UserId::from("bob")),
            job_title: "Engineer".to_string(),
            company_name: "Acme".to_string(),
            participants: vec![UserId::from("alice"), UserId::from("bob")],
            created_at: datetime!(2024-02-01 09:00 UTC),
            last_message: None,
            unread_count: unread,
        }
    }

    #[test]
    fn test_join_is_noop_for_current_room() {
        let mut state = SessionState::new();
        assert!(state.begin_join(RoomId::from("r1")));
        state.messages.push(message("m1", "r1", "bob", "hi"));

        // Re-joining the same room must not clear the log
        assert!(!state.begin_join(RoomId::from("r1")));
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn test_join_switch_clears_log() {
        let mut state = SessionState::new();
        state.begin_join(RoomId::from("r1"));
        state.messages.push(message("m1", "r1", "bob", "hi"));

        assert!(state.begin_join(RoomId::from("r2")));
        assert!(state.messages.is_empty());
        assert_eq!(state.current_room, Some(RoomId::from("r2")));
    }

    #[test]
    fn test_stale_history_is_discarded() {
        let mut state = SessionState::new();
        state.begin_join(RoomId::from("a"));
        state.begin_join(RoomId::from("b"));

        // A's snapshot arrives after the switch to B
        let applied = state.apply_history(&RoomId::from("a"), vec![message("m1", "a", "bob", "x")]);
        assert!(!applied);
        assert!(state.messages.is_empty());

        let applied = state.apply_history(&RoomId::from("b"), vec![message("m2", "b", "bob", "y")]);
        assert!(applied);
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn test_messages_append_in_arrival_order() {
        let mut state = SessionState::new();
        state.begin_join(RoomId::from("r1"));

        state.apply_message(message("m1", "r1", "bob", "first"));
        state.apply_message(message("m2", "r1", "bob", "second"));

        let contents: Vec<_> = state.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert_eq!(state.unread, 0);
    }

    #[test]
    fn test_foreign_room_message_increments_unread() {
        let mut state = SessionState::new();
        state.replace_rooms(vec![room("r1", 0), room("r2", 0)]);
        state.begin_join(RoomId::from("r1"));

        let outcome = state.apply_message(message("m1", "r2", "bob", "psst"));
        assert_eq!(outcome, MessageOutcome::UnreadIncremented);
        assert_eq!(state.unread, 1);
        assert!(state.messages.is_empty());

        // Room-list bookkeeping follows along
        let r2 = state
            .rooms
            .iter()
            .find(|r| r.id == RoomId::from("r2"))
            .unwrap();
        assert_eq!(r2.unread_count, 1);
        assert_eq!(
            r2.last_message.as_ref().unwrap().content.as_deref(),
            Some("psst")
        );
    }

    #[test]
    fn test_mark_read_resets_only_target_room() {
        let mut state = SessionState::new();
        state.replace_rooms(vec![room("r1", 2), room("r2", 5)]);
        state.unread = 7;

        state.mark_read(&RoomId::from("r1"));

        assert_eq!(state.unread, 0);
        assert_eq!(state.rooms[0].unread_count, 0);
        assert_eq!(state.rooms[1].unread_count, 5);
    }

    #[test]
    fn test_typing_ignores_self_and_foreign_rooms() {
        let mut state = SessionState::new();
        state.set_self_user(UserId::from("alice"));
        state.begin_join(RoomId::from("r1"));

        assert!(state
            .typing_started(&RoomId::from("r1"), UserId::from("alice"))
            .is_none());
        assert!(state
            .typing_started(&RoomId::from("r2"), UserId::from("bob"))
            .is_none());
        assert!(state
            .typing_started(&RoomId::from("r1"), UserId::from("bob"))
            .is_some());
        assert_eq!(state.typing_users(), vec![UserId::from("bob")]);
    }

    #[test]
    fn test_typing_expiry_generation_guard() {
        let mut state = SessionState::new();
        state.set_self_user(UserId::from("alice"));
        state.begin_join(RoomId::from("r1"));

        let first = state
            .typing_started(&RoomId::from("r1"), UserId::from("bob"))
            .unwrap();
        // Bob re-asserts typing before the first timer fires
        let second = state
            .typing_started(&RoomId::from("r1"), UserId::from("bob"))
            .unwrap();
        assert_ne!(first, second);

        // Stale timer must not remove the re-asserted entry
        assert!(!state.expire_typing(&UserId::from("bob"), first));
        assert_eq!(state.typing_users().len(), 1);

        assert!(state.expire_typing(&UserId::from("bob"), second));
        assert!(state.typing_users().is_empty());
    }

    #[test]
    fn test_explicit_stop_defuses_pending_expiry() {
        let mut state = SessionState::new();
        state.set_self_user(UserId::from("alice"));
        state.begin_join(RoomId::from("r1"));

        let seq = state
            .typing_started(&RoomId::from("r1"), UserId::from("bob"))
            .unwrap();
        state.typing_stopped(&UserId::from("bob"));
        assert!(state.typing_users().is_empty());

        // The delayed removal finds nothing to do
        assert!(!state.expire_typing(&UserId::from("bob"), seq));
    }

    #[test]
    fn test_disconnect_clears_room_scoped_state() {
        let mut state = SessionState::new();
        state.set_connected();
        state.begin_join(RoomId::from("r1"));
        state.apply_message(message("m1", "r1", "bob", "hi"));

        state.set_disconnected();
        assert_eq!(state.connection, ConnectionState::Disconnected);
        assert!(state.current_room.is_none());
        assert!(state.messages.is_empty());
    }
}
