//! REST collaborator client
//!
//! Covers the HTTP side of the backend: room list (role-dependent endpoint),
//! history backfill, and the mark-read fallback. The real-time transport is
//! the primary write path; these endpoints are read/secondary paths.

use std::time::Duration;

use jobchat_shared::{ChatError, ChatResult, ChatRoom, Message, Role, RoomId};
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RoomsResponse {
    chat_rooms: Vec<ChatRoom>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    messages: Vec<Message>,
}

/// HTTP client for the chat REST endpoints
#[derive(Debug, Clone)]
pub struct ChatApi {
    http: Client,
    base_url: String,
}

impl ChatApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ChatResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the authenticated user's room list. The endpoint depends on the
    /// caller's role.
    pub async fn fetch_rooms(&self, role: Role, token: &str) -> ChatResult<Vec<ChatRoom>> {
        let path = match role {
            Role::Student => "/api/students/chat-rooms",
            Role::Recruiter => "/api/recruiters/chat-rooms",
        };
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;
        let body: RoomsResponse = response.json().await?;
        Ok(body.chat_rooms)
    }

    /// Fetch the most recent messages for a room, in chronological order
    pub async fn fetch_history(
        &self,
        room_id: &RoomId,
        limit: u32,
        token: &str,
    ) -> ChatResult<Vec<Message>> {
        let response = self
            .http
            .get(format!("{}/api/chat/history/{}", self.base_url, room_id))
            .query(&[("limit", limit)])
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;
        let body: HistoryResponse = response.json().await?;
        Ok(body.messages)
    }

    /// Mark a room's messages read via REST. Secondary path; the primary
    /// mark-read signal goes over the real-time transport.
    pub async fn mark_read(&self, room_id: &RoomId, token: &str) -> ChatResult<()> {
        self.http
            .post(format!("{}/api/chat/read/{}", self.base_url, room_id))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()
            .map_err(ChatError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobchat_shared::UserId;

    #[tokio::test]
    async fn test_fetch_rooms_student_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/students/chat-rooms")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body(
                r#"{"chat_rooms":[{
                    "id": "r1",
                    "job_id": "job-1",
                    "recruiter_id": "bob",
                    "job_title": "Engineer",
                    "company_name": "Acme",
                    "created_at": "2024-03-01T09:00:00Z",
                    "last_message": null,
                    "unread_count": 2,
                    "participants": ["alice", "bob"]
                }]}"#,
            )
            .create_async()
            .await;

        let api = ChatApi::new(server.url(), Duration::from_secs(5)).unwrap();
        let rooms = api.fetch_rooms(Role::Student, "tok").await.unwrap();

        mock.assert_async().await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, RoomId::from("r1"));
        assert_eq!(rooms[0].unread_count, 2);
        assert_eq!(rooms[0].recruiter_id, Some(UserId::from("bob")));
    }

    #[tokio::test]
    async fn test_fetch_history_parses_messages() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/chat/history/r1")
            .match_query(mockito::Matcher::UrlEncoded("limit".into(), "50".into()))
            .with_status(200)
            .with_body(
                r#"{"room_id":"r1","messages":[{
                    "id": "m1",
                    "room_id": "r1",
                    "sender_id": "bob",
                    "content": "hello",
                    "timestamp": "2024-03-01T10:00:00Z"
                }]}"#,
            )
            .create_async()
            .await;

        let api = ChatApi::new(server.url(), Duration::from_secs(5)).unwrap();
        let messages = api
            .fetch_history(&RoomId::from("r1"), 50, "tok")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");
    }

    #[tokio::test]
    async fn test_fetch_rooms_server_error_is_err() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/recruiters/chat-rooms")
            .with_status(500)
            .create_async()
            .await;

        let api = ChatApi::new(server.url(), Duration::from_secs(5)).unwrap();
        let result = api.fetch_rooms(Role::Recruiter, "tok").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_transient());
    }
}
