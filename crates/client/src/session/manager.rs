//! The session manager
//!
//! Orchestrates the transport, the REST collaborator, and the pure session
//! state. All network failure is communicated through observable state, not
//! through errors: callers of `send_message`/`join_room` get silent no-ops
//! when preconditions aren't met, and fetch failures keep the previous state
//! (fail-soft).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use jobchat_shared::{ChatError, ChatResult, RoomId, UserId, UserIdentity};
use tokio::sync::{mpsc, RwLock};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;

use crate::api::ChatApi;
use crate::config::ChatConfig;
use crate::session::events::{ClientEvent, ServerEvent};
use crate::session::state::{ConnectionState, SessionSnapshot, SessionState};
use crate::transport::{negotiate, Connector, Inbound, Transport, WsConnector};

/// Client-side chat session for one authenticated user.
///
/// Constructed once at application start and shared as an `Arc` with every
/// caller that needs chat; there is no ambient singleton.
pub struct ChatSession {
    config: ChatConfig,
    api: ChatApi,
    /// Dials new links; both `connect` and reconnection go through this seam
    connector: Arc<dyn Connector>,
    state: RwLock<SessionState>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    identity: RwLock<Option<UserIdentity>>,
    /// Mount path that accepted the handshake; reconnection is only enabled
    /// once this is known
    working_path: RwLock<Option<String>>,
    /// Bumped on every attach/teardown so a pump task from a torn-down
    /// transport can never mutate its successor's state
    generation: AtomicU64,
    /// Handle to ourselves for the background tasks we spawn
    self_ref: Weak<ChatSession>,
}

impl ChatSession {
    /// Session dialing real WebSocket endpoints
    pub fn new(config: ChatConfig) -> ChatResult<Arc<Self>> {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Session with a caller-supplied [`Connector`]; used by tests and by
    /// embedders bringing their own link layer
    pub fn with_connector(
        config: ChatConfig,
        connector: Arc<dyn Connector>,
    ) -> ChatResult<Arc<Self>> {
        let api = ChatApi::new(config.api_base_url.clone(), config.request_timeout)?;
        Ok(Arc::new_cyclic(|self_ref| Self {
            config,
            api,
            connector,
            state: RwLock::new(SessionState::new()),
            transport: RwLock::new(None),
            identity: RwLock::new(None),
            working_path: RwLock::new(None),
            generation: AtomicU64::new(0),
            self_ref: self_ref.clone(),
        }))
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Establish the real-time connection.
    ///
    /// Idempotent: calling again with the same credentials while connected or
    /// connecting is a no-op; different credentials tear the old connection
    /// down first. Candidate mount paths are tried in order; exhaustion
    /// leaves the session disconnected and returns `AllPathsFailed`.
    pub async fn connect(&self, identity: UserIdentity) -> ChatResult<()> {
        if identity.user_id.0.is_empty() || identity.token.is_empty() {
            return Err(ChatError::Auth("user and token are required"));
        }

        {
            let state = self.state.read().await;
            let current = self.identity.read().await;
            if state.connection != ConnectionState::Disconnected
                && current.as_ref() == Some(&identity)
            {
                tracing::debug!(user_id = %identity.user_id, "already connected, ignoring");
                return Ok(());
            }
        }

        // Different credentials (or a dead previous attempt): start clean
        self.teardown().await;

        {
            let mut state = self.state.write().await;
            state.set_connecting();
            state.set_self_user(identity.user_id.clone());
        }
        *self.identity.write().await = Some(identity.clone());

        let connector = Arc::clone(&self.connector);
        let base = self.config.socket_base_url.clone();
        let token = identity.token.clone();
        let timeout = self.config.connect_timeout;
        let result = negotiate(&self.config.socket_paths, |path| {
            let connector = Arc::clone(&connector);
            let base = base.clone();
            let token = token.clone();
            async move { connector.connect(&base, &path, &token, timeout).await }
        })
        .await;

        let ((transport, inbound), path_index) = match result {
            Ok(ok) => ok,
            Err(err) => {
                self.state.write().await.set_disconnected();
                tracing::warn!(user_id = %identity.user_id, error = %err, "connection failed");
                return Err(err);
            }
        };

        *self.working_path.write().await = Some(self.config.socket_paths[path_index].clone());
        self.attach(identity, transport, inbound).await;

        // Connecting triggers a room-list refresh; failures are fail-soft
        if let Some(session) = self.self_ref.upgrade() {
            tokio::spawn(async move { session.refresh_rooms().await });
        }

        Ok(())
    }

    /// Wire an established transport into the session and start the inbound
    /// pump. Used by `connect` and by embedders supplying their own
    /// [`Transport`] implementation.
    pub async fn attach(
        &self,
        identity: UserIdentity,
        transport: Arc<dyn Transport>,
        inbound: mpsc::UnboundedReceiver<Inbound>,
    ) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.transport.write().await = Some(transport);
        {
            let mut state = self.state.write().await;
            state.set_self_user(identity.user_id.clone());
            state.set_connected();
        }
        *self.identity.write().await = Some(identity.clone());

        tracing::info!(user_id = %identity.user_id, "chat session connected");

        if let Some(session) = self.self_ref.upgrade() {
            tokio::spawn(async move { session.pump(generation, inbound).await });
        }
    }

    /// Tear down the current transport, if any. No reconnection follows an
    /// explicit teardown.
    pub async fn disconnect(&self) {
        self.teardown().await;
        tracing::info!("chat session disconnected");
    }

    async fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.transport.write().await = None;
        self.state.write().await.set_disconnected();
    }

    /// Inbound pump for one transport generation.
    ///
    /// The generation is re-checked while the state lock is held, so an event
    /// raced against a concurrent teardown/attach can never mutate the
    /// successor's state.
    async fn pump(self: Arc<Self>, generation: u64, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
        while let Some(item) = inbound.recv().await {
            match item {
                Inbound::Event(event) => {
                    let mut state = self.state.write().await;
                    if self.generation.load(Ordering::SeqCst) != generation {
                        break;
                    }
                    self.apply_event(&mut state, event);
                }
                Inbound::Dropped(reason) => {
                    tracing::warn!(reason = %reason, "transport dropped");
                    self.on_drop(generation).await;
                    break;
                }
            }
        }
    }

    /// React to an unexpected transport drop: mark the session disconnected
    /// and kick off background reconnection when a known-good path exists.
    /// A drop notice from a superseded transport is ignored.
    async fn on_drop(&self, generation: u64) {
        {
            let mut state = self.state.write().await;
            let mut transport = self.transport.write().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            *transport = None;
            state.set_disconnected();
        }

        if self.config.reconnect_max_attempts == 0 {
            return;
        }
        let path = self.working_path.read().await.clone();
        let identity = self.identity.read().await.clone();
        let (Some(path), Some(identity)) = (path, identity) else {
            return;
        };

        if let Some(session) = self.self_ref.upgrade() {
            tokio::spawn(async move { session.reconnect(generation, path, identity).await });
        }
    }

    /// Bounded background reconnection to the known-good path. The total
    /// number of dials is `reconnect_max_attempts`: one immediate try plus
    /// backed-off retries.
    ///
    /// Returns a boxed future to break the `attach` -> `pump` -> `on_drop`
    /// -> `reconnect` opaque-type cycle so the spawned task is provably
    /// `Send`.
    fn reconnect(
        self: Arc<Self>,
        generation: u64,
        path: String,
        identity: UserIdentity,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            let strategy = ExponentialBackoff::from_millis(500)
                .max_delay(std::time::Duration::from_secs(10))
                .take(self.config.reconnect_max_attempts.saturating_sub(1));

            let connector = Arc::clone(&self.connector);
            let base = self.config.socket_base_url.clone();
            let token = identity.token.clone();
            let timeout = self.config.connect_timeout;
            let result = Retry::spawn(strategy, || {
                let connector = Arc::clone(&connector);
                let base = base.clone();
                let path = path.clone();
                let token = token.clone();
                async move { connector.connect(&base, &path, &token, timeout).await }
            })
            .await;

            // A newer connect() or an explicit disconnect() superseded this attempt
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }

            match result {
                Ok((transport, inbound)) => {
                    tracing::info!(path = %path, "reconnected to chat server");
                    self.attach(identity, transport, inbound).await;
                    self.refresh_rooms().await;
                }
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "reconnection gave up");
                }
            }
        })
    }

    // =========================================================================
    // Caller operations
    // =========================================================================

    /// Fetch the room list, replacing the local collection wholesale.
    /// Failure keeps the previous list.
    pub async fn refresh_rooms(&self) {
        let Some(identity) = self.identity.read().await.clone() else {
            return;
        };
        match self.api.fetch_rooms(identity.role, &identity.token).await {
            Ok(rooms) => {
                tracing::debug!(count = rooms.len(), "room list refreshed");
                self.state.write().await.replace_rooms(rooms);
            }
            Err(err) => {
                tracing::warn!(error = %err, "room list fetch failed, keeping previous list");
            }
        }
    }

    /// Join a room: signal the transport, clear the local log, and backfill
    /// history in the background. No-op when the room is already joined or
    /// the session is disconnected. A failed backfill leaves the log empty.
    pub async fn join_room(&self, room_id: RoomId) {
        {
            let mut state = self.state.write().await;
            if !state.is_connected() {
                tracing::debug!(room_id = %room_id, "join ignored: not connected");
                return;
            }
            if !state.begin_join(room_id.clone()) {
                return;
            }
        }

        self.emit(ClientEvent::JoinRoom {
            room_id: room_id.clone(),
        })
        .await;

        let Some(identity) = self.identity.read().await.clone() else {
            return;
        };
        let Some(session) = self.self_ref.upgrade() else {
            return;
        };
        let limit = self.config.history_limit;
        tokio::spawn(async move {
            match session
                .api
                .fetch_history(&room_id, limit, &identity.token)
                .await
            {
                Ok(messages) => {
                    let mut state = session.state.write().await;
                    if !state.apply_history(&room_id, messages) {
                        tracing::debug!(room_id = %room_id, "stale history backfill discarded");
                    }
                }
                Err(err) => {
                    tracing::warn!(room_id = %room_id, error = %err, "history backfill failed");
                }
            }
        });
    }

    /// Leave a room; clears the joined room only if it matches
    pub async fn leave_room(&self, room_id: RoomId) {
        self.emit(ClientEvent::LeaveRoom {
            room_id: room_id.clone(),
        })
        .await;
        self.state.write().await.end_leave(&room_id);
    }

    /// Send a message to the joined room.
    ///
    /// Silent no-op when disconnected, when the content trims to empty, or
    /// when `room_id` is not the joined room. The message is not appended
    /// locally: the server echo on `new_message` is the single source of
    /// truth, so no ghost copies can appear.
    pub async fn send_message(&self, room_id: RoomId, content: &str, receiver_id: Option<UserId>) {
        let content = content.trim();
        if content.is_empty() {
            tracing::debug!(room_id = %room_id, "send ignored: empty content");
            return;
        }
        {
            let state = self.state.read().await;
            if !state.is_connected() {
                tracing::debug!(room_id = %room_id, "send ignored: not connected");
                return;
            }
            if state.current_room.as_ref() != Some(&room_id) {
                tracing::debug!(room_id = %room_id, "send ignored: room not joined");
                return;
            }
        }
        self.emit(ClientEvent::SendMessage {
            room_id,
            content: content.to_string(),
            receiver_id,
        })
        .await;
    }

    /// Fire-and-forget typing signal; dropped silently when disconnected
    pub async fn start_typing(&self, room_id: RoomId) {
        self.emit(ClientEvent::StartTyping { room_id }).await;
    }

    /// Fire-and-forget stop-typing signal; dropped silently when disconnected
    pub async fn stop_typing(&self, room_id: RoomId) {
        self.emit(ClientEvent::StopTyping { room_id }).await;
    }

    /// Acknowledge a room as read. Always zeroes the session unread counter
    /// and the target room's count; other rooms keep theirs. Falls back to
    /// the REST path when the transport is down.
    pub async fn mark_as_read(&self, room_id: RoomId) {
        let signaled = self
            .try_emit(ClientEvent::MarkAsRead {
                room_id: room_id.clone(),
            })
            .await;

        if !signaled {
            if let Some(identity) = self.identity.read().await.clone() {
                if let Err(err) = self.api.mark_read(&room_id, &identity.token).await {
                    tracing::warn!(room_id = %room_id, error = %err, "mark-read fallback failed");
                }
            }
        }

        self.state.write().await.mark_read(&room_id);
    }

    // =========================================================================
    // Inbound dispatch
    // =========================================================================

    /// Apply one inbound server event to the session state.
    ///
    /// Normally driven by the internal pump; exposed so embedders and tests
    /// can feed events without a live transport.
    pub async fn handle_event(&self, event: ServerEvent) {
        let mut state = self.state.write().await;
        self.apply_event(&mut state, event);
    }

    fn apply_event(&self, state: &mut SessionState, event: ServerEvent) {
        match event {
            ServerEvent::NewMessage { message } => {
                let outcome = state.apply_message(message);
                tracing::debug!(?outcome, "message received");
            }
            ServerEvent::ChatHistory { room_id, messages } => {
                if !state.apply_history(&room_id, messages) {
                    tracing::debug!(room_id = %room_id, "stale history snapshot discarded");
                }
            }
            ServerEvent::UserTyping { room_id, user_id } => {
                if let Some(seq) = state.typing_started(&room_id, user_id.clone()) {
                    self.arm_typing_expiry(user_id, seq);
                }
            }
            ServerEvent::UserStoppedTyping { user_id, .. } => {
                state.typing_stopped(&user_id);
            }
            ServerEvent::RoomJoined { room_id } => {
                tracing::debug!(room_id = %room_id, "room join acknowledged");
            }
            ServerEvent::RoomLeft { room_id } => {
                state.end_leave(&room_id);
            }
            ServerEvent::Error { msg } => {
                tracing::warn!(message = %msg, "server reported chat error");
            }
        }
    }

    /// Typing entries self-heal: absent an explicit stop, the entry is
    /// removed after the configured quiet window. The generation check in
    /// `expire_typing` keeps a stale timer from removing a re-asserted entry.
    fn arm_typing_expiry(&self, user_id: UserId, seq: u64) {
        let Some(session) = self.self_ref.upgrade() else {
            return;
        };
        let expiry = self.config.typing_expiry;
        tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            if session.state.write().await.expire_typing(&user_id, seq) {
                tracing::debug!(user_id = %user_id, "typing indicator expired");
            }
        });
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Point-in-time copy of the full session state
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.read().await.snapshot()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.connection
    }

    pub async fn unread_count(&self) -> u64 {
        self.state.read().await.unread
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn emit(&self, event: ClientEvent) {
        self.try_emit(event).await;
    }

    /// Emit over the transport; returns false when there is no live
    /// transport or the send failed (both are treated as "disconnected")
    async fn try_emit(&self, event: ClientEvent) -> bool {
        let transport = self.transport.read().await;
        match transport.as_ref() {
            Some(transport) => match transport.emit(event) {
                Ok(()) => true,
                Err(err) => {
                    tracing::debug!(error = %err, "emit failed, transport closed");
                    false
                }
            },
            None => {
                tracing::debug!("emit dropped: not connected");
                false
            }
        }
    }
}
