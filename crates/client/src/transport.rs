//! Real-time transport
//!
//! The session manager talks to the transport through two seams:
//! [`Transport`] for an established link (outbound [`ClientEvent`]s go
//! through `emit`, inbound traffic arrives on an [`Inbound`] channel), and
//! [`Connector`] for dialing one. The production pair is
//! [`WsConnector`]/[`WsTransport`]; [`MpscConnector`]/[`MpscTransport`] are
//! in-process stand-ins for tests and embedding.
//!
//! Because deployments mount the socket endpoint at different prefixes,
//! [`negotiate`] walks an ordered candidate list and stops at the first path
//! that accepts the handshake.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use jobchat_shared::{ChatError, ChatResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::session::events::{ClientEvent, ServerEvent};

/// Inbound traffic as seen by the session manager
#[derive(Debug)]
pub enum Inbound {
    /// A decoded server event
    Event(ServerEvent),
    /// The transport dropped; carries the close reason
    Dropped(String),
}

/// Outbound side of a live transport
pub trait Transport: Send + Sync {
    /// Emit an event to the server.
    ///
    /// Returns Err when the transport has closed; the caller treats that the
    /// same as being disconnected.
    fn emit(&self, event: ClientEvent) -> ChatResult<()>;
}

/// An established link: the outbound handle plus the inbound event stream
pub type TransportLink = (Arc<dyn Transport>, mpsc::UnboundedReceiver<Inbound>);

/// Future returned by a [`Connector`] attempt
pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = ChatResult<TransportLink>> + Send + 'a>>;

/// Dials one candidate endpoint. The session manager routes both the initial
/// negotiation and later reconnects through this seam, so sessions can be
/// exercised without a live socket server.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        base_url: &str,
        path: &str,
        token: &str,
        timeout: Duration,
    ) -> ConnectFuture<'_>;
}

// =============================================================================
// Path negotiation
// =============================================================================

/// Try candidate mount paths in order, returning the first successful handle
/// together with its index. Each failure is logged; exhaustion maps to
/// [`ChatError::AllPathsFailed`].
pub async fn negotiate<T, F, Fut>(candidates: &[String], mut attempt: F) -> ChatResult<(T, usize)>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ChatResult<T>>,
{
    for (index, path) in candidates.iter().enumerate() {
        match attempt(path.clone()).await {
            Ok(handle) => {
                tracing::info!(
                    path = %path,
                    failed_attempts = index,
                    "real-time endpoint negotiated"
                );
                return Ok((handle, index));
            }
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "candidate socket path failed");
            }
        }
    }
    Err(ChatError::AllPathsFailed {
        attempts: candidates.len(),
    })
}

// =============================================================================
// WebSocket transport
// =============================================================================

/// Production connector: dials the WebSocket endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(
        &self,
        base_url: &str,
        path: &str,
        token: &str,
        timeout: Duration,
    ) -> ConnectFuture<'_> {
        let base_url = base_url.to_string();
        let path = path.to_string();
        let token = token.to_string();
        Box::pin(async move {
            let (transport, inbound) =
                WsTransport::connect(&base_url, &path, &token, timeout).await?;
            let transport: Arc<dyn Transport> = transport;
            Ok((transport, inbound))
        })
    }
}

/// Production transport backed by a WebSocket connection.
///
/// Owns the reader and writer tasks; dropping the handle tears both down.
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WsTransport {
    /// Connect to `base_url` + `path`, authenticating with `token` both as a
    /// query parameter and as a bearer header. The handshake is bounded by
    /// `timeout`.
    pub async fn connect(
        base_url: &str,
        path: &str,
        token: &str,
        timeout: Duration,
    ) -> ChatResult<(Arc<Self>, mpsc::UnboundedReceiver<Inbound>)> {
        let mut url =
            Url::parse(base_url).map_err(|e| ChatError::Transport(format!("bad base url: {e}")))?;
        url.set_path(path);
        url.query_pairs_mut().append_pair("token", token);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {token}")
                .parse()
                .map_err(|_| ChatError::Transport("token is not header-safe".to_string()))?,
        );

        let (stream, _response) = tokio::time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| ChatError::Timeout("websocket handshake"))?
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Inbound>();

        let writer = tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to encode outbound event");
                        continue;
                    }
                };
                if let Err(err) = sink.send(WsMessage::Text(text)).await {
                    tracing::warn!(error = %err, "websocket send failed, stopping writer");
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            loop {
                match source.next().await {
                    Some(Ok(WsMessage::Text(text))) => match serde_json::from_str(&text) {
                        Ok(event) => {
                            if inbound_tx.send(Inbound::Event(event)).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "unrecognized server event, skipping");
                        }
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "server closed connection".to_string());
                        let _ = inbound_tx.send(Inbound::Dropped(reason));
                        break;
                    }
                    // Ping/pong are handled by tungstenite; binary frames are
                    // not part of the chat protocol
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        let _ = inbound_tx.send(Inbound::Dropped(err.to_string()));
                        break;
                    }
                    None => {
                        let _ = inbound_tx.send(Inbound::Dropped("stream ended".to_string()));
                        break;
                    }
                }
            }
        });

        let transport = Arc::new(Self {
            outbound: outbound_tx,
            reader,
            writer,
        });
        Ok((transport, inbound_rx))
    }
}

impl Transport for WsTransport {
    fn emit(&self, event: ClientEvent) -> ChatResult<()> {
        self.outbound
            .send(event)
            .map_err(|_| ChatError::Transport("transport closed".to_string()))
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

// =============================================================================
// In-process transport
// =============================================================================

/// Channel-backed transport for tests and in-process embedding.
///
/// Emitted events are delivered to the receiver returned by [`MpscTransport::new`];
/// the paired [`Inbound`] sender feeds events to the session as if a server
/// had pushed them.
pub struct MpscTransport {
    outbound: mpsc::UnboundedSender<ClientEvent>,
}

impl MpscTransport {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Arc<dyn Transport>, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { outbound: tx }), rx)
    }
}

impl Transport for MpscTransport {
    fn emit(&self, event: ClientEvent) -> ChatResult<()> {
        self.outbound
            .send(event)
            .map_err(|_| ChatError::Transport("transport closed".to_string()))
    }
}

/// One link handed out by [`MpscConnector`]
struct MpscLink {
    inbound: mpsc::UnboundedSender<Inbound>,
    emitted: Option<mpsc::UnboundedReceiver<ClientEvent>>,
}

/// In-process connector for tests and embedding: every accepted attempt
/// yields an [`MpscTransport`] link. Attempts can be scripted to be refused,
/// which exercises path negotiation and reconnection without a socket server.
#[derive(Default)]
pub struct MpscConnector {
    refusals: AtomicUsize,
    attempts: Mutex<Vec<String>>,
    links: Mutex<Vec<MpscLink>>,
}

// Mutex poisoning only occurs after a panic elsewhere; unwrapping here is the
// same policy the tests themselves follow.
#[allow(clippy::unwrap_used)]
impl MpscConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse the next `n` connection attempts
    pub fn refuse_next(&self, n: usize) {
        self.refusals.fetch_add(n, Ordering::SeqCst);
    }

    /// Paths attempted so far, in order
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    /// Inbound sender of the most recently accepted link (to push server
    /// events or a drop notice into the session)
    pub fn latest_inbound(&self) -> Option<mpsc::UnboundedSender<Inbound>> {
        self.links.lock().unwrap().last().map(|l| l.inbound.clone())
    }

    /// Take the emitted-events receiver of the most recently accepted link
    pub fn take_latest_emitted(&self) -> Option<mpsc::UnboundedReceiver<ClientEvent>> {
        self.links
            .lock()
            .unwrap()
            .last_mut()
            .and_then(|l| l.emitted.take())
    }
}

#[allow(clippy::unwrap_used)]
impl Connector for MpscConnector {
    fn connect(
        &self,
        _base_url: &str,
        path: &str,
        _token: &str,
        _timeout: Duration,
    ) -> ConnectFuture<'_> {
        let path = path.to_string();
        Box::pin(async move {
            self.attempts.lock().unwrap().push(path);
            let refused = self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(ChatError::Transport("connection refused".to_string()));
            }

            let (transport, emitted) = MpscTransport::new();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            self.links.lock().unwrap().push(MpscLink {
                inbound: inbound_tx,
                emitted: Some(emitted),
            });
            Ok((transport, inbound_rx))
        })
    }
}
