//! Jobchat Client
//!
//! Client-side session manager for the job-application chat system. One
//! [`ChatSession`] per authenticated user owns the real-time connection,
//! room membership, message log, typing presence, and unread accounting;
//! the REST API is used for the room list, history backfill, and as a
//! mark-read fallback.
//!
//! # Example
//!
//! ```no_run
//! use jobchat_client::{ChatConfig, ChatSession};
//! use jobchat_shared::{Role, UserIdentity};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ChatConfig::from_env()?;
//! let session = ChatSession::new(config)?;
//!
//! session
//!     .connect(UserIdentity::new("alice", Role::Student, "jwt-token"))
//!     .await?;
//! session.join_room("65f1a2b3c4d5e6f7a8b9c0d1".into()).await;
//! session
//!     .send_message("65f1a2b3c4d5e6f7a8b9c0d1".into(), "hello!", None)
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod session;
pub mod transport;

pub use api::ChatApi;
pub use config::{ChatConfig, ConfigError};
pub use session::events::{ClientEvent, ServerEvent};
pub use session::{ChatSession, ConnectionState, SessionSnapshot};
pub use transport::{
    ConnectFuture, Connector, Inbound, MpscConnector, MpscTransport, Transport, TransportLink,
    WsConnector, WsTransport,
};
