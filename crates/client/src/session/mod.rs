//! Chat session management
//!
//! One [`ChatSession`] owns the real-time connection lifecycle, room
//! membership, message log, typing presence, and unread accounting for a
//! single authenticated user:
//!
//! - **Events**: type-safe wire events for the real-time transport
//! - **State**: the pure state machine every event is applied to
//! - **Manager**: the async orchestration around transport and REST API

pub mod events;
pub mod manager;
pub mod state;

pub use manager::ChatSession;
pub use state::{ConnectionState, SessionSnapshot};
