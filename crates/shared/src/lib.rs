//! Jobchat Shared Types
//!
//! This crate contains the domain types and errors shared between the chat
//! client and the applications embedding it.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
