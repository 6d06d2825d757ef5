//! Shared type definitions for the Lightkeeper tick protocol.
//!
//! The scheduler context and the controller never share memory; everything
//! they exchange is defined here. Wire types flow downstream to `TypeScript`
//! via `ts-rs` so a browser host can speak the same envelope shape.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for context and session identifiers
//! - [`protocol`] -- Topics, the raw wire [`Envelope`], and the typed [`Message`]

pub mod ids;
pub mod protocol;

// Re-export all public types at crate root for convenience.
pub use ids::{ContextId, SessionId};
pub use protocol::{Direction, Envelope, Message, Topic};
