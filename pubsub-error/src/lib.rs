//! # pubsub-error
//!
//! The failure taxonomy shared by every pubsub-sdk crate.
//!
//! Lower-level failures (transport, JSON, service payloads, raw status codes)
//! are classified once, at the point where they cross into the request or
//! subscription layer, into a [`Reason`]. Each reason belongs to exactly one
//! [`Domain`]. From there on failures travel as a single [`PubSubError`]
//! value whose identity is its reason.

mod classify;
mod endpoint;
mod error;
mod reason;
mod service;

pub use classify::*;
pub use endpoint::*;
pub use error::*;
pub use reason::*;
pub use service::*;

/// Result type used throughout the pubsub-sdk crates.
pub type Result<T> = std::result::Result<T, PubSubError>;
