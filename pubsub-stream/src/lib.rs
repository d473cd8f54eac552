//! # pubsub-stream
//!
//! Long-poll subscription engine for the pubsub service.
//!
//! A [`SubscriptionSession`] tracks the channels and channel groups the
//! client is subscribed to, keeps a single long-poll request open against
//! the subscribe endpoint, and turns each response into
//! [`SubscriptionEvent`]s for registered listeners. Messages and signals go
//! through a bounded [`MessageCache`] so that a message redelivered after a
//! reconnect is only reported once.
//!
//! Listeners are held weakly; use [`ChannelListener`] to consume events as
//! a [`futures::Stream`].

mod cache;
mod channel;
mod config;
mod endpoints;
mod error;
mod events;
mod heartbeat;
mod listener;
mod payload;
mod session;
mod status;

pub use cache::*;
pub use channel::*;
pub use config::*;
pub use endpoints::*;
pub use error::*;
pub use events::*;
pub use heartbeat::*;
pub use listener::*;
pub use payload::*;
pub use session::*;
pub use status::*;
