//! # pubsub-sdk
//!
//! Client SDK for a publish/subscribe service reached over HTTP long-polling.
//!
//! [`PubSub`] is the entry point. It keeps a subscription open for the
//! channels and channel groups you ask for and reports messages, signals,
//! presence, object and message-action events, connection status changes and
//! errors to registered listeners.
//!
//! The building blocks live in their own crates and are re-exported here:
//! [`error_taxonomy`] for the error taxonomy, [`request`] for the request lifecycle
//! and [`stream`] for the subscription engine.

mod client;
mod error;
pub mod logging;
mod registry;

pub use client::PubSub;
pub use error::{Result, SdkError};
pub use registry::SessionRegistry;

pub use pubsub_error as error_taxonomy;
pub use pubsub_request as request;
pub use pubsub_stream as stream;

pub mod prelude {
    pub use crate::logging::{init_logging, init_logging_from_env, LoggingMode};
    pub use crate::{PubSub, SdkError, SessionRegistry};
    pub use pubsub_error::{EndpointCategory, PubSubError, Reason};
    pub use pubsub_request::{AutomaticRetry, JsonDecoder, Router, RouterConfiguration};
    pub use pubsub_stream::{
        ChannelListener, ConnectionStatus, EventStream, ListenerToken, MessageEvent,
        PresenceEvent, SubscribeRequest, SubscriptionChangeEvent, SubscriptionConfiguration,
        SubscriptionEvent, SubscriptionListener,
    };
}
