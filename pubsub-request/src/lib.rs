//! # pubsub-request
//!
//! Lifecycle of individual requests against the pubsub service.
//!
//! A [`Session`] creates [`Request`]s from [`Router`] descriptions. Each
//! request moves through the [`TaskState`] machine, makes one or more
//! physical attempts through a [`Transport`], asks a [`RetryCoordinator`]
//! whether to try again after a failure, and hands exactly one result to its
//! completion callback.

mod decoder;
mod http;
mod observer;
mod operator;
mod request;
mod retry;
mod router;
mod session;
mod state;
mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use decoder::*;
pub use http::*;
pub use observer::*;
pub use operator::*;
pub use request::{default_validation, Attempt, AttemptState, RawResult, Request, ValidationContext};
pub use retry::*;
pub use router::*;
pub use session::*;
pub use state::*;
pub use transport::*;
