//! Error types for the pubsub-stream crate.

/// Problems with a subscription configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// No subscribe key was configured
    #[error("A subscribe key is required")]
    MissingSubscribeKey,

    /// The user id is empty
    #[error("A non-empty user id is required")]
    MissingUserId,

    /// The origin host is empty
    #[error("A non-empty origin is required")]
    MissingOrigin,

    /// The long-poll timeout is zero
    #[error("Minimum subscribe timeout must be greater than 0")]
    ZeroSubscribeTimeout,

    /// The presence timeout is below what the service accepts
    #[error("Presence timeout must be at least {minimum} seconds, got {actual}")]
    PresenceTimeoutTooShort { minimum: u32, actual: u32 },
}

/// Result type for configuration checks.
pub type Result<T> = std::result::Result<T, ConfigurationError>;
