//! Configuration types for the pubsub-stream crate
//!
//! [`SubscriptionConfiguration`] controls what the long-poll loop sends with
//! every subscribe request, how presence heartbeats are scheduled and how
//! failed requests are retried.

use std::time::Duration;

use pubsub_request::{AutomaticRetry, RouterConfiguration};

use crate::error::{ConfigurationError, Result};

/// Smallest presence timeout the service accepts, in seconds.
pub const MINIMUM_PRESENCE_TIMEOUT: u32 = 20;

/// Configuration for a [`SubscriptionSession`](crate::SubscriptionSession)
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionConfiguration {
    /// Keys, identity and origin shared with every endpoint
    pub router: RouterConfiguration,

    /// Seconds the service keeps this client present without a heartbeat.
    /// Sent as the `heartbeat` query value of subscribe requests.
    /// Default: Some(300)
    pub presence_timeout: Option<u32>,

    /// Seconds between presence heartbeat requests; 0 disables them
    /// Default: 0
    pub heartbeat_interval: u32,

    /// Server-side filter applied to delivered messages
    /// Default: None
    pub filter_expression: Option<String>,

    /// Skip the presence leave request after unsubscribing
    /// Default: false
    pub suppress_leave_events: bool,

    /// How long a long-poll may stay open before the transport gives up
    /// Default: 310 seconds
    pub minimum_subscribe_timeout: Duration,

    /// Timeout for every request that is not a long-poll
    /// Default: 10 seconds
    pub non_subscribe_request_timeout: Duration,

    /// Retry policy applied to subscribe requests
    /// Default: None
    pub automatic_retry: Option<AutomaticRetry>,
}

impl Default for SubscriptionConfiguration {
    fn default() -> Self {
        Self {
            router: RouterConfiguration::default(),
            presence_timeout: Some(300),
            heartbeat_interval: 0,
            filter_expression: None,
            suppress_leave_events: false,
            minimum_subscribe_timeout: Duration::from_secs(310),
            non_subscribe_request_timeout: Duration::from_secs(10),
            automatic_retry: None,
        }
    }
}

impl SubscriptionConfiguration {
    /// Configuration for subscribing with `subscribe_key` as `user_id`
    pub fn new(subscribe_key: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            router: RouterConfiguration::new(subscribe_key, user_id),
            ..Default::default()
        }
    }

    /// Configuration with both keys, able to publish as well as subscribe
    pub fn with_keys(
        publish_key: impl Into<String>,
        subscribe_key: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        let mut config = Self::new(subscribe_key, user_id);
        config.router.publish_key = Some(publish_key.into());
        config
    }

    pub fn user_id(&self) -> &str {
        &self.router.user_id
    }

    /// Validate the configuration and return the first issue found
    pub fn validate(&self) -> Result<()> {
        if !self.router.subscribe_key_exists() {
            return Err(ConfigurationError::MissingSubscribeKey);
        }

        if self.router.user_id.trim().is_empty() {
            return Err(ConfigurationError::MissingUserId);
        }

        if self.router.origin.trim().is_empty() {
            return Err(ConfigurationError::MissingOrigin);
        }

        if self.minimum_subscribe_timeout.is_zero() {
            return Err(ConfigurationError::ZeroSubscribeTimeout);
        }

        if let Some(timeout) = self.presence_timeout {
            if timeout < MINIMUM_PRESENCE_TIMEOUT {
                return Err(ConfigurationError::PresenceTimeoutTooShort {
                    minimum: MINIMUM_PRESENCE_TIMEOUT,
                    actual: timeout,
                });
            }
        }

        Ok(())
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_origin(mut self, origin: impl Into<String>, secure: bool) -> Self {
        self.router.origin = origin.into();
        self.router.use_secure_connections = secure;
        self
    }

    pub fn with_auth_key(mut self, auth_key: impl Into<String>) -> Self {
        self.router.auth_key = Some(auth_key.into());
        self
    }

    /// Set the presence timeout and a heartbeat interval that keeps the
    /// client present (roughly half the timeout, minus a second).
    pub fn with_presence_timeout(mut self, seconds: u32) -> Self {
        self.presence_timeout = Some(seconds);
        self.heartbeat_interval = (seconds / 2).saturating_sub(1);
        self
    }

    pub fn with_heartbeat_interval(mut self, seconds: u32) -> Self {
        self.heartbeat_interval = seconds;
        self
    }

    pub fn with_filter_expression(mut self, filter: impl Into<String>) -> Self {
        self.filter_expression = Some(filter.into());
        self
    }

    pub fn with_suppressed_leave_events(mut self, suppress: bool) -> Self {
        self.suppress_leave_events = suppress;
        self
    }

    pub fn with_automatic_retry(mut self, retry: AutomaticRetry) -> Self {
        self.automatic_retry = Some(retry);
        self
    }

    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.minimum_subscribe_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SubscriptionConfiguration::new("sub-key", "user-1");
        assert_eq!(config.presence_timeout, Some(300));
        assert_eq!(config.heartbeat_interval, 0);
        assert!(!config.suppress_leave_events);
        assert_eq!(config.minimum_subscribe_timeout, Duration::from_secs(310));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let missing_key = SubscriptionConfiguration::default();
        assert_eq!(
            missing_key.validate(),
            Err(ConfigurationError::MissingSubscribeKey)
        );

        let missing_user = SubscriptionConfiguration::new("sub-key", "  ");
        assert_eq!(missing_user.validate(), Err(ConfigurationError::MissingUserId));

        let no_origin = SubscriptionConfiguration::new("sub-key", "user").with_origin("", true);
        assert_eq!(no_origin.validate(), Err(ConfigurationError::MissingOrigin));

        let zero_timeout = SubscriptionConfiguration::new("sub-key", "user")
            .with_subscribe_timeout(Duration::ZERO);
        assert_eq!(
            zero_timeout.validate(),
            Err(ConfigurationError::ZeroSubscribeTimeout)
        );

        let short_presence =
            SubscriptionConfiguration::new("sub-key", "user").with_presence_timeout(5);
        assert!(matches!(
            short_presence.validate(),
            Err(ConfigurationError::PresenceTimeoutTooShort { actual: 5, .. })
        ));
    }

    #[test]
    fn test_presence_timeout_derives_heartbeat_interval() {
        let config = SubscriptionConfiguration::new("sub-key", "user").with_presence_timeout(60);
        assert_eq!(config.presence_timeout, Some(60));
        assert_eq!(config.heartbeat_interval, 29);
    }

    #[test]
    fn test_with_keys_sets_publish_key() {
        let config = SubscriptionConfiguration::with_keys("pub", "sub", "user");
        assert!(config.router.publish_key_exists());
        assert!(config.router.subscribe_key_exists());
        assert_eq!(config.user_id(), "user");
    }
}
