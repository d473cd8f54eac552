//! Retry decisions.
//!
//! A [`Request`] that fails consults its [`RetryCoordinator`]. The
//! coordinator either asks for another attempt after a delay or gives up;
//! giving up finishes the request with `RequestRetryFailed`.

use std::collections::HashSet;
use std::time::Duration;

use pubsub_error::{AffectedValue, EndpointCategory, PubSubError, Reason};

use crate::request::Request;

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Start a new attempt after the delay
    RetryAfter(Duration),
    /// Stop retrying; the error becomes the cause of `RequestRetryFailed`
    GiveUp(PubSubError),
}

/// Decides whether a failed request should be attempted again.
#[cfg_attr(test, mockall::automock)]
pub trait RetryCoordinator: Send + Sync {
    /// `error` is the failure that just happened; `previous` is the failure
    /// of the attempt before it, if any.
    fn retry_decision(
        &self,
        request: &Request,
        error: &PubSubError,
        previous: Option<PubSubError>,
    ) -> RetryDecision;
}

impl<F> RetryCoordinator for F
where
    F: Fn(&Request, &PubSubError, Option<PubSubError>) -> RetryDecision + Send + Sync,
{
    fn retry_decision(
        &self,
        request: &Request,
        error: &PubSubError,
        previous: Option<PubSubError>,
    ) -> RetryDecision {
        self(request, error, previous)
    }
}

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectionPolicy {
    /// Same delay before every retry
    Linear { delay: Duration },
    /// Delay doubles per retry, starting at `minimum` and capped at `maximum`
    Exponential { minimum: Duration, maximum: Duration },
}

impl ReconnectionPolicy {
    /// Delay before retry number `retry_count + 1`.
    pub fn delay(&self, retry_count: u32) -> Duration {
        match *self {
            ReconnectionPolicy::Linear { delay } => delay,
            ReconnectionPolicy::Exponential { minimum, maximum } => {
                let factor = 2u32.saturating_pow(retry_count.min(31));
                minimum.saturating_mul(factor).min(maximum)
            }
        }
    }
}

/// A retry policy driven by reason and status code.
///
/// A failure is retried while the request's retry count is under the limit,
/// its endpoint is not excluded, and either its reason or its response status
/// is listed as retryable.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomaticRetry {
    /// Delay growth
    /// Default: exponential from 2 seconds up to 150 seconds
    pub policy: ReconnectionPolicy,

    /// Maximum number of retries per request
    /// Default: 6
    pub retry_limit: u32,

    /// Reasons worth another attempt
    pub retryable_reasons: HashSet<Reason>,

    /// Response status codes worth another attempt
    pub retryable_status_codes: HashSet<u16>,

    /// Endpoints that are never retried
    pub excluded: HashSet<EndpointCategory>,
}

impl Default for AutomaticRetry {
    fn default() -> Self {
        Self {
            policy: ReconnectionPolicy::Exponential {
                minimum: Duration::from_secs(2),
                maximum: Duration::from_secs(150),
            },
            retry_limit: 6,
            retryable_reasons: [
                Reason::TimedOut,
                Reason::NameResolutionFailure,
                Reason::ConnectionFailure,
                Reason::ConnectionOverDataFailure,
                Reason::ConnectionLost,
                Reason::BadServerResponse,
                Reason::TooManyRequests,
                Reason::InternalServiceError,
                Reason::ServiceUnavailable,
            ]
            .into_iter()
            .collect(),
            retryable_status_codes: [429, 500, 502, 503, 504].into_iter().collect(),
            excluded: HashSet::new(),
        }
    }
}

impl AutomaticRetry {
    /// Linear policy with the default retryable sets.
    pub fn linear(delay: Duration, retry_limit: u32) -> Self {
        Self {
            policy: ReconnectionPolicy::Linear { delay },
            retry_limit,
            ..Default::default()
        }
    }

    /// Exponential policy with the default retryable sets.
    pub fn exponential(minimum: Duration, maximum: Duration, retry_limit: u32) -> Self {
        Self {
            policy: ReconnectionPolicy::Exponential { minimum, maximum },
            retry_limit,
            ..Default::default()
        }
    }

    /// Never retry requests for `category`.
    pub fn excluding(mut self, category: EndpointCategory) -> Self {
        self.excluded.insert(category);
        self
    }

    /// Whether `error` is eligible for another attempt, ignoring the limit.
    pub fn is_retryable(&self, error: &PubSubError) -> bool {
        if error.is_cancellation() || self.excluded.contains(&error.endpoint()) {
            return false;
        }
        if self.retryable_reasons.contains(&error.reason()) {
            return true;
        }
        error.affected().iter().any(|value| match value {
            AffectedValue::Response { status } => self.retryable_status_codes.contains(status),
            _ => false,
        })
    }
}

impl RetryCoordinator for AutomaticRetry {
    fn retry_decision(
        &self,
        request: &Request,
        error: &PubSubError,
        _previous: Option<PubSubError>,
    ) -> RetryDecision {
        let retry_count = request.retry_count();

        if self.excluded.contains(&request.endpoint())
            || retry_count >= self.retry_limit
            || !self.is_retryable(error)
        {
            return RetryDecision::GiveUp(error.clone());
        }

        RetryDecision::RetryAfter(self.policy.delay(retry_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_linear_delay_is_constant() {
        let policy = ReconnectionPolicy::Linear {
            delay: Duration::from_secs(3),
        };
        assert_eq!(policy.delay(0), Duration::from_secs(3));
        assert_eq!(policy.delay(5), Duration::from_secs(3));
    }

    #[test]
    fn test_exponential_delay_doubles_and_caps() {
        let policy = ReconnectionPolicy::Exponential {
            minimum: Duration::from_secs(2),
            maximum: Duration::from_secs(20),
        };
        assert_eq!(policy.delay(0), Duration::from_secs(2));
        assert_eq!(policy.delay(1), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(16));
        assert_eq!(policy.delay(4), Duration::from_secs(20));
    }

    #[rstest]
    #[case(Reason::TimedOut, true)]
    #[case(Reason::ConnectionLost, true)]
    #[case(Reason::TooManyRequests, true)]
    #[case(Reason::InvalidSubscribeKey, false)]
    #[case(Reason::ClientCancelled, false)]
    #[case(Reason::LongPollingRestart, false)]
    fn test_retryable_reasons(#[case] reason: Reason, #[case] expected: bool) {
        let policy = AutomaticRetry::default();
        let error = PubSubError::new(reason, EndpointCategory::Subscribe);
        assert_eq!(policy.is_retryable(&error), expected);
    }

    #[test]
    fn test_retryable_status_code() {
        let policy = AutomaticRetry::default();
        let error = PubSubError::from_status(EndpointCategory::Subscribe, 502, None);
        assert_eq!(error.reason(), Reason::UnrecognizedStatusCode);
        assert!(policy.is_retryable(&error));
    }

    #[test]
    fn test_excluded_endpoint_is_not_retryable() {
        let policy = AutomaticRetry::default().excluding(EndpointCategory::Publish);
        let error = PubSubError::new(Reason::TimedOut, EndpointCategory::Publish);
        assert!(!policy.is_retryable(&error));
    }

    proptest! {
        #[test]
        fn prop_exponential_delay_is_bounded(
            retry_count in 0u32..64,
            minimum_ms in 1u64..5_000,
            extra_ms in 0u64..100_000,
        ) {
            let minimum = Duration::from_millis(minimum_ms);
            let maximum = Duration::from_millis(minimum_ms + extra_ms);
            let delay = ReconnectionPolicy::Exponential { minimum, maximum }.delay(retry_count);
            prop_assert!(delay >= minimum);
            prop_assert!(delay <= maximum);
        }
    }
}
