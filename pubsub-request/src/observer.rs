//! Request lifecycle notifications.
//!
//! Library code never reaches for a global logger. Each [`Session`] carries a
//! [`RequestObserver`] and every [`Request`] reports its lifecycle to it. The
//! provided [`LoggingObserver`] turns notifications into `tracing` events.
//!
//! [`Session`]: crate::Session
//! [`Request`]: crate::Request

use pubsub_error::PubSubError;

use crate::http::HttpRequest;
use crate::request::Request;

/// Receives lifecycle notifications for requests.
///
/// Every method has an empty default so implementors pick what they need.
/// Notifications are delivered outside of the request's internal lock, so
/// calling back into the request is allowed.
pub trait RequestObserver: Send + Sync {
    fn request_created(&self, _request: &Request) {}

    fn did_create_http_request(&self, _request: &Request, _http: &HttpRequest) {}

    fn did_fail_to_create_http_request(&self, _request: &Request, _error: &PubSubError) {}

    fn did_mutate(&self, _request: &Request, _initial: &HttpRequest, _mutated: &HttpRequest) {}

    fn did_fail_to_mutate(&self, _request: &Request, _error: &PubSubError) {}

    fn did_resume(&self, _request: &Request) {}

    fn did_resume_attempt(&self, _request: &Request, _attempt: usize) {}

    fn did_cancel(&self, _request: &Request) {}

    fn did_cancel_attempt(&self, _request: &Request, _attempt: usize) {}

    fn did_complete_attempt(
        &self,
        _request: &Request,
        _attempt: usize,
        _error: Option<&PubSubError>,
    ) {
    }

    fn is_retrying(&self, _request: &Request) {}

    fn did_finish(&self, _request: &Request, _error: Option<&PubSubError>) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RequestObserver for NoopObserver {}

/// Observer that logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl RequestObserver for LoggingObserver {
    fn request_created(&self, request: &Request) {
        tracing::debug!(
            request_id = %request.id(),
            endpoint = %request.endpoint(),
            "Request created"
        );
    }

    fn did_create_http_request(&self, request: &Request, http: &HttpRequest) {
        tracing::trace!(
            request_id = %request.id(),
            method = %http.method,
            url = %http.url,
            "HTTP request created"
        );
    }

    fn did_fail_to_create_http_request(&self, request: &Request, error: &PubSubError) {
        tracing::warn!(request_id = %request.id(), %error, "Failed to create HTTP request");
    }

    fn did_mutate(&self, request: &Request, _initial: &HttpRequest, mutated: &HttpRequest) {
        tracing::trace!(request_id = %request.id(), url = %mutated.url, "HTTP request mutated");
    }

    fn did_fail_to_mutate(&self, request: &Request, error: &PubSubError) {
        tracing::warn!(request_id = %request.id(), %error, "Failed to mutate HTTP request");
    }

    fn did_resume(&self, request: &Request) {
        tracing::debug!(request_id = %request.id(), "Request resumed");
    }

    fn did_resume_attempt(&self, request: &Request, attempt: usize) {
        tracing::trace!(request_id = %request.id(), attempt, "Attempt started");
    }

    fn did_cancel(&self, request: &Request) {
        tracing::debug!(request_id = %request.id(), "Request cancelled");
    }

    fn did_cancel_attempt(&self, request: &Request, attempt: usize) {
        tracing::trace!(request_id = %request.id(), attempt, "Attempt cancelled");
    }

    fn did_complete_attempt(&self, request: &Request, attempt: usize, error: Option<&PubSubError>) {
        match error {
            Some(error) => {
                tracing::debug!(request_id = %request.id(), attempt, %error, "Attempt failed")
            }
            None => tracing::trace!(request_id = %request.id(), attempt, "Attempt completed"),
        }
    }

    fn is_retrying(&self, request: &Request) {
        tracing::debug!(
            request_id = %request.id(),
            retry_count = request.retry_count(),
            "Retrying request"
        );
    }

    fn did_finish(&self, request: &Request, error: Option<&PubSubError>) {
        match error {
            Some(error) if !error.is_cancellation() => {
                tracing::error!(request_id = %request.id(), %error, "Request failed")
            }
            Some(error) => tracing::debug!(request_id = %request.id(), %error, "Request ended"),
            None => tracing::debug!(request_id = %request.id(), "Request finished"),
        }
    }
}
