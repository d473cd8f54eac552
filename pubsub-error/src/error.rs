//! The uniform error value carried through requests and subscription events.

use std::error::Error as StdError;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use crate::classify::{Classify, TransportError};
use crate::endpoint::EndpointCategory;
use crate::reason::{Domain, Reason};
use crate::service::GenericServicePayload;

/// Shared handle to the lower-level failure behind a [`PubSubError`].
pub type Underlying = Arc<dyn StdError + Send + Sync + 'static>;

/// A value that was involved in producing an error.
#[derive(Debug, Clone, PartialEq)]
pub enum AffectedValue {
    /// The HTTP request that was sent
    Request { method: String, url: String },
    /// The HTTP response status that was received
    Response { status: u16 },
    Text(String),
    Data(Bytes),
    Uuid(Uuid),
    Json(serde_json::Value),
}

/// A classified failure.
///
/// Two errors are equal when their [`Reason`]s are equal; the underlying
/// cause, details, affected values and endpoint are informational.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct PubSubError {
    reason: Reason,
    endpoint: EndpointCategory,
    #[source]
    underlying: Option<Underlying>,
    details: Vec<String>,
    affected: Vec<AffectedValue>,
}

impl PubSubError {
    pub fn new(reason: Reason, endpoint: EndpointCategory) -> Self {
        Self {
            reason,
            endpoint,
            underlying: None,
            details: Vec::new(),
            affected: Vec::new(),
        }
    }

    /// Attach the lower-level failure that caused this error.
    pub fn with_underlying<E>(mut self, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.underlying = Some(Arc::new(error));
        self
    }

    /// Attach an already shared lower-level failure.
    pub fn with_shared_underlying(mut self, error: Underlying) -> Self {
        self.underlying = Some(error);
        self
    }

    pub fn with_details(mut self, details: impl IntoIterator<Item = String>) -> Self {
        self.details.extend(details);
        self
    }

    pub fn with_affected(mut self, values: impl IntoIterator<Item = AffectedValue>) -> Self {
        self.affected.extend(values);
        self
    }

    pub fn reason(&self) -> Reason {
        self.reason
    }

    pub fn domain(&self) -> Domain {
        self.reason.domain()
    }

    pub fn endpoint(&self) -> EndpointCategory {
        self.endpoint
    }

    pub fn underlying(&self) -> Option<&Underlying> {
        self.underlying.as_ref()
    }

    pub fn details(&self) -> &[String] {
        &self.details
    }

    pub fn affected(&self) -> &[AffectedValue] {
        &self.affected
    }

    /// True when the reason is in the cancellation domain.
    pub fn is_cancellation(&self) -> bool {
        self.reason.is_cancellation()
    }

    /// Build an error for a non-success response.
    ///
    /// A reason decoded from the service payload wins; otherwise the status
    /// code fallback table is consulted, and finally `UnrecognizedStatusCode`.
    pub fn from_response(
        reason: Option<Reason>,
        endpoint: EndpointCategory,
        status: u16,
        request: Option<AffectedValue>,
        details: Vec<String>,
    ) -> Self {
        let reason = reason
            .or_else(|| Reason::from_status_code(status))
            .unwrap_or(Reason::UnrecognizedStatusCode);

        let mut affected: Vec<AffectedValue> = request.into_iter().collect();
        affected.push(AffectedValue::Response { status });

        Self::new(reason, endpoint)
            .with_details(details)
            .with_affected(affected)
    }

    /// Build an error from a decoded service payload.
    pub fn from_service_payload(
        payload: &GenericServicePayload,
        endpoint: EndpointCategory,
        status: u16,
        request: Option<AffectedValue>,
    ) -> Self {
        Self::from_response(
            payload.reason(),
            endpoint,
            status,
            request,
            payload.detail_messages(),
        )
    }

    /// Build an error from a bare status code when the body carried nothing.
    pub fn from_status(
        endpoint: EndpointCategory,
        status: u16,
        request: Option<AffectedValue>,
    ) -> Self {
        Self::from_response(None, endpoint, status, request, Vec::new())
    }

    /// Convert any failure crossing into the request layer.
    ///
    /// An existing `PubSubError` is passed through unchanged. Failures that
    /// classify to a specific reason keep it; everything else gets `default`.
    pub fn convert(error: Underlying, endpoint: EndpointCategory, default: Reason) -> Self {
        if let Some(existing) = error.downcast_ref::<PubSubError>() {
            return existing.clone();
        }

        let reason = generic_reason(&*error).unwrap_or(default);
        Self::new(reason, endpoint).with_shared_underlying(error)
    }

    /// A failure while building the request URL.
    pub fn url_creation(error: Underlying, endpoint: EndpointCategory) -> Self {
        Self::convert(error, endpoint, Reason::InvalidUrl)
    }

    /// A failure reported by the transport for one attempt.
    pub fn transport(error: TransportError, endpoint: EndpointCategory) -> Self {
        Self::convert(Arc::new(error), endpoint, Reason::Unknown)
    }

    /// A failure produced while deciding whether to retry.
    pub fn retry(error: Underlying, endpoint: EndpointCategory) -> Self {
        Self::convert(error, endpoint, Reason::RequestRetryFailed)
    }

    /// The error a cancelled request completes with.
    ///
    /// An explicit `reason` wins, then a cause that is already a
    /// `PubSubError`, then a generic `ClientCancelled`.
    pub fn cancellation(
        reason: Option<Reason>,
        cause: Option<Underlying>,
        endpoint: EndpointCategory,
    ) -> Self {
        if let Some(reason) = reason {
            let error = Self::new(reason, endpoint);
            return match cause {
                Some(cause) => error.with_shared_underlying(cause),
                None => error,
            };
        }

        match cause {
            Some(cause) => match cause.downcast_ref::<PubSubError>() {
                Some(existing) => existing.clone(),
                None => Self::new(Reason::ClientCancelled, endpoint).with_shared_underlying(cause),
            },
            None => Self::new(Reason::ClientCancelled, endpoint),
        }
    }

    /// Wrap a failure for delivery as a subscription event.
    pub fn event(error: Underlying, endpoint: EndpointCategory) -> Self {
        if let Some(existing) = error.downcast_ref::<PubSubError>() {
            return existing.clone();
        }

        let reason = if error.downcast_ref::<TransportError>().is_some() {
            Reason::ClientCancelled
        } else {
            Reason::Unknown
        };
        Self::new(reason, endpoint).with_shared_underlying(error)
    }
}

/// The specific reason for failures this crate knows how to classify.
fn generic_reason(error: &(dyn StdError + Send + Sync + 'static)) -> Option<Reason> {
    if let Some(transport) = error.downcast_ref::<TransportError>() {
        return transport.reason();
    }
    if let Some(json) = error.downcast_ref::<serde_json::Error>() {
        return json.reason();
    }
    if let Some(io) = error.downcast_ref::<std::io::Error>() {
        return io.kind().reason();
    }
    None
}

impl PartialEq for PubSubError {
    fn eq(&self, other: &Self) -> bool {
        self.reason == other.reason
    }
}

impl Eq for PubSubError {}

impl Hash for PubSubError {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reason.hash(state);
    }
}

impl From<Reason> for PubSubError {
    fn from(reason: Reason) -> Self {
        Self::new(reason, EndpointCategory::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::TransportErrorKind;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn arc<E: StdError + Send + Sync + 'static>(error: E) -> Underlying {
        Arc::new(error)
    }

    #[test]
    fn test_equality_ignores_cause_and_details() {
        let a = PubSubError::new(Reason::TimedOut, EndpointCategory::Subscribe)
            .with_details(vec!["first".to_string()]);
        let b = PubSubError::new(Reason::TimedOut, EndpointCategory::Publish)
            .with_underlying(TransportError::new(TransportErrorKind::TimedOut, "slow"));

        assert_eq!(a, b);
        assert_ne!(a, PubSubError::new(Reason::ConnectionLost, EndpointCategory::Subscribe));

        let set: HashSet<PubSubError> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_from_response_prefers_service_reason() {
        let error = PubSubError::from_response(
            Some(Reason::InvalidSubscribeKey),
            EndpointCategory::Subscribe,
            400,
            None,
            Vec::new(),
        );
        assert_eq!(error.reason(), Reason::InvalidSubscribeKey);

        let error = PubSubError::from_status(EndpointCategory::Subscribe, 429, None);
        assert_eq!(error.reason(), Reason::TooManyRequests);
        assert_eq!(error.affected(), &[AffectedValue::Response { status: 429 }]);

        let error = PubSubError::from_status(EndpointCategory::Subscribe, 502, None);
        assert_eq!(error.reason(), Reason::UnrecognizedStatusCode);
    }

    #[test]
    fn test_from_service_payload_carries_details() {
        let payload = GenericServicePayload::decode(
            br#"{"status": 400, "error": {"message": "Invalid Arguments", "details": [{"message": "bad name"}]}}"#,
        )
        .unwrap();
        let error =
            PubSubError::from_service_payload(&payload, EndpointCategory::Objects, 400, None);

        assert_eq!(error.reason(), Reason::InvalidArguments);
        assert_eq!(error.details(), &["bad name".to_string()]);
    }

    #[test]
    fn test_convert_passes_existing_error_through() {
        let original = PubSubError::new(Reason::MessageTooLong, EndpointCategory::Publish);
        let converted =
            PubSubError::convert(arc(original), EndpointCategory::Subscribe, Reason::Unknown);

        assert_eq!(converted.reason(), Reason::MessageTooLong);
        assert_eq!(converted.endpoint(), EndpointCategory::Publish);
    }

    #[test]
    fn test_convert_classifies_transport_and_json() {
        let timeout = TransportError::new(TransportErrorKind::TimedOut, "timeout");
        assert_eq!(
            PubSubError::transport(timeout, EndpointCategory::Subscribe).reason(),
            Reason::TimedOut
        );

        let json = serde_json::from_str::<serde_json::Value>("[").unwrap_err();
        let error = PubSubError::convert(arc(json), EndpointCategory::Subscribe, Reason::Unknown);
        assert_eq!(error.reason(), Reason::JsonDataDecodingFailure);
        assert!(error.underlying().is_some());
    }

    #[test]
    fn test_retry_defaults_to_retry_failed() {
        let cause = std::fmt::Error;
        let error = PubSubError::retry(arc(cause), EndpointCategory::Subscribe);
        assert_eq!(error.reason(), Reason::RequestRetryFailed);
    }

    #[test]
    fn test_cancellation_precedence() {
        let explicit = PubSubError::cancellation(
            Some(Reason::LongPollingRestart),
            Some(arc(PubSubError::from(Reason::TimedOut))),
            EndpointCategory::Subscribe,
        );
        assert_eq!(explicit.reason(), Reason::LongPollingRestart);

        let from_cause = PubSubError::cancellation(
            None,
            Some(arc(PubSubError::from(Reason::SessionInvalidated))),
            EndpointCategory::Subscribe,
        );
        assert_eq!(from_cause.reason(), Reason::SessionInvalidated);

        let generic = PubSubError::cancellation(None, None, EndpointCategory::Subscribe);
        assert_eq!(generic.reason(), Reason::ClientCancelled);
        assert!(generic.is_cancellation());
    }

    #[test]
    fn test_source_chain_exposes_underlying() {
        let error = PubSubError::new(Reason::ConnectionLost, EndpointCategory::Subscribe)
            .with_underlying(TransportError::new(
                TransportErrorKind::NetworkConnectionLost,
                "reset",
            ));
        let source = StdError::source(&error).map(|s| s.to_string());
        assert!(source.unwrap_or_default().contains("reset"));
        assert_eq!(error.to_string(), "The connection was lost");
    }

    proptest! {
        #[test]
        fn prop_from_status_never_panics_and_is_endpoint_or_processing(code in 0u16..1000) {
            let error = PubSubError::from_status(EndpointCategory::Subscribe, code, None);
            let domain = error.domain();
            prop_assert!(
                domain == Domain::EndpointResponse || domain == Domain::ResponseProcessing
            );
            if let Some(expected) = Reason::from_status_code(code) {
                prop_assert_eq!(error.reason(), expected);
            }
        }
    }
}
