//! Failure reasons and the domains that group them.

use std::fmt;

/// Coarse category a [`Reason`] belongs to.
///
/// Used for grouping failures when logging or when a caller only cares about
/// the broad kind of failure (for instance "anything in `Cancellation`").
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Domain {
    /// The request URL could not be built
    UrlCreation,
    /// JSON encoding or decoding failed
    JsonCodability,
    /// The request could not be prepared or retried
    RequestProcessing,
    /// Payload encryption or decryption failed
    Crypto,
    /// The request could not be delivered
    RequestTransmission,
    /// The response could not be received intact
    ResponseReceiving,
    /// The response arrived but could not be processed
    ResponseProcessing,
    /// The service rejected the request
    EndpointResponse,
    /// A feature required by the request is disabled on the service
    ServiceNotEnabled,
    /// The request was cancelled
    Cancellation,
    /// Anything else
    Uncategorized,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Domain::UrlCreation => "url creation",
            Domain::JsonCodability => "json codability",
            Domain::RequestProcessing => "request processing",
            Domain::Crypto => "crypto",
            Domain::RequestTransmission => "request transmission",
            Domain::ResponseReceiving => "response receiving",
            Domain::ResponseProcessing => "response processing",
            Domain::EndpointResponse => "endpoint response",
            Domain::ServiceNotEnabled => "service not enabled",
            Domain::Cancellation => "cancellation",
            Domain::Uncategorized => "uncategorized",
        };
        f.write_str(name)
    }
}

/// The cause of a failure.
///
/// The set is closed: every failure crossing into the request or subscription
/// layer is classified into exactly one of these. A handful of reasons
/// correspond to HTTP status codes; that correspondence is exposed through
/// [`Reason::status_code`] and [`Reason::from_status_code`] rather than
/// through the enum's discriminants.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Reason {
    // URL creation
    MissingRequiredParameter,
    InvalidEndpointType,
    MissingPublishKey,
    MissingSubscribeKey,
    MissingPublishAndSubscribeKey,

    // JSON
    JsonStringEncodingFailure,
    JsonStringDecodingFailure,
    JsonDataEncodingFailure,
    JsonDataDecodingFailure,

    // Crypto
    MissingCryptoKey,

    // Request processing
    RequestMutatorFailure,
    RequestRetryFailed,

    // Request transmission
    TimedOut,
    NameResolutionFailure,
    InvalidUrl,
    ConnectionFailure,
    ConnectionOverDataFailure,
    ConnectionLost,
    SecureConnectionFailure,
    CertificateTrustFailure,

    // Cancellation
    SessionDeinitialized,
    SessionInvalidated,
    ClientCancelled,
    LongPollingRestart,

    // Response receiving
    BadServerResponse,
    ResponseDecodingFailure,
    DataLengthExceedsMaximum,

    // Response processing
    MissingCriticalResponseData,
    UnrecognizedStatusCode,
    MalformedResponseBody,

    // Endpoint response
    InvalidArguments,
    InvalidCharacter,
    InvalidDevicePushToken,
    InvalidSubscribeKey,
    InvalidPublishKey,
    MaxChannelGroupCountExceeded,
    CouldNotParseRequest,
    RequestContainedInvalidJson,
    MessageCountExceededMaximum,
    MessageTooLong,
    InvalidUuid,
    NothingToDelete,

    // Service not enabled
    PushNotEnabled,
    MessageHistoryNotEnabled,
    MessageDeletionNotEnabled,

    // Uncategorized
    Unknown,

    // Reasons that mirror an HTTP status code
    BadRequest,
    Unauthorized,
    Forbidden,
    ResourceNotFound,
    Conflict,
    PreconditionFailed,
    RequestUriTooLong,
    UnsupportedType,
    TooManyRequests,
    MalformedFilterExpression,
    InternalServiceError,
    ServiceUnavailable,
}

/// Fallback table used when nothing richer than the status code is known.
const STATUS_CODE_REASONS: &[(u16, Reason)] = &[
    (400, Reason::BadRequest),
    (401, Reason::Unauthorized),
    (403, Reason::Forbidden),
    (404, Reason::ResourceNotFound),
    (409, Reason::Conflict),
    (412, Reason::PreconditionFailed),
    (414, Reason::RequestUriTooLong),
    (415, Reason::UnsupportedType),
    (429, Reason::TooManyRequests),
    (481, Reason::MalformedFilterExpression),
    (500, Reason::InternalServiceError),
    (503, Reason::ServiceUnavailable),
];

impl Reason {
    /// The domain this reason is grouped under.
    pub fn domain(&self) -> Domain {
        use Reason::*;

        match self {
            MissingRequiredParameter
            | InvalidEndpointType
            | MissingPublishKey
            | MissingSubscribeKey
            | MissingPublishAndSubscribeKey => Domain::UrlCreation,

            JsonStringEncodingFailure
            | JsonStringDecodingFailure
            | JsonDataEncodingFailure
            | JsonDataDecodingFailure => Domain::JsonCodability,

            MissingCryptoKey => Domain::Crypto,

            RequestMutatorFailure | RequestRetryFailed => Domain::RequestProcessing,

            TimedOut
            | NameResolutionFailure
            | InvalidUrl
            | ConnectionFailure
            | ConnectionOverDataFailure
            | ConnectionLost
            | SecureConnectionFailure
            | CertificateTrustFailure => Domain::RequestTransmission,

            ClientCancelled | SessionDeinitialized | SessionInvalidated | LongPollingRestart => {
                Domain::Cancellation
            }

            BadServerResponse | ResponseDecodingFailure | DataLengthExceedsMaximum => {
                Domain::ResponseReceiving
            }

            MissingCriticalResponseData | UnrecognizedStatusCode | MalformedResponseBody => {
                Domain::ResponseProcessing
            }

            InvalidArguments
            | InvalidCharacter
            | InvalidDevicePushToken
            | InvalidSubscribeKey
            | InvalidPublishKey
            | MaxChannelGroupCountExceeded
            | CouldNotParseRequest
            | RequestContainedInvalidJson
            | MessageCountExceededMaximum
            | MessageTooLong
            | InvalidUuid
            | NothingToDelete
            | BadRequest
            | Unauthorized
            | Forbidden
            | ResourceNotFound
            | Conflict
            | PreconditionFailed
            | RequestUriTooLong
            | UnsupportedType
            | TooManyRequests
            | MalformedFilterExpression
            | InternalServiceError
            | ServiceUnavailable => Domain::EndpointResponse,

            PushNotEnabled | MessageHistoryNotEnabled | MessageDeletionNotEnabled => {
                Domain::ServiceNotEnabled
            }

            Unknown => Domain::Uncategorized,
        }
    }

    /// The HTTP status code this reason mirrors, if any.
    pub fn status_code(&self) -> Option<u16> {
        STATUS_CODE_REASONS
            .iter()
            .find(|(_, reason)| reason == self)
            .map(|(code, _)| *code)
    }

    /// Map a raw HTTP status code onto a reason.
    ///
    /// Only codes with a dedicated reason resolve; everything else is `None`
    /// and callers decide between `UnrecognizedStatusCode` and `Unknown`.
    pub fn from_status_code(code: u16) -> Option<Reason> {
        STATUS_CODE_REASONS
            .iter()
            .find(|(status, _)| *status == code)
            .map(|(_, reason)| *reason)
    }

    /// True for reasons in the [`Domain::Cancellation`] domain.
    pub fn is_cancellation(&self) -> bool {
        self.domain() == Domain::Cancellation
    }

    /// Human readable description.
    pub fn description(&self) -> &'static str {
        use Reason::*;

        match self {
            MissingRequiredParameter => "Required parameter is missing or empty",
            InvalidEndpointType => "The endpoint is invalid for the action being performed",
            MissingPublishKey => "Publish key is missing from the configuration",
            MissingSubscribeKey => "Subscribe key is missing from the configuration",
            MissingPublishAndSubscribeKey => "Publish and subscribe keys are missing",
            JsonStringEncodingFailure => "Failed to encode a JSON string",
            JsonStringDecodingFailure => "Failed to decode a JSON string",
            JsonDataEncodingFailure => "Failed to encode JSON data",
            JsonDataDecodingFailure => "Failed to decode JSON data",
            MissingCryptoKey => "Crypto key is missing",
            RequestMutatorFailure => "Request mutation failed",
            RequestRetryFailed => "Request retry failed",
            TimedOut => "The request timed out",
            NameResolutionFailure => "The host name could not be resolved",
            InvalidUrl => "The URL is invalid",
            ConnectionFailure => "A connection could not be established",
            ConnectionOverDataFailure => "The connection is not allowed over cellular data",
            ConnectionLost => "The connection was lost",
            SecureConnectionFailure => "A secure connection could not be established",
            CertificateTrustFailure => "The server certificate was not trusted",
            SessionDeinitialized => "The session was torn down",
            SessionInvalidated => "The session was invalidated",
            ClientCancelled => "The request was cancelled by the client",
            LongPollingRestart => "The long-poll request was restarted",
            BadServerResponse => "The server returned a bad response",
            ResponseDecodingFailure => "The response could not be decoded",
            DataLengthExceedsMaximum => "The response exceeded the maximum length",
            MissingCriticalResponseData => "Critical response data was missing",
            UnrecognizedStatusCode => "The response status code was not recognized",
            MalformedResponseBody => "The response body was malformed",
            InvalidArguments => "Invalid arguments",
            InvalidCharacter => "Invalid character in request",
            InvalidDevicePushToken => "Invalid device push token",
            InvalidSubscribeKey => "Invalid subscribe key",
            InvalidPublishKey => "Invalid publish key",
            MaxChannelGroupCountExceeded => "Maximum channel group count exceeded",
            CouldNotParseRequest => "The service could not parse the request",
            RequestContainedInvalidJson => "The request contained invalid JSON",
            MessageCountExceededMaximum => "The message count exceeded the maximum",
            MessageTooLong => "The message is too long",
            InvalidUuid => "Invalid user id",
            NothingToDelete => "Nothing to delete",
            PushNotEnabled => "Push notifications are not enabled",
            MessageHistoryNotEnabled => "Message history is not enabled",
            MessageDeletionNotEnabled => "Message deletion is not enabled",
            Unknown => "Unknown error",
            BadRequest => "Bad request",
            Unauthorized => "Unauthorized",
            Forbidden => "Forbidden",
            ResourceNotFound => "Resource not found",
            Conflict => "Conflict",
            PreconditionFailed => "Precondition failed",
            RequestUriTooLong => "Request URI too long",
            UnsupportedType => "Unsupported type",
            TooManyRequests => "Too many requests",
            MalformedFilterExpression => "Malformed filter expression",
            InternalServiceError => "Internal service error",
            ServiceUnavailable => "Service unavailable",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Reason::TimedOut, Domain::RequestTransmission)]
    #[case(Reason::ClientCancelled, Domain::Cancellation)]
    #[case(Reason::LongPollingRestart, Domain::Cancellation)]
    #[case(Reason::MessageTooLong, Domain::EndpointResponse)]
    #[case(Reason::TooManyRequests, Domain::EndpointResponse)]
    #[case(Reason::InvalidSubscribeKey, Domain::EndpointResponse)]
    #[case(Reason::JsonDataDecodingFailure, Domain::JsonCodability)]
    #[case(Reason::RequestRetryFailed, Domain::RequestProcessing)]
    #[case(Reason::MissingCriticalResponseData, Domain::ResponseProcessing)]
    #[case(Reason::PushNotEnabled, Domain::ServiceNotEnabled)]
    #[case(Reason::MissingCryptoKey, Domain::Crypto)]
    #[case(Reason::MissingSubscribeKey, Domain::UrlCreation)]
    #[case(Reason::BadServerResponse, Domain::ResponseReceiving)]
    #[case(Reason::Unknown, Domain::Uncategorized)]
    fn test_reason_domain(#[case] reason: Reason, #[case] domain: Domain) {
        assert_eq!(reason.domain(), domain);
    }

    #[rstest]
    #[case(400, Some(Reason::BadRequest))]
    #[case(403, Some(Reason::Forbidden))]
    #[case(404, Some(Reason::ResourceNotFound))]
    #[case(429, Some(Reason::TooManyRequests))]
    #[case(481, Some(Reason::MalformedFilterExpression))]
    #[case(500, Some(Reason::InternalServiceError))]
    #[case(503, Some(Reason::ServiceUnavailable))]
    #[case(200, None)]
    #[case(418, None)]
    #[case(502, None)]
    fn test_from_status_code(#[case] code: u16, #[case] expected: Option<Reason>) {
        assert_eq!(Reason::from_status_code(code), expected);
    }

    #[test]
    fn test_status_code_round_trips_through_table() {
        for (code, reason) in STATUS_CODE_REASONS {
            assert_eq!(reason.status_code(), Some(*code));
        }
        assert_eq!(Reason::TimedOut.status_code(), None);
    }

    #[test]
    fn test_cancellation_reasons() {
        assert!(Reason::ClientCancelled.is_cancellation());
        assert!(Reason::SessionInvalidated.is_cancellation());
        assert!(!Reason::TimedOut.is_cancellation());
    }

    #[test]
    fn test_display_uses_description() {
        assert_eq!(Reason::TimedOut.to_string(), "The request timed out");
        assert_eq!(Domain::EndpointResponse.to_string(), "endpoint response");
    }
}
