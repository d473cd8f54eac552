//! Pure classification of lower-level failures into a [`Reason`].
//!
//! Each kind of failure that can cross from a collaborator (transport, JSON
//! codec, service payload, raw status code) implements [`Classify`]. The
//! free function [`classify`] folds the optional answer into a total one.

use crate::reason::Reason;
use crate::service::ServiceResponseMessage;

/// A failure kind that knows which [`Reason`] it corresponds to.
pub trait Classify {
    /// The specific reason, or `None` when the failure has no dedicated one.
    fn reason(&self) -> Option<Reason>;
}

/// Classify any failure, falling back to [`Reason::Unknown`].
pub fn classify<F: Classify + ?Sized>(failure: &F) -> Reason {
    failure.reason().unwrap_or(Reason::Unknown)
}

/// Connectivity failure kinds reported by a transport.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum TransportErrorKind {
    Cancelled,
    TimedOut,
    CannotFindHost,
    DnsLookupFailed,
    BadUrl,
    UnsupportedUrl,
    CannotConnectToHost,
    ResourceUnavailable,
    NotConnectedToInternet,
    DataNotAllowed,
    InternationalRoamingOff,
    NetworkConnectionLost,
    SecureConnectionFailed,
    ServerCertificateUntrusted,
    ServerCertificateHasBadDate,
    ServerCertificateHasUnknownRoot,
    ServerCertificateNotYetValid,
    ClientCertificateRejected,
    ClientCertificateRequired,
    BadServerResponse,
    ZeroByteResource,
    CannotDecodeRawData,
    CannotDecodeContentData,
    CannotParseResponse,
    DataLengthExceedsMaximum,
    Unknown,
    /// A failure the transport could not place in any bucket above
    Other,
}

impl Classify for TransportErrorKind {
    fn reason(&self) -> Option<Reason> {
        use TransportErrorKind::*;

        match self {
            Cancelled => Some(Reason::ClientCancelled),
            Unknown => Some(Reason::Unknown),
            TimedOut => Some(Reason::TimedOut),
            CannotFindHost | DnsLookupFailed => Some(Reason::NameResolutionFailure),
            BadUrl | UnsupportedUrl => Some(Reason::InvalidUrl),
            CannotConnectToHost | ResourceUnavailable | NotConnectedToInternet => {
                Some(Reason::ConnectionFailure)
            }
            InternationalRoamingOff | DataNotAllowed => Some(Reason::ConnectionOverDataFailure),
            NetworkConnectionLost => Some(Reason::ConnectionLost),
            SecureConnectionFailed => Some(Reason::SecureConnectionFailure),
            ServerCertificateUntrusted
            | ServerCertificateHasBadDate
            | ServerCertificateHasUnknownRoot
            | ServerCertificateNotYetValid
            | ClientCertificateRejected
            | ClientCertificateRequired => Some(Reason::CertificateTrustFailure),
            BadServerResponse | ZeroByteResource => Some(Reason::BadServerResponse),
            CannotDecodeRawData | CannotDecodeContentData | CannotParseResponse => {
                Some(Reason::ResponseDecodingFailure)
            }
            DataLengthExceedsMaximum => Some(Reason::DataLengthExceedsMaximum),
            Other => None,
        }
    }
}

impl From<std::io::ErrorKind> for TransportErrorKind {
    fn from(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind;

        match kind {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportErrorKind::TimedOut,
            ErrorKind::ConnectionRefused | ErrorKind::AddrNotAvailable => {
                TransportErrorKind::CannotConnectToHost
            }
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => TransportErrorKind::NetworkConnectionLost,
            ErrorKind::UnexpectedEof => TransportErrorKind::BadServerResponse,
            ErrorKind::InvalidData => TransportErrorKind::CannotDecodeContentData,
            ErrorKind::InvalidInput => TransportErrorKind::BadUrl,
            ErrorKind::Interrupted => TransportErrorKind::Cancelled,
            _ => TransportErrorKind::Other,
        }
    }
}

impl Classify for std::io::ErrorKind {
    fn reason(&self) -> Option<Reason> {
        TransportErrorKind::from(*self).reason()
    }
}

/// A failure reported by a transport for one network attempt.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    /// What went wrong
    pub kind: TransportErrorKind,
    /// Transport-provided detail
    pub message: String,
}

impl TransportError {
    /// Create a new transport error.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        Self::new(error.kind().into(), error.to_string())
    }
}

impl Classify for TransportError {
    fn reason(&self) -> Option<Reason> {
        self.kind.reason()
    }
}

/// JSON codec failure kinds.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum JsonErrorKind {
    /// Decoding typed data failed
    UnknownCoding,
    /// Producing a JSON string failed
    StringCreationFailure,
    /// Producing JSON bytes failed
    DataCreationFailure,
}

impl Classify for JsonErrorKind {
    fn reason(&self) -> Option<Reason> {
        Some(match self {
            JsonErrorKind::UnknownCoding => Reason::JsonDataDecodingFailure,
            JsonErrorKind::StringCreationFailure => Reason::JsonStringEncodingFailure,
            JsonErrorKind::DataCreationFailure => Reason::JsonDataEncodingFailure,
        })
    }
}

impl Classify for serde_json::Error {
    fn reason(&self) -> Option<Reason> {
        // serde_json cannot tell direction on its own; an I/O failure while
        // writing is the only case that is unambiguously an encoding failure.
        match self.classify() {
            serde_json::error::Category::Io => Some(Reason::JsonDataEncodingFailure),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => Some(Reason::JsonDataDecodingFailure),
        }
    }
}

/// A raw HTTP status code.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct HttpStatus(pub u16);

impl HttpStatus {
    /// True for 2xx codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }
}

impl Classify for HttpStatus {
    fn reason(&self) -> Option<Reason> {
        if self.is_success() {
            return None;
        }
        Some(Reason::from_status_code(self.0).unwrap_or(Reason::UnrecognizedStatusCode))
    }
}

impl Classify for ServiceResponseMessage {
    fn reason(&self) -> Option<Reason> {
        self.pubsub_reason()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TransportErrorKind::Cancelled, Reason::ClientCancelled)]
    #[case(TransportErrorKind::TimedOut, Reason::TimedOut)]
    #[case(TransportErrorKind::DnsLookupFailed, Reason::NameResolutionFailure)]
    #[case(TransportErrorKind::CannotFindHost, Reason::NameResolutionFailure)]
    #[case(TransportErrorKind::UnsupportedUrl, Reason::InvalidUrl)]
    #[case(TransportErrorKind::CannotConnectToHost, Reason::ConnectionFailure)]
    #[case(TransportErrorKind::NetworkConnectionLost, Reason::ConnectionLost)]
    #[case(TransportErrorKind::SecureConnectionFailed, Reason::SecureConnectionFailure)]
    #[case(TransportErrorKind::ServerCertificateUntrusted, Reason::CertificateTrustFailure)]
    #[case(TransportErrorKind::ZeroByteResource, Reason::BadServerResponse)]
    #[case(TransportErrorKind::CannotParseResponse, Reason::ResponseDecodingFailure)]
    #[case(TransportErrorKind::DataLengthExceedsMaximum, Reason::DataLengthExceedsMaximum)]
    #[case(TransportErrorKind::Other, Reason::Unknown)]
    fn test_transport_classification(#[case] kind: TransportErrorKind, #[case] expected: Reason) {
        assert_eq!(classify(&kind), expected);
    }

    #[rstest]
    #[case(std::io::ErrorKind::TimedOut, Reason::TimedOut)]
    #[case(std::io::ErrorKind::ConnectionRefused, Reason::ConnectionFailure)]
    #[case(std::io::ErrorKind::ConnectionReset, Reason::ConnectionLost)]
    #[case(std::io::ErrorKind::InvalidData, Reason::ResponseDecodingFailure)]
    #[case(std::io::ErrorKind::PermissionDenied, Reason::Unknown)]
    fn test_io_classification(#[case] kind: std::io::ErrorKind, #[case] expected: Reason) {
        assert_eq!(classify(&kind), expected);
    }

    #[test]
    fn test_io_error_converts_to_transport_error() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline elapsed");
        let error = TransportError::from(io);
        assert_eq!(error.kind, TransportErrorKind::TimedOut);
        assert!(error.message.contains("deadline elapsed"));
    }

    #[test]
    fn test_json_classification() {
        let error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert_eq!(classify(&error), Reason::JsonDataDecodingFailure);
        assert_eq!(
            classify(&JsonErrorKind::StringCreationFailure),
            Reason::JsonStringEncodingFailure
        );
        assert_eq!(
            classify(&JsonErrorKind::DataCreationFailure),
            Reason::JsonDataEncodingFailure
        );
    }

    #[rstest]
    #[case(404, Some(Reason::ResourceNotFound))]
    #[case(429, Some(Reason::TooManyRequests))]
    #[case(500, Some(Reason::InternalServiceError))]
    #[case(418, Some(Reason::UnrecognizedStatusCode))]
    #[case(204, None)]
    fn test_status_classification(#[case] code: u16, #[case] expected: Option<Reason>) {
        assert_eq!(HttpStatus(code).reason(), expected);
    }
}
