//! Service error payloads.
//!
//! The service reports failures in one of two JSON shapes:
//!
//! ```text
//! {"status": 400, "message": "Invalid Subscribe Key", "error": true, "service": "Access Manager"}
//! {"status": 400, "error": {"message": "Invalid Arguments", "source": "objects", "details": [...]}}
//! ```
//!
//! Both decode into [`GenericServicePayload`].

use serde::{Deserialize, Serialize};

use crate::reason::Reason;

/// Known service response messages.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum ServiceResponseMessage {
    Acknowledge,
    InvalidArguments,
    InvalidCharacter,
    InvalidDevicePushToken,
    InvalidSubscribeKey,
    InvalidPublishKey,
    MaxChannelGroupCountExceeded,
    CouldNotParseRequest,
    RequestContainedInvalidJson,
    MessageTooLong,
    InvalidUuid,
    NothingToDelete,
    Forbidden,
    NotFound,
    TooManyRequests,
    ServiceUnavailable,
    PushNotEnabled,
    MessageHistoryNotEnabled,
    MessageDeletionNotEnabled,
    /// Any message not listed above, verbatim
    Unknown(String),
}

impl ServiceResponseMessage {
    /// Match a raw message string, ignoring case and surrounding whitespace.
    pub fn from_message(message: &str) -> Self {
        let normalized = message.trim().to_ascii_lowercase();

        match normalized.as_str() {
            "ok" | "success" | "sent" => return Self::Acknowledge,
            "invalid arguments" => return Self::InvalidArguments,
            "invalid character" => return Self::InvalidCharacter,
            "invalid device token" | "invalid device push token" => {
                return Self::InvalidDevicePushToken
            }
            "invalid subscribe key" => return Self::InvalidSubscribeKey,
            "invalid key" | "invalid publish key" => return Self::InvalidPublishKey,
            "maximum channel registration count exceeded" => {
                return Self::MaxChannelGroupCountExceeded
            }
            "could not parse request" => return Self::CouldNotParseRequest,
            "request contained invalid json" => return Self::RequestContainedInvalidJson,
            "message too large" | "message too long" => return Self::MessageTooLong,
            "invalid uuid" | "invalid user id" => return Self::InvalidUuid,
            "there were no messages to delete" | "nothing to delete" => {
                return Self::NothingToDelete
            }
            "forbidden" => return Self::Forbidden,
            "not found" | "resource not found" => return Self::NotFound,
            "too many requests" => return Self::TooManyRequests,
            "service unavailable" => return Self::ServiceUnavailable,
            _ => {}
        }

        if normalized.contains("not enabled") {
            if normalized.contains("push") {
                return Self::PushNotEnabled;
            }
            if normalized.contains("delet") {
                return Self::MessageDeletionNotEnabled;
            }
            if normalized.contains("history") || normalized.contains("storage") {
                return Self::MessageHistoryNotEnabled;
            }
        }

        Self::Unknown(message.to_string())
    }

    /// The failure reason this message corresponds to, if any.
    pub fn pubsub_reason(&self) -> Option<Reason> {
        use ServiceResponseMessage::*;

        match self {
            Acknowledge | Unknown(_) => None,
            InvalidArguments => Some(Reason::InvalidArguments),
            InvalidCharacter => Some(Reason::InvalidCharacter),
            InvalidDevicePushToken => Some(Reason::InvalidDevicePushToken),
            InvalidSubscribeKey => Some(Reason::InvalidSubscribeKey),
            InvalidPublishKey => Some(Reason::InvalidPublishKey),
            MaxChannelGroupCountExceeded => Some(Reason::MaxChannelGroupCountExceeded),
            CouldNotParseRequest => Some(Reason::CouldNotParseRequest),
            RequestContainedInvalidJson => Some(Reason::RequestContainedInvalidJson),
            MessageTooLong => Some(Reason::MessageTooLong),
            InvalidUuid => Some(Reason::InvalidUuid),
            NothingToDelete => Some(Reason::NothingToDelete),
            Forbidden => Some(Reason::Forbidden),
            NotFound => Some(Reason::ResourceNotFound),
            TooManyRequests => Some(Reason::TooManyRequests),
            ServiceUnavailable => Some(Reason::ServiceUnavailable),
            PushNotEnabled => Some(Reason::PushNotEnabled),
            MessageHistoryNotEnabled => Some(Reason::MessageHistoryNotEnabled),
            MessageDeletionNotEnabled => Some(Reason::MessageDeletionNotEnabled),
        }
    }
}

/// One entry of a structured error's `details` list.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, rename = "locationType")]
    pub location_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawError {
    Flag(bool),
    Structured {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        details: Vec<ErrorDetail>,
    },
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<RawError>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default, rename = "error_message")]
    error_message: Option<String>,
}

/// A decoded service error payload.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GenericServicePayload {
    pub message: ServiceResponseMessage,
    pub details: Vec<ErrorDetail>,
    pub service: Option<String>,
    pub status: Option<u16>,
    pub error: bool,
}

impl GenericServicePayload {
    /// Decode either payload shape from raw bytes.
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawPayload = serde_json::from_slice(data)?;

        let (error, nested_message, source, details) = match raw.error {
            Some(RawError::Flag(flag)) => (flag, None, None, Vec::new()),
            Some(RawError::Structured {
                message,
                source,
                details,
            }) => (true, message, source, details),
            None => (false, None, None, Vec::new()),
        };

        let text = nested_message
            .or(raw.message)
            .or(raw.error_message)
            .unwrap_or_default();

        Ok(Self {
            message: ServiceResponseMessage::from_message(&text),
            details,
            service: raw.service.or(source),
            status: raw.status,
            error,
        })
    }

    /// The failure reason carried by the payload message, if any.
    pub fn reason(&self) -> Option<Reason> {
        self.message.pubsub_reason()
    }

    /// Human readable detail strings.
    pub fn detail_messages(&self) -> Vec<String> {
        self.details.iter().map(|d| d.message.clone()).collect()
    }
}
