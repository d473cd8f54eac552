//! Long-poll response payload.
//!
//! ```json
//! {"t": {"t": "16000000000000000", "r": 12},
//!  "m": [{"c": "lobby", "d": {"text": "hi"}, "i": "user-2", "p": {"t": "16000000000000001", "r": 12}}]}
//! ```

use bytes::Bytes;
use pubsub_error::{PubSubError, Reason};
use pubsub_request::{Response, ResponseDecoder};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::channel::is_presence_name;

/// Position in the event stream, resumed from by the next long-poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub struct SubscribeCursor {
    #[serde(rename = "t", deserialize_with = "deserialize_timetoken")]
    pub timetoken: u64,
    #[serde(rename = "r", default)]
    pub region: u32,
}

/// Body of a successful long-poll.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscribeResponse {
    #[serde(rename = "t")]
    pub cursor: SubscribeCursor,
    #[serde(rename = "m", default)]
    pub messages: Vec<SubscribeItem>,
}

/// What an item delivered by a long-poll carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Message,
    Signal,
    Object,
    MessageAction,
    Presence,
}

/// One item delivered by a long-poll.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscribeItem {
    #[serde(rename = "a", default)]
    pub shard: Option<String>,
    /// The subscription (group or wildcard) that matched, if not the channel
    #[serde(rename = "b", default)]
    pub subscription: Option<String>,
    #[serde(rename = "c")]
    pub channel: String,
    #[serde(rename = "d", default)]
    pub payload: Value,
    #[serde(rename = "e", default)]
    pub message_type: Option<u8>,
    #[serde(rename = "f", default)]
    pub flags: Option<u32>,
    #[serde(rename = "i", default)]
    pub publisher: Option<String>,
    #[serde(rename = "k", default)]
    pub subscribe_key: Option<String>,
    #[serde(rename = "p", default)]
    pub published: Option<SubscribeCursor>,
    #[serde(rename = "u", default)]
    pub metadata: Option<Value>,
}

impl SubscribeItem {
    /// Items on a presence channel are presence events regardless of type.
    pub fn kind(&self) -> ItemKind {
        if is_presence_name(&self.channel) {
            return ItemKind::Presence;
        }

        match self.message_type {
            Some(1) => ItemKind::Signal,
            Some(2) => ItemKind::Object,
            Some(3) => ItemKind::MessageAction,
            _ => ItemKind::Message,
        }
    }

    /// Publish timetoken of the item, 0 when absent.
    pub fn timetoken(&self) -> u64 {
        self.published.map_or(0, |cursor| cursor.timetoken)
    }
}

/// Accepts timetokens encoded as either JSON numbers or strings.
pub(crate) fn deserialize_timetoken<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.parse().map_err(D::Error::custom),
    }
}

/// Decodes long-poll bodies into [`SubscribeResponse`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeResponseDecoder;

impl ResponseDecoder for SubscribeResponseDecoder {
    type Payload = SubscribeResponse;

    fn decode(
        &self,
        response: Response<Bytes>,
    ) -> Result<Response<SubscribeResponse>, PubSubError> {
        match serde_json::from_slice::<SubscribeResponse>(&response.payload) {
            Ok(payload) => {
                tracing::trace!(
                    timetoken = payload.cursor.timetoken,
                    count = payload.messages.len(),
                    "Decoded subscribe response"
                );
                Ok(response.with_payload(payload))
            }
            Err(error) => Err(response
                .error(Reason::JsonDataDecodingFailure)
                .with_underlying(error)),
        }
    }
}
