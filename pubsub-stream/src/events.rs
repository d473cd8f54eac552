//! Events emitted by a subscription session.

use pubsub_error::PubSubError;
use serde::Deserialize;
use serde_json::Value;

use crate::channel::{trim_presence_suffix, Channel};
use crate::payload::{deserialize_timetoken, SubscribeItem};
use crate::status::ConnectionStatus;

/// Everything a listener can be told about.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    ConnectionStatusChanged(ConnectionStatus),
    SubscriptionChanged(SubscriptionChangeEvent),
    MessageReceived(MessageEvent),
    SignalReceived(MessageEvent),
    PresenceChanged(PresenceEvent),
    Object(ObjectEvent),
    MessageActionAdded(MessageAction),
    MessageActionRemoved(MessageAction),
    SubscribeError(PubSubError),
}

/// Entries added to or removed from the subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionChangeEvent {
    Subscribed {
        channels: Vec<Channel>,
        groups: Vec<Channel>,
    },
    Unsubscribed {
        channels: Vec<Channel>,
        groups: Vec<Channel>,
    },
}

impl SubscriptionChangeEvent {
    pub fn did_change(&self) -> bool {
        let (channels, groups) = self.entries();
        !channels.is_empty() || !groups.is_empty()
    }

    pub fn entries(&self) -> (&[Channel], &[Channel]) {
        match self {
            SubscriptionChangeEvent::Subscribed { channels, groups }
            | SubscriptionChangeEvent::Unsubscribed { channels, groups } => (channels, groups),
        }
    }

    pub fn channel_ids(&self) -> Vec<&str> {
        self.entries().0.iter().map(|c| c.id.as_str()).collect()
    }

    pub fn group_ids(&self) -> Vec<&str> {
        self.entries().1.iter().map(|c| c.id.as_str()).collect()
    }
}

/// A published message or signal.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub channel: String,
    pub subscription: Option<String>,
    pub payload: Value,
    pub publisher: Option<String>,
    pub timetoken: u64,
    pub metadata: Option<Value>,
}

impl From<&SubscribeItem> for MessageEvent {
    fn from(item: &SubscribeItem) -> Self {
        Self {
            channel: item.channel.clone(),
            subscription: item.subscription.clone(),
            payload: item.payload.clone(),
            publisher: item.publisher.clone(),
            timetoken: item.timetoken(),
            metadata: item.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresenceAction {
    Join,
    Leave,
    Timeout,
    StateChange,
    Interval,
}

#[derive(Deserialize)]
struct PresencePayload {
    action: PresenceAction,
    #[serde(default)]
    timestamp: u64,
    #[serde(default)]
    occupancy: u32,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    join: Vec<String>,
    #[serde(default)]
    leave: Vec<String>,
    #[serde(default)]
    timeout: Vec<String>,
    #[serde(default)]
    here_now_refresh: bool,
}

/// A membership or state change on a presence channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceEvent {
    /// Channel the event is about, without the presence suffix
    pub channel: String,
    pub subscription: Option<String>,
    pub action: PresenceAction,
    pub occupancy: u32,
    pub timestamp: u64,
    pub timetoken: u64,
    pub uuid: Option<String>,
    pub state: Option<Value>,
    /// Interval events list who joined, left or timed out since the last one
    pub join: Vec<String>,
    pub leave: Vec<String>,
    pub timeout: Vec<String>,
    pub refresh_here_now: bool,
}

impl PresenceEvent {
    pub fn decode(item: &SubscribeItem) -> Result<Self, serde_json::Error> {
        let payload = PresencePayload::deserialize(&item.payload)?;
        Ok(Self {
            channel: trim_presence_suffix(&item.channel).to_string(),
            subscription: item
                .subscription
                .as_deref()
                .map(|name| trim_presence_suffix(name).to_string()),
            action: payload.action,
            occupancy: payload.occupancy,
            timestamp: payload.timestamp,
            timetoken: item.timetoken(),
            uuid: payload.uuid,
            state: payload.data,
            join: payload.join,
            leave: payload.leave,
            timeout: payload.timeout,
            refresh_here_now: payload.here_now_refresh,
        })
    }

    /// The state reported for `user_id`, if this event carries it.
    pub fn state_of(&self, user_id: &str) -> Option<&Value> {
        self.state
            .as_ref()
            .filter(|_| self.uuid.as_deref() == Some(user_id))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UuidMetadata {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "externalId")]
    pub external_id: Option<String>,
    #[serde(default, rename = "profileUrl")]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub custom: Option<Value>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default, rename = "eTag")]
    pub e_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelMetadata {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub custom: Option<Value>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default, rename = "eTag")]
    pub e_tag: Option<String>,
}

#[derive(Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Deserialize)]
struct RawMembership {
    uuid: IdRef,
    channel: IdRef,
    #[serde(default)]
    custom: Option<Value>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default, rename = "eTag")]
    e_tag: Option<String>,
}

/// Link between a user and a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub uuid: String,
    pub channel: String,
    pub custom: Option<Value>,
    pub updated: Option<String>,
    pub e_tag: Option<String>,
}

impl From<RawMembership> for Membership {
    fn from(raw: RawMembership) -> Self {
        Self {
            uuid: raw.uuid.id,
            channel: raw.channel.id,
            custom: raw.custom,
            updated: raw.updated,
            e_tag: raw.e_tag,
        }
    }
}

/// A change to user, channel or membership metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEvent {
    UuidMetadataSet(UuidMetadata),
    UuidMetadataRemoved { uuid: String },
    ChannelMetadataSet(ChannelMetadata),
    ChannelMetadataRemoved { channel: String },
    MembershipSet(Membership),
    MembershipRemoved(Membership),
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum ObjectAction {
    Set,
    Delete,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum ObjectType {
    Uuid,
    Channel,
    Membership,
}

#[derive(Deserialize)]
struct ObjectPayload {
    event: ObjectAction,
    #[serde(rename = "type")]
    kind: ObjectType,
    data: Value,
}

impl ObjectEvent {
    pub fn decode(item: &SubscribeItem) -> Result<Self, serde_json::Error> {
        let payload = ObjectPayload::deserialize(&item.payload)?;
        let data = payload.data;

        Ok(match (payload.kind, payload.event) {
            (ObjectType::Uuid, ObjectAction::Set) => {
                ObjectEvent::UuidMetadataSet(UuidMetadata::deserialize(data)?)
            }
            (ObjectType::Uuid, ObjectAction::Delete) => ObjectEvent::UuidMetadataRemoved {
                uuid: IdRef::deserialize(data)?.id,
            },
            (ObjectType::Channel, ObjectAction::Set) => {
                ObjectEvent::ChannelMetadataSet(ChannelMetadata::deserialize(data)?)
            }
            (ObjectType::Channel, ObjectAction::Delete) => ObjectEvent::ChannelMetadataRemoved {
                channel: IdRef::deserialize(data)?.id,
            },
            (ObjectType::Membership, ObjectAction::Set) => {
                ObjectEvent::MembershipSet(RawMembership::deserialize(data)?.into())
            }
            (ObjectType::Membership, ObjectAction::Delete) => {
                ObjectEvent::MembershipRemoved(RawMembership::deserialize(data)?.into())
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageActionKind {
    Added,
    Removed,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAction {
    #[serde(rename = "type")]
    action_type: String,
    value: String,
    #[serde(deserialize_with = "deserialize_timetoken")]
    message_timetoken: u64,
    #[serde(deserialize_with = "deserialize_timetoken")]
    action_timetoken: u64,
}

#[derive(Deserialize)]
struct ActionPayload {
    event: MessageActionKind,
    data: RawAction,
}

/// A reaction or receipt attached to a published message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageAction {
    pub channel: String,
    pub publisher: Option<String>,
    pub action_type: String,
    pub value: String,
    pub message_timetoken: u64,
    pub action_timetoken: u64,
}

impl MessageAction {
    /// Decode the action and whether it was added or removed.
    pub fn decode(item: &SubscribeItem) -> Result<(MessageActionKind, Self), serde_json::Error> {
        let payload = ActionPayload::deserialize(&item.payload)?;
        Ok((
            payload.event,
            Self {
                channel: item.channel.clone(),
                publisher: item.publisher.clone(),
                action_type: payload.data.action_type,
                value: payload.data.value,
                message_timetoken: payload.data.message_timetoken,
                action_timetoken: payload.data.action_timetoken,
            },
        ))
    }
}
