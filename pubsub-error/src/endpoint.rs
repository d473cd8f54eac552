//! Endpoint categories used to tag requests and the errors they produce.

use std::fmt;

/// The operation a request (and any failure it produced) belongs to.
///
/// Categories double as tags for bulk cancellation: the transport can be told
/// to cancel every outstanding attempt of a given category.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EndpointCategory {
    Time,
    Publish,
    Signal,
    Subscribe,
    Heartbeat,
    Leave,
    SetPresenceState,
    GetPresenceState,
    HereNow,
    WhereNow,
    ChannelGroups,
    History,
    MessageActions,
    Objects,
    Push,
    Unknown,
}

/// Coarser grouping of [`EndpointCategory`] values.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum OperationType {
    Time,
    Publish,
    Subscribe,
    Presence,
    ChannelGroup,
    History,
    MessageActions,
    Objects,
    Push,
    Unknown,
}

impl EndpointCategory {
    /// The operation type this category belongs to.
    pub fn operation_type(&self) -> OperationType {
        match self {
            EndpointCategory::Time => OperationType::Time,
            EndpointCategory::Publish | EndpointCategory::Signal => OperationType::Publish,
            EndpointCategory::Subscribe => OperationType::Subscribe,
            EndpointCategory::Heartbeat
            | EndpointCategory::Leave
            | EndpointCategory::SetPresenceState
            | EndpointCategory::GetPresenceState
            | EndpointCategory::HereNow
            | EndpointCategory::WhereNow => OperationType::Presence,
            EndpointCategory::ChannelGroups => OperationType::ChannelGroup,
            EndpointCategory::History => OperationType::History,
            EndpointCategory::MessageActions => OperationType::MessageActions,
            EndpointCategory::Objects => OperationType::Objects,
            EndpointCategory::Push => OperationType::Push,
            EndpointCategory::Unknown => OperationType::Unknown,
        }
    }
}

impl fmt::Display for EndpointCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointCategory::Time => "Time",
            EndpointCategory::Publish => "Publish",
            EndpointCategory::Signal => "Signal",
            EndpointCategory::Subscribe => "Subscribe",
            EndpointCategory::Heartbeat => "Heartbeat",
            EndpointCategory::Leave => "Leave",
            EndpointCategory::SetPresenceState => "Set Presence State",
            EndpointCategory::GetPresenceState => "Get Presence State",
            EndpointCategory::HereNow => "Here Now",
            EndpointCategory::WhereNow => "Where Now",
            EndpointCategory::ChannelGroups => "Channel Groups",
            EndpointCategory::History => "History",
            EndpointCategory::MessageActions => "Message Actions",
            EndpointCategory::Objects => "Objects",
            EndpointCategory::Push => "Push",
            EndpointCategory::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_categories_group_together() {
        for category in [
            EndpointCategory::Heartbeat,
            EndpointCategory::Leave,
            EndpointCategory::HereNow,
            EndpointCategory::WhereNow,
        ] {
            assert_eq!(category.operation_type(), OperationType::Presence);
        }
        assert_eq!(
            EndpointCategory::Subscribe.operation_type(),
            OperationType::Subscribe
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(EndpointCategory::HereNow.to_string(), "Here Now");
        assert_eq!(EndpointCategory::Subscribe.to_string(), "Subscribe");
    }
}
