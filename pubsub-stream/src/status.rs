//! Connection status of a subscription session.

use std::fmt;

/// Health of the long-poll connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// Not subscribed to anything, or stopped on request
    #[default]
    Disconnected,
    /// The last long-poll failed for a reason other than cancellation
    DisconnectedUnexpectedly,
    /// A long-poll has been issued but none has succeeded yet
    Connecting,
    /// The last long-poll succeeded
    Connected,
}

impl ConnectionStatus {
    /// True while a long-poll loop is expected to be running.
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Connected)
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionStatus::Connected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::DisconnectedUnexpectedly => "disconnected unexpectedly",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ConnectionStatus::Disconnected, false)]
    #[case(ConnectionStatus::DisconnectedUnexpectedly, false)]
    #[case(ConnectionStatus::Connecting, true)]
    #[case(ConnectionStatus::Connected, true)]
    fn test_is_active(#[case] status: ConnectionStatus, #[case] active: bool) {
        assert_eq!(status.is_active(), active);
    }

    #[test]
    fn test_default_is_disconnected() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
    }
}
