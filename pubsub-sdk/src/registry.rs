//! Sharing subscription sessions between clients.
//!
//! Clients built from equal configurations should not open competing
//! long-polls. A [`SessionRegistry`] hands out one [`SubscriptionSession`]
//! per configuration and keeps it only as long as some client does.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pubsub_request::Session;
use pubsub_stream::{SubscriptionConfiguration, SubscriptionSession};

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<Vec<(SubscriptionConfiguration, Weak<SubscriptionSession>)>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live session for `configuration`, or a new one over the network
    /// session produced by `network`.
    pub fn session<F>(
        &self,
        configuration: &SubscriptionConfiguration,
        network: F,
    ) -> Arc<SubscriptionSession>
    where
        F: FnOnce() -> Arc<Session>,
    {
        let mut sessions = self.sessions.lock();
        sessions.retain(|(_, session)| session.strong_count() > 0);

        if let Some(existing) = sessions
            .iter()
            .filter(|(config, _)| config == configuration)
            .find_map(|(_, session)| session.upgrade())
        {
            tracing::debug!(session_id = %existing.id(), "Reusing subscription session");
            return existing;
        }

        let session = SubscriptionSession::new(configuration.clone(), network());
        sessions.push((configuration.clone(), Arc::downgrade(&session)));
        session
    }

    /// Forget sessions no client holds anymore.
    pub fn prune(&self) {
        self.sessions
            .lock()
            .retain(|(_, session)| session.strong_count() > 0);
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.prune();
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubsub_request::testing::MockTransport;

    fn network() -> Arc<Session> {
        Arc::new(Session::new(Arc::new(MockTransport::new())))
    }

    #[test]
    fn test_equal_configurations_share_a_session() {
        let registry = SessionRegistry::new();
        let config = SubscriptionConfiguration::new("sub-key", "user-1");

        let first = registry.session(&config, network);
        let second = registry.session(&config.clone(), network);
        assert!(Arc::ptr_eq(&first, &second));

        let other = registry.session(
            &SubscriptionConfiguration::new("sub-key", "user-2"),
            network,
        );
        assert_ne!(first.id(), other.id());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_dropped_sessions_are_pruned() {
        let registry = SessionRegistry::new();
        let config = SubscriptionConfiguration::new("sub-key", "user-1");

        let first = registry.session(&config, network);
        let first_id = first.id();
        drop(first);
        assert!(registry.is_empty());

        let replacement = registry.session(&config, network);
        assert_ne!(replacement.id(), first_id);
    }
}
