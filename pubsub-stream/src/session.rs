//! The subscription engine.
//!
//! A [`SubscriptionSession`] owns what the client is subscribed to and keeps
//! one long-poll request in flight that reflects it. Every successful
//! long-poll is turned into listener events and immediately followed by the
//! next one, resumed from the returned cursor. Failures never stop the
//! engine: it either settles in `Disconnected` when nothing is left to
//! subscribe to, or reconnects.
//!
//! Each iteration of the loop runs in its own task, spawned when the
//! previous long-poll completes.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use pubsub_error::{AffectedValue, EndpointCategory, PubSubError, Reason};
use pubsub_request::{Request, Response, RetryCoordinator, Session};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::cache::MessageCache;
use crate::channel::{Channel, ChannelSet};
use crate::config::SubscriptionConfiguration;
use crate::endpoints::{DefaultEndpoints, EndpointFactory, SubscribeParameters};
use crate::events::{
    MessageAction, MessageActionKind, MessageEvent, ObjectEvent, PresenceEvent,
    SubscriptionChangeEvent, SubscriptionEvent,
};
use crate::heartbeat::HeartbeatTimer;
use crate::listener::{ListenerRegistry, ListenerToken, SubscriptionListener};
use crate::payload::{
    ItemKind, SubscribeCursor, SubscribeItem, SubscribeResponse, SubscribeResponseDecoder,
};
use crate::status::ConnectionStatus;

/// A long-poll delivering this many items may have dropped some.
pub const MAXIMUM_MESSAGE_COUNT: usize = 100;

/// What to subscribe to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscribeRequest {
    pub channels: Vec<String>,
    pub groups: Vec<String>,
    pub timetoken: Option<u64>,
    pub with_presence: bool,
    /// Presence state keyed by channel or group name
    pub presence_state: HashMap<String, Value>,
}

impl SubscribeRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels.extend(channels.into_iter().map(Into::into));
        self
    }

    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Start from `timetoken` instead of the current position.
    pub fn at(mut self, timetoken: u64) -> Self {
        self.timetoken = Some(timetoken);
        self
    }

    pub fn with_presence(mut self) -> Self {
        self.with_presence = true;
        self
    }

    pub fn state(mut self, name: impl Into<String>, state: Value) -> Self {
        self.presence_state.insert(name.into(), state);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.groups.is_empty()
    }

    fn entries(
        names: Vec<String>,
        with_presence: bool,
        states: &HashMap<String, Value>,
    ) -> Vec<Channel> {
        names
            .into_iter()
            .map(|id| {
                let state = states.get(&id).cloned();
                Channel::new(id, with_presence, state)
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct SubscriptionState {
    channels: ChannelSet,
    groups: ChannelSet,
    status: ConnectionStatus,
    cursor: Option<SubscribeCursor>,
}

impl SubscriptionState {
    fn total(&self) -> usize {
        self.channels.len() + self.groups.len()
    }

    fn presence_state(&self) -> Map<String, Value> {
        let mut states = self.channels.states();
        states.extend(self.groups.states());
        states
    }
}

/// The long-poll currently driving the loop.
///
/// Completions of a request from an older generation only report their
/// error; they do not touch status or restart the loop.
#[derive(Debug, Default)]
struct LoopState {
    generation: u64,
    request: Option<Request>,
    long_polling: bool,
}

/// Subscription engine over a network [`Session`].
pub struct SubscriptionSession {
    id: Uuid,
    me: Weak<SubscriptionSession>,
    configuration: SubscriptionConfiguration,
    network: Arc<Session>,
    endpoints: Arc<dyn EndpointFactory>,
    retry: Option<Arc<dyn RetryCoordinator>>,
    state: Mutex<SubscriptionState>,
    polling: Mutex<LoopState>,
    cache: Mutex<MessageCache<SubscriptionEvent>>,
    listeners: ListenerRegistry,
    heartbeat: HeartbeatTimer,
}

impl SubscriptionSession {
    /// Create an engine using the standard endpoints.
    pub fn new(configuration: SubscriptionConfiguration, network: Arc<Session>) -> Arc<Self> {
        let endpoints = Arc::new(DefaultEndpoints::new(configuration.router.clone()));
        Self::with_endpoints(configuration, network, endpoints)
    }

    pub fn with_endpoints(
        configuration: SubscriptionConfiguration,
        network: Arc<Session>,
        endpoints: Arc<dyn EndpointFactory>,
    ) -> Arc<Self> {
        let retry = configuration
            .automatic_retry
            .clone()
            .map(|retry| Arc::new(retry) as Arc<dyn RetryCoordinator>);

        let session = Arc::new_cyclic(|me| Self {
            id: Uuid::new_v4(),
            me: me.clone(),
            configuration,
            network,
            endpoints,
            retry,
            state: Mutex::new(SubscriptionState::default()),
            polling: Mutex::new(LoopState::default()),
            cache: Mutex::new(MessageCache::new()),
            listeners: ListenerRegistry::new(),
            heartbeat: HeartbeatTimer::new(),
        });

        tracing::debug!(session_id = %session.id, "Subscription session created");
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn configuration(&self) -> &SubscriptionConfiguration {
        &self.configuration
    }

    pub fn network(&self) -> &Arc<Session> {
        &self.network
    }

    pub fn subscribed_channels(&self) -> Vec<String> {
        self.state.lock().channels.ids()
    }

    pub fn subscribed_groups(&self) -> Vec<String> {
        self.state.lock().groups.ids()
    }

    /// Number of subscribed channels plus channel groups.
    pub fn subscription_count(&self) -> usize {
        self.state.lock().total()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.state.lock().status
    }

    /// Cursor returned by the last successful long-poll.
    pub fn previous_cursor(&self) -> Option<SubscribeCursor> {
        self.state.lock().cursor
    }

    /// Presence state stored for subscribed channels and groups.
    pub fn presence_state(&self) -> Map<String, Value> {
        self.state.lock().presence_state()
    }

    /// Register a listener; see [`ListenerRegistry::add`].
    pub fn add_listener<L>(&self, listener: &Arc<L>) -> ListenerToken
    where
        L: SubscriptionListener + 'static,
    {
        self.listeners.add(listener)
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Subscribe to channels and channel groups.
    ///
    /// Entries already subscribed are merged. A change is announced to
    /// listeners, and the loop is (re)started when something changed or the
    /// session is not connected.
    pub fn subscribe(&self, request: SubscribeRequest) {
        if request.is_empty() {
            return;
        }

        let SubscribeRequest {
            channels,
            groups,
            timetoken,
            with_presence,
            presence_state,
        } = request;
        let channels = SubscribeRequest::entries(channels, with_presence, &presence_state);
        let groups = SubscribeRequest::entries(groups, with_presence, &presence_state);

        let (change, connected) = {
            let mut state = self.state.lock();
            let channels: Vec<Channel> = channels
                .into_iter()
                .filter(|channel| state.channels.insert(channel.clone()))
                .collect();
            let groups: Vec<Channel> = groups
                .into_iter()
                .filter(|group| state.groups.insert(group.clone()))
                .collect();

            (
                SubscriptionChangeEvent::Subscribed { channels, groups },
                state.status.is_connected(),
            )
        };

        let changed = change.did_change();
        if changed {
            tracing::debug!(
                channels = ?change.channel_ids(),
                groups = ?change.group_ids(),
                "Subscription changed"
            );
            self.emit(SubscriptionEvent::SubscriptionChanged(change));
        }

        if changed || !connected {
            self.reconnect(timetoken);
        }
    }

    /// Unsubscribe from channels and channel groups.
    ///
    /// With `presence_only` the entries stay subscribed and only stop
    /// receiving presence events.
    pub fn unsubscribe(&self, channels: &[&str], groups: &[&str], presence_only: bool) {
        let change = {
            let mut state = self.state.lock();
            if presence_only {
                SubscriptionChangeEvent::Unsubscribed {
                    channels: channels
                        .iter()
                        .filter_map(|id| state.channels.unsubscribe_presence(id))
                        .collect(),
                    groups: groups
                        .iter()
                        .filter_map(|id| state.groups.unsubscribe_presence(id))
                        .collect(),
                }
            } else {
                SubscriptionChangeEvent::Unsubscribed {
                    channels: channels
                        .iter()
                        .filter_map(|id| state.channels.remove(id))
                        .collect(),
                    groups: groups
                        .iter()
                        .filter_map(|id| state.groups.remove(id))
                        .collect(),
                }
            }
        };

        if change.did_change() {
            self.emit(SubscriptionEvent::SubscriptionChanged(change.clone()));
            self.unsubscribe_cleanup(&change, presence_only);
        }
    }

    pub fn unsubscribe_all(&self) {
        let change = {
            let mut state = self.state.lock();
            SubscriptionChangeEvent::Unsubscribed {
                channels: state.channels.drain(),
                groups: state.groups.drain(),
            }
        };

        if change.did_change() {
            self.emit(SubscriptionEvent::SubscriptionChanged(change.clone()));
            self.unsubscribe_cleanup(&change, false);
        }
    }

    fn unsubscribe_cleanup(&self, change: &SubscriptionChangeEvent, presence_only: bool) {
        if !self.configuration.suppress_leave_events {
            let (channels, groups) = change.entries();
            let names = |entries: &[Channel]| -> Vec<String> {
                entries
                    .iter()
                    .map(|entry| {
                        if presence_only {
                            entry.presence_id()
                        } else {
                            entry.id.clone()
                        }
                    })
                    .collect()
            };
            self.presence_leave(names(channels), names(groups));
        }

        let nothing_left = {
            let mut state = self.state.lock();
            if state.total() == 0 {
                state.cursor = None;
                true
            } else {
                false
            }
        };

        if nothing_left {
            self.disconnect();
        } else {
            self.reconnect(self.previous_timetoken());
        }
    }

    /// Start the loop, or restart it if a long-poll is in flight.
    pub fn reconnect(&self, timetoken: Option<u64>) {
        let starting = {
            let mut state = self.state.lock();
            if state.status.is_active() {
                false
            } else {
                state.status = ConnectionStatus::Connecting;
                true
            }
        };

        if starting {
            self.emit(SubscriptionEvent::ConnectionStatusChanged(
                ConnectionStatus::Connecting,
            ));
            self.perform_subscribe_loop(timetoken);
            self.register_heartbeat();
            return;
        }

        if self.polling.lock().long_polling {
            self.stop_subscribe_loop(Reason::LongPollingRestart);
        }
        self.perform_subscribe_loop(timetoken);
    }

    /// Cancel the in-flight long-poll and stop presence heartbeats.
    pub fn disconnect(&self) {
        self.stop_subscribe_loop(Reason::ClientCancelled);
        self.heartbeat.stop();
    }

    /// Cancel the in-flight long-poll with `reason`, along with every
    /// subscribe attempt the transport still has outstanding.
    ///
    /// A `LongPollingRestart` also retires the current loop, so its
    /// completion does not restart it again. Returns whether the session
    /// is still active.
    pub fn stop_subscribe_loop(&self, reason: Reason) -> bool {
        let request = {
            let mut polling = self.polling.lock();
            if reason == Reason::LongPollingRestart {
                polling.generation += 1;
                polling.long_polling = false;
                polling.request.take()
            } else {
                polling.request.clone()
            }
        };

        if let Some(request) = request {
            request.set_cancellation_reason(reason);
            request.cancel(None);
        }
        self.network
            .cancel_all_tasks(reason, Some(EndpointCategory::Subscribe));

        self.connection_status().is_active()
    }

    /// Issue the next long-poll for the current subscription.
    ///
    /// Does nothing when nothing is subscribed.
    pub fn perform_subscribe_loop(&self, timetoken: Option<u64>) {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!(session_id = %self.id, "No tokio runtime, subscribe loop not started");
            return;
        }

        let parameters = {
            let state = self.state.lock();
            SubscribeParameters {
                channels: state.channels.subscribed_names(),
                groups: state.groups.subscribed_names(),
                timetoken,
                region: state.cursor.map(|cursor| cursor.region),
                heartbeat: self.configuration.presence_timeout,
                filter: self.configuration.filter_expression.clone(),
                state: state.presence_state(),
            }
        };

        if parameters.channels.is_empty() && parameters.groups.is_empty() {
            return;
        }

        let router = self.endpoints.subscribe(parameters);
        let request = self.network.request_with_retry(router, self.retry.clone());

        let generation = {
            let mut polling = self.polling.lock();
            polling.generation += 1;
            polling.long_polling = true;
            polling.request = Some(request.clone());
            polling.generation
        };

        tracing::trace!(
            session_id = %self.id,
            request_id = %request.id(),
            generation,
            ?timetoken,
            "Starting long-poll"
        );

        let me = self.me.clone();
        request
            .validate_default()
            .response(SubscribeResponseDecoder, move |result| {
                if let Some(session) = me.upgrade() {
                    session.did_complete_long_poll(generation, result);
                }
            });
        request.resume();
    }

    fn did_complete_long_poll(
        &self,
        generation: u64,
        result: Result<Response<SubscribeResponse>, PubSubError>,
    ) {
        let current = {
            let mut polling = self.polling.lock();
            let current = polling.generation == generation;
            if current {
                polling.long_polling = false;
            }
            current
        };

        match result {
            Ok(response) if current => self.did_receive(response.payload),
            Ok(_) => {
                tracing::debug!(generation, "Discarding response of a superseded long-poll");
            }
            Err(error) => {
                self.emit(SubscriptionEvent::SubscribeError(error.clone()));
                if current {
                    self.did_fail(&error);
                }
            }
        }
    }

    fn did_fail(&self, error: &PubSubError) {
        let voluntary = matches!(
            error.reason(),
            Reason::ClientCancelled | Reason::LongPollingRestart
        );

        if voluntary {
            if self.subscription_count() == 0 {
                self.set_connection_status(ConnectionStatus::Disconnected);
            } else {
                self.reconnect(self.previous_timetoken());
            }
        } else {
            tracing::warn!(reason = %error.reason(), "Long-poll failed, reconnecting");
            self.set_connection_status(ConnectionStatus::DisconnectedUnexpectedly);
            self.reconnect(self.previous_timetoken());
        }
    }

    fn did_receive(&self, payload: SubscribeResponse) {
        self.register_heartbeat();

        let connected = {
            let mut state = self.state.lock();
            if state.status == ConnectionStatus::Connecting {
                state.status = ConnectionStatus::Connected;
                true
            } else {
                false
            }
        };
        if connected {
            self.emit(SubscriptionEvent::ConnectionStatusChanged(
                ConnectionStatus::Connected,
            ));
        }

        if payload.messages.len() >= MAXIMUM_MESSAGE_COUNT {
            self.emit(SubscriptionEvent::SubscribeError(PubSubError::new(
                Reason::MessageCountExceededMaximum,
                EndpointCategory::Subscribe,
            )));
        }

        for item in &payload.messages {
            self.dispatch_item(item);
        }

        self.state.lock().cursor = Some(payload.cursor);
        self.perform_subscribe_loop(Some(payload.cursor.timetoken));
    }

    fn dispatch_item(&self, item: &SubscribeItem) {
        match item.kind() {
            ItemKind::Message => {
                self.emit_unique(SubscriptionEvent::MessageReceived(MessageEvent::from(item)))
            }
            ItemKind::Signal => {
                self.emit_unique(SubscriptionEvent::SignalReceived(MessageEvent::from(item)))
            }
            ItemKind::Presence => match PresenceEvent::decode(item) {
                Ok(presence) => {
                    if let Some(own) = presence.state_of(self.configuration.user_id()) {
                        self.store_own_state(&presence, own.clone());
                    }
                    self.emit(SubscriptionEvent::PresenceChanged(presence));
                }
                Err(error) => self.emit_decode_failure(item, error),
            },
            ItemKind::Object => match ObjectEvent::decode(item) {
                Ok(object) => self.emit(SubscriptionEvent::Object(object)),
                Err(error) => self.emit_decode_failure(item, error),
            },
            ItemKind::MessageAction => match MessageAction::decode(item) {
                Ok((MessageActionKind::Added, action)) => {
                    self.emit(SubscriptionEvent::MessageActionAdded(action))
                }
                Ok((MessageActionKind::Removed, action)) => {
                    self.emit(SubscriptionEvent::MessageActionRemoved(action))
                }
                Err(error) => self.emit_decode_failure(item, error),
            },
        }
    }

    fn store_own_state(&self, presence: &PresenceEvent, own: Value) {
        let mut state = self.state.lock();
        if state.channels.update_state(&presence.channel, own.clone()) {
            return;
        }
        if let Some(group) = &presence.subscription {
            state.groups.update_state(group, own);
        }
    }

    /// Emit a message or signal unless it was already delivered.
    fn emit_unique(&self, event: SubscriptionEvent) {
        let fresh = self.cache.lock().insert(event.clone());
        if fresh {
            self.emit(event);
        } else {
            tracing::trace!("Dropping duplicate message");
        }
    }

    fn emit_decode_failure(&self, item: &SubscribeItem, error: serde_json::Error) {
        let error = PubSubError::new(Reason::JsonDataDecodingFailure, EndpointCategory::Subscribe)
            .with_underlying(error)
            .with_affected(vec![AffectedValue::Json(item.payload.clone())]);
        self.emit(SubscriptionEvent::SubscribeError(error));
    }

    fn presence_leave(&self, channels: Vec<String>, groups: Vec<String>) {
        if channels.is_empty() && groups.is_empty() {
            return;
        }

        let request = self
            .network
            .request(self.endpoints.leave(channels.clone(), groups.clone()));
        let me = self.me.clone();
        request.validate_default().response_raw(move |result| match result {
            Ok(_) => {
                if !channels.is_empty() {
                    tracing::info!(?channels, "Presence leave successful on channels");
                }
                if !groups.is_empty() {
                    tracing::info!(?groups, "Presence leave successful on groups");
                }
            }
            Err(error) => {
                if let Some(session) = me.upgrade() {
                    session.emit(SubscriptionEvent::SubscribeError(PubSubError::event(
                        Arc::new(error),
                        EndpointCategory::Leave,
                    )));
                }
            }
        });
        request.resume();
    }

    fn register_heartbeat(&self) {
        let interval = Duration::from_secs(self.configuration.heartbeat_interval.into());
        let me = self.me.clone();
        self.heartbeat.register(interval, move || match me.upgrade() {
            Some(session) => {
                session.perform_heartbeat();
                true
            }
            None => false,
        });
    }

    /// Announce presence on everything subscribed.
    pub fn perform_heartbeat(&self) {
        let (channels, groups, state) = {
            let state = self.state.lock();
            (state.channels.ids(), state.groups.ids(), state.presence_state())
        };
        if channels.is_empty() && groups.is_empty() {
            return;
        }

        let router = self.endpoints.heartbeat(
            channels,
            groups,
            self.configuration.presence_timeout,
            state,
        );
        let request = self.network.request(router);
        let me = self.me.clone();
        request.validate_default().response_raw(move |result| match result {
            Ok(_) => tracing::debug!("Presence heartbeat succeeded"),
            Err(error) => {
                if let Some(session) = me.upgrade() {
                    session.emit(SubscriptionEvent::SubscribeError(PubSubError::event(
                        Arc::new(error),
                        EndpointCategory::Heartbeat,
                    )));
                }
            }
        });
        request.resume();
    }

    fn previous_timetoken(&self) -> Option<u64> {
        self.previous_cursor().map(|cursor| cursor.timetoken)
    }

    /// Store `status`; listeners hear about it only if it changed.
    fn set_connection_status(&self, status: ConnectionStatus) {
        let changed = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.status, status) != status
        };

        if changed {
            tracing::debug!(session_id = %self.id, %status, "Connection status changed");
            self.emit(SubscriptionEvent::ConnectionStatusChanged(status));
        }
    }

    fn emit(&self, event: SubscriptionEvent) {
        self.listeners.emit(&event);
    }
}

impl Drop for SubscriptionSession {
    fn drop(&mut self) {
        tracing::debug!(session_id = %self.id, "Subscription session destroyed");
        self.heartbeat.stop();
        self.network.invalidate_and_cancel();
    }
}

impl PartialEq for SubscriptionSession {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubscriptionSession {}

impl Hash for SubscriptionSession {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for SubscriptionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for SubscriptionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SubscriptionSession")
            .field("id", &self.id)
            .field("status", &state.status)
            .field("channels", &state.channels.ids())
            .field("groups", &state.groups.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubsub_request::testing::MockTransport;
    use serde_json::json;

    fn session() -> Arc<SubscriptionSession> {
        let network = Arc::new(Session::new(Arc::new(MockTransport::new())));
        SubscriptionSession::new(SubscriptionConfiguration::new("sub-key", "user-1"), network)
    }

    #[test]
    fn test_subscribe_request_builder() {
        let request = SubscribeRequest::new()
            .channels(["a", "b"])
            .groups(vec![String::from("g")])
            .at(15)
            .with_presence()
            .state("a", json!({"mood": "ok"}));

        assert_eq!(request.channels, vec!["a", "b"]);
        assert_eq!(request.groups, vec!["g"]);
        assert_eq!(request.timetoken, Some(15));
        assert!(request.with_presence);
        assert!(!request.is_empty());
        assert!(SubscribeRequest::new().is_empty());
    }

    #[test]
    fn test_status_change_emits_only_on_change() {
        let session = session();
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        let listener = Arc::new(move |event: &SubscriptionEvent| seen.lock().push(event.clone()));
        let _token = session.add_listener(&listener);

        session.set_connection_status(ConnectionStatus::Connected);
        session.set_connection_status(ConnectionStatus::Connected);
        session.set_connection_status(ConnectionStatus::Disconnected);

        assert_eq!(
            *events.lock(),
            vec![
                SubscriptionEvent::ConnectionStatusChanged(ConnectionStatus::Connected),
                SubscriptionEvent::ConnectionStatusChanged(ConnectionStatus::Disconnected),
            ]
        );
    }

    #[test]
    fn test_subscribe_without_runtime_keeps_state() {
        let session = session();
        session.subscribe(SubscribeRequest::new().channels(["a"]));

        assert_eq!(session.subscribed_channels(), vec!["a"]);
        assert_eq!(session.connection_status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn test_presence_state_is_collected_from_channels_and_groups() {
        let session = session();
        {
            let mut state = session.state.lock();
            state.channels.insert(Channel::new("a", false, Some(json!(1))));
            state.groups.insert(Channel::new("g", false, Some(json!(2))));
        }

        let states = session.presence_state();
        assert_eq!(states.get("a"), Some(&json!(1)));
        assert_eq!(states.get("g"), Some(&json!(2)));
    }
}
