//! Test helpers for driving a subscription session against a scripted
//! transport and observing the events it emits.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pubsub_error::EndpointCategory;
use pubsub_request::testing::{MockOutcome, MockTransport};
use pubsub_request::{HttpRequest, Session};
use pubsub_stream::{
    ChannelListener, ConnectionStatus, EventStream, ListenerToken, MessageEvent,
    SubscriptionConfiguration, SubscriptionEvent, SubscriptionSession,
};
use serde_json::{json, Value};

pub const WAIT: Duration = Duration::from_secs(2);

/// A session wired to a [`MockTransport`] with one channel listener.
pub struct Harness {
    pub transport: Arc<MockTransport>,
    pub session: Arc<SubscriptionSession>,
    pub events: EventStream,
    listener: Arc<ChannelListener>,
    token: ListenerToken,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_configuration(SubscriptionConfiguration::new("sub-key", "user-1"))
    }

    pub fn with_configuration(configuration: SubscriptionConfiguration) -> Self {
        let transport = Arc::new(MockTransport::new());
        transport.set_default(EndpointCategory::Leave, MockOutcome::ok(r#"{"status":200}"#));

        let network = Arc::new(Session::new(transport.clone()));
        let session = SubscriptionSession::new(configuration, network);
        let (listener, events) = ChannelListener::new();
        let token = session.add_listener(&listener);

        Self {
            transport,
            session,
            events,
            listener,
            token,
        }
    }

    /// Queue a successful long-poll response.
    pub fn respond(&self, timetoken: u64, messages: Vec<Value>) {
        self.transport.enqueue(
            EndpointCategory::Subscribe,
            MockOutcome::ok(subscribe_body(timetoken, messages)),
        );
    }

    /// Collect events until one matches `predicate`, inclusive.
    ///
    /// Panics if no matching event arrives in time.
    pub async fn wait_for<F>(&mut self, predicate: F) -> Vec<SubscriptionEvent>
    where
        F: Fn(&SubscriptionEvent) -> bool,
    {
        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(WAIT, self.events.next_event())
                .await
                .expect("timed out waiting for event")
                .expect("event stream closed");
            let done = predicate(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    pub async fn wait_for_status(&mut self, status: ConnectionStatus) -> Vec<SubscriptionEvent> {
        self.wait_for(|event| *event == SubscriptionEvent::ConnectionStatusChanged(status))
            .await
    }

    /// Events already queued.
    pub fn drain(&mut self) -> Vec<SubscriptionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.events.try_next_event() {
            events.push(event);
        }
        events
    }

    /// Wait until `count` long-polls have been sent.
    pub async fn wait_for_polls(&self, count: usize) -> bool {
        self.transport
            .wait_for_requests(EndpointCategory::Subscribe, count, WAIT)
            .await
    }

    pub fn polls(&self) -> Vec<HttpRequest> {
        self.transport.requests(EndpointCategory::Subscribe)
    }

    pub fn last_poll(&self) -> HttpRequest {
        self.polls().pop().expect("no long-poll was sent")
    }
}

pub fn subscribe_body(timetoken: u64, messages: Vec<Value>) -> String {
    json!({
        "t": {"t": timetoken.to_string(), "r": 1},
        "m": messages,
    })
    .to_string()
}

pub fn message(channel: &str, payload: Value, timetoken: u64) -> Value {
    json!({
        "c": channel,
        "d": payload,
        "i": "publisher",
        "p": {"t": timetoken.to_string(), "r": 1},
    })
}

pub fn typed_item(channel: &str, message_type: u8, payload: Value) -> Value {
    json!({
        "c": channel,
        "d": payload,
        "e": message_type,
        "i": "publisher",
        "p": {"t": "1", "r": 1},
    })
}

pub fn received_messages(events: &[SubscriptionEvent]) -> Vec<&MessageEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            SubscriptionEvent::MessageReceived(message) => Some(message),
            _ => None,
        })
        .collect()
}

pub fn statuses(events: &[SubscriptionEvent]) -> Vec<ConnectionStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            SubscriptionEvent::ConnectionStatusChanged(status) => Some(*status),
            _ => None,
        })
        .collect()
}
