//! PubSub - Main entry point for the SDK

use std::sync::Arc;

use pubsub_request::{
    ReqwestTransport, Response, ResponseDecoder, Router, Session, Transport,
};
use pubsub_stream::{
    ConnectionStatus, ListenerToken, SubscribeRequest, SubscriptionConfiguration,
    SubscriptionListener, SubscriptionSession,
};

use crate::registry::SessionRegistry;
use crate::Result;

/// Client for the pubsub service.
///
/// Owns a network session for one-shot requests and a subscription session
/// for the long-poll loop. Both share one transport.
///
/// # Example
///
/// ```rust,ignore
/// use pubsub_sdk::prelude::*;
///
/// let client = PubSub::new(SubscriptionConfiguration::new("sub-key", "user-1"))?;
/// let (listener, mut events) = ChannelListener::new();
/// let _token = client.add_listener(&listener);
///
/// client.subscribe(SubscribeRequest::new().channels(["lobby"]).with_presence());
/// while let Some(event) = events.next_event().await {
///     println!("{event:?}");
/// }
/// ```
pub struct PubSub {
    configuration: SubscriptionConfiguration,
    network: Arc<Session>,
    subscription: Arc<SubscriptionSession>,
}

impl PubSub {
    /// Create a client talking HTTP through `reqwest`.
    pub fn new(configuration: SubscriptionConfiguration) -> Result<Self> {
        configuration.validate()?;
        let transport = ReqwestTransport::new(
            configuration.non_subscribe_request_timeout,
            configuration.minimum_subscribe_timeout,
        )?;
        Self::with_transport(configuration, Arc::new(transport))
    }

    pub fn with_transport(
        configuration: SubscriptionConfiguration,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        configuration.validate()?;
        let subscription = SubscriptionSession::new(
            configuration.clone(),
            Arc::new(Session::new(Arc::clone(&transport))),
        );
        Ok(Self::assemble(configuration, transport, subscription))
    }

    /// Create a client whose subscription session is shared through
    /// `registry` with other clients of an equal configuration.
    pub fn with_registry(
        configuration: SubscriptionConfiguration,
        transport: Arc<dyn Transport>,
        registry: &SessionRegistry,
    ) -> Result<Self> {
        configuration.validate()?;
        let subscription = registry.session(&configuration, || {
            Arc::new(Session::new(Arc::clone(&transport)))
        });
        Ok(Self::assemble(configuration, transport, subscription))
    }

    fn assemble(
        configuration: SubscriptionConfiguration,
        transport: Arc<dyn Transport>,
        subscription: Arc<SubscriptionSession>,
    ) -> Self {
        tracing::debug!(
            subscription_id = %subscription.id(),
            user_id = configuration.user_id(),
            "PubSub client created"
        );
        Self {
            configuration,
            network: Arc::new(Session::new(transport)),
            subscription,
        }
    }

    pub fn configuration(&self) -> &SubscriptionConfiguration {
        &self.configuration
    }

    pub fn subscription(&self) -> &Arc<SubscriptionSession> {
        &self.subscription
    }

    pub fn subscribe(&self, request: SubscribeRequest) {
        self.subscription.subscribe(request);
    }

    pub fn unsubscribe(&self, channels: &[&str], groups: &[&str]) {
        self.subscription.unsubscribe(channels, groups, false);
    }

    /// Stop receiving presence events for the given entries.
    pub fn unsubscribe_presence(&self, channels: &[&str], groups: &[&str]) {
        self.subscription.unsubscribe(channels, groups, true);
    }

    pub fn unsubscribe_all(&self) {
        self.subscription.unsubscribe_all();
    }

    pub fn reconnect(&self, timetoken: Option<u64>) {
        self.subscription.reconnect(timetoken);
    }

    pub fn disconnect(&self) {
        self.subscription.disconnect();
    }

    pub fn add_listener<L>(&self, listener: &Arc<L>) -> ListenerToken
    where
        L: SubscriptionListener + 'static,
    {
        self.subscription.add_listener(listener)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.subscription.connection_status()
    }

    pub fn subscribed_channels(&self) -> Vec<String> {
        self.subscription.subscribed_channels()
    }

    pub fn subscribed_groups(&self) -> Vec<String> {
        self.subscription.subscribed_groups()
    }

    /// Send a one-shot request and decode its response.
    pub async fn request<D>(
        &self,
        router: Arc<dyn Router>,
        decoder: D,
    ) -> Result<Response<D::Payload>>
    where
        D: ResponseDecoder,
    {
        let request = self.network.request(router);
        request.validate_default().resume();
        Ok(request.response_async(decoder).await?)
    }
}

impl Drop for PubSub {
    fn drop(&mut self) {
        self.network.invalidate_and_cancel();
    }
}

impl std::fmt::Debug for PubSub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSub")
            .field("user_id", &self.configuration.user_id())
            .field("subscription", &self.subscription)
            .finish()
    }
}
