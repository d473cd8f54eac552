//! Routers for the endpoints a subscription session calls.
//!
//! [`EndpointFactory`] is the seam: sessions ask it for a router per
//! request, and [`DefaultEndpoints`] builds the standard ones.

use std::fmt;
use std::sync::Arc;

use pubsub_error::{EndpointCategory, PubSubError, Reason};
use pubsub_request::{Router, RouterConfiguration};
use serde_json::{Map, Value};

/// What one long-poll asks for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscribeParameters {
    /// Channel names, presence companions included
    pub channels: Vec<String>,
    /// Channel group names, presence companions included
    pub groups: Vec<String>,
    pub timetoken: Option<u64>,
    pub region: Option<u32>,
    /// Presence timeout in seconds
    pub heartbeat: Option<u32>,
    pub filter: Option<String>,
    /// Presence state keyed by channel or group name
    pub state: Map<String, Value>,
}

/// Builds the routers a subscription session needs.
pub trait EndpointFactory: Send + Sync + fmt::Debug {
    fn subscribe(&self, parameters: SubscribeParameters) -> Arc<dyn Router>;

    fn leave(&self, channels: Vec<String>, groups: Vec<String>) -> Arc<dyn Router>;

    fn heartbeat(
        &self,
        channels: Vec<String>,
        groups: Vec<String>,
        timeout: Option<u32>,
        state: Map<String, Value>,
    ) -> Arc<dyn Router>;
}

/// The standard subscribe and presence endpoints.
#[derive(Debug, Clone)]
pub struct DefaultEndpoints {
    config: RouterConfiguration,
}

impl DefaultEndpoints {
    pub fn new(config: RouterConfiguration) -> Self {
        Self { config }
    }
}

impl EndpointFactory for DefaultEndpoints {
    fn subscribe(&self, parameters: SubscribeParameters) -> Arc<dyn Router> {
        Arc::new(SubscribeRouter {
            config: self.config.clone(),
            parameters,
        })
    }

    fn leave(&self, channels: Vec<String>, groups: Vec<String>) -> Arc<dyn Router> {
        Arc::new(PresenceRouter {
            config: self.config.clone(),
            kind: PresenceKind::Leave,
            channels,
            groups,
            timeout: None,
            state: Map::new(),
        })
    }

    fn heartbeat(
        &self,
        channels: Vec<String>,
        groups: Vec<String>,
        timeout: Option<u32>,
        state: Map<String, Value>,
    ) -> Arc<dyn Router> {
        Arc::new(PresenceRouter {
            config: self.config.clone(),
            kind: PresenceKind::Heartbeat,
            channels,
            groups,
            timeout,
            state,
        })
    }
}

/// `GET /v2/subscribe/{sub_key}/{channels}/0`
#[derive(Debug, Clone)]
pub struct SubscribeRouter {
    config: RouterConfiguration,
    parameters: SubscribeParameters,
}

impl SubscribeRouter {
    pub fn parameters(&self) -> &SubscribeParameters {
        &self.parameters
    }
}

impl Router for SubscribeRouter {
    fn endpoint(&self) -> EndpointCategory {
        EndpointCategory::Subscribe
    }

    fn configuration(&self) -> &RouterConfiguration {
        &self.config
    }

    fn path_segments(&self) -> Result<Vec<String>, PubSubError> {
        Ok(vec![
            "v2".to_string(),
            "subscribe".to_string(),
            subscribe_key(&self.config),
            channel_path(&self.parameters.channels),
            "0".to_string(),
        ])
    }

    fn query_items(&self) -> Result<Vec<(String, String)>, PubSubError> {
        let parameters = &self.parameters;
        let mut query = self.config.default_query_items();

        push_groups(&mut query, &parameters.groups);
        if let Some(timetoken) = parameters.timetoken {
            query.push(("tt".to_string(), timetoken.to_string()));
        }
        if let Some(region) = parameters.region {
            query.push(("tr".to_string(), region.to_string()));
        }
        if let Some(heartbeat) = parameters.heartbeat {
            query.push(("heartbeat".to_string(), heartbeat.to_string()));
        }
        if let Some(filter) = parameters.filter.as_ref().filter(|f| !f.is_empty()) {
            query.push(("filter-expr".to_string(), filter.clone()));
        }
        push_state(&mut query, &parameters.state, self.endpoint())?;

        Ok(query)
    }

    fn validation_error(&self) -> Option<PubSubError> {
        missing_parameters(
            &self.config,
            &self.parameters.channels,
            &self.parameters.groups,
            self.endpoint(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PresenceKind {
    Leave,
    Heartbeat,
}

/// `GET /v2/presence/sub-key/{sub_key}/channel/{channels}/{leave|heartbeat}`
#[derive(Debug, Clone)]
pub struct PresenceRouter {
    config: RouterConfiguration,
    kind: PresenceKind,
    channels: Vec<String>,
    groups: Vec<String>,
    timeout: Option<u32>,
    state: Map<String, Value>,
}

impl Router for PresenceRouter {
    fn endpoint(&self) -> EndpointCategory {
        match self.kind {
            PresenceKind::Leave => EndpointCategory::Leave,
            PresenceKind::Heartbeat => EndpointCategory::Heartbeat,
        }
    }

    fn configuration(&self) -> &RouterConfiguration {
        &self.config
    }

    fn path_segments(&self) -> Result<Vec<String>, PubSubError> {
        let action = match self.kind {
            PresenceKind::Leave => "leave",
            PresenceKind::Heartbeat => "heartbeat",
        };

        Ok(vec![
            "v2".to_string(),
            "presence".to_string(),
            "sub-key".to_string(),
            subscribe_key(&self.config),
            "channel".to_string(),
            channel_path(&self.channels),
            action.to_string(),
        ])
    }

    fn query_items(&self) -> Result<Vec<(String, String)>, PubSubError> {
        let mut query = self.config.default_query_items();
        push_groups(&mut query, &self.groups);
        if let Some(timeout) = self.timeout {
            query.push(("heartbeat".to_string(), timeout.to_string()));
        }
        push_state(&mut query, &self.state, self.endpoint())?;
        Ok(query)
    }

    fn validation_error(&self) -> Option<PubSubError> {
        missing_parameters(&self.config, &self.channels, &self.groups, self.endpoint())
    }
}

fn subscribe_key(config: &RouterConfiguration) -> String {
    config.subscribe_key.clone().unwrap_or_default()
}

/// Comma separated names; a lone comma when there are none.
fn channel_path(channels: &[String]) -> String {
    if channels.is_empty() {
        ",".to_string()
    } else {
        channels.join(",")
    }
}

fn push_groups(query: &mut Vec<(String, String)>, groups: &[String]) {
    if !groups.is_empty() {
        query.push(("channel-group".to_string(), groups.join(",")));
    }
}

fn push_state(
    query: &mut Vec<(String, String)>,
    state: &Map<String, Value>,
    endpoint: EndpointCategory,
) -> Result<(), PubSubError> {
    if state.is_empty() {
        return Ok(());
    }

    let encoded = serde_json::to_string(state).map_err(|error| {
        PubSubError::new(Reason::JsonStringEncodingFailure, endpoint).with_underlying(error)
    })?;
    query.push(("state".to_string(), encoded));
    Ok(())
}

fn missing_parameters(
    config: &RouterConfiguration,
    channels: &[String],
    groups: &[String],
    endpoint: EndpointCategory,
) -> Option<PubSubError> {
    if !config.subscribe_key_exists() {
        return Some(PubSubError::new(Reason::MissingSubscribeKey, endpoint));
    }
    if channels.is_empty() && groups.is_empty() {
        return Some(
            PubSubError::new(Reason::MissingRequiredParameter, endpoint)
                .with_details(vec!["at least one channel or group is required".to_string()]),
        );
    }
    None
}
