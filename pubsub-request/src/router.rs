//! Endpoint descriptions.
//!
//! A [`Router`] describes one logical operation: its endpoint category,
//! method, path, query and body. [`as_http_request`] assembles those pieces
//! into an [`HttpRequest`] using the shared [`RouterConfiguration`].

use std::fmt;

use bytes::Bytes;
use pubsub_error::{EndpointCategory, GenericServicePayload, PubSubError, Reason};
use url::Url;

use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Settings shared by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouterConfiguration {
    /// Host name requests are sent to
    /// Default: "ps.pndsn.com"
    pub origin: String,

    /// Use https instead of http
    /// Default: true
    pub use_secure_connections: bool,

    /// Key used when publishing
    pub publish_key: Option<String>,

    /// Key used when subscribing
    pub subscribe_key: Option<String>,

    /// Identity of this client
    pub user_id: String,

    /// Access token attached to every request when set
    pub auth_key: Option<String>,

    /// Append a `requestid` query parameter to every attempt
    /// Default: false
    pub use_request_id: bool,
}

impl Default for RouterConfiguration {
    fn default() -> Self {
        Self {
            origin: "ps.pndsn.com".to_string(),
            use_secure_connections: true,
            publish_key: None,
            subscribe_key: None,
            user_id: String::new(),
            auth_key: None,
            use_request_id: false,
        }
    }
}

impl RouterConfiguration {
    pub fn new(subscribe_key: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            subscribe_key: Some(subscribe_key.into()),
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn url_scheme(&self) -> &'static str {
        if self.use_secure_connections {
            "https"
        } else {
            "http"
        }
    }

    /// True when a non-empty subscribe key is configured.
    pub fn subscribe_key_exists(&self) -> bool {
        self.subscribe_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    /// True when a non-empty publish key is configured.
    pub fn publish_key_exists(&self) -> bool {
        self.publish_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    /// Query items every endpoint carries: the user id and, when set, the
    /// auth key.
    pub fn default_query_items(&self) -> Vec<(String, String)> {
        let mut items = vec![("uuid".to_string(), self.user_id.clone())];
        if let Some(auth) = self.auth_key.as_ref().filter(|key| !key.is_empty()) {
            items.push(("auth".to_string(), auth.clone()));
        }
        items
    }
}

/// Description of one endpoint operation.
pub trait Router: Send + Sync + fmt::Debug {
    /// The category requests for this endpoint are tagged with.
    fn endpoint(&self) -> EndpointCategory;

    fn configuration(&self) -> &RouterConfiguration;

    fn method(&self) -> HttpMethod {
        HttpMethod::Get
    }

    /// Unencoded path segments; each is percent-encoded on assembly.
    fn path_segments(&self) -> Result<Vec<String>, PubSubError>;

    fn query_items(&self) -> Result<Vec<(String, String)>, PubSubError> {
        Ok(self.configuration().default_query_items())
    }

    fn headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn body(&self) -> Result<Option<Bytes>, PubSubError> {
        Ok(None)
    }

    /// A reason this router cannot produce a request at all.
    fn validation_error(&self) -> Option<PubSubError> {
        None
    }

    /// Decode the error carried in a non-success response body.
    fn decode_error(
        &self,
        request: &HttpRequest,
        response: &HttpResponse,
        data: &[u8],
    ) -> Option<PubSubError> {
        Some(decode_default_error(
            self.endpoint(),
            request,
            response,
            data,
        ))
    }
}

/// Decode a generic service error payload.
///
/// The payload's reason wins over the status code; a body that is not a
/// service payload falls back to the status code alone.
pub fn decode_default_error(
    endpoint: EndpointCategory,
    request: &HttpRequest,
    response: &HttpResponse,
    data: &[u8],
) -> PubSubError {
    match GenericServicePayload::decode(data) {
        Ok(payload) => PubSubError::from_service_payload(
            &payload,
            endpoint,
            response.status,
            Some(request.affected()),
        ),
        Err(_) => PubSubError::from_status(endpoint, response.status, Some(request.affected())),
    }
}

/// Assemble the HTTP request a router describes.
pub fn as_http_request(router: &dyn Router) -> Result<HttpRequest, PubSubError> {
    if let Some(error) = router.validation_error() {
        return Err(error);
    }

    let config = router.configuration();
    let base = format!("{}://{}", config.url_scheme(), config.origin);
    let mut url = Url::parse(&base).map_err(|error| {
        PubSubError::new(Reason::InvalidUrl, router.endpoint())
            .with_underlying(error)
            .with_details(vec![format!("origin: {}", config.origin)])
    })?;

    let segments = router.path_segments()?;
    url.path_segments_mut()
        .map_err(|_| PubSubError::new(Reason::InvalidUrl, router.endpoint()))?
        .clear()
        .extend(segments.iter());

    let query = router.query_items()?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query.iter());
    }

    Ok(HttpRequest {
        method: router.method(),
        url,
        headers: router.headers(),
        body: router.body()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TimeRouter {
        config: RouterConfiguration,
        channel: String,
    }

    impl Router for TimeRouter {
        fn endpoint(&self) -> EndpointCategory {
            EndpointCategory::Time
        }

        fn configuration(&self) -> &RouterConfiguration {
            &self.config
        }

        fn path_segments(&self) -> Result<Vec<String>, PubSubError> {
            Ok(vec!["time".to_string(), self.channel.clone()])
        }
    }

    fn config() -> RouterConfiguration {
        RouterConfiguration {
            auth_key: Some("secret".to_string()),
            ..RouterConfiguration::new("sub-key", "user-1")
        }
    }

    #[test]
    fn test_as_http_request_encodes_segments_and_query() {
        let router = TimeRouter {
            config: config(),
            channel: "a/b c".to_string(),
        };
        let request = as_http_request(&router).unwrap();

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url.scheme(), "https");
        assert_eq!(request.url.host_str(), Some("ps.pndsn.com"));
        assert_eq!(request.url.path(), "/time/a%2Fb%20c");
        assert_eq!(request.query_value("uuid").as_deref(), Some("user-1"));
        assert_eq!(request.query_value("auth").as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_origin_is_invalid_url() {
        let router = TimeRouter {
            config: RouterConfiguration {
                origin: "bad host".to_string(),
                ..config()
            },
            channel: "0".to_string(),
        };
        let error = as_http_request(&router).unwrap_err();
        assert_eq!(error.reason(), Reason::InvalidUrl);
    }

    #[test]
    fn test_default_decode_error_prefers_payload() {
        let router = TimeRouter {
            config: config(),
            channel: "0".to_string(),
        };
        let request = as_http_request(&router).unwrap();

        let error = router
            .decode_error(
                &request,
                &HttpResponse::new(400),
                br#"{"status": 400, "message": "Invalid Subscribe Key", "error": true}"#,
            )
            .unwrap();
        assert_eq!(error.reason(), Reason::InvalidSubscribeKey);

        let error = router
            .decode_error(&request, &HttpResponse::new(404), b"not json")
            .unwrap();
        assert_eq!(error.reason(), Reason::ResourceNotFound);
    }

    #[test]
    fn test_key_presence() {
        let mut config = config();
        assert!(config.subscribe_key_exists());
        assert!(!config.publish_key_exists());
        config.publish_key = Some(String::new());
        assert!(!config.publish_key_exists());
    }
}
