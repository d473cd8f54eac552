//! `reqwest`-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use pubsub_error::{EndpointCategory, TransportError, TransportErrorKind};

use super::{CategoryCancellation, Transport, TransportResponse};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Transport over a shared `reqwest::Client`.
///
/// Long-poll subscribe attempts get their own, longer timeout.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: ::reqwest::Client,
    request_timeout: Duration,
    subscribe_timeout: Duration,
    cancellation: CategoryCancellation,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Duration, subscribe_timeout: Duration) -> Result<Self, TransportError> {
        let client = ::reqwest::Client::builder()
            .build()
            .map_err(map_reqwest_error)?;

        Ok(Self::with_client(client, request_timeout, subscribe_timeout))
    }

    pub fn with_client(
        client: ::reqwest::Client,
        request_timeout: Duration,
        subscribe_timeout: Duration,
    ) -> Self {
        Self {
            client,
            request_timeout,
            subscribe_timeout,
            cancellation: CategoryCancellation::new(),
        }
    }

    fn timeout_for(&self, category: EndpointCategory) -> Duration {
        match category {
            EndpointCategory::Subscribe => self.subscribe_timeout,
            _ => self.request_timeout,
        }
    }

    async fn send(
        &self,
        request: HttpRequest,
        category: EndpointCategory,
    ) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), request.url.clone())
            .timeout(self.timeout_for(category));

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(TransportResponse {
            response: HttpResponse { status, headers },
            body,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: HttpRequest,
        category: EndpointCategory,
    ) -> Result<TransportResponse, TransportError> {
        tracing::trace!(%category, url = %request.url, "Sending request");
        self.cancellation
            .run(category, self.send(request, category))
            .await
    }

    fn cancel_all(&self, category: EndpointCategory) {
        self.cancellation.cancel(category);
    }
}

fn to_reqwest_method(method: HttpMethod) -> ::reqwest::Method {
    match method {
        HttpMethod::Get => ::reqwest::Method::GET,
        HttpMethod::Post => ::reqwest::Method::POST,
        HttpMethod::Put => ::reqwest::Method::PUT,
        HttpMethod::Patch => ::reqwest::Method::PATCH,
        HttpMethod::Delete => ::reqwest::Method::DELETE,
        HttpMethod::Head => ::reqwest::Method::HEAD,
        HttpMethod::Options => ::reqwest::Method::OPTIONS,
    }
}

fn map_reqwest_error(error: ::reqwest::Error) -> TransportError {
    let kind = if error.is_timeout() {
        TransportErrorKind::TimedOut
    } else if error.is_connect() {
        TransportErrorKind::CannotConnectToHost
    } else if error.is_builder() {
        TransportErrorKind::BadUrl
    } else if error.is_redirect() {
        TransportErrorKind::BadServerResponse
    } else if error.is_decode() || error.is_body() {
        TransportErrorKind::CannotDecodeContentData
    } else if error.is_request() {
        TransportErrorKind::NetworkConnectionLost
    } else {
        TransportErrorKind::Other
    };

    TransportError::new(kind, error.to_string())
}
