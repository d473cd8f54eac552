//! Decoding completed responses into typed payloads.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use pubsub_error::{PubSubError, Reason};
use serde::de::DeserializeOwned;

use crate::http::{HttpRequest, HttpResponse};
use crate::router::Router;

/// A completed exchange together with its payload.
#[derive(Clone)]
pub struct Response<T> {
    pub router: Arc<dyn Router>,
    pub request: HttpRequest,
    pub response: HttpResponse,
    /// Raw body bytes as received
    pub data: Bytes,
    pub payload: T,
}

impl<T> Response<T> {
    /// Replace the payload, keeping the exchange.
    pub fn with_payload<U>(self, payload: U) -> Response<U> {
        Response {
            router: self.router,
            request: self.request,
            response: self.response,
            data: self.data,
            payload,
        }
    }

    /// Build an error tied to this exchange.
    pub fn error(&self, reason: Reason) -> PubSubError {
        PubSubError::new(reason, self.router.endpoint()).with_affected(vec![
            self.request.affected(),
            pubsub_error::AffectedValue::Response {
                status: self.response.status,
            },
        ])
    }
}

impl<T: fmt::Debug> fmt::Debug for Response<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("endpoint", &self.router.endpoint())
            .field("url", &self.request.url.as_str())
            .field("status", &self.response.status)
            .field("payload", &self.payload)
            .finish()
    }
}

/// Turns a raw response into a typed one.
pub trait ResponseDecoder: Send + Sync + 'static {
    type Payload: Send + 'static;

    fn decode(&self, response: Response<Bytes>) -> Result<Response<Self::Payload>, PubSubError>;

    /// Post-process a decoded payload, e.g. decrypt message bodies.
    fn decrypt(
        &self,
        response: Response<Self::Payload>,
    ) -> Result<Response<Self::Payload>, PubSubError> {
        Ok(response)
    }
}

/// Decodes the body as JSON into `T`.
pub struct JsonDecoder<T> {
    _payload: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    pub fn new() -> Self {
        Self {
            _payload: PhantomData,
        }
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonDecoder")
    }
}

impl<T> ResponseDecoder for JsonDecoder<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Payload = T;

    fn decode(&self, response: Response<Bytes>) -> Result<Response<T>, PubSubError> {
        match serde_json::from_slice::<T>(&response.payload) {
            Ok(payload) => Ok(response.with_payload(payload)),
            Err(error) => Err(response
                .error(Reason::JsonDataDecodingFailure)
                .with_underlying(error)),
        }
    }
}

/// Passes the raw body through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl ResponseDecoder for RawDecoder {
    type Payload = Bytes;

    fn decode(&self, response: Response<Bytes>) -> Result<Response<Bytes>, PubSubError> {
        Ok(response)
    }
}
