//! Hooks that rewrite each attempt's HTTP request before it is sent.

use std::fmt;
use std::sync::Arc;

use pubsub_error::PubSubError;

use crate::http::HttpRequest;

/// Mutates an outgoing request.
///
/// Runs once per attempt, so a retried request passes through every operator
/// again. A failure ends the attempt with `RequestMutatorFailure`.
pub trait RequestOperator: Send + Sync + fmt::Debug {
    fn mutate(&self, request: HttpRequest) -> Result<HttpRequest, PubSubError>;
}

/// Appends a `requestid` query parameter.
#[derive(Debug, Clone)]
pub struct RequestIdOperator {
    request_id: String,
}

impl RequestIdOperator {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }
}

impl RequestOperator for RequestIdOperator {
    fn mutate(&self, mut request: HttpRequest) -> Result<HttpRequest, PubSubError> {
        request
            .url
            .query_pairs_mut()
            .append_pair("requestid", &self.request_id);
        Ok(request)
    }
}

/// Runs a list of operators in order.
#[derive(Debug, Clone, Default)]
pub struct OperatorChain {
    operators: Vec<Arc<dyn RequestOperator>>,
}

impl OperatorChain {
    pub fn new(operators: Vec<Arc<dyn RequestOperator>>) -> Self {
        Self { operators }
    }

    pub fn push(&mut self, operator: Arc<dyn RequestOperator>) {
        self.operators.push(operator);
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl RequestOperator for OperatorChain {
    fn mutate(&self, request: HttpRequest) -> Result<HttpRequest, PubSubError> {
        self.operators
            .iter()
            .try_fold(request, |request, operator| operator.mutate(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use pubsub_error::{EndpointCategory, Reason};
    use url::Url;

    #[derive(Debug)]
    struct Rejecting;

    impl RequestOperator for Rejecting {
        fn mutate(&self, _request: HttpRequest) -> Result<HttpRequest, PubSubError> {
            Err(PubSubError::new(Reason::MissingCryptoKey, EndpointCategory::Publish))
        }
    }

    fn request() -> HttpRequest {
        HttpRequest::new(
            HttpMethod::Get,
            Url::parse("https://ps.pndsn.com/time/0?uuid=u").unwrap(),
        )
    }

    #[test]
    fn test_request_id_operator_appends_query() {
        let mutated = RequestIdOperator::new("abc").mutate(request()).unwrap();
        assert_eq!(mutated.query_value("requestid").as_deref(), Some("abc"));
        assert_eq!(mutated.query_value("uuid").as_deref(), Some("u"));
    }

    #[test]
    fn test_chain_stops_at_first_failure() {
        let chain = OperatorChain::new(vec![
            Arc::new(RequestIdOperator::new("abc")),
            Arc::new(Rejecting),
        ]);
        let error = chain.mutate(request()).unwrap_err();
        assert_eq!(error.reason(), Reason::MissingCryptoKey);
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = OperatorChain::default();
        assert!(chain.is_empty());
        assert_eq!(chain.mutate(request()).unwrap(), request());
    }
}
