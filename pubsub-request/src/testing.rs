//! Scripted in-memory transport for tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use pubsub_error::{EndpointCategory, TransportError, TransportErrorKind};
use tokio::sync::Notify;

use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{CategoryCancellation, Transport, TransportResponse};

/// What the mock does with one attempt.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Reply with a status and body
    Respond { status: u16, body: Bytes },
    /// Reply after a delay
    Delayed {
        delay: Duration,
        status: u16,
        body: Bytes,
    },
    /// Fail with a transport error
    Fail(TransportErrorKind),
    /// Never reply; ends only when cancelled
    Hang,
}

impl MockOutcome {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        MockOutcome::Respond {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<Bytes>) -> Self {
        MockOutcome::Respond {
            status,
            body: body.into(),
        }
    }
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<EndpointCategory, VecDeque<MockOutcome>>,
    defaults: HashMap<EndpointCategory, MockOutcome>,
    history: Vec<(EndpointCategory, HttpRequest)>,
    cancel_calls: Vec<EndpointCategory>,
}

/// Transport that replays scripted outcomes per endpoint category.
///
/// When a category's script runs out, its default outcome is used; the
/// default default is `Hang`. Every executed request is recorded.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    executed: Notify,
    cancellation: CategoryCancellation,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next attempt of `category`.
    pub fn enqueue(&self, category: EndpointCategory, outcome: MockOutcome) -> &Self {
        self.state
            .lock()
            .scripts
            .entry(category)
            .or_default()
            .push_back(outcome);
        self
    }

    /// Outcome used once the script for `category` is exhausted.
    pub fn set_default(&self, category: EndpointCategory, outcome: MockOutcome) -> &Self {
        self.state.lock().defaults.insert(category, outcome);
        self
    }

    /// Every request executed so far, in order.
    pub fn history(&self) -> Vec<(EndpointCategory, HttpRequest)> {
        self.state.lock().history.clone()
    }

    /// Requests executed for `category`.
    pub fn requests(&self, category: EndpointCategory) -> Vec<HttpRequest> {
        self.state
            .lock()
            .history
            .iter()
            .filter(|(c, _)| *c == category)
            .map(|(_, request)| request.clone())
            .collect()
    }

    pub fn request_count(&self, category: EndpointCategory) -> usize {
        self.state
            .lock()
            .history
            .iter()
            .filter(|(c, _)| *c == category)
            .count()
    }

    /// Categories passed to `cancel_all`, in order.
    pub fn cancel_calls(&self) -> Vec<EndpointCategory> {
        self.state.lock().cancel_calls.clone()
    }

    /// Wait until at least `count` requests of `category` were executed.
    ///
    /// Returns `false` on timeout.
    pub async fn wait_for_requests(
        &self,
        category: EndpointCategory,
        count: usize,
        timeout: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.executed.notified();
            if self.request_count(category) >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.request_count(category) >= count;
            }
        }
    }

    fn next_outcome(&self, category: EndpointCategory, request: HttpRequest) -> MockOutcome {
        let mut state = self.state.lock();
        state.history.push((category, request));

        let scripted = state
            .scripts
            .get_mut(&category)
            .and_then(|script| script.pop_front());

        scripted
            .or_else(|| state.defaults.get(&category).cloned())
            .unwrap_or(MockOutcome::Hang)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        request: HttpRequest,
        category: EndpointCategory,
    ) -> Result<TransportResponse, TransportError> {
        let outcome = self.next_outcome(category, request);
        self.executed.notify_waiters();

        let attempt = async move {
            match outcome {
                MockOutcome::Respond { status, body } => Ok(TransportResponse {
                    response: HttpResponse::new(status),
                    body,
                }),
                MockOutcome::Delayed {
                    delay,
                    status,
                    body,
                } => {
                    tokio::time::sleep(delay).await;
                    Ok(TransportResponse {
                        response: HttpResponse::new(status),
                        body,
                    })
                }
                MockOutcome::Fail(kind) => Err(TransportError::new(kind, "scripted failure")),
                MockOutcome::Hang => std::future::pending().await,
            }
        };

        self.cancellation.run(category, attempt).await
    }

    fn cancel_all(&self, category: EndpointCategory) {
        self.state.lock().cancel_calls.push(category);
        self.cancellation.cancel(category);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn request() -> HttpRequest {
        HttpRequest::new(
            HttpMethod::Get,
            url::Url::parse("https://ps.pndsn.com/time/0").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_scripted_outcomes_then_default() {
        let transport = MockTransport::new();
        transport
            .enqueue(EndpointCategory::Time, MockOutcome::ok("[1]"))
            .set_default(
                EndpointCategory::Time,
                MockOutcome::Fail(TransportErrorKind::TimedOut),
            );

        let first = transport
            .execute(request(), EndpointCategory::Time)
            .await
            .unwrap();
        assert_eq!(first.body, Bytes::from_static(b"[1]"));

        let second = transport
            .execute(request(), EndpointCategory::Time)
            .await
            .unwrap_err();
        assert_eq!(second.kind, TransportErrorKind::TimedOut);
        assert_eq!(transport.request_count(EndpointCategory::Time), 2);
    }

    #[tokio::test]
    async fn test_wait_for_requests_times_out() {
        let transport = MockTransport::new();
        let seen = transport
            .wait_for_requests(EndpointCategory::Subscribe, 1, Duration::from_millis(20))
            .await;
        assert!(!seen);
    }
}
