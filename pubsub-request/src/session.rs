//! Network sessions.
//!
//! A [`Session`] owns the transport, the default retry coordinator, the
//! request operator and the lifecycle observer, and creates [`Request`]s that
//! share them. Live requests are tracked weakly so that they can be
//! cancelled in bulk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use pubsub_error::{EndpointCategory, Reason};
use uuid::Uuid;

use crate::observer::{LoggingObserver, RequestObserver};
use crate::operator::{OperatorChain, RequestOperator};
use crate::request::{Request, RequestParts, WeakRequest};
use crate::retry::RetryCoordinator;
use crate::router::Router;
use crate::transport::Transport;

/// Creates requests and tracks the live ones.
pub struct Session {
    id: Uuid,
    transport: Arc<dyn Transport>,
    retry: Option<Arc<dyn RetryCoordinator>>,
    operator: OperatorChain,
    observer: Arc<dyn RequestObserver>,
    requests: DashMap<Uuid, WeakRequest>,
    invalidated: AtomicBool,
}

impl Session {
    /// Create a session over `transport` that logs through `tracing`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport,
            retry: None,
            operator: OperatorChain::default(),
            observer: Arc::new(LoggingObserver),
            requests: DashMap::new(),
            invalidated: AtomicBool::new(false),
        }
    }

    /// Retry coordinator used by requests that do not bring their own.
    pub fn with_retry(mut self, retry: Arc<dyn RetryCoordinator>) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Add an operator applied to every attempt of every request.
    pub fn with_operator(mut self, operator: Arc<dyn RequestOperator>) -> Self {
        self.operator.push(operator);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Create a request using the session's retry coordinator.
    pub fn request(&self, router: Arc<dyn Router>) -> Request {
        self.request_with_retry(router, self.retry.clone())
    }

    /// Create a request with an explicit retry coordinator (or none).
    ///
    /// Requests created after [`invalidate_and_cancel`](Self::invalidate_and_cancel)
    /// are cancelled immediately with `SessionInvalidated`.
    pub fn request_with_retry(
        &self,
        router: Arc<dyn Router>,
        retry: Option<Arc<dyn RetryCoordinator>>,
    ) -> Request {
        let request = Request::new(RequestParts {
            session_id: self.id,
            router,
            transport: Arc::clone(&self.transport),
            retry,
            operator: self.operator.clone(),
            observer: Arc::clone(&self.observer),
        });

        if self.invalidated.load(Ordering::Acquire) {
            request.cancel_with_reason(Reason::SessionInvalidated);
            return request;
        }

        self.prune();
        self.requests.insert(request.id(), request.downgrade());
        request
    }

    /// Requests that are still alive.
    pub fn live_requests(&self) -> Vec<Request> {
        self.requests
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect()
    }

    /// Cancel every live request, or only those of `category`, with `reason`.
    ///
    /// The transport is also told to cancel its outstanding attempts for the
    /// category, covering attempts no request handle refers to.
    pub fn cancel_all_tasks(&self, reason: Reason, category: Option<EndpointCategory>) {
        let targets: Vec<Request> = self
            .live_requests()
            .into_iter()
            .filter(|request| category.map_or(true, |category| request.endpoint() == category))
            .collect();

        tracing::debug!(
            session_id = %self.id,
            count = targets.len(),
            ?category,
            %reason,
            "Cancelling session requests"
        );

        for request in targets {
            request.cancel_with_reason(reason);
        }

        if let Some(category) = category {
            self.transport.cancel_all(category);
        }
        self.prune();
    }

    /// Cancel everything and refuse new work.
    pub fn invalidate_and_cancel(&self) {
        self.invalidated.store(true, Ordering::Release);
        self.cancel_all_tasks(Reason::SessionInvalidated, None);
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    fn prune(&self) {
        self.requests
            .retain(|_, request| request.upgrade().is_some_and(|r| !r.task_state().is_terminal()));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for request in self.live_requests() {
            request.cancel_with_reason(Reason::SessionDeinitialized);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("live_requests", &self.requests.len())
            .field("invalidated", &self.is_invalidated())
            .finish()
    }
}
