//! One logical HTTP exchange across any number of physical attempts.
//!
//! A [`Request`] is a cheap, clonable handle. All mutable state (lifecycle
//! state, attempts, errors, retry count, body bytes and the completion
//! callback) lives behind a single lock, so `resume`, `cancel` and attempt
//! completion never observe each other half-way.
//!
//! The completion callback fires exactly once. If the request finishes
//! before a callback is attached, the result is kept and handed to the
//! callback as soon as it is attached.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use pubsub_error::{EndpointCategory, PubSubError, Reason, TransportError, Underlying};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::decoder::{Response, ResponseDecoder};
use crate::http::{HttpRequest, HttpResponse};
use crate::observer::RequestObserver;
use crate::operator::{OperatorChain, RequestIdOperator, RequestOperator};
use crate::retry::{RetryCoordinator, RetryDecision};
use crate::router::{as_http_request, Router};
use crate::state::TaskState;
use crate::transport::{Transport, TransportResponse};

/// Result handed to a request's completion callback.
pub type RawResult = Result<Response<Bytes>, PubSubError>;

type Completion = Box<dyn FnOnce(RawResult) + Send + 'static>;
type Validator = Arc<dyn Fn(&ValidationContext<'_>) -> Option<PubSubError> + Send + Sync>;

/// What a validator gets to inspect after an attempt completed.
pub struct ValidationContext<'a> {
    pub router: &'a dyn Router,
    pub request: &'a HttpRequest,
    pub response: &'a HttpResponse,
    pub data: &'a Bytes,
}

/// State of one physical attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// One physical network attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub index: usize,
    pub request: HttpRequest,
    pub response: Option<HttpResponse>,
    pub state: AttemptState,
}

enum Outcome {
    Pending,
    Stored(RawResult),
    Delivered,
}

struct RequestState {
    task_state: TaskState,
    attempts: Vec<Attempt>,
    error: Option<PubSubError>,
    previous_errors: Vec<PubSubError>,
    retry_count: u32,
    data: Option<BytesMut>,
    cancellation_reason: Option<Reason>,
    driver: Option<AbortHandle>,
    completion: Option<Completion>,
    outcome: Outcome,
}

impl RequestState {
    fn new() -> Self {
        Self {
            task_state: TaskState::Initialized,
            attempts: Vec::new(),
            error: None,
            previous_errors: Vec::new(),
            retry_count: 0,
            data: None,
            cancellation_reason: None,
            driver: None,
            completion: None,
            outcome: Outcome::Pending,
        }
    }

    fn set_error(&mut self, error: PubSubError) {
        if let Some(previous) = self.error.replace(error) {
            self.previous_errors.push(previous);
        }
    }

    fn snapshot(&self) -> Snapshot {
        let exchange = self.attempts.last().and_then(|attempt| {
            let response = attempt.response.clone()?;
            let data = self.data.as_ref()?;
            Some((
                attempt.request.clone(),
                response,
                Bytes::copy_from_slice(data),
            ))
        });

        Snapshot {
            error: self.error.clone(),
            exchange,
        }
    }
}

/// One consistent view of a request used to both validate and complete it.
struct Snapshot {
    error: Option<PubSubError>,
    exchange: Option<(HttpRequest, HttpResponse, Bytes)>,
}

impl Snapshot {
    fn into_result(self, router: &Arc<dyn Router>) -> RawResult {
        if let Some(error) = self.error {
            return Err(error);
        }

        match self.exchange {
            Some((request, response, data)) => Ok(Response {
                router: Arc::clone(router),
                request,
                response,
                data: data.clone(),
                payload: data,
            }),
            None => Err(PubSubError::new(
                Reason::MissingCriticalResponseData,
                router.endpoint(),
            )),
        }
    }
}

/// Everything a session hands to a new request.
pub(crate) struct RequestParts {
    pub session_id: Uuid,
    pub router: Arc<dyn Router>,
    pub transport: Arc<dyn Transport>,
    pub retry: Option<Arc<dyn RetryCoordinator>>,
    pub operator: OperatorChain,
    pub observer: Arc<dyn RequestObserver>,
}

struct Inner {
    id: Uuid,
    session_id: Uuid,
    router: Arc<dyn Router>,
    transport: Arc<dyn Transport>,
    retry: Option<Arc<dyn RetryCoordinator>>,
    operator: OperatorChain,
    observer: Arc<dyn RequestObserver>,
    state: Mutex<RequestState>,
    validators: Mutex<Vec<Validator>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        tracing::debug!(request_id = %self.id, "Request destroyed");
    }
}

/// Handle to one logical request.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

/// Non-owning handle used by sessions to track live requests.
#[derive(Clone)]
pub(crate) struct WeakRequest(Weak<Inner>);

impl WeakRequest {
    pub(crate) fn upgrade(&self) -> Option<Request> {
        self.0.upgrade().map(|inner| Request { inner })
    }
}

impl Request {
    pub(crate) fn new(parts: RequestParts) -> Self {
        let id = Uuid::new_v4();

        let mut operator = parts.operator;
        if parts.router.configuration().use_request_id {
            operator.push(Arc::new(RequestIdOperator::new(id.to_string())));
        }

        let request = Self {
            inner: Arc::new(Inner {
                id,
                session_id: parts.session_id,
                router: parts.router,
                transport: parts.transport,
                retry: parts.retry,
                operator,
                observer: parts.observer,
                state: Mutex::new(RequestState::new()),
                validators: Mutex::new(Vec::new()),
            }),
        };

        request.inner.observer.request_created(&request);
        request
    }

    pub(crate) fn downgrade(&self) -> WeakRequest {
        WeakRequest(Arc::downgrade(&self.inner))
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Id of the session that created this request.
    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn router(&self) -> &Arc<dyn Router> {
        &self.inner.router
    }

    pub fn endpoint(&self) -> EndpointCategory {
        self.inner.router.endpoint()
    }

    pub fn task_state(&self) -> TaskState {
        self.inner.state.lock().task_state
    }

    pub fn is_cancelled(&self) -> bool {
        self.task_state() == TaskState::Cancelled
    }

    /// The current error, if any.
    pub fn error(&self) -> Option<PubSubError> {
        self.inner.state.lock().error.clone()
    }

    /// Errors superseded by later ones, oldest first.
    pub fn previous_errors(&self) -> Vec<PubSubError> {
        self.inner.state.lock().previous_errors.clone()
    }

    pub fn previous_error(&self) -> Option<PubSubError> {
        self.inner.state.lock().previous_errors.last().cloned()
    }

    pub fn retry_count(&self) -> u32 {
        self.inner.state.lock().retry_count
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.inner.state.lock().attempts.clone()
    }

    /// The HTTP request of the latest attempt.
    pub fn http_request(&self) -> Option<HttpRequest> {
        self.inner
            .state
            .lock()
            .attempts
            .last()
            .map(|attempt| attempt.request.clone())
    }

    /// The HTTP response of the latest attempt.
    pub fn http_response(&self) -> Option<HttpResponse> {
        self.inner
            .state
            .lock()
            .attempts
            .last()
            .and_then(|attempt| attempt.response.clone())
    }

    /// Body bytes received by the latest attempt.
    pub fn data(&self) -> Option<Bytes> {
        self.inner
            .state
            .lock()
            .data
            .as_ref()
            .map(|data| Bytes::copy_from_slice(data))
    }

    /// Reason used instead of `ClientCancelled` when this request is cancelled.
    pub fn set_cancellation_reason(&self, reason: Reason) {
        self.inner.state.lock().cancellation_reason = Some(reason);
    }

    /// Start the request. Does nothing unless the request is `Initialized`.
    pub fn resume(&self) -> &Self {
        {
            let mut state = self.inner.state.lock();
            if !state.task_state.can_transition(TaskState::Resumed) {
                return self;
            }
            state.task_state = TaskState::Resumed;
        }

        self.inner.observer.did_resume(self);
        self.spawn_attempt(None);
        self
    }

    /// Cancel the request.
    ///
    /// The first call to win the transition to `Cancelled` finishes the
    /// request with the cancellation error, skipping retry. Later calls do
    /// nothing.
    pub fn cancel(&self, cause: Option<Underlying>) -> &Self {
        let (error, driver, attempt) = {
            let mut state = self.inner.state.lock();
            if !state.task_state.can_transition(TaskState::Cancelled) {
                return self;
            }

            let error =
                PubSubError::cancellation(state.cancellation_reason, cause, self.endpoint());
            state.task_state = TaskState::Cancelled;
            state.set_error(error.clone());

            let attempt = state
                .attempts
                .last_mut()
                .filter(|attempt| attempt.state == AttemptState::Running)
                .map(|attempt| {
                    attempt.state = AttemptState::Cancelled;
                    attempt.index
                });

            (error, state.driver.take(), attempt)
        };

        self.inner.observer.did_cancel(self);

        if let Some(driver) = driver {
            driver.abort();
        }
        if let Some(index) = attempt {
            self.inner.observer.did_cancel_attempt(self, index);
        }

        self.finish(Some(error));
        self
    }

    /// Cancel with an explicit reason.
    pub fn cancel_with_reason(&self, reason: Reason) -> &Self {
        self.set_cancellation_reason(reason);
        self.cancel(None)
    }

    /// Register a check run after every attempt that completed without a
    /// transport error.
    pub fn validate<F>(&self, validator: F) -> &Self
    where
        F: Fn(&ValidationContext<'_>) -> Option<PubSubError> + Send + Sync + 'static,
    {
        self.inner.validators.lock().push(Arc::new(validator));
        self
    }

    /// Register the status-code validator.
    pub fn validate_default(&self) -> &Self {
        self.validate(default_validation)
    }

    /// Attach the completion callback for the raw response.
    ///
    /// Replaces any callback attached earlier that has not fired yet.
    pub fn response_raw<F>(&self, completion: F)
    where
        F: FnOnce(RawResult) + Send + 'static,
    {
        let stored = {
            let mut state = self.inner.state.lock();
            match std::mem::replace(&mut state.outcome, Outcome::Delivered) {
                Outcome::Pending => {
                    state.outcome = Outcome::Pending;
                    state.completion = Some(Box::new(completion));
                    return;
                }
                Outcome::Stored(result) => (completion, result),
                Outcome::Delivered => {
                    tracing::warn!(
                        request_id = %self.id(),
                        "Completion attached after the result was already delivered"
                    );
                    return;
                }
            }
        };

        let (completion, result) = stored;
        dispatch(move || completion(result));
    }

    /// Attach a completion callback receiving the decoded response.
    pub fn response<D, F>(&self, decoder: D, completion: F)
    where
        D: ResponseDecoder,
        F: FnOnce(Result<Response<D::Payload>, PubSubError>) + Send + 'static,
    {
        self.response_raw(move |result| {
            let decoded = result
                .and_then(|response| decoder.decode(response))
                .and_then(|response| decoder.decrypt(response));
            completion(decoded)
        });
    }

    /// Wait for the decoded response.
    pub async fn response_async<D>(&self, decoder: D) -> Result<Response<D::Payload>, PubSubError>
    where
        D: ResponseDecoder,
    {
        let (tx, rx) = oneshot::channel();
        self.response(decoder, move |result| {
            let _ = tx.send(result);
        });

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(PubSubError::new(Reason::ClientCancelled, self.endpoint())
                .with_details(vec!["completion was replaced".to_string()])),
        }
    }

    /// Retry after `error` if the coordinator allows it, otherwise finish.
    ///
    /// Cancellation errors are never retried.
    pub fn retry_or_finish(&self, error: PubSubError) {
        if error.is_cancellation() {
            self.finish(Some(error));
            return;
        }

        let Some(retry) = self.inner.retry.clone() else {
            self.finish(Some(error));
            return;
        };

        match retry.retry_decision(self, &error, self.previous_error()) {
            RetryDecision::RetryAfter(delay) => {
                if self.prepare_for_retry() {
                    self.spawn_attempt(Some(delay));
                }
            }
            RetryDecision::GiveUp(cause) => {
                let error = PubSubError::new(Reason::RequestRetryFailed, self.endpoint())
                    .with_underlying(cause);
                self.finish(Some(error));
            }
        }
    }

    /// Count a retry and archive the current error.
    ///
    /// Returns `false` when the request already ended.
    pub fn prepare_for_retry(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.task_state.is_terminal() {
                return false;
            }
            state.retry_count += 1;
            if let Some(error) = state.error.take() {
                state.previous_errors.push(error);
            }
        }

        self.inner.observer.is_retrying(self);
        true
    }

    /// Complete the request.
    ///
    /// An explicit error wins; otherwise the stored error; otherwise the
    /// latest exchange if it has a request, response and body; otherwise
    /// `MissingCriticalResponseData`.
    pub fn finish(&self, error: Option<PubSubError>) {
        let result = match error {
            Some(error) => Err(error),
            None => {
                let snapshot = self.inner.state.lock().snapshot();
                snapshot.into_result(&self.inner.router)
            }
        };
        self.deliver(result);
    }

    fn deliver(&self, result: RawResult) {
        let error = result.as_ref().err().cloned();

        let (completion, driver, attempt) = {
            let mut state = self.inner.state.lock();
            if !matches!(state.outcome, Outcome::Pending) {
                return;
            }
            if state.task_state.can_transition(TaskState::Finished) {
                state.task_state = TaskState::Finished;
            }

            // An in-flight attempt cannot outlive its request.
            let attempt = state
                .attempts
                .last_mut()
                .filter(|attempt| attempt.state == AttemptState::Running)
                .map(|attempt| {
                    attempt.state = AttemptState::Cancelled;
                    attempt.index
                });

            let completion = match state.completion.take() {
                Some(completion) => {
                    state.outcome = Outcome::Delivered;
                    Some((completion, result))
                }
                None => {
                    state.outcome = Outcome::Stored(result);
                    None
                }
            };
            (completion, state.driver.take(), attempt)
        };

        if let Some(driver) = driver {
            driver.abort();
        }
        if let Some(index) = attempt {
            self.inner.observer.did_cancel_attempt(self, index);
        }
        self.inner.observer.did_finish(self, error.as_ref());

        if let Some((completion, result)) = completion {
            dispatch(move || completion(result));
        }
    }

    fn set_error(&self, error: PubSubError) {
        self.inner.state.lock().set_error(error);
    }

    fn spawn_attempt(&self, delay: Option<Duration>) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(runtime_error) => {
                let error = PubSubError::new(Reason::Unknown, self.endpoint())
                    .with_details(vec![runtime_error.to_string()]);
                self.set_error(error.clone());
                self.finish(Some(error));
                return;
            }
        };

        let mut state = self.inner.state.lock();
        if state.task_state != TaskState::Resumed {
            return;
        }

        let request = self.clone();
        let task = handle.spawn(async move {
            if let Some(delay) = delay.filter(|delay| !delay.is_zero()) {
                tokio::time::sleep(delay).await;
            }
            request.perform_attempt().await;
        });

        if let Some(previous) = state.driver.replace(task.abort_handle()) {
            previous.abort();
        }
    }

    async fn perform_attempt(self) {
        let endpoint = self.endpoint();

        let http = match as_http_request(self.inner.router.as_ref()) {
            Ok(http) => http,
            Err(error) => {
                let error = PubSubError::url_creation(Arc::new(error), endpoint);
                self.set_error(error.clone());
                self.inner
                    .observer
                    .did_fail_to_create_http_request(&self, &error);
                self.retry_or_finish(error);
                return;
            }
        };
        self.inner.observer.did_create_http_request(&self, &http);

        let http = if self.inner.operator.is_empty() {
            http
        } else {
            match self.inner.operator.mutate(http.clone()) {
                Ok(mutated) => {
                    self.inner.observer.did_mutate(&self, &http, &mutated);
                    mutated
                }
                Err(cause) => {
                    let error = PubSubError::new(Reason::RequestMutatorFailure, endpoint)
                        .with_underlying(cause)
                        .with_affected(vec![http.affected()]);
                    self.set_error(error.clone());
                    self.inner.observer.did_fail_to_mutate(&self, &error);
                    self.retry_or_finish(error);
                    return;
                }
            }
        };

        let index = {
            let mut state = self.inner.state.lock();
            if state.task_state != TaskState::Resumed {
                return;
            }
            let index = state.attempts.len();
            state.data = None;
            state.attempts.push(Attempt {
                index,
                request: http.clone(),
                response: None,
                state: AttemptState::Running,
            });
            index
        };
        self.inner.observer.did_resume_attempt(&self, index);

        match self.inner.transport.execute(http, endpoint).await {
            Ok(TransportResponse { response, body }) => {
                self.did_complete_attempt(index, response, body)
            }
            Err(error) => self.did_fail_attempt(index, error),
        }
    }

    fn did_complete_attempt(&self, index: usize, response: HttpResponse, body: Bytes) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            if state.task_state != TaskState::Resumed {
                return;
            }
            let Some(attempt) = state.attempts.get_mut(index) else {
                return;
            };
            attempt.response = Some(response);
            attempt.state = AttemptState::Completed;
            state
                .data
                .get_or_insert_with(BytesMut::new)
                .extend_from_slice(&body);
            state.snapshot()
        };

        let validation_error = match (&snapshot.error, &snapshot.exchange) {
            (None, Some((request, response, data))) => {
                self.run_validators(request, response, data)
            }
            _ => None,
        };
        if let Some(error) = &validation_error {
            self.set_error(error.clone());
        }

        let error = validation_error.or_else(|| snapshot.error.clone());
        self.inner
            .observer
            .did_complete_attempt(self, index, error.as_ref());

        match error {
            Some(error) => self.retry_or_finish(error),
            None => self.deliver(snapshot.into_result(&self.inner.router)),
        }
    }

    fn did_fail_attempt(&self, index: usize, error: TransportError) {
        let affected = {
            let mut state = self.inner.state.lock();
            if state.task_state != TaskState::Resumed {
                return;
            }
            let Some(attempt) = state.attempts.get_mut(index) else {
                return;
            };
            attempt.state = AttemptState::Failed;
            attempt.request.affected()
        };

        let error = PubSubError::transport(error, self.endpoint()).with_affected(vec![affected]);
        self.set_error(error.clone());
        self.inner
            .observer
            .did_complete_attempt(self, index, Some(&error));
        self.retry_or_finish(error);
    }

    fn run_validators(
        &self,
        request: &HttpRequest,
        response: &HttpResponse,
        data: &Bytes,
    ) -> Option<PubSubError> {
        let validators = self.inner.validators.lock().clone();
        let context = ValidationContext {
            router: self.inner.router.as_ref(),
            request,
            response,
            data,
        };

        validators.iter().find_map(|validator| validator(&context))
    }
}

/// Status-code validation.
///
/// A non-success response with a body is decoded by the router; one without
/// a body is classified from its status code alone.
pub fn default_validation(context: &ValidationContext<'_>) -> Option<PubSubError> {
    if context.response.is_successful() {
        return None;
    }

    if !is_truly_empty(context.data) {
        return context
            .router
            .decode_error(context.request, context.response, context.data);
    }

    Some(PubSubError::from_status(
        context.router.endpoint(),
        context.response.status,
        Some(context.request.affected()),
    ))
}

fn is_truly_empty(data: &[u8]) -> bool {
    data.iter().all(|byte| byte.is_ascii_whitespace())
}

/// Run `f` on the current runtime, or inline when there is none.
fn dispatch<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { f() });
        }
        Err(_) => f(),
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Request {}

impl Hash for Request {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.inner.id)
            .field("endpoint", &self.endpoint())
            .field("state", &self.task_state())
            .finish()
    }
}
