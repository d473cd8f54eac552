//! The network transport seam.
//!
//! A [`Transport`] executes one physical attempt. Attempts are tagged with the
//! endpoint category of their request so that every outstanding attempt of a
//! category can be cancelled at once.

use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use pubsub_error::{EndpointCategory, TransportError, TransportErrorKind};
use tokio::sync::watch;

use crate::http::{HttpRequest, HttpResponse};

mod reqwest;

pub use self::reqwest::ReqwestTransport;

/// Status line and full body of a finished attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub response: HttpResponse,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            response: HttpResponse::new(status),
            body: body.into(),
        }
    }
}

/// Executes HTTP attempts.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and wait for the complete response.
    ///
    /// The body is always reported, even when empty.
    async fn execute(
        &self,
        request: HttpRequest,
        category: EndpointCategory,
    ) -> Result<TransportResponse, TransportError>;

    /// Cancel every outstanding attempt tagged with `category`.
    fn cancel_all(&self, _category: EndpointCategory) {}
}

/// Per-category cancellation generations.
///
/// An attempt watches its category's generation; bumping it ends every
/// attempt that started before the bump.
#[derive(Debug, Default)]
pub struct CategoryCancellation {
    generations: DashMap<EndpointCategory, watch::Sender<u64>>,
}

impl CategoryCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe(&self, category: EndpointCategory) -> watch::Receiver<u64> {
        self.generations
            .entry(category)
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    /// End every running attempt of `category`.
    pub fn cancel(&self, category: EndpointCategory) {
        if let Some(sender) = self.generations.get(&category) {
            sender.send_modify(|generation| *generation += 1);
        }
    }

    /// Drive `attempt` until it finishes or its category is cancelled.
    pub async fn run<F>(
        &self,
        category: EndpointCategory,
        attempt: F,
    ) -> Result<TransportResponse, TransportError>
    where
        F: Future<Output = Result<TransportResponse, TransportError>> + Send,
    {
        let mut generation = self.subscribe(category);
        generation.borrow_and_update();

        tokio::select! {
            result = attempt => result,
            _ = generation.changed() => Err(TransportError::new(
                TransportErrorKind::Cancelled,
                format!("all {category} attempts were cancelled"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_ends_running_attempts_of_category() {
        let cancellation = Arc::new(CategoryCancellation::new());

        let runner = Arc::clone(&cancellation);
        let hanging = tokio::spawn(async move {
            runner
                .run(EndpointCategory::Subscribe, std::future::pending())
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancellation.cancel(EndpointCategory::Publish);
        cancellation.cancel(EndpointCategory::Subscribe);

        let result = tokio::time::timeout(Duration::from_secs(1), hanging)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err().kind, TransportErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_completed_attempt_is_returned() {
        let cancellation = CategoryCancellation::new();
        let result = cancellation
            .run(EndpointCategory::Time, async {
                Ok(TransportResponse::new(200, "[1]"))
            })
            .await
            .unwrap();
        assert_eq!(result.body, Bytes::from_static(b"[1]"));
    }
}
