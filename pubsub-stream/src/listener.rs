//! Listener registry.
//!
//! The registry holds listeners weakly: a listener stops receiving events as
//! soon as its last `Arc` is dropped, or when the [`ListenerToken`] returned
//! on registration is cancelled or dropped.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::events::SubscriptionEvent;

/// Receives subscription events.
pub trait SubscriptionListener: Send + Sync {
    fn emit(&self, event: &SubscriptionEvent);
}

impl<F> SubscriptionListener for F
where
    F: Fn(&SubscriptionEvent) + Send + Sync,
{
    fn emit(&self, event: &SubscriptionEvent) {
        self(event)
    }
}

/// Listener that forwards every event into an [`EventStream`].
#[derive(Debug)]
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<SubscriptionEvent>,
}

impl ChannelListener {
    /// Create a listener and the stream its events arrive on.
    ///
    /// The stream ends once the listener is dropped.
    pub fn new() -> (Arc<Self>, EventStream) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), EventStream { receiver })
    }
}

impl SubscriptionListener for ChannelListener {
    fn emit(&self, event: &SubscriptionEvent) {
        if self.sender.send(event.clone()).is_err() {
            tracing::trace!("Event stream dropped, discarding event");
        }
    }
}

/// Events delivered to a [`ChannelListener`].
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<SubscriptionEvent>,
}

impl EventStream {
    /// Wait for the next event; `None` once the listener is gone.
    pub async fn next_event(&mut self) -> Option<SubscriptionEvent> {
        self.receiver.recv().await
    }

    /// The next event if one is already queued.
    pub fn try_next_event(&mut self) -> Option<SubscriptionEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = SubscriptionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

struct Entry {
    id: u64,
    listener: Weak<dyn SubscriptionListener>,
}

#[derive(Default)]
struct RegistryInner {
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl RegistryInner {
    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }
}

/// Weak set of listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`.
    ///
    /// A listener that is already registered loses its previous
    /// registration; the token handed out for it then does nothing.
    pub fn add<L>(&self, listener: &Arc<L>) -> ListenerToken
    where
        L: SubscriptionListener + 'static,
    {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Weak<dyn SubscriptionListener> = weak;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut entries = self.inner.entries.lock();
            entries.retain(|entry| {
                entry.listener.strong_count() > 0 && !Weak::ptr_eq(&entry.listener, &weak)
            });
            entries.push(Entry { id, listener: weak });
        }

        ListenerToken {
            id,
            registry: Arc::downgrade(&self.inner),
            armed: true,
        }
    }

    /// Call `f` for every live listener.
    ///
    /// `f` runs against a snapshot taken up front, outside the registry lock,
    /// so listeners may register or cancel from inside a callback.
    pub fn notify<F>(&self, f: F)
    where
        F: Fn(&dyn SubscriptionListener),
    {
        let live: Vec<Arc<dyn SubscriptionListener>> = {
            let mut entries = self.inner.entries.lock();
            entries.retain(|entry| entry.listener.strong_count() > 0);
            entries
                .iter()
                .filter_map(|entry| entry.listener.upgrade())
                .collect()
        };

        for listener in live {
            f(listener.as_ref());
        }
    }

    /// Send `event` to every live listener.
    pub fn emit(&self, event: &SubscriptionEvent) {
        self.notify(|listener| listener.emit(event));
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.listener.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Registration handle; unregisters the listener when cancelled or dropped.
#[must_use = "dropping the token unregisters the listener"]
#[derive(Debug)]
pub struct ListenerToken {
    id: u64,
    registry: Weak<RegistryInner>,
    armed: bool,
}

impl ListenerToken {
    /// Unregister the listener now.
    pub fn cancel(&mut self) {
        if std::mem::replace(&mut self.armed, false) {
            if let Some(registry) = self.registry.upgrade() {
                registry.remove(self.id);
            }
        }
    }

    /// Keep the registration for as long as the listener lives.
    pub fn detach(mut self) {
        self.armed = false;
    }

    pub fn is_cancelled(&self) -> bool {
        !self.armed
    }
}

impl Drop for ListenerToken {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ConnectionStatus;
    use futures::StreamExt;
    use std::sync::atomic::AtomicUsize;

    fn status_event() -> SubscriptionEvent {
        SubscriptionEvent::ConnectionStatusChanged(ConnectionStatus::Connected)
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<impl SubscriptionListener>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let listener = Arc::new(move |_: &SubscriptionEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    #[test]
    fn test_notify_reaches_live_listeners() {
        let registry = ListenerRegistry::new();
        let (count, listener) = counter();
        let _token = registry.add(&listener);

        registry.emit(&status_event());
        registry.emit(&status_event());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropped_listener_is_removed() {
        let registry = ListenerRegistry::new();
        let (count, listener) = counter();
        let token = registry.add(&listener);
        token.detach();

        drop(listener);
        registry.emit(&status_event());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancelled_token_unregisters() {
        let registry = ListenerRegistry::new();
        let (count, listener) = counter();
        let mut token = registry.add(&listener);

        token.cancel();
        assert!(token.is_cancelled());
        registry.emit(&status_event());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_re_adding_replaces_previous_registration() {
        let registry = ListenerRegistry::new();
        let (count, listener) = counter();

        let first = registry.add(&listener);
        let _second = registry.add(&listener);
        assert_eq!(registry.len(), 1);

        drop(first);
        registry.emit(&status_event());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    struct Recorder {
        events: Mutex<Vec<SubscriptionEvent>>,
    }

    impl SubscriptionListener for Recorder {
        fn emit(&self, event: &SubscriptionEvent) {
            self.events.lock().push(event.clone());
        }
    }

    #[test]
    fn test_named_listener_type_registers() {
        let registry = ListenerRegistry::new();
        let recorder = Arc::new(Recorder {
            events: Mutex::new(Vec::new()),
        });
        let token = registry.add(&recorder);

        registry.emit(&status_event());
        assert_eq!(recorder.events.lock().len(), 1);

        drop(token);
        registry.emit(&status_event());
        assert_eq!(recorder.events.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_channel_listener_streams_events() {
        let registry = ListenerRegistry::new();
        let (listener, mut stream) = ChannelListener::new();
        let _token = registry.add(&listener);

        registry.emit(&status_event());
        assert_eq!(stream.next().await, Some(status_event()));
        assert_eq!(stream.try_next_event(), None);

        drop(_token);
        drop(listener);
        assert_eq!(stream.next_event().await, None);
    }
}
