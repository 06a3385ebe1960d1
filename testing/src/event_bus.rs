//! Recording event bus.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use storefront_core::event::SerializedEvent;
use storefront_core::event_bus::{EventBus, EventBusError};

#[derive(Debug, Default)]
struct Inner {
    published: Mutex<Vec<(String, SerializedEvent)>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
}

/// [`EventBus`] that records every published event.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(topic, event)` accepted so far.
    #[must_use]
    pub fn published(&self) -> Vec<(String, SerializedEvent)> {
        self.inner.published.lock().unwrap().clone()
    }

    /// Number of publish calls, successful or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Fail the next `n` publish calls.
    pub fn fail_next(&self, n: usize) {
        self.inner.failures_left.store(n, Ordering::SeqCst);
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        Box::pin(async move {
            self.inner.attempts.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .inner
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "broker unavailable".to_string(),
                });
            }
            self.inner
                .published
                .lock()
                .map_err(|_| EventBusError::ConnectionFailed("lock poisoned".to_string()))?
                .push((topic, event));
            Ok(())
        })
    }
}
