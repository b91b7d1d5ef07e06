//! Failure notifications for observers that live outside the call site.
//!
//! Every call that terminates in failure publishes exactly one
//! [`ApiErrorEvent`] on the client's [`ErrorBroadcaster`]. Observers such as a
//! toast area or an audit log register closures with
//! [`ErrorBroadcaster::subscribe`]; the broadcaster knows nothing about them.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use serde::Serialize;

use crate::ErrorDescriptor;

/// Name of the notification channel.
pub const API_ERROR_EVENT: &str = "api-error";

/// Payload delivered to observers for a terminal failure.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ApiErrorEvent {
    pub message: String,
    pub status: Option<u16>,
    pub url: String,
    pub attempts: u32,
}

impl From<&ErrorDescriptor> for ApiErrorEvent {
    fn from(descriptor: &ErrorDescriptor) -> Self {
        Self {
            message: descriptor.message.clone(),
            status: descriptor.status,
            url: descriptor.url.clone(),
            attempts: descriptor.attempts,
        }
    }
}

/// Handle returned by [`ErrorBroadcaster::subscribe`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&ApiErrorEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

/// Publish/subscribe channel for [`ApiErrorEvent`]s.
///
/// Clones share the same listener registry.
#[derive(Clone, Default)]
pub struct ErrorBroadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for ErrorBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorBroadcaster")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl ErrorBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener invoked for every published event.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ApiErrorEvent) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.lock();
        let before = registry.listeners.len();
        registry.listeners.retain(|(existing, _)| *existing != id);
        registry.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Delivers `event` synchronously to every listener registered at the time
    /// of the call and returns how many were invoked.
    ///
    /// The registry lock is released before dispatch, so listeners may
    /// subscribe or unsubscribe from inside the callback.
    pub fn publish(&self, event: &ApiErrorEvent) -> usize {
        let listeners: Vec<Listener> = self
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            event = API_ERROR_EVENT,
            status = ?event.status,
            url = %event.url,
            listeners = listeners.len(),
            "publishing api error"
        );

        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use super::{ApiErrorEvent, ErrorBroadcaster};

    fn event() -> ApiErrorEvent {
        ApiErrorEvent {
            message: "Erreur serveur. Réessayez plus tard.".to_owned(),
            status: Some(500),
            url: "http://localhost/api/stats".to_owned(),
            attempts: 4,
        }
    }

    #[test]
    fn publish_reaches_every_listener() {
        let broadcaster = ErrorBroadcaster::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let count = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&seen);
        broadcaster.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        let counter = Arc::clone(&count);
        broadcaster.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(broadcaster.publish(&event()), 2);
        assert_eq!(seen.lock().unwrap().as_slice(), &[event()]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribed_listener_is_not_called() {
        let broadcaster = ErrorBroadcaster::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let id = broadcaster.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(broadcaster.unsubscribe(id));
        assert!(!broadcaster.unsubscribe(id));
        assert_eq!(broadcaster.publish(&event()), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_can_unsubscribe_itself_during_dispatch() {
        let broadcaster = ErrorBroadcaster::new();
        let handle = broadcaster.clone();
        let own_id = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&own_id);

        let id = broadcaster.subscribe(move |_| {
            if let Some(id) = *slot.lock().unwrap() {
                handle.unsubscribe(id);
            }
        });
        *own_id.lock().unwrap() = Some(id);

        assert_eq!(broadcaster.publish(&event()), 1);
        assert_eq!(broadcaster.listener_count(), 0);
    }

    #[test]
    fn event_serializes_as_flat_object() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["status"], 500);
        assert_eq!(json["url"], "http://localhost/api/stats");
        assert_eq!(json["attempts"], 4);
    }
}
