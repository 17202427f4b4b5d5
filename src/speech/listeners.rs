//! Subscriber registry for transcript and error listeners

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Process-wide counter so ids from different registries never collide
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned by a subscription, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered set of listeners for one event type
///
/// Listeners are called outside the registry lock, so a listener may
/// subscribe or unsubscribe without deadlocking.
pub(crate) struct ListenerRegistry<T> {
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<T> ListenerRegistry<T> {
    pub(crate) fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub(crate) fn emit(&self, event: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in snapshot {
            listener(event);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let registry = ListenerRegistry::<String>::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let first = registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&hits);
        let second = registry.subscribe(move |_| {
            counter.fetch_add(10, Ordering::SeqCst);
        });

        registry.emit(&"주문".to_string());
        assert_eq!(hits.load(Ordering::SeqCst), 11);

        assert!(registry.unsubscribe(first));
        assert!(!registry.unsubscribe(first));
        registry.emit(&"결제".to_string());
        assert_eq!(hits.load(Ordering::SeqCst), 21);

        assert!(registry.unsubscribe(second));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_ids_are_unique_across_registries() {
        let a = ListenerRegistry::<u32>::default();
        let b = ListenerRegistry::<u32>::default();
        let id_a = a.subscribe(|_| {});
        let id_b = b.subscribe(|_| {});
        assert_ne!(id_a, id_b);
        assert!(!b.unsubscribe(id_a));
    }
}
