use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

impl Registry {
    fn listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Observer registry for authenticated/unauthenticated transitions.
///
/// Listeners receive no payload and run in registration order. Clones share
/// the same registry.
#[derive(Clone, Default)]
pub struct AuthStateBroadcaster {
    registry: Arc<Registry>,
}

impl AuthStateBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.listeners().push((id, Arc::new(listener)));
        tracing::debug!(subscription = id, "Auth state listener registered");

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Invoke every listener registered at the time of the call.
    ///
    /// A panicking listener is logged and skipped. The list is copied first,
    /// so callbacks may subscribe or unsubscribe without deadlocking.
    pub fn notify(&self) {
        let snapshot: Vec<(u64, Listener)> = self
            .registry
            .listeners()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                tracing::warn!(subscription = id, "Auth state listener panicked");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.listeners().len()
    }
}

/// Handle returned by [`AuthStateBroadcaster::subscribe`].
///
/// Dropping it leaves the listener registered.
#[must_use = "call unsubscribe() to remove the listener"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.listeners().retain(|(id, _)| *id != self.id);
            tracing::debug!(subscription = self.id, "Auth state listener removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        (count, move || {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn notify_reaches_every_listener() {
        let broadcaster = AuthStateBroadcaster::new();
        let (first, f) = counter();
        let (second, g) = counter();
        let _a = broadcaster.subscribe(f);
        let _b = broadcaster.subscribe(g);

        broadcaster.notify();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let broadcaster = AuthStateBroadcaster::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut subscriptions = Vec::new();
        for n in 0..4 {
            let order = Arc::clone(&order);
            subscriptions.push(broadcaster.subscribe(move || order.lock().unwrap().push(n)));
        }

        broadcaster.notify();

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let broadcaster = AuthStateBroadcaster::new();
        let (count, f) = counter();
        let f = Arc::new(f);
        let first = {
            let f = Arc::clone(&f);
            broadcaster.subscribe(move || f())
        };
        let _second = {
            let f = Arc::clone(&f);
            broadcaster.subscribe(move || f())
        };

        first.unsubscribe();
        broadcaster.notify();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(broadcaster.listener_count(), 1);
    }

    #[test]
    fn dropping_subscription_keeps_listener() {
        let broadcaster = AuthStateBroadcaster::new();
        let (count, f) = counter();
        drop(broadcaster.subscribe(f));

        broadcaster.notify();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_does_not_stop_later_ones() {
        let broadcaster = AuthStateBroadcaster::new();
        let (count, f) = counter();
        let _bad = broadcaster.subscribe(|| panic!("listener failure"));
        let _good = broadcaster.subscribe(f);

        broadcaster.notify();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_may_unsubscribe_during_notify() {
        let broadcaster = AuthStateBroadcaster::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let (count, f) = counter();

        let inner_slot = Arc::clone(&slot);
        let subscription = broadcaster.subscribe(move || {
            f();
            if let Some(subscription) = inner_slot.lock().unwrap().take() {
                subscription.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(subscription);

        broadcaster.notify();
        broadcaster.notify();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(broadcaster.listener_count(), 0);
    }

    #[test]
    fn clones_share_registry() {
        let broadcaster = AuthStateBroadcaster::new();
        let (count, f) = counter();
        let _s = broadcaster.subscribe(f);

        broadcaster.clone().notify();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
