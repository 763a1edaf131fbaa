//! One-way push channel for status snapshots
//!
//! Observers register a callback and get back a `Subscription`. Cancelling
//! (explicitly or by dropping the handle) detaches the observer; cancelling
//! twice is harmless.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    observers: Vec<(u64, Observer<T>)>,
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    // observers never run under the lock, so a poisoned registry is still consistent
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fan-out of snapshots to every live subscriber, in publish order
pub struct StatusBroadcaster<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: Send + 'static> StatusBroadcaster<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    /// Register `observer` for every subsequent snapshot
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.observers.push((id, Arc::new(observer)));
            id
        };

        let weak = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                lock(&registry).observers.retain(|(observer_id, _)| *observer_id != id);
            }
        })
    }

    /// Deliver `value` once to each live subscriber. Returns the number of
    /// observers reached.
    pub fn publish(&self, value: &T) -> usize {
        let observers: Vec<Observer<T>> = lock(&self.registry)
            .observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in &observers {
            observer(value);
        }
        observers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).observers.len()
    }
}

impl<T: Clone + Send + 'static> StatusBroadcaster<T> {
    /// Subscribe through an unbounded channel instead of a callback
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |value: &T| {
            let _ = tx.send(value.clone());
        });
        (subscription, rx)
    }
}

impl<T: Send + 'static> Default for StatusBroadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered observer
pub struct Subscription {
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    /// Stop receiving snapshots. Safe to call more than once.
    pub fn cancel(&self) {
        let detach = self
            .detach
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(detach) = detach {
            detach();
        }
    }

    pub fn is_active(&self) -> bool {
        self.detach
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.is_active()).finish()
    }
}
