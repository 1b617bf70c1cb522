//! Listener registries and subscription handles.
//!
//! Listeners are plain callbacks invoked synchronously, in subscription
//! order, on the thread that triggered the change. A panicking listener is
//! logged and skipped; the caller and the remaining listeners are unaffected.

use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

/// A set of callbacks interested in values of type `T`.
pub struct Listeners<T> {
    registry: Arc<RwLock<Registry<T>>>,
}

impl<T: 'static> Listeners<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Registers `listener` until the returned subscription is dropped or
    /// unsubscribed.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut registry = self.registry.write();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, Arc::new(listener)));
            id
        };

        let weak: Weak<RwLock<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                registry.write().entries.retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Invokes every listener with `value`.
    pub fn notify(&self, value: &T) {
        // Snapshot so listeners may subscribe or unsubscribe while being called.
        let listeners: Vec<Listener<T>> = self
            .registry
            .read()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            call_guarded(listener.as_ref(), value);
        }
    }

    /// Returns the number of registered listeners.
    pub fn len(&self) -> usize {
        self.registry.read().entries.len()
    }

    /// Returns true if nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Calls `listener`, containing any panic it raises.
pub(crate) fn call_guarded<T: ?Sized, F: Fn(&T) + ?Sized>(listener: &F, value: &T) {
    if panic::catch_unwind(AssertUnwindSafe(|| listener(value))).is_err() {
        tracing::warn!("listener panicked; continuing with remaining listeners");
    }
}

/// Handle returned by every `subscribe` call.
///
/// Dropping the handle unsubscribes; call [`Subscription::detach`] to keep
/// the listener for the lifetime of its source.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Creates a subscription that runs `cancel` when unsubscribed.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Removes the listener.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keeps the listener registered forever.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
