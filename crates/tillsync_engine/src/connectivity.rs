//! Network reachability.

use crate::listeners::{Listeners, Subscription};
use std::sync::atomic::{AtomicBool, Ordering};

/// Reports whether the device can reach the network.
pub trait Connectivity: Send + Sync {
    /// Returns the current reachability.
    fn is_online(&self) -> bool;

    /// Registers a listener called with the new value on every change.
    fn subscribe(&self, listener: Box<dyn Fn(bool) + Send + Sync>) -> Subscription;
}

/// Connectivity driven by the host application.
///
/// Platform glue (or a test) calls [`ManualConnectivity::set_online`] when
/// the network comes and goes.
pub struct ManualConnectivity {
    online: AtomicBool,
    listeners: Listeners<bool>,
}

impl ManualConnectivity {
    /// Creates connectivity in the given state.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            listeners: Listeners::new(),
        }
    }

    /// Creates connectivity that starts online.
    pub fn online() -> Self {
        Self::new(true)
    }

    /// Creates connectivity that starts offline.
    pub fn offline() -> Self {
        Self::new(false)
    }

    /// Updates reachability. Listeners only hear about actual changes.
    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            tracing::info!(online, "connectivity changed");
            self.listeners.notify(&online);
        }
    }
}

impl Connectivity for ManualConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn subscribe(&self, listener: Box<dyn Fn(bool) + Send + Sync>) -> Subscription {
        self.listeners.subscribe(move |online| listener(*online))
    }
}

impl std::fmt::Debug for ManualConnectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualConnectivity")
            .field("online", &self.is_online())
            .finish()
    }
}
