use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use bearer_issuer::ClaimSet;
use tracing::{debug, error};

/// Callback invoked with the new claims, or `None` when auth was lost.
pub type Subscriber = Arc<dyn Fn(Option<&ClaimSet>) + Send + Sync>;

/// Stable identity of a registration. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberHandle(u64);

impl SubscriberHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Default)]
struct Entries {
    next: u64,
    subscribers: BTreeMap<u64, Subscriber>,
}

/// Ordered set of subscribers keyed by a monotonically increasing handle.
#[derive(Default)]
pub struct SubscriberRegistry {
    entries: Mutex<Entries>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, subscriber: Subscriber) -> SubscriberHandle {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let id = guard.next;
        guard.next += 1;
        guard.subscribers.insert(id, subscriber);
        debug!(handle = id, "subscriber registered");
        SubscriberHandle(id)
    }

    /// Remove exactly one registration. Returns false if it was already gone.
    pub fn remove(&self, handle: SubscriberHandle) -> bool {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        guard.subscribers.remove(&handle.0).is_some()
    }

    pub fn len(&self) -> usize {
        let guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        guard.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every subscriber registered at the moment of the call, in
    /// registration order. A panicking subscriber is logged and skipped.
    /// Returns how many subscribers completed normally.
    pub fn notify(&self, claims: Option<&ClaimSet>) -> usize {
        let snapshot: Vec<(u64, Subscriber)> = {
            let guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            guard
                .subscribers
                .iter()
                .map(|(id, subscriber)| (*id, Arc::clone(subscriber)))
                .collect()
        };

        let mut delivered = 0;
        for (id, subscriber) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| subscriber(claims))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(handle = id, "auth subscriber panicked"),
            }
        }
        delivered
    }
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("len", &self.len())
            .finish()
    }
}

/// Capability to remove one registration.
#[derive(Debug, Clone)]
pub struct Subscription {
    registry: Weak<SubscriberRegistry>,
    handle: SubscriberHandle,
}

impl Subscription {
    pub(crate) fn new(registry: &Arc<SubscriberRegistry>, handle: SubscriberHandle) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            handle,
        }
    }

    pub fn handle(&self) -> SubscriberHandle {
        self.handle
    }

    /// Stop notifications to this registration. Returns false if it was
    /// already removed or the holder is gone.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.handle),
            None => false,
        }
    }
}
