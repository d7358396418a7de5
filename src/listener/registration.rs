//! Removable handles to event-stream subscriptions.
//!
//! # C++ Reference
//! - `firestore/src/include/firebase/firestore/listener_registration.h`
//!
//! A backend that pushes update events hands the subscriber a
//! [`ListenerRegistration`]. Clones share one subscription and one removed
//! flag; `remove()` detaches the subscription exactly once no matter how many
//! clones call it, from however many threads.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type RemoveFn = Box<dyn FnOnce() + Send>;

struct RegistrationState {
    removed: AtomicBool,
    remove_fn: Mutex<Option<RemoveFn>>,
}

/// Handle to an active event subscription.
///
/// Created with the detach closure the platform bridge supplies at
/// subscription time. The closure runs at most once, on the first
/// [`remove`](ListenerRegistration::remove) across all clones. Dropping every
/// clone without calling `remove` leaves the subscription active; only an
/// explicit remove (by a caller or by the owning service's teardown) detaches
/// it.
#[derive(Clone, Default)]
pub struct ListenerRegistration {
    state: Option<Arc<RegistrationState>>,
}

impl ListenerRegistration {
    /// Wrap the detach closure for a new subscription.
    pub fn new<F>(remove_fn: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            state: Some(Arc::new(RegistrationState {
                removed: AtomicBool::new(false),
                remove_fn: Mutex::new(Some(Box::new(remove_fn))),
            })),
        }
    }

    /// Registration whose removal calls back into its owning service object.
    ///
    /// The owner is captured weakly: if the service has already been torn
    /// down when removal happens, the closure is not called and `remove()`
    /// degrades to a flag flip. This keeps straggler registrations safe in
    /// either teardown order.
    pub fn with_owner<O, F>(owner: &Arc<O>, remove_fn: F) -> Self
    where
        O: Send + Sync + 'static,
        F: FnOnce(&O) + Send + 'static,
    {
        let owner = Arc::downgrade(owner);
        Self::new(move || {
            if let Some(owner) = owner.upgrade() {
                remove_fn(&owner);
            }
        })
    }

    /// Registration with no active subscription. `remove()` is a no-op.
    pub fn no_op() -> Self {
        Self::default()
    }

    /// Detach the subscription.
    ///
    /// Idempotent: the first call (on this or any clone) runs the detach
    /// closure; every later call is a no-op. Safe to call concurrently; the
    /// closure is executed by exactly one of the racing callers.
    pub fn remove(&self) {
        let Some(state) = &self.state else {
            return;
        };
        if state.removed.swap(true, Ordering::AcqRel) {
            return;
        }
        let remove_fn = state.remove_fn.lock().unwrap().take();
        if let Some(remove_fn) = remove_fn {
            remove_fn();
        }
    }

    /// True once the subscription was removed, or when the registration never
    /// had one.
    pub fn is_removed(&self) -> bool {
        match &self.state {
            None => true,
            Some(state) => state.removed.load(Ordering::Acquire),
        }
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.state.is_some())
            .field("removed", &self.is_removed())
            .finish()
    }
}
