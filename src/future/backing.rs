//! Backing record for one asynchronous operation.
//!
//! # C++ Reference
//! - `app/src/reference_counted_future_impl.cc` (FutureBackingData)

use std::any::Any;
use std::sync::Arc;
use std::task::Waker;

use super::future::{FutureBase, FutureStatus};

/// Completion callback stored by a backing record.
///
/// Invoked with the completed untyped handle, outside the api lock.
pub(crate) type CompletionCallback = Box<dyn FnOnce(&FutureBase) + Send>;

/// The important data for one future: status, error, result, reference count
/// and registered continuations. Held by the api and indexed by handle id;
/// freed when no handle references it any more.
pub(crate) struct FutureBackingData {
    pub(crate) status: FutureStatus,
    pub(crate) error: i32,
    pub(crate) error_message: String,
    /// Type-erased result payload; present only once completed with a result.
    pub(crate) result: Option<Arc<dyn Any + Send + Sync>>,
    /// Number of handles (including last-result slots) referencing this record.
    pub(crate) ref_count: usize,
    /// Single-slot callback; re-registering replaces the previous one.
    pub(crate) single_callback: Option<CompletionCallback>,
    /// Additional callbacks, keyed for removal, fired in registration order.
    pub(crate) added_callbacks: Vec<(u64, CompletionCallback)>,
    /// Tasks suspended in `wait()`; woken on completion.
    pub(crate) wakers: Vec<Waker>,
}

impl FutureBackingData {
    pub(crate) fn new() -> Self {
        Self {
            status: FutureStatus::Pending,
            error: 0,
            error_message: String::new(),
            result: None,
            ref_count: 0,
            single_callback: None,
            added_callbacks: Vec::new(),
            wakers: Vec::new(),
        }
    }

    /// Drain every registered callback: the single-slot callback first, then
    /// the added callbacks in the order they were registered.
    pub(crate) fn take_callbacks(&mut self) -> Vec<CompletionCallback> {
        let mut callbacks = Vec::with_capacity(self.added_callbacks.len() + 1);
        if let Some(callback) = self.single_callback.take() {
            callbacks.push(callback);
        }
        callbacks.extend(self.added_callbacks.drain(..).map(|(_, callback)| callback));
        callbacks
    }
}
