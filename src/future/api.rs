//! Reference-counted backing store for futures.
//!
//! # C++ Reference
//! - `app/src/reference_counted_future_impl.h` - ReferenceCountedFutureImpl
//! - `app/src/reference_counted_future_impl.cc`
//!
//! A service owns one [`FutureApi`] and allocates a backing record per
//! asynchronous call. Handles ([`FutureBase`](super::FutureBase) /
//! [`Future<T>`](super::Future)) are cheap reference-counted views onto those
//! records: cloning a handle increments the record's count, dropping it
//! decrements, and the record is freed (detaching any unfired callbacks) when
//! the count reaches zero. The platform bridge resolves the record exactly
//! once through a [`FutureCompleter`].
//!
//! Completion callbacks always run outside the api lock, on whatever thread
//! resolved the future.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, Weak};

use tracing::warn;

use super::backing::FutureBackingData;
use super::future::{Future, FutureBase, FutureStatus, FUTURE_ERROR_INVALID, FUTURE_MESSAGE_ABANDONED};
use crate::error::SUCCESS;

/// Integer identifying one allocated future within its api.
pub type FutureHandleId = u64;

/// Id that is never returned by an allocation. Default handles carry it.
pub const INVALID_FUTURE_HANDLE_ID: FutureHandleId = 0;

/// Type-safe allocation token for a future with result type `T`.
///
/// Returned by [`FutureApi::alloc`] and consumed by the completion entry
/// points, so completing with an incompatible result type does not compile:
///
/// ```compile_fail
/// # use firebase_app_core::FutureApi;
/// let api = FutureApi::new(1);
/// let handle = api.alloc::<u32>(None);
/// api.complete_with_result(handle, 0, "", "wrong type");
/// ```
pub struct SafeFutureHandle<T> {
    id: FutureHandleId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SafeFutureHandle<T> {
    pub(crate) fn new(id: FutureHandleId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Handle that does not reference any allocation.
    pub fn invalid() -> Self {
        Self::new(INVALID_FUTURE_HANDLE_ID)
    }

    /// The raw handle id.
    pub fn id(&self) -> FutureHandleId {
        self.id
    }
}

impl<T> Clone for SafeFutureHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SafeFutureHandle<T> {}

impl<T> std::fmt::Debug for SafeFutureHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeFutureHandle").field("id", &self.id).finish()
    }
}

/// Opaque handle to a callback registered via
/// [`FutureBase::add_on_completion`], accepted by
/// [`FutureBase::remove_on_completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionCallbackHandle {
    id: u64,
}

impl CompletionCallbackHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self { id }
    }

    /// Handle for a callback that was fired immediately or never stored.
    /// Removing it is a no-op.
    pub(crate) fn none() -> Self {
        Self { id: 0 }
    }

    pub(crate) fn id(self) -> u64 {
        self.id
    }

    pub(crate) fn is_none(self) -> bool {
        self.id == 0
    }
}

pub(crate) struct ApiState {
    pub(crate) inner: Mutex<ApiInner>,
}

pub(crate) struct ApiInner {
    backings: HashMap<FutureHandleId, FutureBackingData>,
    next_handle_id: FutureHandleId,
    next_callback_id: u64,
    /// Most recent allocation per function index; each live slot holds one
    /// reference on its backing.
    last_results: Vec<FutureHandleId>,
    /// Non-zero while a completion callback is running.
    running_callbacks: usize,
}

impl ApiInner {
    fn alloc_handle_id(&mut self) -> FutureHandleId {
        let id = self.next_handle_id;
        self.next_handle_id += 1;
        if self.next_handle_id == INVALID_FUTURE_HANDLE_ID {
            self.next_handle_id += 1;
        }
        id
    }

    pub(crate) fn next_callback_id(&mut self) -> u64 {
        self.next_callback_id += 1;
        self.next_callback_id
    }

    pub(crate) fn backing(&self, id: FutureHandleId) -> Option<&FutureBackingData> {
        self.backings.get(&id)
    }

    pub(crate) fn backing_mut(&mut self, id: FutureHandleId) -> Option<&mut FutureBackingData> {
        self.backings.get_mut(&id)
    }

    /// Add one reference to `id`. Returns false if the backing is gone.
    pub(crate) fn reference(&mut self, id: FutureHandleId) -> bool {
        match self.backings.get_mut(&id) {
            Some(backing) => {
                backing.ref_count += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one reference from `id`, freeing the backing at zero.
    ///
    /// The freed record is returned instead of dropped so the caller can drop
    /// it after releasing the api lock: a detached callback may own handles
    /// whose drop re-enters the lock.
    #[must_use]
    pub(crate) fn release(&mut self, id: FutureHandleId) -> Option<FutureBackingData> {
        let freed = match self.backings.get_mut(&id) {
            None => false,
            Some(backing) => {
                debug_assert!(backing.ref_count > 0, "future reference count underflow");
                backing.ref_count = backing.ref_count.saturating_sub(1);
                backing.ref_count == 0
            }
        };
        if freed {
            self.backings.remove(&id)
        } else {
            None
        }
    }
}

impl ApiState {
    /// Transition `id` from Pending to Complete, then run its callbacks and
    /// wake its waiters outside the lock.
    ///
    /// Returns false without touching the record if it is already complete
    /// (completion is write-once) or if every handle to it was dropped.
    pub(crate) fn complete_internal(
        state: &Arc<ApiState>,
        id: FutureHandleId,
        error: i32,
        error_message: &str,
        result: Option<Arc<dyn Any + Send + Sync>>,
    ) -> bool {
        let callbacks;
        let wakers;
        {
            let mut inner = state.inner.lock().unwrap();
            let backing = match inner.backing_mut(id) {
                Some(backing) => backing,
                None => return false,
            };
            if backing.status == FutureStatus::Complete {
                drop(inner);
                warn!(handle = id, "ignoring repeated completion of an already-complete future");
                return false;
            }
            backing.status = FutureStatus::Complete;
            backing.error = error;
            backing.error_message = error_message.to_owned();
            backing.result = result;
            callbacks = backing.take_callbacks();
            wakers = std::mem::take(&mut backing.wakers);
            // Hold the record across the callback run; released when `holder`
            // drops below.
            backing.ref_count += 1;
            inner.running_callbacks += 1;
        }
        for waker in wakers {
            waker.wake();
        }
        let holder = FutureBase::from_parts(Arc::downgrade(state), id);
        for callback in callbacks {
            callback(&holder);
        }
        drop(holder);
        state.inner.lock().unwrap().running_callbacks -= 1;
        true
    }
}

/// Backing store for the futures of one service.
///
/// # C++ Reference
/// - `app/src/reference_counted_future_impl.h:106`
///
/// `last_result_count` fixes the number of function-index slots for the
/// [`last_result`](FutureApi::last_result) table; one slot per logical API
/// entry point of the owning service.
///
/// Dropping the api invalidates every outstanding handle: their accessors
/// report [`FutureStatus::Invalid`] instead of dangling.
///
/// # Example
/// ```
/// use firebase_app_core::{FutureApi, FutureStatus};
///
/// const LOAD_FN: usize = 0;
///
/// let api = FutureApi::new(1);
/// let handle = api.alloc::<String>(Some(LOAD_FN));
/// let future = api.make_future(handle);
/// assert_eq!(future.status(), FutureStatus::Pending);
///
/// api.complete_with_result(handle, 0, "", "loaded".to_string());
/// assert_eq!(future.status(), FutureStatus::Complete);
/// assert_eq!(*future.result().unwrap(), "loaded");
/// ```
pub struct FutureApi {
    state: Arc<ApiState>,
}

impl FutureApi {
    /// Create a backing store with `last_result_count` function-index slots.
    pub fn new(last_result_count: usize) -> Self {
        Self {
            state: Arc::new(ApiState {
                inner: Mutex::new(ApiInner {
                    backings: HashMap::new(),
                    next_handle_id: INVALID_FUTURE_HANDLE_ID + 1,
                    next_callback_id: 0,
                    last_results: vec![INVALID_FUTURE_HANDLE_ID; last_result_count],
                    running_callbacks: 0,
                }),
            }),
        }
    }

    /// Allocate backing data for a future with result type `T`.
    ///
    /// If `fn_idx` is given, the last-result slot for that function index is
    /// updated to the new allocation, superseding (and unreferencing) the
    /// previous one.
    ///
    /// # Panics
    /// Panics if `fn_idx` is outside the slot range passed to
    /// [`FutureApi::new`]; registering an unknown function index is a
    /// programming error.
    pub fn alloc<T>(&self, fn_idx: Option<usize>) -> SafeFutureHandle<T> {
        let id;
        let superseded = {
            let mut inner = self.state.inner.lock().unwrap();
            id = inner.alloc_handle_id();
            inner.backings.insert(id, FutureBackingData::new());
            match fn_idx {
                None => None,
                Some(idx) => {
                    assert!(
                        idx < inner.last_results.len(),
                        "function index {} out of range (slot count {})",
                        idx,
                        inner.last_results.len()
                    );
                    let previous = std::mem::replace(&mut inner.last_results[idx], id);
                    inner.reference(id);
                    inner.release(previous)
                }
            }
        };
        drop(superseded);
        SafeFutureHandle::new(id)
    }

    /// Create a caller-facing handle for an allocation.
    ///
    /// Returns an invalid future if the allocation is already gone.
    pub fn make_future<T>(&self, handle: SafeFutureHandle<T>) -> Future<T> {
        let mut inner = self.state.inner.lock().unwrap();
        if inner.reference(handle.id()) {
            drop(inner);
            Future::from_base(FutureBase::from_parts(Arc::downgrade(&self.state), handle.id()))
        } else {
            Future::from_base(FutureBase::default())
        }
    }

    /// Create the resolve-exactly-once token handed to the platform bridge.
    pub fn completer<T: Send + Sync + 'static>(&self, handle: SafeFutureHandle<T>) -> FutureCompleter<T> {
        FutureCompleter {
            api: Arc::downgrade(&self.state),
            id: handle.id(),
            resolved: false,
            _marker: PhantomData,
        }
    }

    /// Complete `handle` without a result payload.
    ///
    /// Returns false if the future was already complete or no longer exists.
    pub fn complete<T>(&self, handle: SafeFutureHandle<T>, error: i32, error_message: &str) -> bool {
        ApiState::complete_internal(&self.state, handle.id(), error, error_message, None)
    }

    /// Complete `handle` with a result payload.
    ///
    /// Returns false if the future was already complete or no longer exists.
    pub fn complete_with_result<T: Send + Sync + 'static>(
        &self,
        handle: SafeFutureHandle<T>,
        error: i32,
        error_message: &str,
        result: T,
    ) -> bool {
        ApiState::complete_internal(&self.state, handle.id(), error, error_message, Some(Arc::new(result)))
    }

    /// Untyped handle to the most recent allocation for `fn_idx`.
    ///
    /// Returns an invalid future if nothing was allocated for the slot yet,
    /// the slot was invalidated, or `fn_idx` is out of range.
    pub fn last_result(&self, fn_idx: usize) -> FutureBase {
        let mut inner = self.state.inner.lock().unwrap();
        let id = inner
            .last_results
            .get(fn_idx)
            .copied()
            .unwrap_or(INVALID_FUTURE_HANDLE_ID);
        if inner.reference(id) {
            drop(inner);
            FutureBase::from_parts(Arc::downgrade(&self.state), id)
        } else {
            FutureBase::default()
        }
    }

    /// Typed view of [`last_result`](FutureApi::last_result).
    ///
    /// The caller asserts the slot's result type; a mismatch makes
    /// [`Future::result`] return `None`, never undefined behavior.
    pub fn last_result_as<T>(&self, fn_idx: usize) -> Future<T> {
        Future::from_base(self.last_result(fn_idx))
    }

    /// Drop the last-result slot for `fn_idx`; later
    /// [`last_result`](FutureApi::last_result) calls return an invalid future
    /// until the next allocation for the slot. Out-of-range indices are
    /// ignored.
    pub fn invalidate_last_result(&self, fn_idx: usize) {
        let freed = {
            let mut inner = self.state.inner.lock().unwrap();
            if fn_idx >= inner.last_results.len() {
                return;
            }
            let previous = std::mem::replace(&mut inner.last_results[fn_idx], INVALID_FUTURE_HANDLE_ID);
            inner.release(previous)
        };
        drop(freed);
    }

    /// Number of function-index slots.
    pub fn last_result_count(&self) -> usize {
        self.state.inner.lock().unwrap().last_results.len()
    }

    /// True while at least one handle references the allocation.
    pub fn valid_future<T>(&self, handle: SafeFutureHandle<T>) -> bool {
        self.state.inner.lock().unwrap().backing(handle.id()).is_some()
    }

    /// True when no future is pending and no completion callback is running.
    ///
    /// Service owners gate their teardown on this so they do not free state a
    /// running callback can still touch.
    pub fn is_safe_to_delete(&self) -> bool {
        let inner = self.state.inner.lock().unwrap();
        inner.running_callbacks == 0
            && inner
                .backings
                .values()
                .all(|backing| backing.status != FutureStatus::Pending)
    }

    /// True when some allocation is referenced by a handle outside the
    /// last-result table.
    pub fn is_referenced_externally(&self) -> bool {
        let inner = self.state.inner.lock().unwrap();
        let mut slot_refs: HashMap<FutureHandleId, usize> = HashMap::new();
        for &id in &inner.last_results {
            if id != INVALID_FUTURE_HANDLE_ID {
                *slot_refs.entry(id).or_default() += 1;
            }
        }
        inner
            .backings
            .iter()
            .any(|(id, backing)| backing.ref_count > slot_refs.get(id).copied().unwrap_or(0))
    }
}

impl std::fmt::Debug for FutureApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.state.inner.lock().unwrap();
        f.debug_struct("FutureApi")
            .field("backings", &inner.backings.len())
            .field("last_results", &inner.last_results.len())
            .finish()
    }
}

/// Bridge-side token that resolves one future exactly once.
///
/// The platform bridge receives the completer when work is dispatched and
/// must consume it with one of the completion methods, mapping bridge-internal
/// failures (timeout, disconnect, missing backend) to a non-zero error code.
/// If the bridge drops the completer without resolving it, the future is
/// completed with [`FUTURE_ERROR_INVALID`] and a fixed message so callers are
/// never left awaiting a permanently pending handle.
pub struct FutureCompleter<T> {
    api: Weak<ApiState>,
    id: FutureHandleId,
    resolved: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> FutureCompleter<T> {
    /// Complete without a result payload.
    pub fn complete(mut self, error: i32, error_message: &str) -> bool {
        self.resolved = true;
        match self.api.upgrade() {
            Some(state) => ApiState::complete_internal(&state, self.id, error, error_message, None),
            None => false,
        }
    }

    /// Complete with a result payload.
    pub fn complete_with_result(mut self, error: i32, error_message: &str, result: T) -> bool {
        self.resolved = true;
        match self.api.upgrade() {
            Some(state) => {
                ApiState::complete_internal(&state, self.id, error, error_message, Some(Arc::new(result)))
            }
            None => false,
        }
    }

    /// Complete successfully with a result payload.
    pub fn complete_ok(self, result: T) -> bool {
        self.complete_with_result(SUCCESS, "", result)
    }

    /// The allocation this completer resolves.
    pub fn handle(&self) -> SafeFutureHandle<T> {
        SafeFutureHandle::new(self.id)
    }
}

impl<T> Drop for FutureCompleter<T> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        let Some(state) = self.api.upgrade() else {
            return;
        };
        if ApiState::complete_internal(&state, self.id, FUTURE_ERROR_INVALID, FUTURE_MESSAGE_ABANDONED, None) {
            warn!(handle = self.id, "future completer dropped before resolving");
        }
    }
}

impl<T> std::fmt::Debug for FutureCompleter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FutureCompleter")
            .field("id", &self.id)
            .field("resolved", &self.resolved)
            .finish()
    }
}
