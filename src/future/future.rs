//! Caller-facing future handles.
//!
//! # C++ Reference
//! - `app/src/include/firebase/future.h` - FutureBase / Future<T>
//!
//! [`FutureBase`] is the untyped handle over one asynchronous operation's
//! status, error and result; [`Future<T>`] is its type-specific view. Handles
//! are cheap to clone: every clone references the same completion record, and
//! the record is reference counted, living as long as its longest holder.
//!
//! Callers observe completion three ways: poll [`FutureBase::status`], hang a
//! callback with [`FutureBase::on_completion`], or suspend in
//! [`FutureBase::wait`]. Whichever is used, the completed error code and
//! result are read through the same accessors; a failed operation is a
//! non-zero [`FutureBase::error`] plus message, never a panic.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};
use std::task::Poll;

use super::api::{ApiState, CompletionCallbackHandle, FutureHandleId, INVALID_FUTURE_HANDLE_ID};
use crate::error::{OperationError, SUCCESS};

/// Asynchronous call status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    /// Results are ready.
    Complete,
    /// Result is still being processed.
    Pending,
    /// No result is pending: the handle is default-constructed, was released,
    /// or its owning api was destroyed.
    Invalid,
}

/// Error code reported by accessors of an invalid future.
pub const FUTURE_ERROR_INVALID: i32 = -1;

/// Error message reported by accessors of an invalid future.
pub const FUTURE_MESSAGE_INVALID: &str = "Invalid Future";

/// Error message set when a bridge abandoned an operation without resolving it.
pub const FUTURE_MESSAGE_ABANDONED: &str = "Operation was abandoned before it completed";

/// Type-independent handle over the eventual result of an asynchronous call.
///
/// # C++ Reference
/// - `app/src/include/firebase/future.h:129`
pub struct FutureBase {
    api: Weak<ApiState>,
    id: FutureHandleId,
}

impl FutureBase {
    pub(crate) fn from_parts(api: Weak<ApiState>, id: FutureHandleId) -> Self {
        Self { api, id }
    }

    /// The handle id within the owning api, or
    /// [`INVALID_FUTURE_HANDLE_ID`](super::INVALID_FUTURE_HANDLE_ID) for an
    /// invalid handle.
    pub fn id(&self) -> FutureHandleId {
        self.id
    }

    fn with_backing<R>(&self, f: impl FnOnce(&super::backing::FutureBackingData) -> R) -> Option<R> {
        let state = self.api.upgrade()?;
        let inner = state.inner.lock().unwrap();
        inner.backing(self.id).map(f)
    }

    /// Completion status of the asynchronous call.
    pub fn status(&self) -> FutureStatus {
        self.with_backing(|backing| backing.status)
            .unwrap_or(FutureStatus::Invalid)
    }

    /// True unless the handle is default-constructed, released, or its owning
    /// api was destroyed.
    pub fn is_valid(&self) -> bool {
        self.status() != FutureStatus::Invalid
    }

    /// The API-defined error code.
    ///
    /// Meaningful once [`status`](FutureBase::status) is
    /// [`FutureStatus::Complete`]; zero while pending and
    /// [`FUTURE_ERROR_INVALID`] for an invalid handle.
    pub fn error(&self) -> i32 {
        self.with_backing(|backing| backing.error)
            .unwrap_or(FUTURE_ERROR_INVALID)
    }

    /// Human-readable description of the error, or an empty string when the
    /// API does not provide one.
    pub fn error_message(&self) -> String {
        self.with_backing(|backing| backing.error_message.clone())
            .unwrap_or_else(|| FUTURE_MESSAGE_INVALID.to_string())
    }

    /// Type-erased result of the call, or `None` while it is pending, when it
    /// completed without a result payload, or when the handle is invalid.
    pub fn result_any(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.with_backing(|backing| {
            if backing.status == FutureStatus::Complete {
                backing.result.clone()
            } else {
                None
            }
        })
        .flatten()
    }

    /// Register a single callback called at most once, when the future
    /// completes.
    ///
    /// Re-registering replaces the previously registered single callback;
    /// callbacks added with [`add_on_completion`](FutureBase::add_on_completion)
    /// are unaffected. If the future is already complete the callback runs
    /// immediately on the calling thread; otherwise it runs on whatever
    /// thread resolves the future, so it must not block. If every handle is
    /// dropped before completion the callback is discarded unfired.
    pub fn on_completion<F>(&self, callback: F)
    where
        F: FnOnce(&FutureBase) + Send + 'static,
    {
        let mut callback = Some(callback);
        let mut fire_now = false;
        let mut replaced = None;
        if let Some(state) = self.api.upgrade() {
            let mut inner = state.inner.lock().unwrap();
            match inner.backing_mut(self.id) {
                None => {}
                Some(backing) if backing.status == FutureStatus::Complete => fire_now = true,
                Some(backing) => {
                    replaced = backing.single_callback.replace(Box::new(callback.take().unwrap()));
                }
            }
        }
        // A replaced callback may own handles of its own; drop it outside the
        // lock.
        drop(replaced);
        if fire_now {
            (callback.take().unwrap())(self);
        }
    }

    /// Like [`on_completion`](FutureBase::on_completion), but allows adding
    /// multiple callbacks.
    ///
    /// On completion the single-slot callback runs first, then added
    /// callbacks in registration order. Returns a handle accepted by
    /// [`remove_on_completion`](FutureBase::remove_on_completion).
    pub fn add_on_completion<F>(&self, callback: F) -> CompletionCallbackHandle
    where
        F: FnOnce(&FutureBase) + Send + 'static,
    {
        let mut callback = Some(callback);
        let mut fire_now = false;
        let handle = match self.api.upgrade() {
            None => CompletionCallbackHandle::none(),
            Some(state) => {
                let mut inner = state.inner.lock().unwrap();
                let callback_id = inner.next_callback_id();
                match inner.backing_mut(self.id) {
                    None => CompletionCallbackHandle::none(),
                    Some(backing) if backing.status == FutureStatus::Complete => {
                        fire_now = true;
                        CompletionCallbackHandle::none()
                    }
                    Some(backing) => {
                        backing
                            .added_callbacks
                            .push((callback_id, Box::new(callback.take().unwrap())));
                        CompletionCallbackHandle::new(callback_id)
                    }
                }
            }
        };
        if fire_now {
            (callback.take().unwrap())(self);
        }
        handle
    }

    /// Unregister a callback previously added with
    /// [`add_on_completion`](FutureBase::add_on_completion). No-op if the
    /// callback already ran or was already removed.
    pub fn remove_on_completion(&self, handle: CompletionCallbackHandle) {
        if handle.is_none() {
            return;
        }
        let removed = match self.api.upgrade() {
            None => None,
            Some(state) => {
                let mut inner = state.inner.lock().unwrap();
                match inner.backing_mut(self.id) {
                    None => None,
                    Some(backing) => backing
                        .added_callbacks
                        .iter()
                        .position(|(id, _)| *id == handle.id())
                        .map(|index| backing.added_callbacks.remove(index)),
                }
            }
        };
        // Dropped outside the lock: the callback may own handles of its own.
        drop(removed);
    }

    /// Suspend until the future completes.
    ///
    /// Resolves immediately with the current status if the future is already
    /// complete or the handle is invalid.
    pub async fn wait(&self) -> FutureStatus {
        std::future::poll_fn(|cx| {
            let Some(state) = self.api.upgrade() else {
                return Poll::Ready(FutureStatus::Invalid);
            };
            let mut inner = state.inner.lock().unwrap();
            match inner.backing_mut(self.id) {
                None => Poll::Ready(FutureStatus::Invalid),
                Some(backing) if backing.status == FutureStatus::Complete => {
                    Poll::Ready(FutureStatus::Complete)
                }
                Some(backing) => {
                    if !backing.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                        backing.wakers.push(cx.waker().clone());
                    }
                    Poll::Pending
                }
            }
        })
        .await
    }

    /// Explicitly drop this handle's reference to the underlying operation.
    /// The handle becomes invalid.
    pub fn release(&mut self) {
        let released = std::mem::take(self);
        drop(released);
    }
}

impl Default for FutureBase {
    fn default() -> Self {
        Self {
            api: Weak::new(),
            id: INVALID_FUTURE_HANDLE_ID,
        }
    }
}

impl Clone for FutureBase {
    fn clone(&self) -> Self {
        if let Some(state) = self.api.upgrade() {
            let mut inner = state.inner.lock().unwrap();
            if inner.reference(self.id) {
                return Self {
                    api: self.api.clone(),
                    id: self.id,
                };
            }
        }
        Self::default()
    }
}

impl Drop for FutureBase {
    fn drop(&mut self) {
        if self.id == INVALID_FUTURE_HANDLE_ID {
            return;
        }
        if let Some(state) = self.api.upgrade() {
            let freed = {
                let mut inner = state.inner.lock().unwrap();
                inner.release(self.id)
            };
            // Any detached callbacks are dropped here, outside the lock.
            drop(freed);
        }
    }
}

impl PartialEq for FutureBase {
    /// Two handles are equal when they reference the same operation of the
    /// same api.
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.api, &other.api) && self.id == other.id
    }
}

impl fmt::Debug for FutureBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureBase")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

/// Type-specific version of [`FutureBase`].
///
/// # C++ Reference
/// - `app/src/include/firebase/future.h:400`
///
/// All asynchronous entry points of a service return a `Future<T>`, and each
/// provides a last-result accessor to retrieve the future of its most recent
/// call. Once complete, check [`error`](FutureBase::error) before consuming
/// [`result`](Future::result):
///
/// ```
/// use firebase_app_core::{FutureApi, FutureStatus};
///
/// let api = FutureApi::new(0);
/// let handle = api.alloc::<u64>(None);
/// let future = api.make_future(handle);
/// api.complete_with_result(handle, 0, "", 7u64);
///
/// if future.status() == FutureStatus::Complete && future.error() == 0 {
///     assert_eq!(*future.result().unwrap(), 7);
/// }
/// ```
pub struct Future<T> {
    base: FutureBase,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Future<T> {
    /// Wrap an untyped handle. The caller asserts the operation's result
    /// type; a mismatch makes [`result`](Future::result) return `None`.
    pub fn from_base(base: FutureBase) -> Self {
        Self {
            base,
            _marker: PhantomData,
        }
    }

    /// Discard the type information.
    pub fn into_base(self) -> FutureBase {
        self.base
    }
}

impl<T: Send + Sync + 'static> Future<T> {
    /// Result of the asynchronous call, or `None` while it is pending, when
    /// it completed without a result, or when the stored result is not a `T`.
    pub fn result(&self) -> Option<Arc<T>> {
        self.base.result_any().and_then(|result| result.downcast::<T>().ok())
    }

    /// Typed [`FutureBase::on_completion`].
    pub fn on_completion<F>(&self, callback: F)
    where
        F: FnOnce(&Future<T>) + Send + 'static,
    {
        self.base.on_completion(move |base| {
            let typed = Future::<T>::from_base(base.clone());
            callback(&typed);
        });
    }

    /// Typed [`FutureBase::add_on_completion`].
    pub fn add_on_completion<F>(&self, callback: F) -> CompletionCallbackHandle
    where
        F: FnOnce(&Future<T>) + Send + 'static,
    {
        self.base.add_on_completion(move |base| {
            let typed = Future::<T>::from_base(base.clone());
            callback(&typed);
        })
    }

    /// Suspend until completion, then return the result or the `(code,
    /// message)` error.
    ///
    /// Completing successfully without a result payload is reported as an
    /// internal error; use [`FutureBase::wait`] directly for operations that
    /// produce no result.
    pub async fn value(&self) -> Result<Arc<T>, OperationError> {
        match self.base.wait().await {
            FutureStatus::Complete => {
                if self.base.error() == SUCCESS {
                    self.result().ok_or_else(|| {
                        OperationError::new(
                            crate::error::ErrorCode::Internal.code(),
                            "operation completed without a result payload",
                        )
                    })
                } else {
                    Err(OperationError::new(self.base.error(), self.base.error_message()))
                }
            }
            _ => Err(OperationError::new(FUTURE_ERROR_INVALID, FUTURE_MESSAGE_INVALID)),
        }
    }
}

impl<T> Deref for Future<T> {
    type Target = FutureBase;

    fn deref(&self) -> &FutureBase {
        &self.base
    }
}

impl<T> DerefMut for Future<T> {
    fn deref_mut(&mut self) -> &mut FutureBase {
        &mut self.base
    }
}

impl<T> Default for Future<T> {
    fn default() -> Self {
        Self::from_base(FutureBase::default())
    }
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self::from_base(self.base.clone())
    }
}

impl<T> PartialEq for Future<T> {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("id", &self.base.id())
            .field("status", &self.base.status())
            .finish()
    }
}
