//! Reference-counted asynchronous operation handles.
//!
//! # C++ SDK Structure Mapping
//! Following the C++ SDK's file organization:
//! - `future.h` → `future.rs` (FutureBase, Future<T>, FutureStatus)
//! - `reference_counted_future_impl.h/.cc` → `api.rs` + `backing.rs`
//!
//! Every asynchronous entry point of a service allocates a record in its
//! [`FutureApi`], hands the caller a [`Future<T>`] and hands the platform
//! bridge a [`FutureCompleter`]. The bridge resolves exactly once; callers
//! poll, register completion callbacks, or `await`.

mod api;
mod backing;
mod future;

pub use api::{
    CompletionCallbackHandle, FutureApi, FutureCompleter, FutureHandleId, SafeFutureHandle,
    INVALID_FUTURE_HANDLE_ID,
};
pub use future::{
    Future, FutureBase, FutureStatus, FUTURE_ERROR_INVALID, FUTURE_MESSAGE_ABANDONED,
    FUTURE_MESSAGE_INVALID,
};
