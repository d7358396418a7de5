//! Firebase App Core
//!
//! Asynchronous operation lifecycle and instance-ownership core shared by the
//! Firebase Rust SDK service modules (Auth, Firestore, Remote Config, ...).
//!
//! Service crates expose their asynchronous entry points as reference-counted
//! [`Future<T>`] handles backed by a [`FutureApi`], hand long-lived client
//! instances to an [`InstanceRegistry`] so bindings in garbage-collected
//! hosts can share them safely, and return [`ListenerRegistration`] handles
//! for update-event subscriptions. The platform-specific work itself lives in
//! bridge adapters; [`bridge`] provides the tokio-backed one.
//!
//! # Example
//! ```
//! use firebase_app_core::bridge::spawn_operation;
//! use firebase_app_core::FutureApi;
//!
//! const FETCH_FN: usize = 0;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let api = FutureApi::new(1);
//! let future = spawn_operation(&api, Some(FETCH_FN), async {
//!     Ok("fetched".to_string())
//! });
//!
//! assert_eq!(*future.value().await.unwrap(), "fetched");
//! assert_eq!(api.last_result_as::<String>(FETCH_FN), future);
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod app;
pub mod bridge;
pub mod error;
pub mod future;
pub mod instance;
pub mod listener;

// Re-exports for convenience
pub use app::{App, AppOptions, DEFAULT_APP_NAME};
pub use error::{error_message, AppError, ErrorCode, InitResult, OperationError, SUCCESS};
pub use future::{
    CompletionCallbackHandle, Future, FutureApi, FutureBase, FutureCompleter, FutureStatus,
    SafeFutureHandle,
};
pub use instance::{InstanceKey, InstanceRegistry, RegistryError};
pub use listener::ListenerRegistration;
