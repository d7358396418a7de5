//! Tokio-backed platform bridge adapter.
//!
//! The core never performs work itself: a platform bridge runs the operation
//! on its own thread or queue and resolves the future, or feeds a stream of
//! update events into a listener callback. On platforms where that work is a
//! tokio task, this module is the bridge. Platform-native bridges (JNI shims,
//! delegate objects, dynamic-library callback tables) implement the same two
//! contracts out of tree:
//!
//! - an operation receives a [`FutureCompleter`](crate::future::FutureCompleter)
//!   and resolves it exactly once, mapping internal failures to a non-zero
//!   `(code, message)`;
//! - a subscription supplies its detach closure to
//!   [`ListenerRegistration`](crate::ListenerRegistration) and stops
//!   delivering events once it runs.

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

use crate::error::OperationError;
use crate::future::{Future, FutureApi};
use crate::listener::ListenerRegistration;

/// Dispatch an asynchronous unit of work and return the future observing it.
///
/// Allocates a future in `api` (recording it in the last-result slot for
/// `fn_idx`, if given), spawns `op` on the tokio runtime and resolves the
/// future from the task: `Ok` completes with a success code and the result,
/// `Err` with the carried `(code, message)`. If the task is cancelled or
/// panics before resolving, the dropped completer completes the future with
/// the abandoned sentinel, so callers never await a permanently pending
/// handle.
///
/// # Example
/// ```
/// # use firebase_app_core::bridge::spawn_operation;
/// # use firebase_app_core::FutureApi;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let api = FutureApi::new(1);
/// let future = spawn_operation(&api, Some(0), async { Ok(2 + 2) });
/// assert_eq!(*future.value().await.unwrap(), 4);
/// # }
/// ```
pub fn spawn_operation<T, Fut>(api: &FutureApi, fn_idx: Option<usize>, op: Fut) -> Future<T>
where
    T: Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<T, OperationError>> + Send + 'static,
{
    let handle = api.alloc::<T>(fn_idx);
    let future = api.make_future(handle);
    let completer = api.completer(handle);
    tokio::spawn(async move {
        match op.await {
            Ok(result) => {
                completer.complete_ok(result);
            }
            Err(err) => {
                completer.complete(err.code, &err.message);
            }
        }
    });
    future
}

/// Forward every event of `stream` into `on_event` until the returned
/// registration is removed or the stream ends.
///
/// The callback runs on the forwarding task; it must not block. Removal is
/// asynchronous: events already in flight when `remove()` returns may still
/// be delivered. Dropping the registration without removing it leaves the
/// subscription running for the life of the stream.
pub fn spawn_stream_listener<S, F>(stream: S, mut on_event: F) -> ListenerRegistration
where
    S: Stream + Send + 'static,
    S::Item: Send,
    F: FnMut(S::Item) + Send + 'static,
{
    let cancel = Arc::new(Notify::new());
    let cancel_signal = Arc::clone(&cancel);
    tokio::spawn(async move {
        tokio::pin!(stream);
        loop {
            tokio::select! {
                _ = cancel_signal.notified() => {
                    debug!("listener removed; stopping event forwarding");
                    break;
                }
                event = stream.next() => match event {
                    Some(event) => on_event(event),
                    None => break,
                },
            }
        }
    });
    ListenerRegistration::new(move || cancel.notify_one())
}

/// Adapt a channel receiver into the event stream shape
/// [`spawn_stream_listener`] consumes.
///
/// For backends that push events through a sender handle rather than
/// producing a `Stream` themselves.
pub fn channel_stream<T: Send + 'static>(
    mut receiver: mpsc::UnboundedReceiver<T>,
) -> impl Stream<Item = T> + Send {
    async_stream::stream! {
        while let Some(event) = receiver.recv().await {
            yield event;
        }
    }
}
