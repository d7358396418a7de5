//! End-to-end tests for the asynchronous operation lifecycle.
//!
//! A miniature config-fetch client stands in for a real service module: its
//! entry points allocate futures, record last results, and are resolved by
//! the tokio bridge from a fake backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use firebase_app_core::bridge::spawn_operation;
use firebase_app_core::{ErrorCode, Future, FutureApi, FutureStatus, OperationError};

/// Function indices of the client's asynchronous entry points.
const FETCH_FN: usize = 0;
const ACTIVATE_FN: usize = 1;
const FN_COUNT: usize = 2;

struct FakeBackend {
    values: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl FakeBackend {
    fn new() -> Self {
        let mut values = HashMap::new();
        values.insert("greeting".to_string(), "hello".to_string());
        values.insert("retries".to_string(), "3".to_string());
        Self {
            values: Mutex::new(values),
            unavailable: AtomicBool::new(false),
        }
    }

    fn lookup(&self, key: &str) -> Result<String, OperationError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OperationError::from_error_code(ErrorCode::Unavailable));
        }
        self.values
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| OperationError::from_error_code(ErrorCode::NotFound))
    }
}

struct ConfigClient {
    api: FutureApi,
    backend: Arc<FakeBackend>,
}

impl ConfigClient {
    fn new() -> Self {
        Self {
            api: FutureApi::new(FN_COUNT),
            backend: Arc::new(FakeBackend::new()),
        }
    }

    fn fetch(&self, key: &str) -> Future<String> {
        let backend = Arc::clone(&self.backend);
        let key = key.to_string();
        spawn_operation(&self.api, Some(FETCH_FN), async move {
            // Resolution happens later, on the bridge's task.
            tokio::time::sleep(Duration::from_millis(5)).await;
            backend.lookup(&key)
        })
    }

    fn fetch_last_result(&self) -> Future<String> {
        self.api.last_result_as::<String>(FETCH_FN)
    }

    fn activate(&self) -> Future<bool> {
        spawn_operation(&self.api, Some(ACTIVATE_FN), async move { Ok(true) })
    }

    fn activate_last_result(&self) -> Future<bool> {
        self.api.last_result_as::<bool>(ACTIVATE_FN)
    }
}

#[tokio::test]
async fn test_fetch_pending_then_complete_with_result() {
    let client = ConfigClient::new();
    let future = client.fetch("greeting");

    assert_eq!(future.status(), FutureStatus::Pending);
    assert_eq!(client.fetch_last_result(), future);

    assert_eq!(future.wait().await, FutureStatus::Complete);
    assert_eq!(future.error(), 0);
    assert_eq!(future.error_message(), "");
    assert_eq!(*future.result().unwrap(), "hello");
}

#[tokio::test]
async fn test_fetch_failure_reports_code_and_message() {
    let client = ConfigClient::new();
    client.backend.unavailable.store(true, Ordering::SeqCst);

    let future = client.fetch("greeting");
    let err = future.value().await.unwrap_err();

    assert_eq!(err.code, ErrorCode::Unavailable.code());
    assert_eq!(err.message, ErrorCode::Unavailable.message());
    assert_eq!(future.status(), FutureStatus::Complete);
    assert!(future.result().is_none());
}

#[tokio::test]
async fn test_missing_key_maps_to_not_found() {
    let client = ConfigClient::new();
    let err = client.fetch("no-such-key").value().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound.code());
}

#[tokio::test]
async fn test_new_call_supersedes_last_result() {
    let client = ConfigClient::new();

    let first = client.fetch("greeting");
    first.wait().await;

    let second = client.fetch("retries");
    let last = client.fetch_last_result();
    assert_eq!(last, second);
    assert_ne!(last, first);

    // The superseded future is still readable through its own handle.
    assert_eq!(*first.result().unwrap(), "hello");
    assert_eq!(*last.value().await.unwrap(), "3");
}

#[tokio::test]
async fn test_last_results_are_tracked_per_entry_point() {
    let client = ConfigClient::new();

    let fetch = client.fetch("greeting");
    let activate = client.activate();
    fetch.wait().await;
    activate.wait().await;

    assert_eq!(client.fetch_last_result(), fetch);
    assert_eq!(client.activate_last_result(), activate);
    assert!(*client.activate_last_result().result().unwrap());
}

#[tokio::test]
async fn test_retrieving_result_later_without_holding_the_future() {
    let client = ConfigClient::new();

    // Call without retaining the returned future.
    client.fetch("greeting");

    let last = client.fetch_last_result();
    assert_eq!(last.wait().await, FutureStatus::Complete);
    assert_eq!(*last.result().unwrap(), "hello");
}

#[tokio::test]
async fn test_on_completion_fires_exactly_once_whenever_registered() {
    let client = ConfigClient::new();

    // Registered before resolution.
    let before = Arc::new(AtomicUsize::new(0));
    let before_in_callback = Arc::clone(&before);
    let future = client.fetch("greeting");
    future.on_completion(move |completed| {
        assert_eq!(completed.error(), 0);
        before_in_callback.fetch_add(1, Ordering::SeqCst);
    });

    future.wait().await;
    assert_eq!(before.load(Ordering::SeqCst), 1);

    // Registered after resolution: fires immediately, on this thread.
    let after = Arc::new(AtomicUsize::new(0));
    let after_in_callback = Arc::clone(&after);
    future.on_completion(move |completed| {
        assert_eq!(*completed.result().unwrap(), "hello");
        after_in_callback.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(after.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_every_observer_sees_the_same_terminal_state() {
    let client = ConfigClient::new();
    let future = client.fetch("greeting");

    let callback_hits = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let hits = Arc::clone(&callback_hits);
        future.add_on_completion(move |completed| {
            assert_eq!(*completed.result().unwrap(), "hello");
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }

    let waiter = {
        let future = future.clone();
        tokio::spawn(async move {
            future.wait().await;
            future.error()
        })
    };

    assert_eq!(*future.value().await.unwrap(), "hello");
    assert_eq!(waiter.await.unwrap(), 0);
    assert_eq!(callback_hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_dropping_the_client_invalidates_outstanding_futures() {
    let client = ConfigClient::new();
    let future = client.fetch("greeting");
    drop(client);

    assert_eq!(future.wait().await, FutureStatus::Invalid);
    assert!(future.result().is_none());
}
