//! Reference-counted ownership of long-lived service instances.
//!
//! # C++ Reference
//! - `firestore/src/common/firestore.cc` (g_firestores_lock / FirestoreCache)
//!
//! A managed-runtime binding (C# / Unity-style) cannot express Rust ownership,
//! so every binding-side reference to a service instance is counted here
//! explicitly: one `release_reference` per `add_reference`, destruction
//! exactly once when the count reaches zero. The registry owns the instances;
//! callers keep only an opaque [`InstanceKey`].
//!
//! Registries are process-wide and never torn down. Declare them as lazily
//! initialized statics:
//!
//! ```
//! use firebase_app_core::InstanceRegistry;
//! use once_cell::sync::Lazy;
//!
//! struct Database;
//!
//! static DATABASE_INSTANCES: Lazy<InstanceRegistry<Database>> =
//!     Lazy::new(|| InstanceRegistry::new("database"));
//!
//! let key = DATABASE_INSTANCES.insert(Database);
//! DATABASE_INSTANCES.release_reference(key).unwrap();
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, error};

/// Opaque identity of a tracked instance: the address of its heap allocation.
///
/// Stable for the lifetime of the entry; fits in a pointer-sized field on the
/// binding side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceKey(usize);

impl InstanceKey {
    /// The raw pointer value, for binding layers that marshal it as an
    /// integer handle.
    pub fn as_raw(self) -> usize {
        self.0
    }
}

/// Errors raised by [`InstanceRegistry`] misuse.
///
/// Releasing or referencing an untracked key indicates a broken
/// acquire/release pairing in the binding layer; it is reported (not silently
/// ignored) so the defect is caught in testing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The key does not identify a tracked instance.
    #[error("instance {key:#x} is not tracked by the '{registry}' registry")]
    UntrackedInstance {
        /// Registry name, for diagnostics.
        registry: &'static str,
        /// The untracked key value.
        key: usize,
    },
}

struct RegistryEntry<T> {
    instance: Box<T>,
    ref_count: usize,
}

/// Reference-counting table ensuring a shared service instance is destroyed
/// exactly once, after its last release.
///
/// All mutation happens under one mutex, and instance reads through
/// [`with_instance`](InstanceRegistry::with_instance) hold the same mutex, so
/// no caller can observe an instance that a concurrent release is destroying.
pub struct InstanceRegistry<T> {
    name: &'static str,
    entries: Mutex<HashMap<usize, RegistryEntry<T>>>,
}

impl<T> InstanceRegistry<T> {
    /// Create a registry. `name` labels diagnostics only.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Take ownership of `instance` and begin tracking it with a reference
    /// count of one.
    pub fn insert(&self, instance: T) -> InstanceKey {
        let boxed = Box::new(instance);
        let key = &*boxed as *const T as usize;
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key,
            RegistryEntry {
                instance: boxed,
                ref_count: 1,
            },
        );
        debug!(registry = self.name, key = key as u64, "instance tracked");
        InstanceKey(key)
    }

    /// Add one reference to a tracked instance. Returns the new count.
    pub fn add_reference(&self, key: InstanceKey) -> Result<usize, RegistryError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&key.0) {
            Some(entry) => {
                entry.ref_count += 1;
                Ok(entry.ref_count)
            }
            None => Err(self.untracked(key)),
        }
    }

    /// Drop one reference. On the last release the instance is destroyed,
    /// while the registry lock is held, and the entry removed; returns the
    /// remaining count.
    ///
    /// Instance drop implementations must not call back into the same
    /// registry.
    pub fn release_reference(&self, key: InstanceKey) -> Result<usize, RegistryError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&key.0) {
            None => Err(self.untracked(key)),
            Some(entry) => {
                entry.ref_count -= 1;
                if entry.ref_count > 0 {
                    return Ok(entry.ref_count);
                }
                drop(entries.remove(&key.0));
                debug!(registry = self.name, key = key.0 as u64, "instance destroyed");
                Ok(0)
            }
        }
    }

    /// Run `f` against the tracked instance, under the registry lock.
    ///
    /// Because destruction also happens under this lock, `f` can never
    /// observe a partially destroyed instance.
    pub fn with_instance<R>(&self, key: InstanceKey, f: impl FnOnce(&T) -> R) -> Result<R, RegistryError> {
        let entries = self.entries.lock().unwrap();
        match entries.get(&key.0) {
            Some(entry) => Ok(f(&entry.instance)),
            None => Err(self.untracked(key)),
        }
    }

    /// Current reference count of a tracked instance.
    pub fn ref_count(&self, key: InstanceKey) -> Option<usize> {
        self.entries.lock().unwrap().get(&key.0).map(|entry| entry.ref_count)
    }

    /// True while `key` identifies a tracked instance.
    pub fn contains(&self, key: InstanceKey) -> bool {
        self.entries.lock().unwrap().contains_key(&key.0)
    }

    /// Number of tracked instances.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// True when no instance is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn untracked(&self, key: InstanceKey) -> RegistryError {
        error!(
            registry = self.name,
            key = key.0 as u64,
            "reference to untracked instance; acquire/release calls are unbalanced"
        );
        RegistryError::UntrackedInstance {
            registry: self.name,
            key: key.0,
        }
    }
}

impl<T> std::fmt::Debug for InstanceRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct TrackedService {
        drops: Arc<AtomicUsize>,
        label: &'static str,
    }

    impl Drop for TrackedService {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked(drops: &Arc<AtomicUsize>, label: &'static str) -> TrackedService {
        TrackedService {
            drops: Arc::clone(drops),
            label,
        }
    }

    #[test]
    fn test_insert_starts_at_one_reference() {
        let drops = Arc::new(AtomicUsize::new(0));
        let registry = InstanceRegistry::new("test");
        let key = registry.insert(tracked(&drops, "a"));

        assert_eq!(registry.ref_count(key), Some(1));
        assert_eq!(registry.release_reference(key), Ok(0));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(!registry.contains(key));
    }

    #[test]
    fn test_two_references_destroy_once_after_second_release() {
        let drops = Arc::new(AtomicUsize::new(0));
        let registry = InstanceRegistry::new("test");
        let key = registry.insert(tracked(&drops, "a"));

        assert_eq!(registry.add_reference(key), Ok(2));

        assert_eq!(registry.release_reference(key), Ok(1));
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert!(registry.contains(key));

        assert_eq!(registry.release_reference(key), Ok(0));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_untracked_key_is_reported() {
        let registry = InstanceRegistry::<u32>::new("test");
        let bogus = InstanceKey(0xdead);

        let err = registry.release_reference(bogus).unwrap_err();
        assert_eq!(
            err,
            RegistryError::UntrackedInstance {
                registry: "test",
                key: 0xdead
            }
        );
        assert!(registry.add_reference(bogus).is_err());
        assert!(registry.with_instance(bogus, |_| ()).is_err());
    }

    #[test]
    fn test_release_after_destruction_is_reported() {
        let drops = Arc::new(AtomicUsize::new(0));
        let registry = InstanceRegistry::new("test");
        let key = registry.insert(tracked(&drops, "a"));

        assert_eq!(registry.release_reference(key), Ok(0));
        assert!(registry.release_reference(key).is_err());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_with_instance_reads_tracked_state() {
        let drops = Arc::new(AtomicUsize::new(0));
        let registry = InstanceRegistry::new("test");
        let key = registry.insert(tracked(&drops, "labeled"));

        let label = registry.with_instance(key, |service| service.label).unwrap();
        assert_eq!(label, "labeled");
        registry.release_reference(key).unwrap();
    }

    #[test]
    fn test_distinct_instances_have_distinct_keys() {
        let drops = Arc::new(AtomicUsize::new(0));
        let registry = InstanceRegistry::new("test");
        let first = registry.insert(tracked(&drops, "a"));
        let second = registry.insert(tracked(&drops, "b"));

        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
        registry.release_reference(first).unwrap();
        registry.release_reference(second).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_add_release_balances_to_one_destruction() {
        let drops = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(InstanceRegistry::new("test"));
        let key = registry.insert(tracked(&drops, "shared"));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.add_reference(key).unwrap();
                        registry.release_reference(key).unwrap();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(registry.ref_count(key), Some(1));
        assert_eq!(registry.release_reference(key), Ok(0));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
