//! Shared state.
//!
//! The [`SharedStore`] is the mutable container a flow run threads through
//! every node visit. It imposes no schema: values are `Arc<dyn Any>` so nodes
//! can stash anything that is `Send + Sync`, including `tokio::sync::mpsc`
//! queue endpoints for producer/consumer coordination between concurrent
//! traversals. Cloning a store is cheap and yields a handle to the same
//! backend.
//!
//! The store performs no locking beyond per-operation consistency; concurrent
//! traversals that contend on a key must coordinate through queues or locks
//! they place in the store themselves.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Type of the values held by a [`StoreBackend`].
///
/// `Arc` allows cheap cloning on retrieval and `dyn Any` allows storing any
/// type.
pub type StoredValue = Arc<dyn Any + Send + Sync>;

/// Storage capability behind a [`SharedStore`].
pub trait StoreBackend: Send + Sync {
    fn insert(&self, key: &str, value: StoredValue);

    fn get(&self, key: &str) -> Option<StoredValue>;

    /// Removes a value, returning it if it existed.
    fn remove(&self, key: &str) -> Option<StoredValue>;

    fn contains_key(&self, key: &str) -> bool;

    fn keys(&self) -> Vec<String>;
}

/// Default in-memory backend.
#[derive(Default)]
pub struct InMemoryBackend {
    inner: RwLock<HashMap<String, StoredValue>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for InMemoryBackend {
    fn insert(&self, key: &str, value: StoredValue) {
        self.inner.write().insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<StoredValue> {
        self.inner.read().get(key).cloned()
    }

    fn remove(&self, key: &str) -> Option<StoredValue> {
        self.inner.write().remove(key)
    }

    fn contains_key(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }
}

/// Handle to the shared state of a flow run.
#[derive(Clone)]
pub struct SharedStore {
    backend: Arc<dyn StoreBackend>,
}

impl SharedStore {
    /// Create a store over the default in-memory backend.
    pub fn new() -> Self {
        Self {
            backend: Arc::new(InMemoryBackend::new()),
        }
    }

    /// Create a store over a caller-provided backend.
    pub fn with_backend(backend: Arc<dyn StoreBackend>) -> Self {
        Self { backend }
    }

    /// Insert a value of any `Send + Sync` type.
    pub fn insert<T: 'static + Send + Sync>(&self, key: &str, value: T) {
        self.backend.insert(key, Arc::new(value));
    }

    /// Retrieve a clone of a previously inserted value.
    ///
    /// Returns `None` when the key is absent or holds a different type.
    pub fn get<T: 'static + Clone>(&self, key: &str) -> Option<T> {
        self.backend
            .get(key)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    pub fn remove(&self, key: &str) -> Option<StoredValue> {
        self.backend.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.backend.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.backend.keys()
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_typed() {
        let store = SharedStore::new();
        store.insert("count", 7u64);
        store.insert("label", "ready".to_string());

        assert_eq!(store.get::<u64>("count"), Some(7));
        assert_eq!(store.get::<String>("label").as_deref(), Some("ready"));
        assert_eq!(store.get::<u64>("missing"), None);
    }

    #[test]
    fn get_with_wrong_type_is_none() {
        let store = SharedStore::new();
        store.insert("count", 7u64);
        assert_eq!(store.get::<String>("count"), None);
    }

    #[test]
    fn clones_share_the_backend() {
        let store = SharedStore::new();
        let alias = store.clone();
        alias.insert("seen", true);

        assert_eq!(store.get::<bool>("seen"), Some(true));
        assert!(store.contains_key("seen"));
    }

    #[test]
    fn remove_clears_the_key() {
        let store = SharedStore::new();
        store.insert("tmp", 1i32);
        assert!(store.remove("tmp").is_some());
        assert!(!store.contains_key("tmp"));
        assert!(store.remove("tmp").is_none());
    }
}
