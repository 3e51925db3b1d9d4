use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Process-local keyed store behind which all orchestration state lives.
///
/// Every record type (guards, sessions, directory entries, routing
/// preferences) is kept in one of these rather than a module-level map, so
/// tests can substitute a fake and observe writes. State is process-local:
/// running more than one instance of the service breaks the mutual-exclusion
/// and caching guarantees built on top of this trait.
pub trait KeyValueStore<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;
    fn set(&self, key: &str, value: V);
    fn remove(&self, key: &str) -> Option<V>;
    fn list(&self) -> Vec<(String, V)>;
}

pub struct InMemoryStore<V> {
    entries: Arc<Mutex<HashMap<String, V>>>,
}

impl<V> InMemoryStore<V> {
    pub fn new() -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, V>> {
        match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<V> Default for InMemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for InMemoryStore<V> {
    fn clone(&self) -> Self {
        Self { entries: Arc::clone(&self.entries) }
    }
}

impl<V> KeyValueStore<V> for InMemoryStore<V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Option<V> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: V) {
        self.entries().insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) -> Option<V> {
        self.entries().remove(key)
    }

    fn list(&self) -> Vec<(String, V)> {
        self.entries().iter().map(|(key, value)| (key.clone(), value.clone())).collect()
    }
}
