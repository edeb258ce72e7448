use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct SessionEntry<T> {
    value: T,
    stored_at: Instant,
}

/// Explicit per-caller session state with a TTL, passed where it is needed
/// instead of living in process globals. Expired entries are dropped on
/// access and swept on insert.
pub struct SessionStore<T> {
    ttl: Duration,
    inner: Mutex<HashMap<String, SessionEntry<T>>>,
}

impl<T: Clone> SessionStore<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn put(&self, key: &str, value: T) {
        let mut inner = self.inner.lock().expect("session lock not poisoned");
        let ttl = self.ttl;
        inner.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        inner.insert(
            key.to_string(),
            SessionEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.lock().expect("session lock not poisoned");
        match inner.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                inner.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("session lock not poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_returns_per_key() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.put("a", 1);
        store.put("b", 2);
        assert_eq!(store.get("a"), Some(1));
        assert_eq!(store.get("b"), Some(2));
        assert_eq!(store.get("c"), None);
    }

    #[test]
    fn overwrites_existing_entry() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.put("a", 1);
        store.put("a", 2);
        assert_eq!(store.get("a"), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_entries_are_gone() {
        let store = SessionStore::new(Duration::from_millis(5));
        store.put("a", 1);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(store.get("a"), None);

        // Insert sweeps expired entries from other keys too.
        store.put("b", 2);
        assert_eq!(store.len(), 1);
    }
}
