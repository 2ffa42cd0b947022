use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Identity map from remote ID to the one live local object for that ID.
///
/// Entries are never evicted. An entry is inserted fully constructed, so
/// readers can't see a half-built object.
#[derive(Debug)]
pub struct EntityCache<T> {
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T> Default for EntityCache<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> EntityCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Return the cached entity for `id`, or build one with `constructor` and
    /// cache it.
    ///
    /// Under contention the first caller to take the write lock wins. Losers
    /// drop whatever they built and get the winner's object.
    pub fn get_or_insert<F>(&self, id: &str, constructor: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.get(id) {
            return existing;
        }
        let candidate = Arc::new(constructor());
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(id.to_string())
            .or_insert(candidate)
            .clone()
    }

    /// Snapshot of every cached entity, in no particular order.
    pub fn values(&self) -> Vec<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn sequential_calls_never_build_twice() {
        let cache = EntityCache::new();
        let built = AtomicUsize::new(0);
        let first = cache.get_or_insert("a", || {
            built.fetch_add(1, Ordering::SeqCst);
            String::from("first")
        });
        let second = cache.get_or_insert("a", || {
            built.fetch_add(1, Ordering::SeqCst);
            String::from("second")
        });
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, "first");
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_callers_agree_on_one_winner() {
        let cache = Arc::new(EntityCache::<usize>::new());
        let barrier = Arc::new(std::sync::Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|n| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_insert("shared", || n)
                })
            })
            .collect();
        let results: Vec<Arc<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winner = cache.get("shared").unwrap();
        for r in &results {
            assert!(Arc::ptr_eq(r, &winner));
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_ids_get_distinct_entries() {
        let cache = EntityCache::new();
        cache.get_or_insert("a", || 1);
        cache.get_or_insert("b", || 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b").as_deref(), Some(&2));
        assert!(cache.get("c").is_none());
    }
}
