//! In-memory per-identity state store.

use dashmap::DashMap;

use llmops_core::traits::IdentityStore;

/// Identity store backed by a sharded concurrent map.
///
/// `with_record` holds the shard lock for the identity while `f` runs, so
/// `f` must not call back into the same store.
pub struct InMemoryIdentityStore<R> {
    records: DashMap<String, R>,
}

impl<R> InMemoryIdentityStore<R> {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl<R> Default for InMemoryIdentityStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> IdentityStore<R> for InMemoryIdentityStore<R>
where
    R: Default + Send + Sync,
{
    fn with_record(&self, identity: &str, f: &mut dyn FnMut(&mut R)) {
        if let Some(mut record) = self.records.get_mut(identity) {
            f(&mut *record);
            return;
        }
        let mut record = self.records.entry(identity.to_string()).or_default();
        f(&mut *record);
    }

    fn inspect(&self, identity: &str, f: &mut dyn FnMut(Option<&R>)) {
        let record = self.records.get(identity);
        f(record.as_deref());
    }

    fn retain(&self, keep: &mut dyn FnMut(&mut R) -> bool) {
        self.records.retain(|_, record| keep(record));
    }

    fn clear(&self) {
        self.records.clear();
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_created_on_first_access() {
        let store: InMemoryIdentityStore<u32> = InMemoryIdentityStore::new();
        assert!(store.is_empty());

        store.with_record("alice", &mut |n| *n += 1);
        store.with_record("alice", &mut |n| *n += 1);

        let mut seen = None;
        store.inspect("alice", &mut |n| seen = n.copied());
        assert_eq!(seen, Some(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear() {
        let store: InMemoryIdentityStore<u32> = InMemoryIdentityStore::new();
        store.with_record("a", &mut |n| *n = 1);
        store.with_record("b", &mut |n| *n = 1);
        store.clear();

        let mut seen = Some(0);
        store.inspect("a", &mut |n| seen = n.copied());
        assert_eq!(seen, None);
    }

    #[test]
    fn test_retain_drops_rejected_records() {
        let store: InMemoryIdentityStore<u32> = InMemoryIdentityStore::new();
        for (identity, n) in [("a", 1), ("b", 0), ("c", 3)] {
            store.with_record(identity, &mut |record| *record = n);
        }

        store.retain(&mut |n| {
            *n = n.saturating_sub(1);
            *n > 0
        });

        assert_eq!(store.len(), 1);
        let mut seen = None;
        store.inspect("c", &mut |n| seen = n.copied());
        assert_eq!(seen, Some(2));
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let store: Arc<InMemoryIdentityStore<u64>> = Arc::new(InMemoryIdentityStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        store.with_record("shared", &mut |n| *n += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut total = 0;
        store.inspect("shared", &mut |n| total = n.copied().unwrap_or(0));
        assert_eq!(total, 8000);
    }
}
