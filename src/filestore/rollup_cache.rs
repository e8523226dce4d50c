//! In-process bounded LRU + TTL cache over rollup summaries (spec §4.4):
//! "writer-wins; stale reads of `state = pending` are tolerated."

use crate::domain::rollup::Rollup;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

struct Entry {
    rollup: Rollup,
    cached_at: Instant,
}

pub struct RollupCache {
    entries: Mutex<lru::LruCache<i64, Entry>>,
    ttl: Duration,
}

impl RollupCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).expect("max_entries.max(1) is never zero");
        Self { entries: Mutex::new(lru::LruCache::new(capacity)), ttl }
    }

    /// `None` on a miss or an expired entry; misses fall through to C1.
    pub fn get(&self, node_id: i64) -> Option<Rollup> {
        let mut entries = self.entries.lock();
        let hit = entries.get(&node_id)?;
        if hit.cached_at.elapsed() > self.ttl {
            entries.pop(&node_id);
            return None;
        }
        Some(hit.rollup.clone())
    }

    pub fn put(&self, rollup: Rollup) {
        self.entries.lock().put(rollup.node_id, Entry { rollup, cached_at: Instant::now() });
    }

    pub fn invalidate(&self, node_id: i64) {
        self.entries.lock().pop(&node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rollup::RollupState;

    fn sample(node_id: i64) -> Rollup {
        Rollup {
            node_id,
            size_bytes: 10,
            file_count: 1,
            directory_count: 0,
            child_count: 1,
            state: RollupState::UpToDate,
            last_calculated_at: None,
        }
    }

    #[test]
    fn hit_then_invalidate() {
        let cache = RollupCache::new(4, Duration::from_secs(300));
        cache.put(sample(1));
        assert!(cache.get(1).is_some());
        cache.invalidate(1);
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = RollupCache::new(4, Duration::from_millis(0));
        cache.put(sample(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn bounded_capacity_evicts_lru() {
        let cache = RollupCache::new(1, Duration::from_secs(300));
        cache.put(sample(1));
        cache.put(sample(2));
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());
    }
}
