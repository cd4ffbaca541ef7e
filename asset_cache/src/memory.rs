use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::key::ContentKey;

#[derive(Debug)]
struct MemoryCacheItem<V> {
    value: Arc<V>,
    cost: u64,
    last_access: u64,
}

/// Counters describing the memory tier at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub num_items: usize,
    pub total_cost: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct CacheState<V> {
    inner: HashMap<ContentKey, MemoryCacheItem<V>>,
    // access tick -> key, oldest first
    recency: BTreeMap<u64, ContentKey>,
    next_tick: u64,
    total_cost: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V> CacheState<V> {
    fn new() -> Self {
        Self {
            inner: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
            total_cost: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        let t = self.next_tick;
        self.next_tick += 1;
        t
    }

    fn remove(&mut self, key: &ContentKey) -> Option<MemoryCacheItem<V>> {
        let item = self.inner.remove(key)?;
        self.recency.remove(&item.last_access);
        self.total_cost -= item.cost;
        Some(item)
    }

    fn evict_least_recent(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        if let Some(item) = self.inner.remove(&key) {
            self.total_cost -= item.cost;
        }
        self.evictions += 1;
        true
    }
}

/// MemoryTier is a bounded in-process map from content key to decoded asset.
///
/// It holds at most `max_entries` items whose summed cost is at most `max_cost`. Inserting
/// past either limit evicts least-recently-used entries first. Reads refresh recency.
/// All operations take a single lock, so an eviction pass and an insertion never interleave.
#[derive(Debug)]
pub struct MemoryTier<V> {
    max_entries: usize,
    max_cost: u64,
    state: Mutex<CacheState<V>>,
}

impl<V> MemoryTier<V> {
    pub fn new(max_entries: usize, max_cost: u64) -> Self {
        Self {
            max_entries,
            max_cost,
            state: Mutex::new(CacheState::new()),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn max_cost(&self) -> u64 {
        self.max_cost
    }

    pub fn get(&self, key: &ContentKey) -> Option<Arc<V>> {
        let mut state = self.state.lock();
        let tick = state.tick();
        let state = &mut *state;

        let Some(item) = state.inner.get_mut(key) else {
            state.misses += 1;
            return None;
        };

        state.recency.remove(&item.last_access);
        item.last_access = tick;
        state.recency.insert(tick, *key);
        state.hits += 1;

        Some(item.value.clone())
    }

    /// Inserts or replaces the entry for `key`.
    ///
    /// An asset whose cost alone exceeds `max_cost` is accepted and immediately dropped; any
    /// previous entry for the key is removed in that case as well.
    pub fn put(&self, key: ContentKey, value: Arc<V>, cost: u64) {
        let mut state = self.state.lock();

        state.remove(&key);

        if cost > self.max_cost || self.max_entries == 0 {
            debug!("memory tier dropping {key}: cost {cost} does not fit in budget {}", self.max_cost);
            state.evictions += 1;
            return;
        }

        while state.inner.len() >= self.max_entries || state.total_cost + cost > self.max_cost {
            if !state.evict_least_recent() {
                break;
            }
        }

        let tick = state.tick();
        state.recency.insert(tick, key);
        state.total_cost += cost;
        state.inner.insert(
            key,
            MemoryCacheItem {
                value,
                cost,
                last_access: tick,
            },
        );
    }

    /// Checks for `key` without counting a hit or refreshing recency.
    pub fn contains(&self, key: &ContentKey) -> bool {
        self.state.lock().inner.contains_key(key)
    }

    pub fn remove(&self, key: &ContentKey) -> bool {
        self.state.lock().remove(key).is_some()
    }

    pub fn remove_all(&self) {
        let mut state = self.state.lock();
        state.inner.clear();
        state.recency.clear();
        state.total_cost = 0;
    }

    pub fn num_items(&self) -> usize {
        self.state.lock().inner.len()
    }

    pub fn total_cost(&self) -> u64 {
        self.state.lock().total_cost
    }

    pub fn stats(&self) -> MemoryStats {
        let state = self.state.lock();
        MemoryStats {
            num_items: state.inner.len(),
            total_cost: state.total_cost,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}
