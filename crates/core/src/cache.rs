use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use bytes::Bytes;
use bytesize::ByteSize;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const DEFAULT_BUDGET_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_budget")]
    pub byte_budget: ByteSize,
    #[serde(default = "default_ceiling")]
    pub item_ceiling: ByteSize,
}

fn default_budget() -> ByteSize {
    ByteSize::b(DEFAULT_BUDGET_BYTES)
}

fn default_ceiling() -> ByteSize {
    ByteSize::b(DEFAULT_BUDGET_BYTES / 4)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::with_budget(default_budget())
    }
}

impl CacheConfig {
    /// Budget with the ceiling derived as a quarter of it.
    pub fn with_budget(byte_budget: ByteSize) -> Self {
        Self {
            byte_budget,
            item_ceiling: ByteSize::b(byte_budget.as_u64() / 4),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub oversized: u64,
}

impl CacheStats {
    /// Share of loads answered from the cache, 0 when nothing was loaded.
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            loads => self.hits as f64 / loads as f64,
        }
    }
}

enum Lookup<Fut> {
    Hit(Bytes),
    Miss(Fut),
}

struct CacheEntry {
    bytes: Bytes,
    size: u64,
    last_accessed: u64,
}

/// Entry map, recency index and running total. Every mutation goes through
/// one of the methods below so the three never drift apart.
struct CacheState<K> {
    entries: HashMap<K, CacheEntry>,
    recency: BTreeMap<u64, K>,
    total: u64,
    clock: u64,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone> CacheState<K> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            total: 0,
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, key: &K) -> Option<Bytes> {
        let now = self.tick();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.last_accessed);
        entry.last_accessed = now;
        self.recency.insert(now, key.clone());
        Some(entry.bytes.clone())
    }

    fn insert(&mut self, key: K, bytes: Bytes) {
        let now = self.tick();
        let size = bytes.len() as u64;
        let entry = CacheEntry {
            bytes,
            size,
            last_accessed: now,
        };
        if let Some(old) = self.entries.insert(key.clone(), entry) {
            self.recency.remove(&old.last_accessed);
            self.total -= old.size;
        }
        self.recency.insert(now, key);
        self.total += size;
    }

    fn evict_oldest(&mut self) -> Option<u64> {
        let (_, key) = self.recency.pop_first()?;
        let entry = self.entries.remove(&key)?;
        self.total -= entry.size;
        self.stats.evictions += 1;
        Some(entry.size)
    }

    fn evict_to(&mut self, budget: u64) {
        while self.total > budget {
            match self.evict_oldest() {
                Some(size) => tracing::debug!(size, total = self.total, "evicted cached content"),
                None => break,
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
        self.total = 0;
    }
}

/// Cache of content buffers keyed by an opaque identifier.
///
/// Entries are evicted oldest-access-first once the cached bytes exceed the
/// budget; items above the ceiling are returned but never stored. The lock is
/// never held while a fetch runs, so two callers missing on the same key may
/// both fetch it.
pub struct ContentCache<K> {
    config: CacheConfig,
    state: Mutex<CacheState<K>>,
}

impl<K: Eq + Hash + Clone> Default for ContentCache<K> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<K: Eq + Hash + Clone> ContentCache<K> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the cached content for `key`, calling `fetch` on a miss.
    ///
    /// A failed fetch is returned unchanged and leaves the cache untouched.
    pub fn load<F, B, E>(&self, key: K, fetch: F) -> Result<Bytes, E>
    where
        F: FnOnce(&K) -> Result<B, E>,
        B: Into<Bytes>,
    {
        if let Some(bytes) = self.hit(&key) {
            return Ok(bytes);
        }
        let bytes: Bytes = fetch(&key)?.into();
        self.store(key, bytes.clone());
        Ok(bytes)
    }

    /// Async form of [`ContentCache::load`], suspending only while `fetch`
    /// runs. The fetch is owned by the returned future: dropping it before
    /// completion cancels the fetch and nothing is stored. Use
    /// [`ContentCache::fetch_and_store`] for a fetch that outlives its caller.
    pub async fn load_async<F, Fut, B, E>(&self, key: K, fetch: F) -> Result<Bytes, E>
    where
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<B, E>>,
        B: Into<Bytes>,
    {
        if let Some(bytes) = self.hit(&key) {
            return Ok(bytes);
        }
        let bytes: Bytes = fetch(&key).await?.into();
        self.store(key, bytes.clone());
        Ok(bytes)
    }

    /// Fetch `key` in a future that holds its own handle to the cache and
    /// stores the content when the fetch completes.
    ///
    /// The future borrows nothing from the caller, so it can be spawned on an
    /// executor and left running after the requester loses interest; the
    /// result still lands in the cache. Cached content resolves immediately.
    pub fn fetch_and_store<F, Fut, B, E>(
        self: &Arc<Self>,
        key: K,
        fetch: F,
    ) -> impl Future<Output = Result<Bytes, E>>
    where
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = Result<B, E>>,
        B: Into<Bytes>,
    {
        let cache = Arc::clone(self);
        let lookup = match cache.hit(&key) {
            Some(bytes) => Lookup::Hit(bytes),
            None => Lookup::Miss(fetch(&key)),
        };
        async move {
            let bytes: Bytes = match lookup {
                Lookup::Hit(bytes) => return Ok(bytes),
                Lookup::Miss(pending) => pending.await?.into(),
            };
            cache.store(key, bytes.clone());
            Ok::<Bytes, E>(bytes)
        }
    }

    /// Peek without touching recency or fetching.
    pub fn get_cached(&self, key: &K) -> Option<Bytes> {
        self.state.lock().entries.get(key).map(|e| e.bytes.clone())
    }

    pub fn clear(&self) {
        self.state.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> u64 {
        self.state.lock().total
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }

    fn hit(&self, key: &K) -> Option<Bytes> {
        let mut state = self.state.lock();
        match state.touch(key) {
            Some(bytes) => {
                state.stats.hits += 1;
                Some(bytes)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    fn store(&self, key: K, bytes: Bytes) {
        let size = bytes.len() as u64;
        let budget = self.config.byte_budget.as_u64();
        // A ceiling above the budget would let one item flush the whole cache.
        let ceiling = self.config.item_ceiling.as_u64().min(budget);
        let mut state = self.state.lock();
        if size > ceiling {
            state.stats.oversized += 1;
            tracing::debug!(size, ceiling, "content above item ceiling, not cached");
            return;
        }
        state.insert(key, bytes);
        state.evict_to(budget);
    }
}
