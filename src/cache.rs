//! The compiled-function cache (spec §2 component 4, §4.4): a bounded,
//! weighted, thread-safe fingerprint → module mapping with "compile-once,
//! many-readers" semantics, plus the process-wide singleton factory that
//! owns it.

use crate::compile_dag::Fingerprint;
use crate::error::JitError;
use crate::module::CompiledFunctionCacheEntry;
use once_cell::sync::OnceCell;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct State {
    entries: FxHashMap<Fingerprint, CompiledFunctionCacheEntry>,
    pending: FxHashSet<Fingerprint>,
    /// Least-recently-used ordering; the front is evicted first. A
    /// fingerprint may appear more than once here (stale entries are
    /// skipped on pop); this avoids an O(n) "move to back" on every hit
    /// at the cost of a little eviction-time bookkeeping.
    lru: VecDeque<Fingerprint>,
    total_weight: usize,
}

/// A weighted LRU cache from `Fingerprint` to a shared `CompiledModule`
/// handle (via `CompiledFunctionCacheEntry`). Capacity is an absolute byte
/// budget for total module weight (spec §6).
pub struct CompiledFunctionCache {
    capacity_bytes: usize,
    state: Mutex<State>,
    condvar: Condvar,
}

impl CompiledFunctionCache {
    pub fn new(capacity_bytes: usize) -> Self {
        CompiledFunctionCache {
            capacity_bytes,
            state: Mutex::new(State {
                entries: FxHashMap::default(),
                pending: FxHashSet::default(),
                lru: VecDeque::new(),
                total_weight: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    /// Current aggregate weight (bytes) of all resident entries.
    pub fn weight(&self) -> usize {
        self.state.lock().unwrap().total_weight
    }

    pub fn max_size(&self) -> usize {
        self.capacity_bytes
    }

    /// Looks up `fingerprint`; on a miss, calls `producer` exactly once
    /// even under concurrent callers for the same key — other callers
    /// block until the first completes and all receive the same shared
    /// entry (spec §4.4, §8 property 5).
    ///
    /// Returns `(entry, was_inserted)`.
    pub fn get_or_set<F>(
        &self,
        fingerprint: Fingerprint,
        producer: F,
    ) -> Result<(CompiledFunctionCacheEntry, bool), JitError>
    where
        F: FnOnce() -> Result<CompiledFunctionCacheEntry, JitError>,
    {
        let mut guard = self.state.lock().unwrap();
        loop {
            if let Some(entry) = guard.entries.get(&fingerprint).cloned() {
                guard.lru.push_back(fingerprint);
                return Ok((entry, false));
            }
            if guard.pending.contains(&fingerprint) {
                guard = self.condvar.wait(guard).unwrap();
                continue;
            }
            // Claim the key for this thread's producer call.
            guard.pending.insert(fingerprint);
            break;
        }
        drop(guard);

        let produced = producer();

        let mut guard = self.state.lock().unwrap();
        guard.pending.remove(&fingerprint);
        let result = match produced {
            Ok(entry) => {
                guard.total_weight += entry.weight();
                guard.entries.insert(fingerprint, entry.clone());
                guard.lru.push_back(fingerprint);
                self.evict_locked(&mut guard, Some(fingerprint));
                Ok((entry, true))
            }
            Err(err) => Err(err),
        };
        self.condvar.notify_all();
        result
    }

    /// Evicts least-recently-used entries (dropping the cache's own strong
    /// reference; live executors keep theirs, spec §9 "Lifetime of
    /// compiled code") until total weight fits the capacity. Never evicts
    /// `just_inserted`, so a single oversized module is still cached.
    fn evict_locked(&self, state: &mut State, just_inserted: Option<Fingerprint>) {
        while state.total_weight > self.capacity_bytes {
            let Some(candidate) = state.lru.pop_front() else { break };
            if Some(candidate) == just_inserted {
                continue;
            }
            if let Some(entry) = state.entries.remove(&candidate) {
                state.total_weight -= entry.weight();
            }
        }
    }
}

/// Process-wide singleton owning the (at most one) compiled-function cache.
/// Mirrors the original's `CompiledExpressionCacheFactory::instance()`.
pub struct CacheFactory {
    cache: OnceCell<CompiledFunctionCache>,
}

impl CacheFactory {
    pub fn instance() -> &'static CacheFactory {
        static INSTANCE: OnceCell<CacheFactory> = OnceCell::new();
        INSTANCE.get_or_init(|| CacheFactory { cache: OnceCell::new() })
    }

    /// Idempotent when called again with the same capacity; fails with
    /// `AlreadyInitialised` when called again with a different one (spec
    /// §7; the same-capacity idempotence is a documented extension, see
    /// `SPEC_FULL.md` §4.4).
    pub fn init(&self, capacity_bytes: usize) -> Result<(), JitError> {
        match self.cache.get() {
            Some(existing) if existing.capacity_bytes() != capacity_bytes => Err(JitError::AlreadyInitialised),
            Some(_) => Ok(()),
            None => {
                // If another thread wins the race, its capacity stands;
                // `OnceCell::set` reports that loser case as an error we
                // intentionally swallow.
                let _ = self.cache.set(CompiledFunctionCache::new(capacity_bytes));
                Ok(())
            }
        }
    }

    pub fn try_get_cache(&self) -> Option<&CompiledFunctionCache> {
        self.cache.get()
    }
}
