//! Compiled-plan cache
//!
//! Plans are keyed by a SHA-256 digest of the schema id and the normalized
//! query text, so two spellings of the same query share one entry. The LRU
//! order, the entries and the counters live behind a single mutex: every
//! `get` or `put` is one critical section.
//!
//! Cached plans are handed out as `Arc`s. Evicting an entry never affects a
//! caller that already holds its plan.
//!
//! The executor talks to the cache through [`PlanStore`]. [`NoopPlanStore`]
//! keeps nothing and turns caching off while still reporting counters.

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use crate::compiler::CompiledPlan;
use crate::compiler::operation::normalize_query;
use crate::config::CacheConfig;
use crate::schema::SchemaId;

/// Hex-encoded SHA-256 identifying one (schema, query, operation) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for raw query text
    pub fn new(schema_id: &SchemaId, query: &str, operation_name: Option<&str>) -> Self {
        Self::from_normalized(schema_id, &normalize_query(query), operation_name)
    }

    /// Derive the key for text that is already normalized
    pub fn from_normalized(
        schema_id: &SchemaId,
        normalized: &str,
        operation_name: Option<&str>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(schema_id.as_str());
        hasher.update([0u8]);
        hasher.update(normalized);
        if let Some(name) = operation_name {
            hasher.update([0u8]);
            hasher.update(name);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached plan with its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub plan: Arc<CompiledPlan>,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub hit_count: u64,
}

/// Counters reported by [`PlanStore::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Lookups that found a plan built against an older registry generation
    pub stale: u64,
    pub compilations: u64,
    /// Total time spent building plans
    pub compile_time: Duration,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Share of lookups served from the cache, `0.0` before any lookup
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }

    /// Mean time per compilation
    pub fn average_compile_time(&self) -> Duration {
        match u32::try_from(self.compilations) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.compile_time / n,
            Err(_) => Duration::from_secs_f64(
                self.compile_time.as_secs_f64() / self.compilations as f64,
            ),
        }
    }
}

/// Outcome of a generation-aware lookup
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Built against the requested generation
    Hit(Arc<CompiledPlan>),
    /// Built against another generation; counted as a miss
    Stale(Arc<CompiledPlan>),
    Miss,
}

// =============================================================================
// Store Trait
// =============================================================================

/// Storage for compiled plans, shared by every executor that holds it
pub trait PlanStore: Send + Sync + fmt::Debug {
    /// Look up a plan regardless of the generation it was built for
    fn get_by_key(&self, key: &CacheKey) -> Option<Arc<CompiledPlan>>;

    /// Look up a plan, treating one built for another generation as stale
    fn lookup(&self, key: &CacheKey, generation: Uuid) -> Lookup;

    /// Insert or replace a plan
    fn put_by_key(&self, key: CacheKey, plan: Arc<CompiledPlan>);

    /// Drop one entry
    fn remove(&self, key: &CacheKey) -> Option<Arc<CompiledPlan>>;

    /// Add one plan build to the compilation counters
    fn record_compilation(&self, elapsed: Duration);

    fn stats(&self) -> CacheStats;

    /// Drop every entry; counters are kept
    fn clear(&self);

    fn len(&self) -> usize {
        self.stats().size
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize {
        self.stats().capacity
    }

    /// Look up the plan for a query
    fn get(
        &self,
        schema_id: &SchemaId,
        query: &str,
        operation_name: Option<&str>,
    ) -> Option<Arc<CompiledPlan>> {
        self.get_by_key(&CacheKey::new(schema_id, query, operation_name))
    }

    /// Store the plan for a query
    fn put(
        &self,
        schema_id: &SchemaId,
        query: &str,
        operation_name: Option<&str>,
        plan: Arc<CompiledPlan>,
    ) {
        self.put_by_key(CacheKey::new(schema_id, query, operation_name), plan);
    }
}

// =============================================================================
// LRU Cache
// =============================================================================

struct Inner {
    entries: LruCache<CacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    stale: u64,
    compilations: u64,
    compile_time: Duration,
}

/// LRU cache of compiled plans with optional expiry
pub struct PlanCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Option<chrono::Duration>,
}

impl PlanCache {
    /// Create a cache holding at most `capacity` plans (at least one)
    pub fn new(capacity: usize) -> Self {
        Self::with_ttl(capacity, None)
    }

    /// Create a cache whose entries expire `ttl` after insertion
    pub fn with_ttl(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
                stale: 0,
                compilations: 0,
                compile_time: Duration::ZERO,
            }),
            capacity: capacity.max(1),
            ttl: ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_ttl(config.capacity, config.ttl())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of an entry without touching its recency
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lock().entries.peek(key).cloned()
    }

    /// Shared lookup; `generation` of `None` accepts any plan
    fn fetch(&self, key: &CacheKey, generation: Option<Uuid>) -> Lookup {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let now = Utc::now();

        let Some(entry) = inner.entries.get_mut(key) else {
            inner.misses += 1;
            tracing::debug!(key = %key, "plan cache miss");
            return Lookup::Miss;
        };

        if self.ttl.is_some_and(|ttl| now - entry.created_at > ttl) {
            inner.entries.pop(key);
            inner.expirations += 1;
            inner.misses += 1;
            tracing::debug!(key = %key, "plan cache entry expired");
            return Lookup::Miss;
        }

        let plan = Arc::clone(&entry.plan);
        if generation.is_some_and(|generation| plan.generation() != generation) {
            inner.stale += 1;
            inner.misses += 1;
            tracing::debug!(key = %key, "plan cache entry is stale");
            return Lookup::Stale(plan);
        }

        entry.last_access = now;
        entry.hit_count += 1;
        inner.hits += 1;
        tracing::debug!(key = %key, "plan cache hit");
        Lookup::Hit(plan)
    }
}

impl PlanStore for PlanCache {
    /// An expired entry is dropped and counts as a miss
    fn get_by_key(&self, key: &CacheKey) -> Option<Arc<CompiledPlan>> {
        match self.fetch(key, None) {
            Lookup::Hit(plan) | Lookup::Stale(plan) => Some(plan),
            Lookup::Miss => None,
        }
    }

    fn lookup(&self, key: &CacheKey, generation: Uuid) -> Lookup {
        self.fetch(key, Some(generation))
    }

    /// Evicts least-recently-used entries past capacity
    fn put_by_key(&self, key: CacheKey, plan: Arc<CompiledPlan>) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let now = Utc::now();

        inner.entries.put(
            key.clone(),
            CacheEntry {
                key,
                plan,
                created_at: now,
                last_access: now,
                hit_count: 0,
            },
        );
        while inner.entries.len() > self.capacity {
            if let Some((evicted, _)) = inner.entries.pop_lru() {
                inner.evictions += 1;
                tracing::debug!(key = %evicted, "plan cache eviction");
            }
        }
    }

    fn remove(&self, key: &CacheKey) -> Option<Arc<CompiledPlan>> {
        self.lock().entries.pop(key).map(|entry| entry.plan)
    }

    fn record_compilation(&self, elapsed: Duration) {
        let mut inner = self.lock();
        inner.compilations += 1;
        inner.compile_time += elapsed;
    }

    fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
            stale: inner.stale,
            compilations: inner.compilations,
            compile_time: inner.compile_time,
            size: inner.entries.len(),
            capacity: self.capacity,
        }
    }

    fn clear(&self) {
        self.lock().entries.clear();
    }

    fn len(&self) -> usize {
        self.lock().entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanCache")
            .field("stats", &self.stats())
            .field("ttl", &self.ttl)
            .finish()
    }
}

// =============================================================================
// No-op Store
// =============================================================================

/// Store that keeps nothing: every lookup misses and every plan is rebuilt
#[derive(Debug, Default)]
pub struct NoopPlanStore {
    stats: Mutex<CacheStats>,
}

impl NoopPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn miss(&self) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .misses += 1;
    }
}

impl PlanStore for NoopPlanStore {
    fn get_by_key(&self, _key: &CacheKey) -> Option<Arc<CompiledPlan>> {
        self.miss();
        None
    }

    fn lookup(&self, _key: &CacheKey, _generation: Uuid) -> Lookup {
        self.miss();
        Lookup::Miss
    }

    fn put_by_key(&self, _key: CacheKey, _plan: Arc<CompiledPlan>) {}

    fn remove(&self, _key: &CacheKey) -> Option<Arc<CompiledPlan>> {
        None
    }

    fn record_compilation(&self, elapsed: Duration) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.compilations += 1;
        stats.compile_time += elapsed;
    }

    fn stats(&self) -> CacheStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear(&self) {}
}
