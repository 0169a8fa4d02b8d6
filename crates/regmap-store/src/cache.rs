//! # Evaluation Cache
//!
//! Memoizes the most recent [`EvaluationResult`] per mapping name until its
//! expiry.
//!
//! ## Invariants
//!
//! - An entry is valid iff its `valid` flag is set and `now < expires_at`.
//!   `get` treats an invalid entry exactly like absence.
//! - `put` supersedes the previous entry for the key in one step. A
//!   concurrent `get` observes either the previous valid entry or the new
//!   one, never a mixture.
//! - Expired and invalidated entries stay physically present until `sweep`
//!   removes them, so `get_including_expired` can still show them to
//!   history/debug callers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Duration;
use parking_lot::RwLock;
use regmap_core::{Clock, MappingName, Timestamp};
use regmap_evaluator::EvaluationResult;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A cached evaluation with its validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached evaluation.
    pub result: EvaluationResult,
    /// When the entry was written.
    pub created_at: Timestamp,
    /// First instant at which the entry is no longer valid.
    pub expires_at: Timestamp,
    /// Cleared by explicit invalidation.
    pub valid: bool,
}

impl CacheEntry {
    /// Whether the entry may be served at `now`.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.valid && now < self.expires_at
    }
}

/// The evaluation cache contract.
pub trait EvaluationCache: Send + Sync {
    /// The valid entry for `key`, if any.
    fn get(
        &self,
        key: &MappingName,
    ) -> impl Future<Output = Result<Option<EvaluationResult>, StoreError>> + Send;

    /// The physical entry for `key` regardless of validity. Debug/history only.
    fn get_including_expired(
        &self,
        key: &MappingName,
    ) -> impl Future<Output = Result<Option<CacheEntry>, StoreError>> + Send;

    /// Replace the entry for `key` with `result`, valid for `ttl`.
    fn put(
        &self,
        key: &MappingName,
        result: EvaluationResult,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Expire the entry for `key` now. Returns whether a valid entry was retired.
    fn invalidate(&self, key: &MappingName) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Remove entries that expired before `cutoff`. Returns the number removed.
    fn sweep(&self, cutoff: Timestamp) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Counters kept by [`InMemoryEvaluationCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// `get` calls that returned an entry.
    pub hits: u64,
    /// `get` calls with no entry at all.
    pub misses: u64,
    /// `get` calls that found only an expired or invalidated entry.
    pub expired: u64,
    /// Successful `put` calls.
    pub writes: u64,
    /// `invalidate` calls that retired a valid entry.
    pub invalidations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
}

/// Process-local cache. Clones share storage.
#[derive(Debug, Clone)]
pub struct InMemoryEvaluationCache {
    entries: Arc<RwLock<HashMap<MappingName, CacheEntry>>>,
    counters: Arc<Counters>,
    clock: Arc<dyn Clock>,
}

impl InMemoryEvaluationCache {
    /// Empty cache reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
            clock,
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Physical entry count, valid or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EvaluationCache for InMemoryEvaluationCache {
    async fn get(&self, key: &MappingName) -> Result<Option<EvaluationResult>, StoreError> {
        let now = self.clock.now();
        let guard = self.entries.read();
        match guard.get(key) {
            Some(entry) if entry.is_valid_at(now) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.result.clone()))
            }
            Some(_) => {
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn get_including_expired(
        &self,
        key: &MappingName,
    ) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(
        &self,
        key: &MappingName,
        result: EvaluationResult,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let created_at = self.clock.now();
        let expires_at = created_at
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Corrupt(format!("ttl {ttl} overflows expiry")))?;
        let entry = CacheEntry {
            result,
            created_at,
            expires_at,
            valid: true,
        };
        self.entries.write().insert(key.clone(), entry);
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn invalidate(&self, key: &MappingName) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut guard = self.entries.write();
        let Some(entry) = guard.get_mut(key) else {
            return Ok(false);
        };
        let was_valid = entry.is_valid_at(now);
        entry.valid = false;
        if now < entry.expires_at {
            entry.expires_at = now;
        }
        if was_valid {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        Ok(was_valid)
    }

    async fn sweep(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut guard = self.entries.write();
        let before = guard.len();
        guard.retain(|_, entry| entry.expires_at >= cutoff);
        Ok((before - guard.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regmap_core::{ManualClock, PolicyRef};
    use regmap_evaluator::{ActorContext, ControlCoverageEvaluator, CoverageEvaluator};
    use regmap_evaluator::{MappingDefinition, VendorCapabilities};

    fn start() -> Timestamp {
        Timestamp::parse("2026-04-01T09:00:00Z").unwrap()
    }

    fn result(name: &str, provided: &[&str], clock: &ManualClock) -> EvaluationResult {
        let mapping = MappingDefinition {
            name: MappingName::new(name).unwrap(),
            policy: PolicyRef::new("NIST", "rev5").unwrap(),
            required_controls: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            vendors: vec![VendorCapabilities {
                vendor_id: "v".into(),
                controls: provided.iter().map(|s| s.to_string()).collect(),
            }],
        };
        ControlCoverageEvaluator
            .evaluate(&mapping)
            .unwrap()
            .seal(clock.now(), ActorContext::system())
            .unwrap()
    }

    fn setup() -> (ManualClock, InMemoryEvaluationCache, MappingName) {
        let clock = ManualClock::new(start());
        let cache = InMemoryEvaluationCache::new(Arc::new(clock.clone()));
        (clock, cache, MappingName::new("M").unwrap())
    }

    #[tokio::test]
    async fn second_put_supersedes_first() {
        let (clock, cache, key) = setup();
        let r1 = result("M", &["A"], &clock);
        let r2 = result("M", &["A", "B", "C"], &clock);
        cache.put(&key, r1.clone(), Duration::minutes(5)).await.unwrap();
        cache.put(&key, r2.clone(), Duration::minutes(5)).await.unwrap();
        let got = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(got, r2);
        assert_ne!(got.content_hash, r1.content_hash);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_but_still_present() {
        let (clock, cache, key) = setup();
        cache
            .put(&key, result("M", &["A"], &clock), Duration::minutes(5))
            .await
            .unwrap();
        clock.advance(Duration::minutes(4));
        assert!(cache.get(&key).await.unwrap().is_some());
        clock.advance(Duration::minutes(1));
        assert!(cache.get(&key).await.unwrap().is_none());

        let entry = cache.get_including_expired(&key).await.unwrap().unwrap();
        assert!(!entry.is_valid_at(clock.now()));
        assert_eq!(entry.expires_at, entry.created_at.checked_add(Duration::minutes(5)).unwrap());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.writes, 1);
    }

    #[tokio::test]
    async fn invalidate_retires_valid_entry_once() {
        let (clock, cache, key) = setup();
        cache
            .put(&key, result("M", &["A"], &clock), Duration::minutes(5))
            .await
            .unwrap();
        assert!(cache.invalidate(&key).await.unwrap());
        assert!(cache.get(&key).await.unwrap().is_none());
        assert!(!cache.invalidate(&key).await.unwrap());
        assert!(!cache.invalidate(&MappingName::new("other").unwrap()).await.unwrap());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn put_after_invalidate_is_valid_again() {
        let (clock, cache, key) = setup();
        cache
            .put(&key, result("M", &["A"], &clock), Duration::minutes(5))
            .await
            .unwrap();
        cache.invalidate(&key).await.unwrap();
        let fresh = result("M", &["A", "B"], &clock);
        cache.put(&key, fresh.clone(), Duration::minutes(5)).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(fresh));
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let (clock, cache, _) = setup();
        for name in ["a", "b"] {
            let key = MappingName::new(name).unwrap();
            cache
                .put(&key, result(name, &["A"], &clock), Duration::minutes(5))
                .await
                .unwrap();
        }
        clock.advance(Duration::minutes(10));
        let key = MappingName::new("c").unwrap();
        cache
            .put(&key, result("c", &["A"], &clock), Duration::minutes(5))
            .await
            .unwrap();

        let cutoff = clock.now();
        assert_eq!(cache.sweep(cutoff).await.unwrap(), 2);
        assert_eq!(cache.sweep(cutoff).await.unwrap(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_puts_leave_one_whole_result() {
        let (clock, cache, key) = setup();
        let r1 = result("M", &["A"], &clock);
        let r2 = result("M", &["A", "B", "C", "D"], &clock);
        let mut handles = Vec::new();
        for i in 0..32 {
            let cache = cache.clone();
            let key = key.clone();
            let r = if i % 2 == 0 { r1.clone() } else { r2.clone() };
            handles.push(tokio::spawn(async move {
                cache.put(&key, r, Duration::minutes(5)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let got = cache.get(&key).await.unwrap().unwrap();
        assert!(got == r1 || got == r2);
        assert!(got.verify_content_hash());
    }
}
