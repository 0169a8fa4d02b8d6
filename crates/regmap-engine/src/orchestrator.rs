//! # Evaluation Orchestrator
//!
//! Drives one request through
//!
//! ```text
//! CACHE_LOOKUP ─hit──────────────────────────────────────────► Returned(result)
//!      │miss/expired
//!      ▼
//! acquire per-key slot ──(deadline passed)──────────────────► Failed(Timeout)
//!      │
//!      ├─(another caller filled the cache meanwhile)─────────► Returned(result)
//!      ▼
//! COMPUTE ──err────────────────────────────────────────────► Failed(InvalidInput | ..)
//!      ▼
//! CACHE_WRITE ──err: warn, continue
//!      ▼
//! AUDIT_APPEND ──err───────────────────────────────────────► Failed(AuditWriteFailed)
//!      ▼
//! Returned(result)
//! ```
//!
//! ## Single Flight
//!
//! Each mapping name has at most one computing caller at a time. The first
//! caller to miss takes the key's slot; concurrent callers for the same key
//! queue on it and, once admitted, re-read the cache before computing. A
//! burst of same-key misses therefore produces one evaluator invocation.
//! A waiter whose deadline passes gives up with [`EngineError::Timeout`];
//! the caller holding the slot is unaffected and still fills the cache.
//!
//! Cache faults degrade to recomputation and never reach the caller. Audit
//! faults always do, even though the cache may already hold the result.
//!
//! Results are sealed through a [`MonotonicClock`], so two evaluations by
//! the same orchestrator never share an `evaluated_at`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use regmap_core::{Clock, MappingName, MonotonicClock};
use regmap_evaluator::{ActorContext, CoverageEvaluator, EvaluationResult};
use regmap_store::{AuditRecord, AuditTrail, EvaluationCache};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::config::CoreConfig;
use crate::error::EngineError;
use crate::loader::MappingLoader;

/// Per-call knobs for [`EvaluationOrchestrator::evaluate_with`].
#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions {
    /// Skip the cache lookup and invalidate the key before computing.
    pub force_refresh: bool,
    /// How long to wait for another caller's in-flight computation.
    /// Falls back to the configured default.
    pub deadline: Option<Duration>,
    /// Cache lifetime of a freshly computed result. Falls back to the
    /// configured TTL.
    pub ttl: Option<chrono::Duration>,
}

#[derive(Debug, Default)]
struct InFlight {
    slots: Mutex<HashMap<MappingName, Arc<AsyncMutex<()>>>>,
}

impl InFlight {
    fn join(&self, key: &MappingName) -> Flight<'_> {
        let slot = self.slots.lock().entry(key.clone()).or_default().clone();
        Flight {
            registry: self,
            key: key.clone(),
            slot,
        }
    }

    fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// A caller's membership in a key's queue. Dropping the last membership
/// removes the slot.
struct Flight<'a> {
    registry: &'a InFlight,
    key: MappingName,
    slot: Arc<AsyncMutex<()>>,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut slots = self.registry.slots.lock();
        // The map holds one reference and this flight holds the other.
        if Arc::strong_count(&self.slot) == 2 {
            if let Some(current) = slots.get(&self.key) {
                if Arc::ptr_eq(current, &self.slot) {
                    slots.remove(&self.key);
                }
            }
        }
    }
}

/// Coordinates loader, evaluator, cache and audit trail.
///
/// Cloning is cheap and clones share the in-flight table, so a clone can be
/// moved into a spawned task.
pub struct EvaluationOrchestrator<L, E, C, A> {
    loader: Arc<L>,
    evaluator: Arc<E>,
    cache: Arc<C>,
    audit: Arc<A>,
    clock: Arc<dyn Clock>,
    cache_ttl: chrono::Duration,
    default_deadline: Option<Duration>,
    audit_page_limit: usize,
    inflight: Arc<InFlight>,
}

impl<L, E, C, A> Clone for EvaluationOrchestrator<L, E, C, A> {
    fn clone(&self) -> Self {
        Self {
            loader: Arc::clone(&self.loader),
            evaluator: Arc::clone(&self.evaluator),
            cache: Arc::clone(&self.cache),
            audit: Arc::clone(&self.audit),
            clock: Arc::clone(&self.clock),
            cache_ttl: self.cache_ttl,
            default_deadline: self.default_deadline,
            audit_page_limit: self.audit_page_limit,
            inflight: Arc::clone(&self.inflight),
        }
    }
}

impl<L, E, C, A> EvaluationOrchestrator<L, E, C, A>
where
    L: MappingLoader,
    E: CoverageEvaluator,
    C: EvaluationCache,
    A: AuditTrail,
{
    /// Wire the collaborators together using default configuration.
    pub fn new(
        loader: Arc<L>,
        evaluator: Arc<E>,
        cache: Arc<C>,
        audit: Arc<A>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            loader,
            evaluator,
            cache,
            audit,
            clock: Arc::new(MonotonicClock::new(clock)),
            cache_ttl: CoreConfig::default().cache_ttl(),
            default_deadline: None,
            audit_page_limit: CoreConfig::default().audit_page_limit,
            inflight: Arc::default(),
        }
    }

    /// Apply TTL, deadline and paging limits from `config`.
    pub fn with_config(mut self, config: &CoreConfig) -> Self {
        self.cache_ttl = config.cache_ttl();
        self.default_deadline = config.default_deadline();
        self.audit_page_limit = config.audit_page_limit;
        self
    }

    /// The cache this orchestrator writes through.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// The audit trail this orchestrator appends to.
    pub fn audit(&self) -> &A {
        &self.audit
    }

    /// Keys with a computation in flight or queued.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Return a valid cached result for `name` or compute, cache and audit
    /// a fresh one.
    pub async fn evaluate_mapping(
        &self,
        name: &MappingName,
        force_refresh: bool,
        actor: ActorContext,
    ) -> Result<EvaluationResult, EngineError> {
        let options = EvaluateOptions {
            force_refresh,
            ..EvaluateOptions::default()
        };
        self.evaluate_with(name, actor, options).await
    }

    /// [`evaluate_mapping`](Self::evaluate_mapping) with per-call options.
    #[tracing::instrument(skip_all, fields(mapping = %name, force = options.force_refresh))]
    pub async fn evaluate_with(
        &self,
        name: &MappingName,
        actor: ActorContext,
        options: EvaluateOptions,
    ) -> Result<EvaluationResult, EngineError> {
        let started = Instant::now();
        counter!("regmap_evaluate_requests_total").increment(1);

        if !options.force_refresh {
            if let Some(hit) = self.lookup(name).await {
                return Ok(hit);
            }
        }

        let flight = self.inflight.join(name);
        let _permit = self.acquire(&flight, name, started, options.deadline).await?;

        if options.force_refresh {
            match self.cache.invalidate(name).await {
                Ok(retired) => tracing::debug!(retired, "cache entry invalidated"),
                Err(e) => {
                    let e = EngineError::CacheUnavailable(e);
                    tracing::warn!(error = %e, "invalidate failed, recomputing anyway");
                }
            }
        } else if let Some(hit) = self.lookup(name).await {
            tracing::debug!("served by concurrent computation");
            return Ok(hit);
        }

        self.compute(name, actor, options.ttl.unwrap_or(self.cache_ttl))
            .await
    }

    /// Audit history of `name`, most recent first. `limit` is capped at the
    /// configured page limit.
    pub async fn get_history(
        &self,
        name: &MappingName,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AuditRecord>, EngineError> {
        let limit = limit.min(self.audit_page_limit);
        self.audit
            .history(name, limit, offset)
            .await
            .map_err(EngineError::Store)
    }

    /// Eagerly expire the cached result for `name`, e.g. after its policy or
    /// vendor definitions changed.
    pub async fn invalidate(&self, name: &MappingName) -> Result<bool, EngineError> {
        self.cache
            .invalidate(name)
            .await
            .map_err(EngineError::CacheUnavailable)
    }

    async fn lookup(&self, name: &MappingName) -> Option<EvaluationResult> {
        match self.cache.get(name).await {
            Ok(Some(hit)) => {
                counter!("regmap_cache_hits_total").increment(1);
                tracing::debug!(hash = %hit.content_hash, "cache hit");
                Some(hit)
            }
            Ok(None) => {
                counter!("regmap_cache_misses_total").increment(1);
                tracing::debug!("cache miss");
                None
            }
            Err(e) => {
                counter!("regmap_cache_errors_total").increment(1);
                let e = EngineError::CacheUnavailable(e);
                tracing::warn!(error = %e, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn acquire(
        &self,
        flight: &Flight<'_>,
        name: &MappingName,
        started: Instant,
        deadline: Option<Duration>,
    ) -> Result<OwnedMutexGuard<()>, EngineError> {
        if let Ok(permit) = Arc::clone(&flight.slot).try_lock_owned() {
            return Ok(permit);
        }
        counter!("regmap_single_flight_waits_total").increment(1);
        tracing::debug!("waiting on in-flight evaluation");

        let wait = Arc::clone(&flight.slot).lock_owned();
        match deadline.or(self.default_deadline) {
            None => Ok(wait.await),
            Some(limit) => tokio::time::timeout_at(started + limit, wait)
                .await
                .map_err(|_| {
                    counter!("regmap_single_flight_timeouts_total").increment(1);
                    let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    tracing::warn!(waited_ms, "deadline exceeded waiting on in-flight evaluation");
                    EngineError::Timeout {
                        mapping: name.clone(),
                        waited_ms,
                    }
                }),
        }
    }

    async fn compute(
        &self,
        name: &MappingName,
        actor: ActorContext,
        ttl: chrono::Duration,
    ) -> Result<EvaluationResult, EngineError> {
        let definition = self
            .loader
            .load(name)
            .ok_or_else(|| EngineError::MappingNotFound(name.clone()))?;
        if definition.name != *name {
            return Err(EngineError::InvalidInput(format!(
                "loader returned mapping {} for {name}",
                definition.name
            )));
        }

        counter!("regmap_evaluations_total").increment(1);
        let body = self.evaluator.evaluate(&definition)?;
        let result = body.seal(self.clock.now(), actor.clone())?;

        if let Err(e) = self.cache.put(name, result.clone(), ttl).await {
            counter!("regmap_cache_errors_total").increment(1);
            let e = EngineError::CacheUnavailable(e);
            tracing::warn!(error = %e, "cache write failed, continuing to audit");
        }

        let record_id = match self.audit.append(&result, &actor).await {
            Ok(id) => id,
            Err(e) => {
                counter!("regmap_audit_failures_total").increment(1);
                tracing::error!(error = %e, hash = %result.content_hash, "audit append failed");
                return Err(EngineError::AuditWriteFailed(e));
            }
        };

        tracing::info!(
            record_id = %record_id,
            coverage = %result.coverage(),
            status = %result.status(),
            hash = %result.content_hash,
            "evaluation recorded"
        );
        Ok(result)
    }
}
