//! End-to-end flows through the evaluation orchestrator, with fault
//! injection through wrapper stores.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regmap_core::{Clock, ManualClock, MappingName, PolicyRef, Timestamp};
use regmap_engine::{
    CoreConfig, EngineError, EvaluateOptions, EvaluationOrchestrator, InMemoryMappingLoader,
    RetentionJob,
};
use regmap_evaluator::{
    ActorContext, ControlCoverageEvaluator, ControlId, CoverageBp, CoverageEvaluator,
    CoverageStatus, EvaluationBody, EvaluationResult, EvaluatorError, MappingDefinition,
    VendorCapabilities,
};
use regmap_store::{
    AuditRecord, AuditTrail, CacheEntry, ChainIntegrity, EvaluationCache, InMemoryAuditTrail,
    InMemoryEvaluationCache, RecordId, StoreError,
};

// ── Fault-injecting collaborators ───────────────────────────────────

#[derive(Default)]
struct CountingEvaluator {
    calls: AtomicUsize,
}

impl CountingEvaluator {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CoverageEvaluator for CountingEvaluator {
    fn evaluate(&self, mapping: &MappingDefinition) -> Result<EvaluationBody, EvaluatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ControlCoverageEvaluator.evaluate(mapping)
    }
}

struct FlakyCache {
    inner: InMemoryEvaluationCache,
    fail_get: AtomicBool,
    fail_put: AtomicBool,
    put_delay_ms: AtomicU64,
}

impl FlakyCache {
    fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: InMemoryEvaluationCache::new(clock),
            fail_get: AtomicBool::new(false),
            fail_put: AtomicBool::new(false),
            put_delay_ms: AtomicU64::new(0),
        }
    }

    fn injected() -> StoreError {
        StoreError::Unavailable("injected cache fault".into())
    }
}

impl EvaluationCache for FlakyCache {
    async fn get(&self, key: &MappingName) -> Result<Option<EvaluationResult>, StoreError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.get(key).await
    }

    async fn get_including_expired(
        &self,
        key: &MappingName,
    ) -> Result<Option<CacheEntry>, StoreError> {
        self.inner.get_including_expired(key).await
    }

    async fn put(
        &self,
        key: &MappingName,
        result: EvaluationResult,
        ttl: chrono::Duration,
    ) -> Result<(), StoreError> {
        let delay = self.put_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.put(key, result, ttl).await
    }

    async fn invalidate(&self, key: &MappingName) -> Result<bool, StoreError> {
        self.inner.invalidate(key).await
    }

    async fn sweep(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        self.inner.sweep(cutoff).await
    }
}

struct FlakyAudit {
    inner: InMemoryAuditTrail,
    fail_append: AtomicBool,
}

impl AuditTrail for FlakyAudit {
    async fn append(
        &self,
        result: &EvaluationResult,
        actor: &ActorContext,
    ) -> Result<RecordId, StoreError> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected audit fault".into()));
        }
        self.inner.append(result, actor).await
    }

    async fn history(
        &self,
        mapping: &MappingName,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        self.inner.history(mapping, limit, offset).await
    }

    async fn cleanup(&self, older_than_days: u32) -> Result<u64, StoreError> {
        self.inner.cleanup(older_than_days).await
    }

    async fn verify_chain(&self, limit: usize) -> Result<ChainIntegrity, StoreError> {
        self.inner.verify_chain(limit).await
    }
}

// ── Harness ─────────────────────────────────────────────────────────

type Orchestrator =
    EvaluationOrchestrator<InMemoryMappingLoader, CountingEvaluator, FlakyCache, FlakyAudit>;

struct Harness {
    clock: ManualClock,
    loader: Arc<InMemoryMappingLoader>,
    evaluator: Arc<CountingEvaluator>,
    orchestrator: Orchestrator,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(&CoreConfig::default())
    }

    fn with_config(config: &CoreConfig) -> Self {
        let clock = ManualClock::new(Timestamp::parse("2026-07-01T08:00:00Z").unwrap());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let loader = Arc::new(InMemoryMappingLoader::new());
        loader.upsert(mapping("M", &["A", "B", "C", "D"], &["A", "B", "C"]));
        let evaluator = Arc::new(CountingEvaluator::default());
        let cache = Arc::new(FlakyCache::new(Arc::clone(&shared)));
        let audit = Arc::new(FlakyAudit {
            inner: InMemoryAuditTrail::new(Arc::clone(&shared)),
            fail_append: AtomicBool::new(false),
        });
        let orchestrator = EvaluationOrchestrator::new(
            Arc::clone(&loader),
            Arc::clone(&evaluator),
            cache,
            audit,
            shared,
        )
        .with_config(config);
        Self {
            clock,
            loader,
            evaluator,
            orchestrator,
        }
    }

    fn cache(&self) -> &FlakyCache {
        self.orchestrator.cache()
    }

    fn audit(&self) -> &InMemoryAuditTrail {
        &self.orchestrator.audit().inner
    }

    async fn evaluate(&self, name: &str) -> Result<EvaluationResult, EngineError> {
        self.orchestrator
            .evaluate_mapping(&m(name), false, ActorContext::user("tester"))
            .await
    }
}

fn m(name: &str) -> MappingName {
    MappingName::new(name).unwrap()
}

fn mapping(name: &str, required: &[&str], provided: &[&str]) -> MappingDefinition {
    MappingDefinition {
        name: m(name),
        policy: PolicyRef::new("NIST", "800-53r5").unwrap(),
        required_controls: required.iter().map(|s| s.to_string()).collect(),
        vendors: vec![VendorCapabilities {
            vendor_id: "acme-cloud".into(),
            controls: provided.iter().map(|s| s.to_string()).collect(),
        }],
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn partial_coverage_is_cached_within_ttl() {
    let h = Harness::new();

    let first = h.evaluate("M").await.unwrap();
    assert_eq!(first.coverage(), CoverageBp::from_bp(7_500).unwrap());
    assert_eq!(first.status(), CoverageStatus::PartialCompliant);
    assert_eq!(first.body.missing, vec![ControlId::new("D").unwrap()]);
    assert_eq!(h.audit().len(), 1);

    h.clock.advance(chrono::Duration::minutes(4));
    let second = h.evaluate("M").await.unwrap();
    assert_eq!(second, first);
    assert_eq!(h.evaluator.calls(), 1);
    assert_eq!(h.audit().len(), 1);
}

#[tokio::test]
async fn expired_entry_recomputes_with_new_audit_record() {
    let h = Harness::new();
    let first = h.evaluate("M").await.unwrap();

    h.clock.advance(chrono::Duration::minutes(5));
    let second = h.evaluate("M").await.unwrap();

    assert_eq!(second.content_hash, first.content_hash);
    assert!(second.evaluated_at > first.evaluated_at);
    assert_eq!(h.evaluator.calls(), 2);

    let history = h.orchestrator.get_history(&m("M"), 10, 0).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_ne!(history[0].id, history[1].id);
    assert_eq!(history[0].result, second);
    assert_eq!(history[1].result, first);
}

#[tokio::test]
async fn force_refresh_bypasses_valid_cache() {
    let h = Harness::new();
    h.evaluate("M").await.unwrap();
    h.clock.advance(chrono::Duration::seconds(30));

    let refreshed = h
        .orchestrator
        .evaluate_mapping(&m("M"), true, ActorContext::system())
        .await
        .unwrap();

    assert_eq!(h.evaluator.calls(), 2);
    assert_eq!(h.audit().len(), 2);
    assert_eq!(h.cache().inner.get(&m("M")).await.unwrap(), Some(refreshed));
}

#[tokio::test(start_paused = true)]
async fn cold_stampede_evaluates_once() {
    let h = Harness::new();
    h.cache().put_delay_ms.store(50, Ordering::SeqCst);

    let mut handles = Vec::new();
    for i in 0..50 {
        let orchestrator = h.orchestrator.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .evaluate_mapping(&m("M"), false, ActorContext::user(format!("caller-{i}")))
                .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(h.evaluator.calls(), 1);
    assert_eq!(h.audit().len(), 1);
    assert_eq!(results.len(), 50);
    assert!(results.iter().all(|r| *r == results[0]));
    assert_eq!(h.orchestrator.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn parallel_stampede_evaluates_once() {
    let h = Harness::new();
    h.cache().put_delay_ms.store(20, Ordering::SeqCst);
    let start = Arc::new(tokio::sync::Barrier::new(64));

    let mut handles = Vec::new();
    for i in 0..64 {
        let orchestrator = h.orchestrator.clone();
        let start = Arc::clone(&start);
        handles.push(tokio::spawn(async move {
            start.wait().await;
            orchestrator
                .evaluate_mapping(&m("M"), false, ActorContext::user(format!("worker-{i}")))
                .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(h.evaluator.calls(), 1);
    assert_eq!(h.audit().len(), 1);
    assert!(results.iter().all(|r| *r == results[0]));
    assert_eq!(h.orchestrator.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn waiter_timeout_leaves_leader_running() {
    let h = Harness::new();
    h.cache().put_delay_ms.store(200, Ordering::SeqCst);

    let leader = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .evaluate_mapping(&m("M"), false, ActorContext::system())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;

    let options = EvaluateOptions {
        deadline: Some(Duration::from_millis(20)),
        ..EvaluateOptions::default()
    };
    let err = h
        .orchestrator
        .evaluate_with(&m("M"), ActorContext::system(), options)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }));

    let led = leader.await.unwrap().unwrap();
    assert_eq!(h.evaluator.calls(), 1);
    assert_eq!(h.audit().len(), 1);
    assert_eq!(h.cache().inner.get(&m("M")).await.unwrap(), Some(led));
    assert_eq!(h.orchestrator.in_flight(), 0);
}

#[tokio::test]
async fn audit_failure_fails_call_but_cache_is_ahead() {
    let h = Harness::new();
    h.orchestrator.audit().fail_append.store(true, Ordering::SeqCst);

    let err = h.evaluate("M").await.unwrap_err();
    assert!(matches!(err, EngineError::AuditWriteFailed(_)));
    assert!(h.audit().is_empty());

    let cached = h.cache().inner.get(&m("M")).await.unwrap();
    assert!(cached.is_some());

    // Served from cache; the audit gap stays until a recomputation succeeds.
    h.orchestrator.audit().fail_append.store(false, Ordering::SeqCst);
    assert_eq!(h.evaluate("M").await.unwrap(), cached.unwrap());
    assert!(h.audit().is_empty());
}

#[tokio::test]
async fn cache_faults_degrade_to_recomputation() {
    let h = Harness::new();
    h.cache().fail_get.store(true, Ordering::SeqCst);
    h.cache().fail_put.store(true, Ordering::SeqCst);

    let a = h.evaluate("M").await.unwrap();
    let b = h.evaluate("M").await.unwrap();

    assert_eq!(a.content_hash, b.content_hash);
    assert_eq!(h.evaluator.calls(), 2);
    assert_eq!(h.audit().len(), 2);
    assert!(h.cache().inner.is_empty());
}

#[tokio::test]
async fn evaluator_failure_writes_nothing() {
    let h = Harness::new();
    h.loader.upsert(mapping("bad", &["ac-1", "AC-1"], &["AC-1"]));

    let err = h.evaluate("bad").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert!(h.cache().inner.is_empty());
    assert!(h.audit().is_empty());
}

#[tokio::test]
async fn unknown_mapping_is_not_found() {
    let h = Harness::new();
    let err = h.evaluate("nope").await.unwrap_err();
    assert!(matches!(err, EngineError::MappingNotFound(name) if name.as_str() == "nope"));
    assert_eq!(h.evaluator.calls(), 0);
    assert!(h.audit().is_empty());
}

#[tokio::test]
async fn empty_required_set_is_fully_compliant() {
    let h = Harness::new();
    h.loader.upsert(mapping("empty", &[], &["A"]));
    let r = h.evaluate("empty").await.unwrap();
    assert_eq!(r.coverage(), CoverageBp::FULL);
    assert_eq!(r.status(), CoverageStatus::Compliant);
}

#[tokio::test]
async fn definition_change_needs_invalidation() {
    let h = Harness::new();
    let before = h.evaluate("M").await.unwrap();

    h.loader.upsert(mapping("M", &["A", "B", "C", "D"], &["A", "B", "C", "D"]));
    assert_eq!(h.evaluate("M").await.unwrap(), before);

    assert!(h.orchestrator.invalidate(&m("M")).await.unwrap());
    let after = h.evaluate("M").await.unwrap();
    assert_eq!(after.status(), CoverageStatus::Compliant);
    assert_ne!(after.content_hash, before.content_hash);
}

#[tokio::test]
async fn history_is_paged_and_capped() {
    let config = CoreConfig {
        audit_page_limit: 2,
        ..CoreConfig::default()
    };
    let h = Harness::with_config(&config);
    for _ in 0..3 {
        h.orchestrator
            .evaluate_mapping(&m("M"), true, ActorContext::system())
            .await
            .unwrap();
        h.clock.advance(chrono::Duration::seconds(1));
    }

    let page = h.orchestrator.get_history(&m("M"), 10, 0).await.unwrap();
    assert_eq!(page.len(), 2);
    assert!(page[0].id > page[1].id);
    assert!(page[0].result.evaluated_at > page[1].result.evaluated_at);

    let rest = h.orchestrator.get_history(&m("M"), 10, 2).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert!(rest[0].id < page[1].id);
    assert!(h.orchestrator.get_history(&m("other"), 10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn refreshes_within_one_instant_keep_history_strictly_ordered() {
    let h = Harness::new();
    for _ in 0..3 {
        h.orchestrator
            .evaluate_mapping(&m("M"), true, ActorContext::system())
            .await
            .unwrap();
    }

    let history = h.orchestrator.get_history(&m("M"), 10, 0).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history
        .windows(2)
        .all(|w| w[0].result.evaluated_at > w[1].result.evaluated_at));
    assert!(history.windows(2).all(|w| w[0].recorded_at > w[1].recorded_at));
    assert_eq!(history[2].result.evaluated_at, h.clock.now());
}

#[tokio::test]
async fn retention_prunes_audit_and_expired_cache() {
    let h = Harness::new();
    h.loader.upsert(mapping("N", &["A"], &["A"]));
    h.evaluate("M").await.unwrap();

    h.clock.advance(chrono::Duration::days(31));
    h.evaluate("N").await.unwrap();

    let job = RetentionJob::new(
        Arc::new(h.cache().inner.clone()),
        Arc::new(h.audit().clone()),
        Arc::new(h.clock.clone()),
        30,
    );
    let report = job.run().await.unwrap();
    assert_eq!(report.audit_records_deleted, 1);
    assert_eq!(report.cache_entries_swept, 1);

    let again = job.run().await.unwrap();
    assert_eq!(again.audit_records_deleted, 0);
    assert_eq!(again.cache_entries_swept, 0);

    assert!(h.orchestrator.get_history(&m("M"), 10, 0).await.unwrap().is_empty());
    assert_eq!(h.orchestrator.get_history(&m("N"), 10, 0).await.unwrap().len(), 1);
    assert!(h.audit().verify_chain(100).await.unwrap().valid);
}

#[tokio::test]
async fn audit_chain_stays_valid_across_mappings() {
    let h = Harness::new();
    h.loader.upsert(mapping("N", &["A", "B"], &["B"]));
    for _ in 0..3 {
        h.orchestrator
            .evaluate_mapping(&m("M"), true, ActorContext::system())
            .await
            .unwrap();
        h.orchestrator
            .evaluate_mapping(&m("N"), true, ActorContext::user("ops"))
            .await
            .unwrap();
    }
    let integrity = h.audit().verify_chain(usize::MAX).await.unwrap();
    assert_eq!(integrity.total, 6);
    assert!(integrity.valid);
}
