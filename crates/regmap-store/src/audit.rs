//! # Audit Trail
//!
//! Append-only record of every evaluation the orchestrator computed,
//! independent of cache expiry.
//!
//! ## Hash Chain
//!
//! Records form a single chain across all mappings, ordered by [`RecordId`].
//! Each record stores the digest of its predecessor and its own
//! `record_digest`:
//!
//! ```text
//! record_digest = SHA256(JCS({previous_digest, id, mapping_name,
//!                             content_hash, evaluated_at, recorded_at, actor}))
//! ```
//!
//! The first record ever appended links to [`ContentDigest::zero`]. Retention
//! cleanup deletes a prefix of the chain; the oldest surviving record's
//! `previous_digest` then serves as the anchor. [`AuditTrail::verify_chain`]
//! recomputes every digest and reports discontinuities.
//!
//! `recorded_at` strictly increases along the chain. An append whose clock
//! reading does not pass the head's is stamped one microsecond after it.

use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use parking_lot::RwLock;
use regmap_core::{digest_of, CanonicalizationError, Clock, ContentDigest, MappingName, Timestamp};
use regmap_evaluator::{ActorContext, EvaluationResult};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Monotonic surrogate identifier of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    /// Wrap a raw identifier.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw identifier.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One immutable audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Position in the chain.
    pub id: RecordId,
    /// The evaluation exactly as appended.
    pub result: EvaluationResult,
    /// Who triggered the append.
    pub actor: ActorContext,
    /// When the record was written.
    pub recorded_at: Timestamp,
    /// `record_digest` of the preceding record.
    pub previous_digest: ContentDigest,
    /// Digest over this record's chained fields.
    pub record_digest: ContentDigest,
}

impl AuditRecord {
    /// Mapping of the recorded evaluation.
    pub fn mapping_name(&self) -> &MappingName {
        self.result.mapping_name()
    }

    /// Recompute this record's digest from its stored fields.
    pub fn expected_digest(&self) -> Result<ContentDigest, CanonicalizationError> {
        chain_digest(
            &self.previous_digest,
            self.id,
            &self.result,
            &self.actor,
            self.recorded_at,
        )
    }
}

#[derive(Serialize)]
struct ChainLink<'a> {
    previous_digest: &'a ContentDigest,
    id: u64,
    mapping_name: &'a MappingName,
    content_hash: &'a ContentDigest,
    evaluated_at: Timestamp,
    recorded_at: Timestamp,
    actor: &'a ActorContext,
}

/// Digest of one chain link.
pub fn chain_digest(
    previous: &ContentDigest,
    id: RecordId,
    result: &EvaluationResult,
    actor: &ActorContext,
    recorded_at: Timestamp,
) -> Result<ContentDigest, CanonicalizationError> {
    digest_of(&ChainLink {
        previous_digest: previous,
        id: id.get(),
        mapping_name: result.mapping_name(),
        content_hash: &result.content_hash,
        evaluated_at: result.evaluated_at,
        recorded_at,
        actor,
    })
}

/// Outcome of [`AuditTrail::verify_chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainIntegrity {
    /// Records inspected.
    pub total: usize,
    /// Records whose back-link or own digest did not check out.
    pub broken_links: usize,
    /// `broken_links == 0`.
    pub valid: bool,
}

impl ChainIntegrity {
    /// Walk `records` (oldest first) and count broken links.
    pub fn check(records: &[AuditRecord]) -> Self {
        let mut broken_links = 0;
        let mut last: Option<&ContentDigest> = None;
        for record in records {
            let linked = last.map_or(true, |prev| *prev == record.previous_digest);
            let sealed = matches!(record.expected_digest(), Ok(d) if d == record.record_digest);
            if !linked || !sealed {
                broken_links += 1;
            }
            last = Some(&record.record_digest);
        }
        Self {
            total: records.len(),
            broken_links,
            valid: broken_links == 0,
        }
    }
}

/// The audit trail contract.
pub trait AuditTrail: Send + Sync {
    /// Append `result` on behalf of `actor`. Atomic: either the record exists
    /// with a fresh id or nothing was written.
    fn append(
        &self,
        result: &EvaluationResult,
        actor: &ActorContext,
    ) -> impl Future<Output = Result<RecordId, StoreError>> + Send;

    /// Records for `mapping`, most recent first, skipping `offset`.
    fn history(
        &self,
        mapping: &MappingName,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Vec<AuditRecord>, StoreError>> + Send;

    /// Delete records written more than `older_than_days` days ago.
    fn cleanup(&self, older_than_days: u32) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Verify the oldest `limit` records of the chain.
    fn verify_chain(&self, limit: usize) -> impl Future<Output = Result<ChainIntegrity, StoreError>> + Send;
}

/// Retention cutoff for `older_than_days` relative to `now`.
pub(crate) fn retention_cutoff(now: Timestamp, older_than_days: u32) -> Result<Timestamp, StoreError> {
    now.checked_sub(Duration::days(i64::from(older_than_days)))
        .ok_or_else(|| StoreError::Corrupt(format!("retention of {older_than_days} days underflows")))
}

/// Timestamp for a record appended after `head`.
pub(crate) fn next_recorded_at(now: Timestamp, head: Option<Timestamp>) -> Timestamp {
    match head {
        Some(prev) if now <= prev => prev.successor(),
        _ => now,
    }
}

#[derive(Debug)]
struct Chain {
    records: Vec<AuditRecord>,
    next_id: u64,
}

/// Process-local audit trail. Clones share storage.
#[derive(Debug, Clone)]
pub struct InMemoryAuditTrail {
    chain: Arc<RwLock<Chain>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryAuditTrail {
    /// Empty trail reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            chain: Arc::new(RwLock::new(Chain {
                records: Vec::new(),
                next_id: 1,
            })),
            clock,
        }
    }

    /// Total number of stored records.
    pub fn len(&self) -> usize {
        self.chain.read().records.len()
    }

    /// Whether no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored record, oldest first.
    pub fn all(&self) -> Vec<AuditRecord> {
        self.chain.read().records.clone()
    }
}

impl AuditTrail for InMemoryAuditTrail {
    async fn append(
        &self,
        result: &EvaluationResult,
        actor: &ActorContext,
    ) -> Result<RecordId, StoreError> {
        let now = self.clock.now();
        let mut chain = self.chain.write();
        let id = RecordId(chain.next_id);
        let head = chain.records.last();
        let previous_digest = head.map_or_else(ContentDigest::zero, |r| r.record_digest);
        let recorded_at = next_recorded_at(now, head.map(|r| r.recorded_at));
        let record_digest = chain_digest(&previous_digest, id, result, actor, recorded_at)?;
        chain.records.push(AuditRecord {
            id,
            result: result.clone(),
            actor: actor.clone(),
            recorded_at,
            previous_digest,
            record_digest,
        });
        chain.next_id += 1;
        tracing::debug!(mapping = %result.mapping_name(), record_id = %id, "audit record appended");
        Ok(id)
    }

    async fn history(
        &self,
        mapping: &MappingName,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let chain = self.chain.read();
        Ok(chain
            .records
            .iter()
            .rev()
            .filter(|r| r.mapping_name() == mapping)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn cleanup(&self, older_than_days: u32) -> Result<u64, StoreError> {
        let cutoff = retention_cutoff(self.clock.now(), older_than_days)?;
        let mut chain = self.chain.write();
        let before = chain.records.len();
        chain.records.retain(|r| r.recorded_at >= cutoff);
        let removed = (before - chain.records.len()) as u64;
        if removed > 0 {
            tracing::info!(removed, %cutoff, "audit records pruned");
        }
        Ok(removed)
    }

    async fn verify_chain(&self, limit: usize) -> Result<ChainIntegrity, StoreError> {
        let chain = self.chain.read();
        let end = limit.min(chain.records.len());
        Ok(ChainIntegrity::check(&chain.records[..end]))
    }
}
