//! # Policy Version Registry
//!
//! Ingested policy documents keyed by `(authority, version, content_hash)`.
//!
//! Ingesting bytes whose hash already exists for the pair is a no-op that
//! reports [`IngestOutcome::Deduplicated`], including when the matching row
//! has since been superseded. Any other ingest deactivates the pair's current
//! active row and inserts the new row as active, as one critical section: no
//! reader observes zero or two active rows for a pair once it has been
//! ingested at least once.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use regmap_core::{sha256_raw, Authority, Clock, ContentDigest, PolicyVersionLabel, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Surrogate identifier of a registry row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyVersionId(Uuid);

impl PolicyVersionId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PolicyVersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PolicyVersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One ingested policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVersion {
    pub id: PolicyVersionId,
    pub authority: Authority,
    pub version: PolicyVersionLabel,
    /// SHA-256 of the raw document bytes.
    pub content_hash: ContentDigest,
    /// Where the document came from (file path, URL), if known.
    pub origin: Option<String>,
    pub active: bool,
    pub created_at: Timestamp,
}

/// What [`PolicyVersionRegistry::ingest`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new active row was written.
    Inserted(PolicyVersion),
    /// A row with identical content already existed. Nothing changed.
    Deduplicated(PolicyVersion),
}

impl IngestOutcome {
    /// The inserted or pre-existing row.
    pub fn version(&self) -> &PolicyVersion {
        match self {
            Self::Inserted(v) | Self::Deduplicated(v) => v,
        }
    }

    /// Whether the registry was mutated.
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// The policy version registry contract.
pub trait PolicyVersionRegistry: Send + Sync {
    /// Register `content` as the current document for `(authority, version)`.
    fn ingest(
        &self,
        authority: &Authority,
        version: &PolicyVersionLabel,
        content: &[u8],
        origin: Option<&str>,
    ) -> impl Future<Output = Result<IngestOutcome, StoreError>> + Send;

    /// The active row for the pair, if it was ever ingested.
    fn active(
        &self,
        authority: &Authority,
        version: &PolicyVersionLabel,
    ) -> impl Future<Output = Result<Option<PolicyVersion>, StoreError>> + Send;

    /// Every row for the pair, newest first.
    fn versions(
        &self,
        authority: &Authority,
        version: &PolicyVersionLabel,
    ) -> impl Future<Output = Result<Vec<PolicyVersion>, StoreError>> + Send;
}

/// Process-local registry. Clones share storage.
#[derive(Debug, Clone)]
pub struct InMemoryPolicyRegistry {
    rows: Arc<RwLock<Vec<PolicyVersion>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryPolicyRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(Vec::new())),
            clock,
        }
    }
}

fn same_pair(row: &PolicyVersion, authority: &Authority, version: &PolicyVersionLabel) -> bool {
    row.authority == *authority && row.version == *version
}

impl PolicyVersionRegistry for InMemoryPolicyRegistry {
    async fn ingest(
        &self,
        authority: &Authority,
        version: &PolicyVersionLabel,
        content: &[u8],
        origin: Option<&str>,
    ) -> Result<IngestOutcome, StoreError> {
        let content_hash = sha256_raw(content);
        let mut rows = self.rows.write();

        if let Some(existing) = rows
            .iter()
            .find(|r| same_pair(r, authority, version) && r.content_hash == content_hash)
        {
            tracing::debug!(%authority, %version, hash = %content_hash, "policy content unchanged");
            return Ok(IngestOutcome::Deduplicated(existing.clone()));
        }

        for row in rows.iter_mut().filter(|r| same_pair(r, authority, version)) {
            row.active = false;
        }
        let inserted = PolicyVersion {
            id: PolicyVersionId::new(),
            authority: authority.clone(),
            version: version.clone(),
            content_hash,
            origin: origin.map(str::to_string),
            active: true,
            created_at: self.clock.now(),
        };
        rows.push(inserted.clone());
        tracing::info!(%authority, %version, hash = %content_hash, "policy version activated");
        Ok(IngestOutcome::Inserted(inserted))
    }

    async fn active(
        &self,
        authority: &Authority,
        version: &PolicyVersionLabel,
    ) -> Result<Option<PolicyVersion>, StoreError> {
        Ok(self
            .rows
            .read()
            .iter()
            .find(|r| r.active && same_pair(r, authority, version))
            .cloned())
    }

    async fn versions(
        &self,
        authority: &Authority,
        version: &PolicyVersionLabel,
    ) -> Result<Vec<PolicyVersion>, StoreError> {
        Ok(self
            .rows
            .read()
            .iter()
            .rev()
            .filter(|r| same_pair(r, authority, version))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regmap_core::ManualClock;

    fn setup() -> (InMemoryPolicyRegistry, Authority, PolicyVersionLabel) {
        let clock = ManualClock::new(Timestamp::parse("2026-05-01T00:00:00Z").unwrap());
        (
            InMemoryPolicyRegistry::new(Arc::new(clock)),
            Authority::new("NIST").unwrap(),
            PolicyVersionLabel::new("800-53r5").unwrap(),
        )
    }

    async fn active_count(reg: &InMemoryPolicyRegistry, a: &Authority, v: &PolicyVersionLabel) -> usize {
        reg.versions(a, v).await.unwrap().iter().filter(|r| r.active).count()
    }

    #[tokio::test]
    async fn identical_content_is_deduplicated() {
        let (reg, a, v) = setup();
        let first = reg.ingest(&a, &v, b"policy body", Some("nist.yaml")).await.unwrap();
        let second = reg.ingest(&a, &v, b"policy body", None).await.unwrap();
        assert!(first.is_inserted());
        assert_eq!(second, IngestOutcome::Deduplicated(first.version().clone()));
        assert_eq!(reg.versions(&a, &v).await.unwrap().len(), 1);
        assert_eq!(active_count(&reg, &a, &v).await, 1);
    }

    #[tokio::test]
    async fn new_content_supersedes_exactly_one_row() {
        let (reg, a, v) = setup();
        let old = reg.ingest(&a, &v, b"v1", None).await.unwrap();
        let new = reg.ingest(&a, &v, b"v2", None).await.unwrap();
        assert!(new.is_inserted());

        let rows = reg.versions(&a, &v).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, new.version().id);
        assert!(rows[0].active);
        assert_eq!(rows[1].id, old.version().id);
        assert!(!rows[1].active);
        assert_eq!(reg.active(&a, &v).await.unwrap().unwrap().id, new.version().id);
    }

    #[tokio::test]
    async fn reverted_content_is_deduplicated_against_inactive_row() {
        let (reg, a, v) = setup();
        reg.ingest(&a, &v, b"v1", None).await.unwrap();
        let current = reg.ingest(&a, &v, b"v2", None).await.unwrap();
        let outcome = reg.ingest(&a, &v, b"v1", None).await.unwrap();
        assert!(!outcome.is_inserted());
        assert!(!outcome.version().active);
        assert_eq!(reg.active(&a, &v).await.unwrap().unwrap().id, current.version().id);
    }

    #[tokio::test]
    async fn pairs_are_independent() {
        let (reg, a, v) = setup();
        let other = PolicyVersionLabel::new("800-53r4").unwrap();
        reg.ingest(&a, &v, b"same", None).await.unwrap();
        let outcome = reg.ingest(&a, &other, b"same", None).await.unwrap();
        assert!(outcome.is_inserted());
        assert_eq!(active_count(&reg, &a, &v).await, 1);
        assert_eq!(active_count(&reg, &a, &other).await, 1);
        assert!(reg.active(&Authority::new("PCI").unwrap(), &v).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_ingests_leave_one_active_row() {
        let (reg, a, v) = setup();
        let mut handles = Vec::new();
        for i in 0..16 {
            let (reg, a, v) = (reg.clone(), a.clone(), v.clone());
            handles.push(tokio::spawn(async move {
                let body = format!("revision {}", i % 4);
                reg.ingest(&a, &v, body.as_bytes(), None).await.unwrap()
            }));
        }
        let mut inserted = 0;
        for h in handles {
            if h.await.unwrap().is_inserted() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 4);
        assert_eq!(reg.versions(&a, &v).await.unwrap().len(), 4);
        assert_eq!(active_count(&reg, &a, &v).await, 1);
    }
}
