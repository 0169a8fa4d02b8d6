//! PostgreSQL policy version registry.
//!
//! `ingest` takes a transaction-scoped advisory lock derived from
//! `(authority, version)` before reading, so the dedup check, the
//! deactivation and the insert form one critical section per pair. The
//! partial unique index `policy_versions_one_active` rejects any second
//! active row outright. `versions` orders by the `seq` insertion counter,
//! which never ties.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regmap_core::{sha256_raw, Authority, Clock, PolicyVersionLabel, Timestamp};
use sqlx::PgPool;
use uuid::Uuid;

use super::parse_digest;
use crate::error::StoreError;
use crate::policy::{IngestOutcome, PolicyVersion, PolicyVersionId, PolicyVersionRegistry};

#[derive(sqlx::FromRow)]
struct PolicyRow {
    id: Uuid,
    authority: String,
    version: String,
    content_hash: String,
    origin: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<PolicyRow> for PolicyVersion {
    type Error = StoreError;

    fn try_from(row: PolicyRow) -> Result<Self, Self::Error> {
        Ok(PolicyVersion {
            id: PolicyVersionId::from_uuid(row.id),
            authority: Authority::new(row.authority)
                .map_err(|e| StoreError::Corrupt(format!("authority: {e}")))?,
            version: PolicyVersionLabel::new(row.version)
                .map_err(|e| StoreError::Corrupt(format!("version: {e}")))?,
            content_hash: parse_digest("content_hash", &row.content_hash)?,
            origin: row.origin,
            active: row.active,
            created_at: Timestamp::from_utc(row.created_at),
        })
    }
}

const SELECT_VERSION: &str =
    "SELECT id, authority, version, content_hash, origin, active, created_at FROM policy_versions";

/// Registry backed by the `policy_versions` table.
#[derive(Debug, Clone)]
pub struct PgPolicyRegistry {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgPolicyRegistry {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

impl PolicyVersionRegistry for PgPolicyRegistry {
    async fn ingest(
        &self,
        authority: &Authority,
        version: &PolicyVersionLabel,
        content: &[u8],
        origin: Option<&str>,
    ) -> Result<IngestOutcome, StoreError> {
        let content_hash = sha256_raw(content);
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("policy:{authority}@{version}"))
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_as::<_, PolicyRow>(&format!(
            "{SELECT_VERSION} WHERE authority = $1 AND version = $2 AND content_hash = $3"
        ))
        .bind(authority.as_str())
        .bind(version.as_str())
        .bind(content_hash.to_string())
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = existing {
            tx.rollback().await?;
            tracing::debug!(%authority, %version, hash = %content_hash, "policy content unchanged");
            return Ok(IngestOutcome::Deduplicated(row.try_into()?));
        }

        sqlx::query(
            "UPDATE policy_versions SET active = FALSE
             WHERE authority = $1 AND version = $2 AND active",
        )
        .bind(authority.as_str())
        .bind(version.as_str())
        .execute(&mut *tx)
        .await?;

        let inserted = PolicyVersion {
            id: PolicyVersionId::new(),
            authority: authority.clone(),
            version: version.clone(),
            content_hash,
            origin: origin.map(str::to_string),
            active: true,
            created_at: self.clock.now(),
        };
        sqlx::query(
            "INSERT INTO policy_versions
                 (id, authority, version, content_hash, origin, active, created_at)
             VALUES ($1, $2, $3, $4, $5, TRUE, $6)",
        )
        .bind(inserted.id.as_uuid())
        .bind(authority.as_str())
        .bind(version.as_str())
        .bind(content_hash.to_string())
        .bind(inserted.origin.as_deref())
        .bind(inserted.created_at.as_datetime())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(%authority, %version, hash = %content_hash, "policy version activated");
        Ok(IngestOutcome::Inserted(inserted))
    }

    async fn active(
        &self,
        authority: &Authority,
        version: &PolicyVersionLabel,
    ) -> Result<Option<PolicyVersion>, StoreError> {
        let row = sqlx::query_as::<_, PolicyRow>(&format!(
            "{SELECT_VERSION} WHERE authority = $1 AND version = $2 AND active"
        ))
        .bind(authority.as_str())
        .bind(version.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(PolicyVersion::try_from).transpose()
    }

    async fn versions(
        &self,
        authority: &Authority,
        version: &PolicyVersionLabel,
    ) -> Result<Vec<PolicyVersion>, StoreError> {
        let rows = sqlx::query_as::<_, PolicyRow>(&format!(
            "{SELECT_VERSION} WHERE authority = $1 AND version = $2
             ORDER BY seq DESC"
        ))
        .bind(authority.as_str())
        .bind(version.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PolicyVersion::try_from).collect()
    }
}
