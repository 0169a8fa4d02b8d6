//! PostgreSQL audit trail.
//!
//! Appends run in a transaction holding a transaction-scoped advisory lock,
//! so reading the chain head, reserving the next id and inserting the row
//! cannot interleave between concurrent writers. The head's `recorded_at`
//! is read under the same lock, keeping timestamps strictly increasing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regmap_core::{Clock, MappingName, Timestamp};
use regmap_evaluator::{ActorContext, EvaluationResult};
use sqlx::types::Json;
use sqlx::PgPool;

use super::{parse_digest, to_i64};
use crate::audit::{
    chain_digest, next_recorded_at, retention_cutoff, AuditRecord, AuditTrail, ChainIntegrity,
    RecordId,
};
use crate::error::StoreError;

/// Advisory lock key serializing audit chain appends.
const AUDIT_CHAIN_LOCK: i64 = 0x7265_676d_6175_6474;

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: i64,
    result: Json<EvaluationResult>,
    actor: Json<ActorContext>,
    recorded_at: DateTime<Utc>,
    previous_digest: String,
    record_digest: String,
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let id = u64::try_from(row.id)
            .map_err(|_| StoreError::Corrupt(format!("negative audit id {}", row.id)))?;
        Ok(AuditRecord {
            id: RecordId::new(id),
            result: row.result.0,
            actor: row.actor.0,
            recorded_at: Timestamp::from_utc(row.recorded_at),
            previous_digest: parse_digest("previous_digest", &row.previous_digest)?,
            record_digest: parse_digest("record_digest", &row.record_digest)?,
        })
    }
}

const SELECT_RECORD: &str = "SELECT id, result, actor, recorded_at, previous_digest, record_digest
     FROM evaluation_audit";

/// Audit trail backed by the `evaluation_audit` table.
#[derive(Debug, Clone)]
pub struct PgAuditTrail {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgAuditTrail {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

impl AuditTrail for PgAuditTrail {
    async fn append(
        &self,
        result: &EvaluationResult,
        actor: &ActorContext,
    ) -> Result<RecordId, StoreError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(AUDIT_CHAIN_LOCK)
            .execute(&mut *tx)
            .await?;

        let head: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT record_digest, recorded_at FROM evaluation_audit ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;
        let (previous_digest, recorded_at) = match head {
            Some((raw, head_at)) => (
                parse_digest("record_digest", &raw)?,
                next_recorded_at(now, Some(Timestamp::from_utc(head_at))),
            ),
            None => (regmap_core::ContentDigest::zero(), now),
        };

        let raw_id: i64 =
            sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('evaluation_audit', 'id'))")
                .fetch_one(&mut *tx)
                .await?;
        let id = RecordId::new(
            u64::try_from(raw_id)
                .map_err(|_| StoreError::Corrupt(format!("negative audit id {raw_id}")))?,
        );
        let record_digest = chain_digest(&previous_digest, id, result, actor, recorded_at)?;

        sqlx::query(
            "INSERT INTO evaluation_audit
                 (id, mapping_name, result, content_hash, actor, evaluated_at,
                  recorded_at, previous_digest, record_digest)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(raw_id)
        .bind(result.mapping_name().as_str())
        .bind(Json(result))
        .bind(result.content_hash.to_string())
        .bind(Json(actor))
        .bind(result.evaluated_at.as_datetime())
        .bind(recorded_at.as_datetime())
        .bind(previous_digest.to_string())
        .bind(record_digest.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(mapping = %result.mapping_name(), record_id = %id, "audit record appended");
        Ok(id)
    }

    async fn history(
        &self,
        mapping: &MappingName,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "{SELECT_RECORD} WHERE mapping_name = $1 ORDER BY id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(mapping.as_str())
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AuditRecord::try_from).collect()
    }

    async fn cleanup(&self, older_than_days: u32) -> Result<u64, StoreError> {
        let cutoff = retention_cutoff(self.clock.now(), older_than_days)?;
        let done = sqlx::query("DELETE FROM evaluation_audit WHERE recorded_at < $1")
            .bind(cutoff.as_datetime())
            .execute(&self.pool)
            .await?;
        let removed = done.rows_affected();
        if removed > 0 {
            tracing::info!(removed, %cutoff, "audit records pruned");
        }
        Ok(removed)
    }

    async fn verify_chain(&self, limit: usize) -> Result<ChainIntegrity, StoreError> {
        let rows = sqlx::query_as::<_, AuditRow>(&format!("{SELECT_RECORD} ORDER BY id ASC LIMIT $1"))
            .bind(to_i64(limit))
            .fetch_all(&self.pool)
            .await?;
        let records = rows
            .into_iter()
            .map(AuditRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ChainIntegrity::check(&records))
    }
}
