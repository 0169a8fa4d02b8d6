//! PostgreSQL evaluation cache.
//!
//! One row per mapping name. `put` is a single `INSERT .. ON CONFLICT DO
//! UPDATE`, so a concurrent reader sees either the previous row or the new
//! one.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use regmap_core::{Clock, MappingName, Timestamp};
use regmap_evaluator::EvaluationResult;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::cache::{CacheEntry, EvaluationCache};
use crate::error::StoreError;

#[derive(sqlx::FromRow)]
struct CacheRow {
    result: Json<EvaluationResult>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    valid: bool,
}

impl From<CacheRow> for CacheEntry {
    fn from(row: CacheRow) -> Self {
        CacheEntry {
            result: row.result.0,
            created_at: Timestamp::from_utc(row.created_at),
            expires_at: Timestamp::from_utc(row.expires_at),
            valid: row.valid,
        }
    }
}

/// Cache backed by the `evaluation_cache` table.
#[derive(Debug, Clone)]
pub struct PgEvaluationCache {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgEvaluationCache {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

impl EvaluationCache for PgEvaluationCache {
    async fn get(&self, key: &MappingName) -> Result<Option<EvaluationResult>, StoreError> {
        let now = self.clock.now();
        let row: Option<Json<EvaluationResult>> = sqlx::query_scalar(
            "SELECT result FROM evaluation_cache
             WHERE mapping_name = $1 AND valid AND expires_at > $2",
        )
        .bind(key.as_str())
        .bind(now.as_datetime())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|json| json.0))
    }

    async fn get_including_expired(
        &self,
        key: &MappingName,
    ) -> Result<Option<CacheEntry>, StoreError> {
        let row = sqlx::query_as::<_, CacheRow>(
            "SELECT result, created_at, expires_at, valid FROM evaluation_cache
             WHERE mapping_name = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CacheEntry::from))
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
        sqlx::query(
            "INSERT INTO evaluation_cache
                 (mapping_name, result, content_hash, created_at, expires_at, valid)
             VALUES ($1, $2, $3, $4, $5, TRUE)
             ON CONFLICT (mapping_name) DO UPDATE SET
                 result = EXCLUDED.result,
                 content_hash = EXCLUDED.content_hash,
                 created_at = EXCLUDED.created_at,
                 expires_at = EXCLUDED.expires_at,
                 valid = TRUE",
        )
        .bind(key.as_str())
        .bind(Json(&result))
        .bind(result.content_hash.to_string())
        .bind(created_at.as_datetime())
        .bind(expires_at.as_datetime())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn invalidate(&self, key: &MappingName) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let done = sqlx::query(
            "UPDATE evaluation_cache SET valid = FALSE, expires_at = $2
             WHERE mapping_name = $1 AND valid AND expires_at > $2",
        )
        .bind(key.as_str())
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn sweep(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let done = sqlx::query("DELETE FROM evaluation_cache WHERE expires_at < $1")
            .bind(cutoff.as_datetime())
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }
}
