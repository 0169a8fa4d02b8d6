//! # PostgreSQL Backends
//!
//! `sqlx` implementations of the three store traits, sharing one pool.
//!
//! All timestamps written by these backends come from the injected
//! [`Clock`](regmap_core::Clock), never from `NOW()`, so expiry and retention
//! behave the same against Postgres as against the in-memory stores.
//!
//! Digests are stored as `sha256:<hex>` text and parsed on read; a row that
//! fails to parse surfaces as [`StoreError::Corrupt`].

pub mod audit;
pub mod cache;
pub mod policy;

pub use audit::PgAuditTrail;
pub use cache::PgEvaluationCache;
pub use policy::PgPolicyRegistry;

use std::time::Duration;

use regmap_core::ContentDigest;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::StoreError;

/// Open a connection pool to `url`.
pub async fn connect(url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;
    tracing::info!("connected to PostgreSQL");
    Ok(pool)
}

/// Create the cache, audit and policy tables if they do not exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("evaluation core schema applied");
    Ok(())
}

pub(crate) fn parse_digest(column: &str, raw: &str) -> Result<ContentDigest, StoreError> {
    ContentDigest::parse(raw).map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

pub(crate) fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
