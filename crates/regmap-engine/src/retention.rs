//! # Retention
//!
//! Purges audit records older than the retention window and cache entries
//! that expired before it. Scheduling is external: an operator cron or the
//! `regmap cleanup` command calls [`RetentionJob::run`]. Running twice with
//! the same clock reading deletes nothing the second time.

use std::sync::Arc;

use chrono::Duration;
use regmap_core::{Clock, Timestamp};
use regmap_store::{AuditTrail, EvaluationCache};
use serde::Serialize;

use crate::error::EngineError;

/// What one retention pass removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    /// Records older than this instant were eligible.
    pub cutoff: Timestamp,
    pub audit_records_deleted: u64,
    pub cache_entries_swept: u64,
}

/// One retention policy applied to a cache and an audit trail.
pub struct RetentionJob<C, A> {
    cache: Arc<C>,
    audit: Arc<A>,
    clock: Arc<dyn Clock>,
    retention_days: u32,
}

impl<C, A> RetentionJob<C, A>
where
    C: EvaluationCache,
    A: AuditTrail,
{
    pub fn new(cache: Arc<C>, audit: Arc<A>, clock: Arc<dyn Clock>, retention_days: u32) -> Self {
        Self {
            cache,
            audit,
            clock,
            retention_days,
        }
    }

    /// Delete everything older than the retention window.
    pub async fn run(&self) -> Result<RetentionReport, EngineError> {
        let cutoff = self
            .clock
            .now()
            .checked_sub(Duration::days(i64::from(self.retention_days)))
            .ok_or_else(|| {
                EngineError::InvalidInput(format!(
                    "retention of {} days is out of range",
                    self.retention_days
                ))
            })?;

        let audit_records_deleted = self
            .audit
            .cleanup(self.retention_days)
            .await
            .map_err(EngineError::Store)?;
        let cache_entries_swept = self
            .cache
            .sweep(cutoff)
            .await
            .map_err(EngineError::CacheUnavailable)?;

        tracing::info!(
            %cutoff,
            audit_records_deleted,
            cache_entries_swept,
            "retention pass complete"
        );
        Ok(RetentionReport {
            cutoff,
            audit_records_deleted,
            cache_entries_swept,
        })
    }
}
