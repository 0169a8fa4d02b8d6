//! # regmap-store: Evaluation Core Storage
//!
//! Three logically separate stores sit behind the orchestrator:
//!
//! - **Evaluation cache** ([`cache`]): the latest result per mapping name with
//!   an expiry. At most one valid entry per key; a write replaces the previous
//!   entry in a single step, so readers see the old entry or the new one.
//! - **Audit trail** ([`audit`]): every evaluation ever computed, append-only,
//!   hash-chained, most-recent-first per mapping, pruned only by retention.
//! - **Policy version registry** ([`policy`]): ingested policy documents,
//!   deduplicated by content hash, with exactly one active row per
//!   `(authority, version)` after the first ingest.
//!
//! Each store is a trait with an in-memory implementation (`parking_lot`
//! locks, never held across `.await`) and a PostgreSQL implementation in
//! [`db`]. Stores are constructed explicitly and injected; there are no
//! process-wide singletons.
//!
//! Trait methods return `impl Future + Send` so that generic callers can be
//! spawned onto a multi-threaded runtime.

pub mod audit;
pub mod cache;
pub mod db;
pub mod error;
pub mod policy;

pub use audit::{AuditRecord, AuditTrail, ChainIntegrity, InMemoryAuditTrail, RecordId};
pub use cache::{CacheEntry, CacheStats, EvaluationCache, InMemoryEvaluationCache};
pub use error::StoreError;
pub use policy::{
    InMemoryPolicyRegistry, IngestOutcome, PolicyVersion, PolicyVersionId, PolicyVersionRegistry,
};
