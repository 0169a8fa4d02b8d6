//! # Storage Errors

use regmap_core::CanonicalizationError;
use thiserror::Error;

/// A storage operation failed.
///
/// The orchestrator decides what a failure means: cache errors degrade to
/// recomputation, audit errors fail the evaluation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing database rejected or failed the operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migrations could not be applied.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A chain digest could not be computed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// A stored row violates a type invariant (bad digest, bad identifier).
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The store is not reachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the backend rejected the write on a uniqueness constraint.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }
}
