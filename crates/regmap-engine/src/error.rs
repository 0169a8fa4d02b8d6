//! # Engine Errors

use regmap_core::MappingName;
use regmap_evaluator::EvaluatorError;
use regmap_store::StoreError;
use thiserror::Error;

/// Failure of an orchestrator operation.
///
/// `CacheUnavailable` is recovered inside [`evaluate_mapping`] and never
/// returned from it; it surfaces only from direct cache operations such as
/// explicit invalidation or retention sweeps.
///
/// [`evaluate_mapping`]: crate::EvaluationOrchestrator::evaluate_mapping
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed mapping or control set. Never retried automatically.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The evaluator failed for a reason other than bad input.
    #[error("evaluation failed: {0}")]
    Evaluation(EvaluatorError),

    /// The cache backend failed.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(#[source] StoreError),

    /// The audit append failed; the evaluation is incomplete.
    #[error("audit write failed: {0}")]
    AuditWriteFailed(#[source] StoreError),

    /// The caller's deadline passed while waiting on an in-flight evaluation.
    #[error("timed out after {waited_ms} ms waiting for evaluation of {mapping}")]
    Timeout { mapping: MappingName, waited_ms: u64 },

    /// The registry rejected a policy version on a uniqueness constraint.
    #[error("policy ingest conflict: {0}")]
    PolicyIngestConflict(String),

    /// The loader has no definition for the mapping.
    #[error("mapping not found: {0}")]
    MappingNotFound(MappingName),

    /// History or registry reads failed.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl From<EvaluatorError> for EngineError {
    fn from(e: EvaluatorError) -> Self {
        match e {
            EvaluatorError::InvalidInput(msg) => Self::InvalidInput(msg),
            other => Self::Evaluation(other),
        }
    }
}

impl From<regmap_core::ValidationError> for EngineError {
    fn from(e: regmap_core::ValidationError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}
