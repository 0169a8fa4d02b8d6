//! # Evaluator Errors

use regmap_core::CanonicalizationError;
use thiserror::Error;

/// Failures of the coverage evaluator.
#[derive(Error, Debug)]
pub enum EvaluatorError {
    /// The required control list is not a valid set.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The evaluation body could not be canonicalized for hashing.
    #[error("evaluation body could not be hashed: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}
