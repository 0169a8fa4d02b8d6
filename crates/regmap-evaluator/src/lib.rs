//! # regmap-evaluator: Control Coverage Evaluation
//!
//! Given the controls a mapping requires and the controls its vendors
//! provide, compute `missing = required − provided`, a coverage percentage
//! and a status classification.
//!
//! ```text
//! MappingDefinition ──► ControlSet (required) ─┐
//!                   └─► ControlSet (provided) ─┴─► CoverageReport ──► EvaluationBody ──seal──► EvaluationResult
//! ```
//!
//! The evaluator is a pure function of its inputs: no clock, no I/O, no
//! shared state. Timestamps and actor context are attached afterwards by
//! [`EvaluationBody::seal`], and neither participates in the content hash.
//!
//! ## Thresholds
//!
//! `coverage ≥ 80.00 % → compliant`, `70.00 % ≤ coverage < 80.00 % →
//! partial_compliant`, otherwise `non_compliant`. Coverage is held in basis
//! points (hundredths of a percent) so the classification never compares
//! floats and the canonical encoding never carries one.

pub mod control;
pub mod coverage;
pub mod error;
pub mod input;
pub mod result;

pub use control::{ControlId, ControlSet};
pub use coverage::{
    classify, evaluate, CoverageBp, CoverageReport, CoverageStatus, T_HIGH_BP, T_LOW_BP,
};
pub use error::EvaluatorError;
pub use input::{MappingDefinition, VendorCapabilities};
pub use result::{ActorContext, EvaluationBody, EvaluationResult};

/// The seam the orchestrator evaluates through.
///
/// [`ControlCoverageEvaluator`] is the production implementation. Tests wrap
/// it to count invocations or inject failures.
pub trait CoverageEvaluator: Send + Sync {
    /// Evaluate a mapping definition into an unsealed body.
    fn evaluate(&self, mapping: &MappingDefinition) -> Result<EvaluationBody, EvaluatorError>;
}

/// Stateless evaluator over [`MappingDefinition`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlCoverageEvaluator;

impl CoverageEvaluator for ControlCoverageEvaluator {
    fn evaluate(&self, mapping: &MappingDefinition) -> Result<EvaluationBody, EvaluatorError> {
        let required = ControlSet::required(&mapping.required_controls)?;
        let provided = ControlSet::provided(mapping.provided_controls());
        let report = evaluate(&required, &provided);
        tracing::debug!(
            mapping = %mapping.name,
            required = report.required.len(),
            missing = report.missing.len(),
            coverage = %report.coverage,
            status = %report.status,
            "coverage evaluated"
        );
        Ok(EvaluationBody::from_report(
            mapping.name.clone(),
            mapping.policy.clone(),
            report,
        ))
    }
}
