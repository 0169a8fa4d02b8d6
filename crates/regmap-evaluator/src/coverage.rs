//! # Coverage and Classification
//!
//! `coverage = 100 × |required − missing| / |required|`, held in basis points
//! (1 bp = 0.01 %) and rounded half-up. An empty required set has nothing to
//! miss and is defined as 100.00 %.
//!
//! Coverage is classified after rounding to hundredths, so 79.995 % counts
//! as 80.00 %. Classification bands, upper bound inclusive on each
//! comparison:
//!
//! | coverage            | status              |
//! |---------------------|---------------------|
//! | ≥ 80.00 %           | `compliant`         |
//! | 70.00 % – 79.99 %   | `partial_compliant` |
//! | < 70.00 %           | `non_compliant`     |

use serde::{Deserialize, Serialize};

use crate::control::{ControlId, ControlSet};

/// Lower bound of the `compliant` band, in basis points.
pub const T_HIGH_BP: u16 = 8_000;
/// Lower bound of the `partial_compliant` band, in basis points.
pub const T_LOW_BP: u16 = 7_000;

const FULL_BP: u16 = 10_000;

/// A coverage percentage with two-decimal precision, stored as basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct CoverageBp(u16);

impl CoverageBp {
    /// 100.00 %.
    pub const FULL: CoverageBp = CoverageBp(FULL_BP);

    /// Wrap a basis-point value. Returns `None` above 10 000.
    pub fn from_bp(bp: u16) -> Option<Self> {
        (bp <= FULL_BP).then_some(Self(bp))
    }

    /// `covered / total`, rounded half-up. `total == 0` yields 100.00 %.
    pub fn ratio(covered: usize, total: usize) -> Self {
        if total == 0 {
            return Self::FULL;
        }
        let covered = covered.min(total) as u64;
        let total = total as u64;
        let bp = (covered * u64::from(FULL_BP) * 2 + total) / (total * 2);
        Self(bp as u16)
    }

    /// Basis points (0..=10 000).
    pub fn bp(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for CoverageBp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl TryFrom<u16> for CoverageBp {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::from_bp(value).ok_or_else(|| format!("coverage {value} bp exceeds 10000"))
    }
}

impl From<CoverageBp> for u16 {
    fn from(value: CoverageBp) -> Self {
        value.0
    }
}

/// Compliance classification of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    /// Coverage at or above 80.00 %.
    Compliant,
    /// Coverage in [70.00 %, 80.00 %).
    PartialCompliant,
    /// Coverage below 70.00 %.
    NonCompliant,
}

impl CoverageStatus {
    /// Wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::PartialCompliant => "partial_compliant",
            Self::NonCompliant => "non_compliant",
        }
    }
}

impl std::fmt::Display for CoverageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Total classification over the coverage range.
pub fn classify(coverage: CoverageBp) -> CoverageStatus {
    match coverage.bp() {
        bp if bp >= T_HIGH_BP => CoverageStatus::Compliant,
        bp if bp >= T_LOW_BP => CoverageStatus::PartialCompliant,
        _ => CoverageStatus::NonCompliant,
    }
}

/// Output of [`evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageReport {
    /// Normalized required controls.
    pub required: ControlSet,
    /// Normalized provided controls.
    pub provided: ControlSet,
    /// `required − provided`.
    pub missing: ControlSet,
    /// Coverage of `required` by `provided`.
    pub coverage: CoverageBp,
    /// Classification of `coverage`.
    pub status: CoverageStatus,
}

impl CoverageReport {
    /// Whether `id` is required but not provided.
    pub fn is_missing(&self, id: &ControlId) -> bool {
        self.missing.contains(id)
    }
}

/// Compute missing controls, coverage and status.
pub fn evaluate(required: &ControlSet, provided: &ControlSet) -> CoverageReport {
    let missing = required.difference(provided);
    let coverage = CoverageBp::ratio(required.len() - missing.len(), required.len());
    CoverageReport {
        required: required.clone(),
        provided: provided.clone(),
        missing,
        coverage,
        status: classify(coverage),
    }
}
