//! # Evaluation Results
//!
//! An [`EvaluationBody`] is the deterministic part of an evaluation: the same
//! mapping inputs always produce the same body and therefore the same
//! content hash. An [`EvaluationResult`] seals a body with the instant it was
//! computed and the actor that requested it. Results are values: a
//! recomputation produces a new result, it never edits an old one.

use regmap_core::{digest_of, ContentDigest, MappingName, PolicyRef, Timestamp};
use serde::{Deserialize, Serialize};

use crate::control::ControlId;
use crate::coverage::{CoverageBp, CoverageReport, CoverageStatus};
use crate::error::EvaluatorError;

/// Who asked for an evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorContext {
    /// Originating user, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Originating session, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ActorContext {
    /// No user, no session: scheduled or internal callers.
    pub fn system() -> Self {
        Self::default()
    }

    /// A user without a session.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            session_id: None,
        }
    }

    /// Attach a session identifier.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// The hashed body of an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationBody {
    /// Mapping that was evaluated.
    pub mapping_name: MappingName,
    /// Policy version the mapping bound to.
    pub policy: PolicyRef,
    /// Normalized required controls, sorted.
    pub required: Vec<ControlId>,
    /// Normalized provided controls, sorted.
    pub provided: Vec<ControlId>,
    /// `required − provided`, sorted.
    pub missing: Vec<ControlId>,
    /// Coverage in basis points.
    pub coverage_bp: CoverageBp,
    /// Classification of the coverage.
    pub status: CoverageStatus,
}

impl EvaluationBody {
    /// Assemble a body from a coverage report.
    pub fn from_report(mapping_name: MappingName, policy: PolicyRef, report: CoverageReport) -> Self {
        Self {
            mapping_name,
            policy,
            required: report.required.to_vec(),
            provided: report.provided.to_vec(),
            missing: report.missing.to_vec(),
            coverage_bp: report.coverage,
            status: report.status,
        }
    }

    /// SHA-256 of the canonical body.
    pub fn content_hash(&self) -> Result<ContentDigest, EvaluatorError> {
        Ok(digest_of(self)?)
    }

    /// Stamp the body with a time and actor, producing an immutable result.
    pub fn seal(
        self,
        evaluated_at: Timestamp,
        actor: ActorContext,
    ) -> Result<EvaluationResult, EvaluatorError> {
        let content_hash = self.content_hash()?;
        Ok(EvaluationResult {
            body: self,
            content_hash,
            evaluated_at,
            actor,
        })
    }
}

/// A computed evaluation for one mapping at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Deterministic evaluation output.
    pub body: EvaluationBody,
    /// Hash of `body`.
    pub content_hash: ContentDigest,
    /// When the body was computed (UTC).
    pub evaluated_at: Timestamp,
    /// Who requested it.
    #[serde(default)]
    pub actor: ActorContext,
}

impl EvaluationResult {
    /// Mapping this result belongs to.
    pub fn mapping_name(&self) -> &MappingName {
        &self.body.mapping_name
    }

    /// Classification.
    pub fn status(&self) -> CoverageStatus {
        self.body.status
    }

    /// Coverage.
    pub fn coverage(&self) -> CoverageBp {
        self.body.coverage_bp
    }

    /// Recompute the body hash and compare with the stored one.
    ///
    /// A mismatch means the stored result was altered after it was sealed.
    pub fn verify_content_hash(&self) -> bool {
        matches!(self.body.content_hash(), Ok(h) if h == self.content_hash)
    }
}
