//! # regmap-engine: Evaluation Orchestration
//!
//! The two operations the compliance core exposes to its callers:
//!
//! - [`EvaluationOrchestrator::evaluate_mapping`]: serve a valid cached
//!   result or compute, cache and audit a fresh one, with per-key single
//!   flight and caller deadlines.
//! - [`EvaluationOrchestrator::get_history`]: past evaluations of a mapping,
//!   most recent first.
//!
//! Around them: [`MappingLoader`] implementations that supply mapping
//! definitions, [`PolicyIngestor`] for policy documents, [`RetentionJob`]
//! for the externally scheduled cleanup, and [`CoreConfig`].
//!
//! All collaborators are constructed by the caller and injected. Nothing in
//! this crate is process-global.

pub mod config;
pub mod error;
pub mod loader;
pub mod orchestrator;
pub mod policy;
pub mod retention;

pub use config::{ConfigError, CoreConfig};
pub use error::EngineError;
pub use loader::{CatalogError, CatalogLoader, InMemoryMappingLoader, MappingLoader};
pub use orchestrator::{EvaluateOptions, EvaluationOrchestrator};
pub use policy::PolicyIngestor;
pub use retention::{RetentionJob, RetentionReport};
