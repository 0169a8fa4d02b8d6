//! Policy document ingestion on top of a [`PolicyVersionRegistry`].

use std::path::Path;
use std::sync::Arc;

use regmap_core::{Authority, PolicyVersionLabel};
use regmap_store::{IngestOutcome, PolicyVersionRegistry};

use crate::error::EngineError;

/// Validates identifiers and maps registry failures to [`EngineError`].
pub struct PolicyIngestor<R> {
    registry: Arc<R>,
}

impl<R: PolicyVersionRegistry> PolicyIngestor<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }

    /// Register `content` for `(authority, version)`.
    pub async fn ingest(
        &self,
        authority: &str,
        version: &str,
        content: &[u8],
        origin: Option<&str>,
    ) -> Result<IngestOutcome, EngineError> {
        let authority = Authority::new(authority)?;
        let version = PolicyVersionLabel::new(version)?;
        self.registry
            .ingest(&authority, &version, content, origin)
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    EngineError::PolicyIngestConflict(format!("{authority}@{version}: {e}"))
                } else {
                    EngineError::Store(e)
                }
            })
    }

    /// Read `path` and register its bytes, recording the path as origin.
    pub async fn ingest_file(
        &self,
        authority: &str,
        version: &str,
        path: &Path,
    ) -> Result<IngestOutcome, EngineError> {
        let content = tokio::fs::read(path).await.map_err(|e| {
            EngineError::InvalidInput(format!("cannot read policy {}: {e}", path.display()))
        })?;
        let origin = path.display().to_string();
        self.ingest(authority, version, &content, Some(&origin)).await
    }

    /// The registry this ingestor writes to.
    pub fn registry(&self) -> &R {
        &self.registry
    }
}
