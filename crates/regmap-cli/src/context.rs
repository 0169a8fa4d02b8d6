//! Store selection and wiring shared by all subcommands.
//!
//! With `database_url` configured the stores are PostgreSQL-backed and the
//! schema is applied on startup. Otherwise everything lives in memory for
//! the lifetime of the process, which is only useful for a single
//! `evaluate` or for trying out a catalog.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use regmap_core::{Clock, SystemClock};
use regmap_engine::{
    CatalogLoader, CoreConfig, EvaluationOrchestrator, PolicyIngestor, RetentionJob,
};
use regmap_evaluator::ControlCoverageEvaluator;
use regmap_store::db::{self, PgAuditTrail, PgEvaluationCache, PgPolicyRegistry};
use regmap_store::{
    AuditTrail, EvaluationCache, InMemoryAuditTrail, InMemoryEvaluationCache,
    InMemoryPolicyRegistry, PolicyVersionRegistry,
};

/// Resolve configuration: an explicit YAML file wins over the environment.
pub fn load_config(path: Option<&Path>) -> Result<CoreConfig> {
    match path {
        Some(path) => CoreConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => CoreConfig::from_env().context("invalid environment configuration"),
    }
}

/// Load the mapping catalog, or an empty one when none is given.
pub fn load_catalog(path: Option<&Path>) -> Result<CatalogLoader> {
    match path {
        Some(path) => CatalogLoader::from_path(path)
            .with_context(|| format!("failed to load mapping catalog {}", path.display())),
        None => Ok(CatalogLoader::empty()),
    }
}

/// The three stores plus the clock they share.
pub struct Stores<C, A, R> {
    pub cache: Arc<C>,
    pub audit: Arc<A>,
    pub registry: Arc<R>,
    pub clock: Arc<dyn Clock>,
}

impl<C, A, R> Stores<C, A, R>
where
    C: EvaluationCache,
    A: AuditTrail,
    R: PolicyVersionRegistry,
{
    pub fn orchestrator(
        &self,
        catalog: CatalogLoader,
        config: &CoreConfig,
    ) -> EvaluationOrchestrator<CatalogLoader, ControlCoverageEvaluator, C, A> {
        EvaluationOrchestrator::new(
            Arc::new(catalog),
            Arc::new(ControlCoverageEvaluator),
            Arc::clone(&self.cache),
            Arc::clone(&self.audit),
            Arc::clone(&self.clock),
        )
        .with_config(config)
    }

    pub fn ingestor(&self) -> PolicyIngestor<R> {
        PolicyIngestor::new(Arc::clone(&self.registry))
    }

    pub fn retention(&self, retention_days: u32) -> RetentionJob<C, A> {
        RetentionJob::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.audit),
            Arc::clone(&self.clock),
            retention_days,
        )
    }
}

pub type MemoryStores = Stores<InMemoryEvaluationCache, InMemoryAuditTrail, InMemoryPolicyRegistry>;
pub type PgStores = Stores<PgEvaluationCache, PgAuditTrail, PgPolicyRegistry>;

/// Whichever store family the configuration selected.
pub enum Backend {
    Memory(MemoryStores),
    Postgres(PgStores),
}

impl Backend {
    pub fn memory(clock: Arc<dyn Clock>) -> MemoryStores {
        Stores {
            cache: Arc::new(InMemoryEvaluationCache::new(Arc::clone(&clock))),
            audit: Arc::new(InMemoryAuditTrail::new(Arc::clone(&clock))),
            registry: Arc::new(InMemoryPolicyRegistry::new(Arc::clone(&clock))),
            clock,
        }
    }

    /// Connect according to `config`.
    pub async fn open(config: &CoreConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let Some(url) = config.database_url.as_deref() else {
            tracing::warn!("DATABASE_URL not set, using in-memory stores; nothing will persist");
            return Ok(Self::Memory(Self::memory(clock)));
        };
        let pool = db::connect(url).await.context("failed to connect to PostgreSQL")?;
        db::ensure_schema(&pool)
            .await
            .context("failed to apply evaluation core schema")?;
        Ok(Self::Postgres(Stores {
            cache: Arc::new(PgEvaluationCache::new(pool.clone(), Arc::clone(&clock))),
            audit: Arc::new(PgAuditTrail::new(pool.clone(), Arc::clone(&clock))),
            registry: Arc::new(PgPolicyRegistry::new(pool, Arc::clone(&clock))),
            clock,
        }))
    }
}
