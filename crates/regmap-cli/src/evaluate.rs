//! # `regmap evaluate`
//!
//! Evaluate one mapping from the catalog and print the result as JSON.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use regmap_core::MappingName;
use regmap_engine::{CatalogLoader, CoreConfig, EvaluateOptions};
use regmap_evaluator::ActorContext;
use regmap_store::{AuditTrail, EvaluationCache, PolicyVersionRegistry};

use crate::context::Stores;

/// Arguments for `regmap evaluate`.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Mapping name as listed in the catalog.
    #[arg(value_name = "MAPPING")]
    pub mapping: String,

    /// Skip the cache and recompute.
    #[arg(long)]
    pub force: bool,

    /// User recorded as the actor.
    #[arg(long)]
    pub user: Option<String>,

    /// Session recorded with the actor.
    #[arg(long)]
    pub session: Option<String>,

    /// Give up after this many milliseconds when another caller is already
    /// evaluating the same mapping.
    #[arg(long)]
    pub deadline_ms: Option<u64>,
}

impl EvaluateArgs {
    fn actor(&self) -> ActorContext {
        ActorContext {
            user_id: self.user.clone(),
            session_id: self.session.clone(),
        }
    }
}

/// Execute `regmap evaluate`.
pub async fn run_evaluate<C, A, R>(
    args: &EvaluateArgs,
    stores: &Stores<C, A, R>,
    config: &CoreConfig,
    catalog: CatalogLoader,
    out: &mut impl Write,
) -> Result<u8>
where
    C: EvaluationCache,
    A: AuditTrail,
    R: PolicyVersionRegistry,
{
    let name = MappingName::new(&args.mapping).context("invalid mapping name")?;
    let orchestrator = stores.orchestrator(catalog, config);
    let options = EvaluateOptions {
        force_refresh: args.force,
        deadline: args.deadline_ms.map(Duration::from_millis),
        ttl: None,
    };
    let result = orchestrator
        .evaluate_with(&name, args.actor(), options)
        .await
        .with_context(|| format!("evaluation of {name} failed"))?;

    tracing::info!(
        mapping = %name,
        coverage = %result.coverage(),
        status = %result.status(),
        "evaluation complete"
    );
    serde_json::to_writer_pretty(&mut *out, &result)?;
    writeln!(out)?;
    Ok(0)
}
