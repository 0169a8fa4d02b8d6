//! # `regmap history`
//!
//! Print audit records of a mapping, most recent first.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use regmap_core::MappingName;
use regmap_engine::{CatalogLoader, CoreConfig};
use regmap_store::{AuditTrail, EvaluationCache, PolicyVersionRegistry};

use crate::context::Stores;

/// Arguments for `regmap history`.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Mapping name.
    #[arg(value_name = "MAPPING")]
    pub mapping: String,

    /// Maximum records to print (capped by `audit_page_limit`).
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Records to skip.
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

/// Execute `regmap history`.
pub async fn run_history<C, A, R>(
    args: &HistoryArgs,
    stores: &Stores<C, A, R>,
    config: &CoreConfig,
    out: &mut impl Write,
) -> Result<u8>
where
    C: EvaluationCache,
    A: AuditTrail,
    R: PolicyVersionRegistry,
{
    let name = MappingName::new(&args.mapping).context("invalid mapping name")?;
    let records = stores
        .orchestrator(CatalogLoader::empty(), config)
        .get_history(&name, args.limit, args.offset)
        .await
        .with_context(|| format!("failed to read history of {name}"))?;
    tracing::debug!(mapping = %name, records = records.len(), "history read");
    serde_json::to_writer_pretty(&mut *out, &records)?;
    writeln!(out)?;
    Ok(0)
}
