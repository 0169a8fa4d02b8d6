//! # `regmap cleanup` and `regmap verify-audit`

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use regmap_engine::CoreConfig;
use regmap_store::{AuditTrail, EvaluationCache, PolicyVersionRegistry};

use crate::context::Stores;

/// Arguments for `regmap cleanup`.
#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Override `retention_days` from configuration.
    #[arg(long)]
    pub days: Option<u32>,
}

/// Arguments for `regmap verify-audit`.
#[derive(Args, Debug)]
pub struct VerifyAuditArgs {
    /// Number of oldest records to check.
    #[arg(long, default_value_t = 10_000)]
    pub limit: usize,
}

/// Execute `regmap cleanup`.
pub async fn run_cleanup<C, A, R>(
    args: &CleanupArgs,
    stores: &Stores<C, A, R>,
    config: &CoreConfig,
    out: &mut impl Write,
) -> Result<u8>
where
    C: EvaluationCache,
    A: AuditTrail,
    R: PolicyVersionRegistry,
{
    let days = args.days.unwrap_or(config.retention_days);
    if days == 0 {
        anyhow::bail!("retention must be at least 1 day");
    }
    let report = stores
        .retention(days)
        .run()
        .await
        .context("retention pass failed")?;
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(0)
}

/// Execute `regmap verify-audit`. Exits with 2 when the chain is broken.
pub async fn run_verify_audit<C, A, R>(
    args: &VerifyAuditArgs,
    stores: &Stores<C, A, R>,
    out: &mut impl Write,
) -> Result<u8>
where
    C: EvaluationCache,
    A: AuditTrail,
    R: PolicyVersionRegistry,
{
    let integrity = stores
        .audit
        .verify_chain(args.limit)
        .await
        .context("failed to read audit chain")?;
    serde_json::to_writer_pretty(&mut *out, &integrity)?;
    writeln!(out)?;
    if integrity.valid {
        Ok(0)
    } else {
        tracing::error!(broken_links = integrity.broken_links, "audit chain is broken");
        Ok(2)
    }
}
