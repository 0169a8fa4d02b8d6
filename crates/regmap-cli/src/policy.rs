//! # `regmap ingest-policy`
//!
//! Register a policy document for an `(authority, version)` pair.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use regmap_store::{AuditTrail, EvaluationCache, IngestOutcome, PolicyVersionRegistry};

use crate::context::Stores;

/// Arguments for `regmap ingest-policy`.
#[derive(Args, Debug)]
pub struct IngestPolicyArgs {
    /// Issuing authority, e.g. `NIST`.
    #[arg(long)]
    pub authority: String,

    /// Version label within the authority, e.g. `800-53r5`.
    #[arg(long = "policy-version")]
    pub version: String,

    /// Policy document. Its bytes are hashed as-is.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Execute `regmap ingest-policy`.
pub async fn run_ingest_policy<C, A, R>(
    args: &IngestPolicyArgs,
    stores: &Stores<C, A, R>,
    out: &mut impl Write,
) -> Result<u8>
where
    C: EvaluationCache,
    A: AuditTrail,
    R: PolicyVersionRegistry,
{
    let outcome = stores
        .ingestor()
        .ingest_file(&args.authority, &args.version, &args.file)
        .await
        .with_context(|| format!("failed to ingest {}", args.file.display()))?;

    let label = match &outcome {
        IngestOutcome::Inserted(_) => "inserted",
        IngestOutcome::Deduplicated(_) => "deduplicated",
    };
    let report = serde_json::json!({
        "outcome": label,
        "policy": outcome.version(),
    });
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(0)
}
