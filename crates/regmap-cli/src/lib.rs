//! # regmap-cli: Command-Line Front End for the Compliance Evaluation Core
//!
//! ## Subcommands
//!
//! - `regmap evaluate <MAPPING>`: evaluate a catalog mapping (cached).
//! - `regmap history <MAPPING>`: audit records, most recent first.
//! - `regmap ingest-policy --authority A --policy-version V <FILE>`.
//! - `regmap cleanup`: apply the retention window to audit and cache.
//! - `regmap verify-audit`: walk the audit hash chain.
//!
//! ```bash
//! regmap --catalog mappings.yaml evaluate soc2-aws --user alice
//! regmap history soc2-aws --limit 5
//! DATABASE_URL=postgres://... regmap cleanup --days 30
//! ```

pub mod context;
pub mod evaluate;
pub mod history;
pub mod maintenance;
pub mod policy;
