//! # regmap-core: Foundational Types for the Compliance Evaluation Core
//!
//! Every other `regmap-*` crate depends on this one; it depends on nothing
//! internal. It fixes the primitives that the evaluator, the stores and the
//! orchestrator agree on:
//!
//! 1. **`CanonicalBytes`.** All content hashes flow through
//!    `CanonicalBytes::new()` (RFC 8785 JSON with float rejection). A cache
//!    key, an audit fingerprint and an evaluation body hash computed on two
//!    machines for the same value produce the same bytes.
//!
//! 2. **`ContentDigest`.** SHA-256 digests, rendered `sha256:<hex>`. Structured
//!    values are hashed with [`digest_of`]; opaque policy documents are hashed
//!    with [`sha256_raw`].
//!
//! 3. **UTC-only `Timestamp`, injectable `Clock`.** TTL comparisons and
//!    retention cutoffs read time from a [`Clock`] passed in at construction,
//!    so tests drive expiry with a [`ManualClock`].
//!
//! 4. **Validated identifier newtypes.** `MappingName`, `Authority`,
//!    `PolicyVersionLabel`: no bare strings cross crate boundaries.
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use digest::{digest_of, sha256_digest, sha256_raw, ContentDigest};
pub use error::{CanonicalizationError, DigestParseError, ValidationError};
pub use identity::{Authority, MappingName, PolicyRef, PolicyVersionLabel};
pub use temporal::{Clock, ManualClock, MonotonicClock, SystemClock, Timestamp};
