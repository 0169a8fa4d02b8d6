//! # Content Digests
//!
//! The content hasher for the evaluation core. Three consumers rely on it:
//!
//! - evaluation bodies (`EvaluationResult::content_hash`), which must be
//!   stable across recomputation so that a cached result and a fresh one with
//!   the same inputs compare equal;
//! - the audit chain, where each record digest folds in its predecessor;
//! - the policy version registry, which deduplicates ingested documents by
//!   the digest of their raw bytes.
//!
//! Structured values go through [`CanonicalBytes`] ([`sha256_digest`],
//! [`digest_of`]). Opaque documents whose bytes *are* the identity (policy
//! files) go through [`sha256_raw`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;
use crate::error::{CanonicalizationError, DigestParseError};

const PREFIX: &str = "sha256:";

/// A SHA-256 content digest.
///
/// Serializes as the string `sha256:<64 lowercase hex>`, which is also the
/// representation stored in the database.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zero digest, used as the anchor of an empty audit chain.
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex without the algorithm prefix.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse `sha256:<hex>`.
    pub fn parse(s: &str) -> Result<Self, DigestParseError> {
        let hex = s
            .strip_prefix(PREFIX)
            .ok_or_else(|| DigestParseError::UnsupportedAlgorithm(s.to_string()))?;
        if hex.len() != 64 || !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(DigestParseError::MalformedHex(hex.to_string()));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk)
                .map_err(|_| DigestParseError::MalformedHex(hex.to_string()))?;
            bytes[i] = u8::from_str_radix(pair, 16)
                .map_err(|_| DigestParseError::MalformedHex(hex.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({self})")
    }
}

impl FromStr for ContentDigest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// SHA-256 over canonical bytes.
pub fn sha256_digest(data: &CanonicalBytes) -> ContentDigest {
    sha256_raw(data.as_bytes())
}

/// SHA-256 over opaque bytes whose exact byte sequence is their identity.
///
/// Use this for ingested documents; use [`digest_of`] for anything that is
/// built in memory from typed fields.
pub fn sha256_raw(data: &[u8]) -> ContentDigest {
    let hash = Sha256::digest(data);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hash);
    ContentDigest(bytes)
}

/// Canonicalize a structured value and hash it.
pub fn digest_of(value: &impl Serialize) -> Result<ContentDigest, CanonicalizationError> {
    Ok(sha256_digest(&CanonicalBytes::new(value)?))
}
