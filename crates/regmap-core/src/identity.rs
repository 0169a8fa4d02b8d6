//! # Identifier Newtypes
//!
//! Validated string identifiers. A `MappingName` cannot be passed where an
//! `Authority` is expected, and none of them can be empty.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Upper bound shared by all identifier kinds.
pub const MAX_IDENTIFIER_LEN: usize = 255;

fn validated(raw: impl Into<String>, kind: &'static str) -> Result<String, ValidationError> {
    let s = raw.into();
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { kind });
    }
    if trimmed.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::TooLong {
            kind,
            max: MAX_IDENTIFIER_LEN,
        });
    }
    Ok(trimmed.to_string())
}

macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap. Surrounding whitespace is trimmed.
            pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
                validated(value, $kind).map(Self)
            }

            /// The identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_identifier!(
    /// Unique name of a policy-to-vendor mapping. Cache and audit key.
    MappingName,
    "mapping name"
);

string_identifier!(
    /// Issuing authority of a policy document (e.g. `NIST`, `PCI-SSC`).
    Authority,
    "authority"
);

string_identifier!(
    /// Version label of a policy document within its authority (e.g. `rev5`).
    PolicyVersionLabel,
    "policy version"
);

/// Reference from a mapping to the policy version it is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyRef {
    /// Issuing authority.
    pub authority: Authority,
    /// Version label.
    pub version: PolicyVersionLabel,
}

impl PolicyRef {
    /// Build a reference from raw strings.
    pub fn new(
        authority: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            authority: Authority::new(authority)?,
            version: PolicyVersionLabel::new(version)?,
        })
    }
}

impl std::fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.authority, self.version)
    }
}
