//! # Control Identifiers and Sets
//!
//! Control identifiers arrive from policy documents and vendor catalogs with
//! inconsistent spelling (`ac-2`, `AC-2`, ` AC-2 `). Normalization trims
//! surrounding whitespace and upper-cases ASCII letters.
//!
//! The required set is built strictly: an empty entry, or two entries whose
//! trimmed spellings differ but normalize to the same identifier, make the
//! set ambiguous and are rejected as invalid input. Repeating an identical
//! spelling is harmless and collapses. The provided set is built leniently:
//! vendor catalogs are unions of many sources, so empties are skipped and
//! spelling variants collapse.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::EvaluatorError;

/// A normalized control identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(String);

impl ControlId {
    /// Normalize a raw identifier. Returns `None` for blank input.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_ascii_uppercase()))
    }

    /// The normalized identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ControlId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An unordered set of control identifiers. Iterates in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlSet(BTreeSet<ControlId>);

impl ControlSet {
    /// Build the required set, rejecting blank or conflicting entries.
    pub fn required<S: AsRef<str>>(raw: &[S]) -> Result<Self, EvaluatorError> {
        let mut seen: BTreeMap<ControlId, &str> = BTreeMap::new();
        for (index, entry) in raw.iter().enumerate() {
            let entry = entry.as_ref();
            let id = ControlId::new(entry).ok_or_else(|| {
                EvaluatorError::InvalidInput(format!("required control #{index} is blank"))
            })?;
            match seen.entry(id) {
                Entry::Vacant(slot) => {
                    slot.insert(entry.trim());
                }
                Entry::Occupied(slot) => {
                    if *slot.get() != entry.trim() {
                        return Err(EvaluatorError::InvalidInput(format!(
                            "required controls {:?} and {:?} both normalize to {}",
                            slot.get(),
                            entry.trim(),
                            slot.key()
                        )));
                    }
                }
            }
        }
        Ok(Self(seen.into_keys().collect()))
    }

    /// Build the provided set. Blank entries are skipped.
    pub fn provided<'a, I>(raw: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self(raw.into_iter().filter_map(ControlId::new).collect())
    }

    /// `self − other`.
    pub fn difference(&self, other: &ControlSet) -> ControlSet {
        Self(self.0.difference(&other.0).cloned().collect())
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: &ControlId) -> bool {
        self.0.contains(id)
    }

    /// Number of controls.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &ControlId> {
        self.0.iter()
    }

    /// Sorted vector of members.
    pub fn to_vec(&self) -> Vec<ControlId> {
        self.0.iter().cloned().collect()
    }
}

impl FromIterator<ControlId> for ControlSet {
    fn from_iter<T: IntoIterator<Item = ControlId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
