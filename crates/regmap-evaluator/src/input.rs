//! # Evaluation Input
//!
//! The shape a mapping loader hands to the evaluator: the mapping's name,
//! the policy version it binds to, the controls that policy requires and the
//! capabilities each bound vendor declares. Loaders validate and resolve
//! these before evaluation; the evaluator only normalizes control spellings.

use regmap_core::{MappingName, PolicyRef};
use serde::{Deserialize, Serialize};

/// Capabilities declared by one vendor/provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorCapabilities {
    /// Vendor identifier.
    pub vendor_id: String,
    /// Controls the vendor declares it satisfies.
    #[serde(default)]
    pub controls: Vec<String>,
}

/// A policy-to-vendor mapping as loaded for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDefinition {
    /// Unique mapping name.
    pub name: MappingName,
    /// Policy version the mapping is evaluated against.
    pub policy: PolicyRef,
    /// Raw required control identifiers.
    #[serde(default)]
    pub required_controls: Vec<String>,
    /// Zero or more bound vendors.
    #[serde(default)]
    pub vendors: Vec<VendorCapabilities>,
}

impl MappingDefinition {
    /// All provided control spellings across vendors.
    pub fn provided_controls(&self) -> impl Iterator<Item = &str> {
        self.vendors
            .iter()
            .flat_map(|v| v.controls.iter().map(String::as_str))
    }

    /// Vendor identifiers in declaration order.
    pub fn vendor_ids(&self) -> Vec<&str> {
        self.vendors.iter().map(|v| v.vendor_id.as_str()).collect()
    }
}
