//! # Mapping Loaders
//!
//! The orchestrator resolves a mapping name to a [`MappingDefinition`]
//! through [`MappingLoader`]. Loading is synchronous and returns already
//! validated definitions; an unknown name is `None`, not an error.
//!
//! [`CatalogLoader`] reads a YAML catalog:
//!
//! ```yaml
//! mappings:
//!   - name: soc2-aws
//!     policy: { authority: AICPA, version: "2017" }
//!     required_controls: [CC6.1, CC6.2, CC7.1]
//!     vendors:
//!       - vendor_id: aws
//!         controls: [CC6.1, CC7.1]
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use regmap_core::MappingName;
use regmap_evaluator::MappingDefinition;
use serde::Deserialize;

/// Source of mapping definitions.
pub trait MappingLoader: Send + Sync {
    /// The definition for `name`, if one exists.
    fn load(&self, name: &MappingName) -> Option<MappingDefinition>;
}

/// Mutable in-process loader. Replacing a definition does not touch the
/// cache; callers invalidate through the orchestrator.
#[derive(Debug, Default)]
pub struct InMemoryMappingLoader {
    mappings: RwLock<HashMap<MappingName, MappingDefinition>>,
}

impl InMemoryMappingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a definition. Returns the replaced one.
    pub fn upsert(&self, definition: MappingDefinition) -> Option<MappingDefinition> {
        self.mappings
            .write()
            .insert(definition.name.clone(), definition)
    }

    /// Remove a definition.
    pub fn remove(&self, name: &MappingName) -> Option<MappingDefinition> {
        self.mappings.write().remove(name)
    }
}

impl FromIterator<MappingDefinition> for InMemoryMappingLoader {
    fn from_iter<T: IntoIterator<Item = MappingDefinition>>(iter: T) -> Self {
        Self {
            mappings: RwLock::new(iter.into_iter().map(|d| (d.name.clone(), d)).collect()),
        }
    }
}

impl MappingLoader for InMemoryMappingLoader {
    fn load(&self, name: &MappingName) -> Option<MappingDefinition> {
        self.mappings.read().get(name).cloned()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    mappings: Vec<MappingDefinition>,
}

/// Immutable loader over a YAML mapping catalog.
#[derive(Debug, Clone)]
pub struct CatalogLoader {
    source: Option<PathBuf>,
    mappings: HashMap<MappingName, MappingDefinition>,
}

impl CatalogLoader {
    /// Parse a catalog from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        let mut mappings = HashMap::with_capacity(file.mappings.len());
        for definition in file.mappings {
            let name = definition.name.clone();
            if mappings.insert(name.clone(), definition).is_some() {
                return Err(CatalogError::DuplicateMapping(name));
            }
        }
        Ok(Self {
            source: None,
            mappings,
        })
    }

    /// Read and parse a catalog file.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut loader = Self::from_yaml_str(&raw)?;
        loader.source = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), mappings = loader.len(), "mapping catalog loaded");
        Ok(loader)
    }

    /// An empty catalog.
    pub fn empty() -> Self {
        Self {
            source: None,
            mappings: HashMap::new(),
        }
    }

    /// File the catalog was read from.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Mapping names, sorted.
    pub fn names(&self) -> Vec<&MappingName> {
        let mut names: Vec<_> = self.mappings.keys().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl MappingLoader for CatalogLoader {
    fn load(&self, name: &MappingName) -> Option<MappingDefinition> {
        self.mappings.get(name).cloned()
    }
}

/// A mapping catalog could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("cannot read catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("mapping {0} is defined more than once")]
    DuplicateMapping(MappingName),
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
mappings:
  - name: soc2-aws
    policy: { authority: AICPA, version: "2017" }
    required_controls: [CC6.1, CC6.2, CC7.1]
    vendors:
      - vendor_id: aws
        controls: [cc6.1, CC7.1]
  - name: empty
    policy: { authority: NIST, version: rev5 }
"#;

    #[test]
    fn catalog_parses_and_loads() {
        let loader = CatalogLoader::from_yaml_str(CATALOG).unwrap();
        assert_eq!(loader.len(), 2);
        let def = loader.load(&MappingName::new("soc2-aws").unwrap()).unwrap();
        assert_eq!(def.required_controls.len(), 3);
        assert_eq!(def.vendor_ids(), vec!["aws"]);
        let empty = loader.load(&MappingName::new("empty").unwrap()).unwrap();
        assert!(empty.required_controls.is_empty());
        assert!(empty.vendors.is_empty());
        assert!(loader.load(&MappingName::new("missing").unwrap()).is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let yaml = r#"
mappings:
  - { name: m, policy: { authority: A, version: "1" } }
  - { name: " m ", policy: { authority: A, version: "2" } }
"#;
        assert!(matches!(
            CatalogLoader::from_yaml_str(yaml),
            Err(CatalogError::DuplicateMapping(_))
        ));
    }

    #[test]
    fn blank_name_is_a_parse_error() {
        let yaml = "mappings:\n  - { name: '  ', policy: { authority: A, version: '1' } }\n";
        assert!(matches!(CatalogLoader::from_yaml_str(yaml), Err(CatalogError::Parse(_))));
    }

    #[test]
    fn from_path_records_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, CATALOG).unwrap();
        let loader = CatalogLoader::from_path(&path).unwrap();
        assert_eq!(loader.source(), Some(path.as_path()));
        assert!(matches!(
            CatalogLoader::from_path(&dir.path().join("absent.yaml")),
            Err(CatalogError::Io { .. })
        ));
    }

    #[test]
    fn in_memory_upsert_replaces() {
        let loader: InMemoryMappingLoader = CatalogLoader::from_yaml_str(CATALOG)
            .unwrap()
            .mappings
            .into_values()
            .collect();
        let name = MappingName::new("empty").unwrap();
        let mut def = loader.load(&name).unwrap();
        def.required_controls.push("X".into());
        assert!(loader.upsert(def).is_some());
        assert_eq!(loader.load(&name).unwrap().required_controls, vec!["X".to_string()]);
        assert!(loader.remove(&name).is_some());
        assert!(loader.load(&name).is_none());
    }
}
