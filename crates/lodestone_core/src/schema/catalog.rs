//! Schema catalog loading and lookup.
//!
//! # Responsibility
//! - Load every schema sheet of a workbook into per-type attribute maps.
//! - Answer attribute lookups for entities, filters and the store layout.
//! - Export the loaded definitions as JSON for inspection.
//!
//! # Invariants
//! - The catalog is immutable after load.
//! - Nested-entity datatypes always resolve to a type of the same catalog.

use super::attribute::{AttributeDefinition, Datatype};
use super::sheet::parse_sheet;
use super::{SchemaError, SchemaResult};
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

const SHEET_EXTENSION: &str = "csv";

/// Attribute definitions of one entity type, keyed by attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityTypeSchema {
    name: String,
    attributes: BTreeMap<String, AttributeDefinition>,
}

impl EntityTypeSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, attribute: &str) -> Option<&AttributeDefinition> {
        self.attributes.get(attribute)
    }

    /// Iterates attribute definitions in name order.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDefinition> {
        self.attributes.values()
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Attributes without a scope tag or tagged with `scope`.
    pub fn attributes_for_scope<'a>(
        &'a self,
        scope: &'a str,
    ) -> impl Iterator<Item = &'a AttributeDefinition> + 'a {
        self.attributes
            .values()
            .filter(move |definition| definition.in_scope(scope))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Entity type schemas keyed by type name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SchemaCatalog {
    types: BTreeMap<String, EntityTypeSchema>,
}

impl SchemaCatalog {
    /// Loads a schema workbook from disk.
    ///
    /// `path` is either a directory holding one `*.csv` sheet per entity type
    /// or a single `*.csv` sheet. The sheet name is the file stem.
    ///
    /// # Errors
    /// - `MissingSource` when `path` does not exist.
    /// - Any sheet-level parse error; the catalog is never partially loaded.
    pub fn load(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let started_at = Instant::now();
        let path = path.as_ref();
        if !path.exists() {
            return Err(SchemaError::MissingSource(path.to_path_buf()));
        }

        let files = if path.is_dir() {
            sheet_files_in(path)?
        } else {
            vec![path.to_path_buf()]
        };

        let mut sheets = Vec::with_capacity(files.len());
        for file in files {
            let text = std::fs::read_to_string(&file).map_err(|source| SchemaError::Io {
                path: file.clone(),
                source,
            })?;
            let sheet = file
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default()
                .to_string();
            sheets.push((sheet, text));
        }

        let catalog = Self::from_sheets(sheets)?;
        info!(
            "event=schema_load module=schema status=ok source={} types={} duration_ms={}",
            path.display(),
            catalog.types.len(),
            started_at.elapsed().as_millis()
        );
        Ok(catalog)
    }

    /// Builds a catalog from in-memory `(sheet name, csv text)` pairs.
    pub fn from_sheets<I, N, T>(sheets: I) -> SchemaResult<Self>
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: AsRef<str>,
    {
        let mut types = BTreeMap::new();
        for (name, text) in sheets {
            let name = name.into();
            let Some(attributes) = parse_sheet(&name, text.as_ref())? else {
                continue;
            };
            if types.contains_key(&name) {
                return Err(SchemaError::DuplicateEntityType(name));
            }
            types.insert(name.clone(), EntityTypeSchema { name, attributes });
        }

        let catalog = Self { types };
        catalog.ensure_datatypes_resolve()?;
        Ok(catalog)
    }

    pub fn entity_type(&self, entity_type: &str) -> Option<&EntityTypeSchema> {
        self.types.get(entity_type)
    }

    /// Like [`Self::entity_type`], but unknown types are a configuration error.
    pub fn require(&self, entity_type: &str) -> SchemaResult<&EntityTypeSchema> {
        self.entity_type(entity_type)
            .ok_or_else(|| SchemaError::UnknownEntityType(entity_type.to_string()))
    }

    pub fn attribute(&self, entity_type: &str, attribute: &str) -> Option<&AttributeDefinition> {
        self.types.get(entity_type)?.attribute(attribute)
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.types.contains_key(entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Pretty-printed JSON of every type and attribute definition.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn ensure_datatypes_resolve(&self) -> SchemaResult<()> {
        for schema in self.types.values() {
            for definition in schema.attributes() {
                if let Datatype::Entity(target) = &definition.datatype {
                    if !self.types.contains_key(target) {
                        return Err(SchemaError::UnresolvedDatatype {
                            sheet: schema.name.clone(),
                            attribute: definition.name.clone(),
                            datatype: target.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn sheet_files_in(dir: &Path) -> SchemaResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|source| SchemaError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| SchemaError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_sheet = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case(SHEET_EXTENSION));
        if path.is_file() && is_sheet {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
