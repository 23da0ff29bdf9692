//! Schema configuration file.
//!
//! The file is a JSON array. Element 0 holds general information about the
//! source database (page size, encoding, optionally `"output db"`); every
//! following element maps one table name to an ordered object of
//! `column name -> declared type`:
//!
//! ```json
//! [
//!   { "file name": "history", "page size": "4096 bytes", "output db": "out.sqlite" },
//!   { "urls": { "id": "INTEGER PRIMARY KEY", "url": "LONGVARCHAR", "visit_count": "INTEGER NOT NULL DEFAULT 0" } }
//! ]
//! ```

use crate::affinity::{has_default, resolve_declared_type};
use crate::error::{Result, SchemaError};
use crate::types::{ColumnSpec, TableSpec};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Key under which the general-information object may name an output store.
pub const OUTPUT_DB_KEY: &str = "output db";

/// Column-count thresholds for successive legacy variants: a table must have
/// more columns than the threshold for the next variant to be generated.
const LEGACY_VARIANT_THRESHOLDS: [usize; 3] = [6, 5, 4];

/// A table as written in the configuration, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredTable {
    pub name: String,
    /// `(column name, declared type)` in declaration order.
    pub columns: Vec<(String, String)>,
}

impl DeclaredTable {
    /// Resolve every declared type into a [`TableSpec`].
    pub fn to_table_spec(&self) -> TableSpec {
        TableSpec::new(
            self.name.clone(),
            self.columns
                .iter()
                .map(|(name, decl)| ColumnSpec::new(name.clone(), resolve_declared_type(decl)))
                .collect(),
        )
    }

    fn without_last(&self, name: String) -> DeclaredTable {
        let keep = self.columns.len().saturating_sub(1);
        DeclaredTable {
            name,
            columns: self.columns[..keep].to_vec(),
        }
    }

    fn last_has_default(&self) -> bool {
        self.columns
            .last()
            .map(|(_, decl)| has_default(decl))
            .unwrap_or(false)
    }
}

/// Parsed schema configuration.
#[derive(Debug, Clone, Default)]
pub struct SchemaConfig {
    /// General information about the source database.
    pub info: Map<String, Value>,
    /// Declared tables, in file order.
    pub tables: Vec<DeclaredTable>,
}

impl SchemaConfig {
    /// Load a schema configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Parse a schema configuration from JSON text.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(content)?;
        let elements = root
            .as_array()
            .ok_or_else(|| SchemaError::invalid("schema config must be a JSON array"))?;

        let mut config = SchemaConfig::default();
        let mut iter = elements.iter();

        if let Some(first) = iter.next() {
            config.info = first
                .as_object()
                .cloned()
                .ok_or_else(|| SchemaError::invalid("element 0 must be an object"))?;
        }

        for (index, element) in iter.enumerate() {
            let object = element.as_object().ok_or_else(|| {
                SchemaError::invalid(format!("element {} must be an object", index + 1))
            })?;
            for (table_name, columns) in object {
                let columns = columns.as_object().ok_or_else(|| {
                    SchemaError::invalid(format!("table '{}' must map columns to types", table_name))
                })?;
                let columns = columns
                    .iter()
                    .map(|(name, decl)| match decl {
                        Value::String(s) => Ok((name.clone(), s.clone())),
                        Value::Null => Ok((name.clone(), String::new())),
                        other => Err(SchemaError::invalid(format!(
                            "column '{}.{}' has non-string type {}",
                            table_name, name, other
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;

                if columns.is_empty() {
                    warn!("Skipping table '{}' with no columns", table_name);
                    continue;
                }
                config.tables.push(DeclaredTable {
                    name: table_name.clone(),
                    columns,
                });
            }
        }

        debug!("Loaded schema config with {} tables", config.tables.len());
        Ok(config)
    }

    /// Output store named in the general-information object, if any.
    pub fn output_db(&self) -> Option<&str> {
        self.info.get(OUTPUT_DB_KEY).and_then(Value::as_str)
    }

    /// Declared text encoding of the source database, if recorded.
    pub fn text_encoding(&self) -> Option<&str> {
        self.info.get("text encoding").and_then(Value::as_str)
    }

    /// Resolve all tables into engine inputs.
    ///
    /// Duplicate table names get a `_copy` suffix (repeated until unique).
    /// With `legacy_variants`, tables whose trailing columns carry a
    /// `DEFAULT` clause also yield copies without those columns, for rows
    /// written before the columns were added.
    pub fn table_specs(&self, legacy_variants: bool) -> Vec<TableSpec> {
        let mut declared: Vec<DeclaredTable> = Vec::with_capacity(self.tables.len());
        let mut seen: HashSet<String> = HashSet::new();

        for table in &self.tables {
            let mut name = table.name.clone();
            while seen.contains(&name) {
                name.push_str("_copy");
            }
            seen.insert(name.clone());
            declared.push(DeclaredTable {
                name,
                columns: table.columns.clone(),
            });
        }

        if legacy_variants {
            let mut variants = Vec::new();
            for table in &declared {
                let mut current = table.clone();
                for (step, threshold) in LEGACY_VARIANT_THRESHOLDS.iter().enumerate() {
                    if current.columns.len() <= *threshold || !current.last_has_default() {
                        break;
                    }
                    let name = format!("{}_default_{}", table.name, step);
                    if seen.contains(&name) {
                        break;
                    }
                    seen.insert(name.clone());
                    current = current.without_last(name);
                    variants.push(current.clone());
                }
            }
            declared.extend(variants);
        }

        declared.iter().map(DeclaredTable::to_table_spec).collect()
    }
}
