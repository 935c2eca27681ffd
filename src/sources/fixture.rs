//! A JSON document that serves as both a structural-metadata source and a
//! tabular-data source. Backs the CLI and the tests.
//!
//! ```json
//! {
//!   "entities": [{ "id": "orders", "name": "orders", "kind": "table" }],
//!   "relationships": [{ "source": "orders", "target": "customers", "kind": "foreign_key" }],
//!   "tables": [{
//!     "name": "orders",
//!     "primary_key": "id",
//!     "foreign_keys": [{ "column": "customer_id", "references_table": "customers" }],
//!     "rows": [{ "id": 1, "customer_id": 7 }]
//!   }]
//! }
//! ```
//!
//! File-backed fixtures are re-read on every call so a rebuild sees edits.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{
    EntityDescriptor, ForeignKeyDescriptor, RelationshipDescriptor, Row, SourceError,
    StructuralMetadataSource, TableDescriptor, TabularDataSource,
};
use crate::graph::{NodeType, PropertyValue};

#[derive(Debug, Clone, Default, Deserialize)]
struct FixtureDocument {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    relationships: Vec<RelationshipDescriptor>,
    #[serde(default)]
    tables: Vec<RawTable>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEntity {
    id: String,
    #[serde(default)]
    name: Option<String>,
    kind: NodeType,
    #[serde(default)]
    properties: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTable {
    name: String,
    #[serde(default)]
    primary_key: Option<String>,
    #[serde(default)]
    foreign_keys: Vec<ForeignKeyDescriptor>,
    #[serde(default)]
    rows: Vec<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone)]
enum Origin {
    File(PathBuf),
    Inline(FixtureDocument),
}

#[derive(Debug, Clone)]
pub struct JsonFixtureSource {
    origin: Origin,
}

impl JsonFixtureSource {
    /// Read the fixture from `path` on every call.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            origin: Origin::File(path.into()),
        }
    }

    /// Parse a fixture held in memory.
    pub fn from_json_str(raw: &str) -> Result<Self, SourceError> {
        let document = serde_json::from_str(raw).map_err(|e| SourceError::Invalid(e.to_string()))?;
        Ok(Self {
            origin: Origin::Inline(document),
        })
    }

    fn document(&self) -> Result<FixtureDocument, SourceError> {
        match &self.origin {
            Origin::Inline(document) => Ok(document.clone()),
            Origin::File(path) => read_document(path),
        }
    }
}

fn read_document(path: &Path) -> Result<FixtureDocument, SourceError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SourceError::Unavailable(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| SourceError::Invalid(format!("{}: {}", path.display(), e)))
}

fn convert_properties(raw: &BTreeMap<String, serde_json::Value>) -> BTreeMap<String, PropertyValue> {
    raw.iter()
        .map(|(k, v)| (k.clone(), PropertyValue::from_json(v)))
        .collect()
}

impl StructuralMetadataSource for JsonFixtureSource {
    fn entities(&self) -> Result<Vec<EntityDescriptor>, SourceError> {
        Ok(self
            .document()?
            .entities
            .into_iter()
            .map(|e| EntityDescriptor {
                name: e.name.unwrap_or_else(|| e.id.clone()),
                properties: convert_properties(&e.properties),
                id: e.id,
                kind: e.kind,
            })
            .collect())
    }

    fn relationships(&self) -> Result<Vec<RelationshipDescriptor>, SourceError> {
        Ok(self.document()?.relationships)
    }
}

impl TabularDataSource for JsonFixtureSource {
    fn tables(&self) -> Result<Vec<TableDescriptor>, SourceError> {
        Ok(self
            .document()?
            .tables
            .into_iter()
            .map(|t| TableDescriptor {
                name: t.name,
                primary_key: t.primary_key,
                foreign_keys: t.foreign_keys,
            })
            .collect())
    }

    fn fetch_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>, SourceError> {
        let document = self.document()?;
        let raw = document
            .tables
            .iter()
            .find(|t| t.name == table)
            .ok_or_else(|| SourceError::Invalid(format!("unknown table `{table}`")))?;
        Ok(raw.rows.iter().take(limit).map(convert_properties).collect())
    }
}
