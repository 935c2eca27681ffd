//! Source collaborators the builders read from.
//!
//! These traits are the seam to whatever actually holds the metadata and
//! the rows (a database catalog, a metadata service, a fixture file).

pub mod fixture;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::graph::{EdgeType, NodeType, PropertyValue};

pub use fixture::JsonFixtureSource;

/// Failure reported by a source collaborator.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("source returned invalid data: {0}")]
    Invalid(String),
}

/// An entity declared in structural metadata (a table, view, synonym...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub id: String,
    pub name: String,
    pub kind: NodeType,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

/// A declared relationship between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    pub source: String,
    pub target: String,
    pub kind: EdgeType,
    #[serde(default)]
    pub name: String,
}

/// Supplies entities and declared relationships.
pub trait StructuralMetadataSource: Send + Sync {
    fn entities(&self) -> Result<Vec<EntityDescriptor>, SourceError>;
    fn relationships(&self) -> Result<Vec<RelationshipDescriptor>, SourceError>;
}

/// A declared foreign key on a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    pub column: String,
    pub references_table: String,
    /// Defaults to the referenced table's primary key.
    #[serde(default)]
    pub references_column: Option<String>,
}

/// A table the data graph reads rows from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

/// One row: column name to value.
pub type Row = BTreeMap<String, PropertyValue>;

/// Supplies row-level access to tables.
pub trait TabularDataSource: Send + Sync {
    fn tables(&self) -> Result<Vec<TableDescriptor>, SourceError>;

    /// Fetch at most `limit` rows from `table`.
    fn fetch_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>, SourceError>;
}
