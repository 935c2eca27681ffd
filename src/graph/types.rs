//! Core types for the knowledge graph.
//!
//! A [`Graph`] is an immutable snapshot: it can only be produced by
//! committing a [`GraphDraft`], which checks referential integrity first.
//! Rebuilding means committing a new draft, never editing a live graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use uuid::Uuid;

use crate::error::{GraphError, Result};

/// Which source a graph was built from. Also the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphType {
    /// Built from structural metadata (tables, views, declared relationships).
    Schema,
    /// Built from live rows of tabular data.
    Data,
}

impl GraphType {
    pub const ALL: [GraphType; 2] = [GraphType::Schema, GraphType::Data];

    /// Key under which entries of this type are persisted.
    pub fn cache_key(&self) -> &'static str {
        match self {
            GraphType::Schema => "schema",
            GraphType::Data => "data",
        }
    }
}

impl fmt::Display for GraphType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_key())
    }
}

impl FromStr for GraphType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "schema" => Ok(GraphType::Schema),
            "data" => Ok(GraphType::Data),
            other => Err(format!("unknown graph type `{other}` (expected schema|data)")),
        }
    }
}

/// The kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Table,
    View,
    Synonym,
    /// A single record, used by the data graph.
    Entity,
    Column,
    Procedure,
    Other,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Table => write!(f, "table"),
            NodeType::View => write!(f, "view"),
            NodeType::Synonym => write!(f, "synonym"),
            NodeType::Entity => write!(f, "entity"),
            NodeType::Column => write!(f, "column"),
            NodeType::Procedure => write!(f, "procedure"),
            NodeType::Other => write!(f, "other"),
        }
    }
}

/// The kind of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Declared foreign key.
    ForeignKey,
    /// Relationship inferred from matching key values.
    Association,
    /// A view or synonym pointing at what it reads from.
    Reference,
    Dependency,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeType::ForeignKey => write!(f, "foreign_key"),
            EdgeType::Association => write!(f, "association"),
            EdgeType::Reference => write!(f, "reference"),
            EdgeType::Dependency => write!(f, "dependency"),
        }
    }
}

/// A scalar property value attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PropertyValue {
    /// Convert a JSON value. Arrays and objects are kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PropertyValue::Int(i),
                None => PropertyValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => PropertyValue::Text(s.clone()),
            other => PropertyValue::Text(other.to_string()),
        }
    }

    /// Canonical string form used to match key values across rows.
    /// Null never matches anything.
    pub fn as_key(&self) -> Option<String> {
        match self {
            PropertyValue::Null => None,
            PropertyValue::Bool(b) => Some(b.to_string()),
            PropertyValue::Int(i) => Some(i.to_string()),
            PropertyValue::Float(f) if f.fract() == 0.0 && f.is_finite() => {
                Some(format!("{}", *f as i64))
            }
            PropertyValue::Float(f) => Some(f.to_string()),
            PropertyValue::Text(s) if s.is_empty() => None,
            PropertyValue::Text(s) => Some(s.clone()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "null"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Int(i) => write!(f, "{i}"),
            PropertyValue::Float(x) => write!(f, "{x}"),
            PropertyValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A node in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique within its graph.
    pub id: String,
    pub label: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            node_type,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// A directed edge between two nodes of the same graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub edge_type: EdgeType,
    pub label: String,
}

impl GraphEdge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        edge_type: EdgeType,
        label: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type,
            label: label.into(),
        }
    }
}

/// Facts recorded when a graph is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub node_count: usize,
    pub edge_count: usize,
    pub built_at: DateTime<Utc>,
    /// blake3 of the builder's inputs. Stable while the source is unchanged.
    pub source_hash: String,
    /// blake3 of `source_hash` and the graph id. Unique per build.
    pub fingerprint: String,
    pub build_duration_ms: u64,
}

/// An immutable property graph snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    id: String,
    graph_type: GraphType,
    nodes: BTreeMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    metadata: GraphMetadata,
}

impl Graph {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn graph_type(&self) -> GraphType {
        self.graph_type
    }

    /// Nodes keyed by id, in ascending id order.
    pub fn nodes(&self) -> &BTreeMap<String, GraphNode> {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn fingerprint(&self) -> &str {
        &self.metadata.fingerprint
    }

    /// Re-check the invariants `GraphDraft::commit` enforces. Used on
    /// graphs that come back from persistence.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some((key, node)) = self.nodes.iter().find(|(key, node)| *key != &node.id) {
            return Err(format!("node stored under `{key}` has id `{}`", node.id));
        }
        for edge in &self.edges {
            check_endpoints(edge, |id| self.nodes.contains_key(id))?;
        }
        if self.metadata.node_count != self.nodes.len()
            || self.metadata.edge_count != self.edges.len()
        {
            return Err("metadata counts disagree with graph contents".to_string());
        }
        Ok(())
    }
}

fn check_endpoints(
    edge: &GraphEdge,
    exists: impl Fn(&str) -> bool,
) -> std::result::Result<(), String> {
    for endpoint in [&edge.source, &edge.target] {
        if !exists(endpoint) {
            return Err(format!(
                "edge `{}` -> `{}` references missing node `{}`",
                edge.source, edge.target, endpoint
            ));
        }
    }
    Ok(())
}

/// Accumulates nodes and edges for a single build.
///
/// Nothing is checked until [`GraphDraft::commit`], which either returns a
/// fully valid [`Graph`] or a `BuildFailed` error.
#[derive(Debug)]
pub struct GraphDraft {
    graph_type: GraphType,
    started: Instant,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl GraphDraft {
    pub fn new(graph_type: GraphType) -> Self {
        Self {
            graph_type,
            started: Instant::now(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: GraphNode) {
        self.nodes.push(node);
    }

    pub fn add_edge(&mut self, edge: GraphEdge) {
        self.edges.push(edge);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Validate and freeze the draft into a new graph with a fresh id.
    pub fn commit(self, source_hash: String) -> Result<Graph> {
        let graph_type = self.graph_type;
        let mut nodes = BTreeMap::new();
        for node in self.nodes {
            if nodes.contains_key(&node.id) {
                return Err(GraphError::build_failed(
                    graph_type,
                    format!("duplicate node id `{}`", node.id),
                ));
            }
            nodes.insert(node.id.clone(), node);
        }

        for edge in &self.edges {
            check_endpoints(edge, |id| nodes.contains_key(id))
                .map_err(|reason| GraphError::build_failed(graph_type, reason))?;
        }

        let id = Uuid::new_v4().to_string();
        let fingerprint = {
            let mut hasher = blake3::Hasher::new();
            hasher.update(source_hash.as_bytes());
            hasher.update(id.as_bytes());
            hasher.finalize().to_hex().to_string()
        };

        let metadata = GraphMetadata {
            node_count: nodes.len(),
            edge_count: self.edges.len(),
            built_at: Utc::now(),
            source_hash,
            fingerprint,
            build_duration_ms: self.started.elapsed().as_millis() as u64,
        };

        Ok(Graph {
            id,
            graph_type,
            nodes,
            edges: self.edges,
            metadata,
        })
    }
}
