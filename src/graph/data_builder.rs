//! Data graph builder: one node per fetched row, edges inferred from
//! matching key values across tables.
//!
//! Edges come from two places:
//! 1. Declared foreign keys: a row's FK value matched against the
//!    referenced column of the referenced table (`foreign_key` edges).
//! 2. Naming convention: a `<name>_id` column matched against the primary
//!    key of a table called `<name>`, `<name>s` or `<name>es`
//!    (`association` edges).
//!
//! Values that match no fetched row produce no edge, so the row limit only
//! ever drops edges, never leaves them dangling.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::builder::{fingerprint_inputs, GraphBuilder};
use super::types::{EdgeType, Graph, GraphDraft, GraphEdge, GraphNode, GraphType, NodeType, PropertyValue};
use crate::error::{GraphError, Result};
use crate::sources::{Row, TableDescriptor, TabularDataSource};

pub const DEFAULT_ROW_LIMIT: usize = 100;

pub struct DataGraphBuilder {
    source: Arc<dyn TabularDataSource>,
    row_limit: usize,
}

/// table -> column -> key value -> node ids holding that value
type ValueIndex = HashMap<String, HashMap<String, HashMap<String, Vec<String>>>>;

impl DataGraphBuilder {
    pub fn new(source: Arc<dyn TabularDataSource>) -> Self {
        Self {
            source,
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;
        self
    }

    fn fetch(&self) -> Result<Vec<(TableDescriptor, Vec<Row>)>> {
        let tables = self
            .source
            .tables()
            .map_err(|e| GraphError::build_failed(GraphType::Data, e.to_string()))?;

        let mut fetched = Vec::with_capacity(tables.len());
        for table in tables {
            let mut rows = self
                .source
                .fetch_rows(&table.name, self.row_limit)
                .map_err(|e| GraphError::build_failed(GraphType::Data, e.to_string()))?;
            rows.truncate(self.row_limit);
            debug!(table = %table.name, rows = rows.len(), "rows fetched");
            fetched.push((table, rows));
        }
        Ok(fetched)
    }
}

fn row_node_id(table: &TableDescriptor, row: &Row, position: usize) -> String {
    let key = table
        .primary_key
        .as_ref()
        .and_then(|pk| row.get(pk))
        .and_then(PropertyValue::as_key)
        .unwrap_or_else(|| format!("#{position}"));
    format!("{}:{}", table.name, key)
}

/// Find the table a `<name>_id` column points at by convention.
fn conventional_target<'a>(column: &str, tables: &'a [(TableDescriptor, Vec<Row>)]) -> Option<&'a TableDescriptor> {
    let stem = column.strip_suffix("_id")?;
    if stem.is_empty() {
        return None;
    }
    let candidates = [stem.to_string(), format!("{stem}s"), format!("{stem}es")];
    tables
        .iter()
        .map(|(t, _)| t)
        .find(|t| t.primary_key.is_some() && candidates.iter().any(|c| c.eq_ignore_ascii_case(&t.name)))
}

impl GraphBuilder for DataGraphBuilder {
    fn graph_type(&self) -> GraphType {
        GraphType::Data
    }

    fn build(&self) -> Result<Graph> {
        let mut draft = GraphDraft::new(GraphType::Data);
        let fetched = self.fetch()?;
        let source_hash = fingerprint_inputs(GraphType::Data, &fetched)?;

        // Phase 1: one node per row, and an index of every column value.
        let mut index: ValueIndex = HashMap::new();
        let mut row_ids: Vec<Vec<String>> = Vec::with_capacity(fetched.len());
        for (table, rows) in &fetched {
            let mut ids = Vec::with_capacity(rows.len());
            let columns = index.entry(table.name.clone()).or_default();
            for (position, row) in rows.iter().enumerate() {
                let id = row_node_id(table, row, position + 1);
                for (column, value) in row {
                    if let Some(key) = value.as_key() {
                        columns
                            .entry(column.clone())
                            .or_default()
                            .entry(key)
                            .or_default()
                            .push(id.clone());
                    }
                }

                let label = id
                    .split_once(':')
                    .map(|(_, key)| key.to_string())
                    .unwrap_or_else(|| id.clone());
                let mut node = GraphNode::new(id.clone(), label, NodeType::Entity)
                    .with_property("table", PropertyValue::Text(table.name.clone()));
                for (column, value) in row {
                    node.properties.insert(column.clone(), value.clone());
                }
                draft.add_node(node);
                ids.push(id);
            }
            row_ids.push(ids);
        }

        // Phase 2: edges from matching key values.
        let mut seen: HashSet<(String, String, EdgeType)> = HashSet::new();
        let mut link = |draft: &mut GraphDraft, source: &str, target: &str, kind: EdgeType, label: &str| {
            if source != target && seen.insert((source.to_string(), target.to_string(), kind)) {
                draft.add_edge(GraphEdge::new(source, target, kind, label));
            }
        };

        for ((table, rows), ids) in fetched.iter().zip(&row_ids) {
            let declared: BTreeSet<&str> = table.foreign_keys.iter().map(|fk| fk.column.as_str()).collect();

            for fk in &table.foreign_keys {
                let Some(target_table) = fetched.iter().map(|(t, _)| t).find(|t| t.name == fk.references_table) else {
                    debug!(table = %table.name, references = %fk.references_table, "foreign key to unknown table");
                    continue;
                };
                let Some(target_column) = fk.references_column.as_ref().or(target_table.primary_key.as_ref()) else {
                    continue;
                };
                let Some(targets) = index.get(&target_table.name).and_then(|c| c.get(target_column)) else {
                    continue;
                };
                for (row, id) in rows.iter().zip(ids) {
                    let Some(key) = row.get(&fk.column).and_then(PropertyValue::as_key) else {
                        continue;
                    };
                    for target in targets.get(&key).into_iter().flatten() {
                        link(&mut draft, id, target, EdgeType::ForeignKey, &fk.column);
                    }
                }
            }

            for (row, id) in rows.iter().zip(ids) {
                for (column, value) in row {
                    if declared.contains(column.as_str()) || table.primary_key.as_deref() == Some(column.as_str()) {
                        continue;
                    }
                    let Some(target_table) = conventional_target(column, &fetched) else {
                        continue;
                    };
                    let (Some(pk), Some(key)) = (target_table.primary_key.as_ref(), value.as_key()) else {
                        continue;
                    };
                    let targets = index
                        .get(&target_table.name)
                        .and_then(|c| c.get(pk))
                        .and_then(|values| values.get(&key));
                    for target in targets.into_iter().flatten() {
                        link(&mut draft, id, target, EdgeType::Association, column);
                    }
                }
            }
        }

        let graph = draft.commit(source_hash)?;
        info!(
            tables = fetched.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            row_limit = self.row_limit,
            "data graph built"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::JsonFixtureSource;

    const SHOP: &str = r#"{
        "tables": [
            {
                "name": "customers",
                "primary_key": "id",
                "rows": [{ "id": 1, "name": "Ada" }, { "id": 2, "name": "Grace" }]
            },
            {
                "name": "orders",
                "primary_key": "id",
                "foreign_keys": [{ "column": "buyer", "references_table": "customers" }],
                "rows": [
                    { "id": 10, "buyer": 1, "product_id": "p1" },
                    { "id": 11, "buyer": 2, "product_id": "p9" },
                    { "id": 12, "buyer": null }
                ]
            },
            {
                "name": "products",
                "primary_key": "id",
                "rows": [{ "id": "p1" }]
            }
        ]
    }"#;

    fn build(doc: &str, limit: usize) -> Result<Graph> {
        DataGraphBuilder::new(Arc::new(JsonFixtureSource::from_json_str(doc).unwrap()))
            .with_row_limit(limit)
            .build()
    }

    #[test]
    fn test_one_entity_node_per_row() {
        let graph = build(SHOP, DEFAULT_ROW_LIMIT).unwrap();
        assert_eq!(graph.node_count(), 6);
        let order = graph.node("orders:10").unwrap();
        assert_eq!(order.node_type, NodeType::Entity);
        assert_eq!(order.label, "10");
        assert_eq!(order.properties["table"], PropertyValue::Text("orders".into()));
    }

    #[test]
    fn test_declared_foreign_keys_become_edges() {
        let graph = build(SHOP, DEFAULT_ROW_LIMIT).unwrap();
        let fks: Vec<(&str, &str)> = graph
            .edges()
            .iter()
            .filter(|e| e.edge_type == EdgeType::ForeignKey)
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        assert_eq!(fks, vec![("orders:10", "customers:1"), ("orders:11", "customers:2")]);
    }

    #[test]
    fn test_naming_convention_infers_associations() {
        let graph = build(SHOP, DEFAULT_ROW_LIMIT).unwrap();
        let assoc: Vec<(&str, &str)> = graph
            .edges()
            .iter()
            .filter(|e| e.edge_type == EdgeType::Association)
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        // p9 matches no fetched product, so no edge.
        assert_eq!(assoc, vec![("orders:10", "products:p1")]);
    }

    #[test]
    fn test_row_limit_caps_nodes_without_dangling_edges() {
        let graph = build(SHOP, 1).unwrap();
        assert_eq!(graph.node_count(), 3);
        for edge in graph.edges() {
            assert!(graph.node(&edge.source).is_some());
            assert!(graph.node(&edge.target).is_some());
        }
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_rows_without_primary_key_use_position() {
        let graph = build(
            r#"{ "tables": [{ "name": "log", "rows": [{ "msg": "a" }, { "msg": "b" }] }] }"#,
            DEFAULT_ROW_LIMIT,
        )
        .unwrap();
        assert!(graph.node("log:#1").is_some());
        assert!(graph.node("log:#2").is_some());
    }

    #[test]
    fn test_duplicate_primary_keys_fail_build() {
        let err = build(
            r#"{ "tables": [{ "name": "t", "primary_key": "id", "rows": [{ "id": 1 }, { "id": 1 }] }] }"#,
            DEFAULT_ROW_LIMIT,
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::BuildFailed { graph_type: GraphType::Data, .. }));
    }

    #[test]
    fn test_empty_source_builds_empty_graph() {
        let graph = build("{}", DEFAULT_ROW_LIMIT).unwrap();
        assert!(graph.is_empty());
    }
}
