//! Schema graph builder: one node per declared entity, one edge per
//! declared relationship.

use std::sync::Arc;
use tracing::{debug, info};

use super::builder::{fingerprint_inputs, GraphBuilder};
use super::types::{Graph, GraphDraft, GraphEdge, GraphNode, GraphType};
use crate::error::{GraphError, Result};
use crate::sources::StructuralMetadataSource;

pub struct SchemaGraphBuilder {
    source: Arc<dyn StructuralMetadataSource>,
}

impl SchemaGraphBuilder {
    pub fn new(source: Arc<dyn StructuralMetadataSource>) -> Self {
        Self { source }
    }
}

impl GraphBuilder for SchemaGraphBuilder {
    fn graph_type(&self) -> GraphType {
        GraphType::Schema
    }

    fn build(&self) -> Result<Graph> {
        let mut draft = GraphDraft::new(GraphType::Schema);

        let entities = self
            .source
            .entities()
            .map_err(|e| GraphError::build_failed(GraphType::Schema, e.to_string()))?;
        let relationships = self
            .source
            .relationships()
            .map_err(|e| GraphError::build_failed(GraphType::Schema, e.to_string()))?;
        debug!(
            entities = entities.len(),
            relationships = relationships.len(),
            "structural metadata fetched"
        );

        let source_hash = fingerprint_inputs(GraphType::Schema, &(&entities, &relationships))?;

        for entity in entities {
            draft.add_node(GraphNode {
                id: entity.id,
                label: entity.name,
                node_type: entity.kind,
                properties: entity.properties,
            });
        }
        for rel in relationships {
            draft.add_edge(GraphEdge::new(rel.source, rel.target, rel.kind, rel.name));
        }

        let graph = draft.commit(source_hash)?;
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "schema graph built"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeType, NodeType};
    use crate::sources::JsonFixtureSource;

    fn builder(doc: &str) -> SchemaGraphBuilder {
        SchemaGraphBuilder::new(Arc::new(JsonFixtureSource::from_json_str(doc).unwrap()))
    }

    #[test]
    fn test_maps_entities_and_relationships_one_to_one() {
        let graph = builder(
            r#"{
                "entities": [
                    { "id": "orders", "kind": "table" },
                    { "id": "customers", "kind": "table" },
                    { "id": "active_customers", "kind": "view" }
                ],
                "relationships": [
                    { "source": "orders", "target": "customers", "kind": "foreign_key", "name": "fk_customer" },
                    { "source": "active_customers", "target": "customers", "kind": "reference" }
                ]
            }"#,
        )
        .build()
        .unwrap();

        assert_eq!(graph.graph_type(), GraphType::Schema);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.node("active_customers").unwrap().node_type, NodeType::View);
        assert_eq!(graph.edges()[0].edge_type, EdgeType::ForeignKey);
        assert_eq!(graph.edges()[0].label, "fk_customer");
        for edge in graph.edges() {
            assert!(graph.node(&edge.source).is_some());
            assert!(graph.node(&edge.target).is_some());
        }
    }

    #[test]
    fn test_dangling_relationship_fails_build() {
        let err = builder(
            r#"{
                "entities": [{ "id": "orders", "kind": "table" }],
                "relationships": [{ "source": "orders", "target": "ghost", "kind": "foreign_key" }]
            }"#,
        )
        .build()
        .unwrap_err();
        assert!(matches!(err, GraphError::BuildFailed { .. }));
    }

    #[test]
    fn test_unreachable_source_fails_build() {
        let builder =
            SchemaGraphBuilder::new(Arc::new(JsonFixtureSource::open("/no/such/fixture.json")));
        assert!(matches!(
            builder.build(),
            Err(GraphError::BuildFailed {
                graph_type: GraphType::Schema,
                ..
            })
        ));
    }

    #[test]
    fn test_unchanged_source_keeps_source_hash() {
        let doc = r#"{ "entities": [{ "id": "a", "kind": "table" }] }"#;
        let first = builder(doc).build().unwrap();
        let second = builder(doc).build().unwrap();
        assert_eq!(first.metadata().source_hash, second.metadata().source_hash);
        assert_ne!(first.fingerprint(), second.fingerprint());
    }
}
