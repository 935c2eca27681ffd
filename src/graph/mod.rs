//! Graph module: the immutable domain model and the builders that
//! produce it.

pub mod builder;
pub mod data_builder;
pub mod schema_builder;
pub mod types;

pub use builder::{fingerprint_inputs, GraphBuilder};
pub use data_builder::{DataGraphBuilder, DEFAULT_ROW_LIMIT};
pub use schema_builder::SchemaGraphBuilder;
pub use types::{
    EdgeType, Graph, GraphDraft, GraphEdge, GraphMetadata, GraphNode, GraphType, NodeType,
    PropertyValue,
};
