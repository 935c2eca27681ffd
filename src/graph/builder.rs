//! The builder seam shared by the schema and data graph builders.

use serde::Serialize;

use super::types::{Graph, GraphType};
use crate::error::{GraphError, Result};

/// Produces a complete, validated graph from some source.
///
/// `build` must be pure with respect to the graph it returns: every call
/// yields a brand-new graph, and a failed call yields no graph at all.
pub trait GraphBuilder: Send + Sync {
    fn graph_type(&self) -> GraphType;

    fn build(&self) -> Result<Graph>;
}

/// Hash a builder's inputs into a stable hex digest.
pub fn fingerprint_inputs<T: Serialize + ?Sized>(graph_type: GraphType, inputs: &T) -> Result<String> {
    let bytes = bincode::serialize(inputs).map_err(|e| {
        GraphError::build_failed(graph_type, format!("failed to fingerprint inputs: {e}"))
    })?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(graph_type.cache_key().as_bytes());
    hasher.update(&bytes);
    Ok(hasher.finalize().to_hex().to_string())
}
