//! Error types for kgraph.
//!
//! Every variant carries owned strings so an error can be cloned and
//! handed to every caller attached to the same in-flight rebuild.

use thiserror::Error;

use crate::graph::GraphType;

/// Errors surfaced by builders, the cache, and the query engines.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    /// A builder could not produce a valid graph (collaborator error or
    /// invariant violation).
    #[error("build of {graph_type} graph failed: {reason}")]
    BuildFailed {
        graph_type: GraphType,
        reason: String,
    },

    /// External I/O during a build exceeded the configured bound.
    #[error("build of {graph_type} graph timed out after {timeout_ms}ms")]
    BuildTimeout { graph_type: GraphType, timeout_ms: u64 },

    /// The native graph backend could not be reached.
    #[error("native graph backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The native graph backend answered with something we can't use.
    #[error("native graph backend returned an invalid response: {0}")]
    InvalidBackendResponse(String),

    /// A query parameter was rejected before dispatch.
    #[error("invalid query parameter `{name}`: {reason}")]
    InvalidQueryParameter { name: String, reason: String },

    /// A persisted cache entry could not be decoded.
    #[error("cache entry `{key}` is corrupt: {reason}")]
    CacheCorrupt { key: String, reason: String },

    /// No builder is registered for the requested graph type.
    #[error("no builder registered for {0} graphs")]
    NoBuilder(GraphType),

    /// The persistence store failed to read or write.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl GraphError {
    pub fn build_failed(graph_type: GraphType, reason: impl Into<String>) -> Self {
        GraphError::BuildFailed {
            graph_type,
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        GraphError::InvalidQueryParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        GraphError::Storage(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, GraphError>;
