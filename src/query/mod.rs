//! Query engines and the service that dispatches to them.
//!
//! Every engine answers the same six operations over an immutable
//! [`Graph`] snapshot and returns the same shapes, so callers can't tell
//! which backend served them apart from `GraphStatistics::engine_name`.

pub mod embedded;
pub mod http_backend;
pub mod native;
pub mod normalize;
pub mod null;
pub mod service;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{GraphError, Result};
use crate::graph::Graph;

pub use embedded::EmbeddedQueryEngine;
pub use http_backend::HttpGraphBackend;
pub use native::{BackendRequest, BackendResponse, NativeGraphBackend, NativeQueryEngine, ScoreRow};
pub use null::NullQueryEngine;
pub use service::{GraphQueryService, DEFAULT_DAMPING};

/// One entry of a ranking, highest score first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedNode {
    pub node_id: String,
    pub score: f64,
}

/// community id → member node ids. Ids are dense, starting at 0, ordered
/// by each community's smallest member.
pub type Communities = BTreeMap<usize, BTreeSet<String>>;

/// Node ids along a directed cycle, starting at its smallest id. The edge
/// from the last id back to the first closes the cycle.
pub type Cycle = Vec<String>;

pub type Component = BTreeSet<String>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    /// edges / (n * (n - 1)); 0 for fewer than two nodes.
    pub density: f64,
    /// Mean of in-degree + out-degree.
    pub average_degree: f64,
    pub is_directed: bool,
    pub engine_name: String,
    pub build_duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralityMetric {
    Betweenness,
    Degree,
    Closeness,
}

impl fmt::Display for CentralityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CentralityMetric::Betweenness => write!(f, "betweenness"),
            CentralityMetric::Degree => write!(f, "degree"),
            CentralityMetric::Closeness => write!(f, "closeness"),
        }
    }
}

impl FromStr for CentralityMetric {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "betweenness" => Ok(CentralityMetric::Betweenness),
            "degree" => Ok(CentralityMetric::Degree),
            "closeness" => Ok(CentralityMetric::Closeness),
            _ => Err(GraphError::invalid_parameter(
                "metric",
                format!("unknown centrality metric `{s}` (expected betweenness|degree|closeness)"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunityAlgorithm {
    Louvain,
    LabelPropagation,
}

impl fmt::Display for CommunityAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommunityAlgorithm::Louvain => write!(f, "louvain"),
            CommunityAlgorithm::LabelPropagation => write!(f, "labelPropagation"),
        }
    }
}

impl FromStr for CommunityAlgorithm {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "louvain" => Ok(CommunityAlgorithm::Louvain),
            "labelpropagation" => Ok(CommunityAlgorithm::LabelPropagation),
            _ => Err(GraphError::invalid_parameter(
                "algorithm",
                format!("unknown community algorithm `{s}` (expected louvain|labelPropagation)"),
            )),
        }
    }
}

/// A backend able to answer graph-algorithm queries over a snapshot.
pub trait GraphQueryEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// PageRank scores, best first, at most `top_k` entries.
    fn page_rank(&self, graph: &Graph, top_k: usize, damping: f64) -> Result<Vec<RankedNode>>;

    fn centrality(
        &self,
        graph: &Graph,
        metric: CentralityMetric,
        top_k: usize,
    ) -> Result<Vec<RankedNode>>;

    /// A partition of the node set into communities.
    fn detect_communities(&self, graph: &Graph, algorithm: CommunityAlgorithm) -> Result<Communities>;

    /// Directed cycles in lexicographic order; empty for an acyclic graph.
    /// At most `max_cycles` are enumerated, and the cap applies to
    /// enumeration order before sorting.
    fn find_cycles(&self, graph: &Graph) -> Result<Vec<Cycle>>;

    /// Weakly connected components covering every node exactly once.
    fn connected_components(&self, graph: &Graph) -> Result<Vec<Component>>;

    fn statistics(&self, graph: &Graph) -> Result<GraphStatistics>;
}
