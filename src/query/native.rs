//! Native engine: delegates algorithms to an external graph backend and
//! reshapes whatever comes back into the embedded engine's shapes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::embedded::{DEFAULT_MAX_CYCLES, PAGE_RANK_MAX_ITERATIONS, PAGE_RANK_TOLERANCE};
use super::normalize::{
    graph_statistics, number_communities, partition_nodes, rank_top_k, sort_components, sort_cycles,
};
use super::{
    CentralityMetric, Communities, CommunityAlgorithm, Component, Cycle, GraphQueryEngine,
    GraphStatistics, RankedNode,
};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, GraphType};

/// Algorithm invocation sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum BackendRequest {
    PageRank {
        damping: f64,
        max_iterations: usize,
        tolerance: f64,
    },
    Centrality {
        metric: CentralityMetric,
    },
    Communities {
        #[serde(rename = "method")]
        algorithm: CommunityAlgorithm,
    },
    Cycles {
        max_cycles: usize,
    },
    Components,
}

impl BackendRequest {
    /// Path segment naming the algorithm on the backend.
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            BackendRequest::PageRank { .. } => "page_rank",
            BackendRequest::Centrality { .. } => "centrality",
            BackendRequest::Communities { .. } => "communities",
            BackendRequest::Cycles { .. } => "cycles",
            BackendRequest::Components => "components",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub node_id: String,
    pub score: f64,
}

/// Raw backend results, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendResponse {
    Scores(Vec<ScoreRow>),
    /// Backend community label → member ids.
    Communities(BTreeMap<String, Vec<String>>),
    Cycles(Vec<Vec<String>>),
    Components(Vec<Vec<String>>),
}

impl BackendResponse {
    fn kind(&self) -> &'static str {
        match self {
            BackendResponse::Scores(_) => "scores",
            BackendResponse::Communities(_) => "communities",
            BackendResponse::Cycles(_) => "cycles",
            BackendResponse::Components(_) => "components",
        }
    }
}

/// Transport to a graph database able to run algorithms itself.
pub trait NativeGraphBackend: Send + Sync {
    fn execute(
        &self,
        workspace_id: &str,
        graph_type: GraphType,
        request: &BackendRequest,
    ) -> Result<BackendResponse>;
}

pub struct NativeQueryEngine {
    backend: Arc<dyn NativeGraphBackend>,
    workspace_id: String,
    max_cycles: usize,
}

impl NativeQueryEngine {
    pub fn new(backend: Arc<dyn NativeGraphBackend>, workspace_id: impl Into<String>) -> Self {
        Self {
            backend,
            workspace_id: workspace_id.into(),
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    fn execute(&self, graph: &Graph, request: BackendRequest) -> Result<BackendResponse> {
        debug!(
            workspace = %self.workspace_id,
            graph_type = %graph.graph_type(),
            algorithm = request.algorithm_name(),
            "dispatching to native backend"
        );
        self.backend
            .execute(&self.workspace_id, graph.graph_type(), &request)
    }

    /// Scores for every node of the snapshot: unknown ids are dropped and
    /// nodes the backend skipped score 0.
    fn ranked(&self, graph: &Graph, request: BackendRequest, top_k: usize) -> Result<Vec<RankedNode>> {
        let rows = match self.execute(graph, request)? {
            BackendResponse::Scores(rows) => rows,
            other => return Err(unexpected("scores", &other)),
        };
        let mut scores: BTreeMap<String, f64> = graph.nodes().keys().map(|id| (id.clone(), 0.0)).collect();
        for row in rows {
            match scores.get_mut(&row.node_id) {
                Some(score) => *score = row.score,
                None => debug!(node = %row.node_id, "dropping unknown node from backend scores"),
            }
        }
        Ok(rank_top_k(scores, top_k))
    }
}

fn unexpected(expected: &str, got: &BackendResponse) -> GraphError {
    GraphError::InvalidBackendResponse(format!("expected {expected}, got {}", got.kind()))
}

impl GraphQueryEngine for NativeQueryEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    fn page_rank(&self, graph: &Graph, top_k: usize, damping: f64) -> Result<Vec<RankedNode>> {
        let request = BackendRequest::PageRank {
            damping,
            max_iterations: PAGE_RANK_MAX_ITERATIONS,
            tolerance: PAGE_RANK_TOLERANCE,
        };
        self.ranked(graph, request, top_k)
    }

    fn centrality(&self, graph: &Graph, metric: CentralityMetric, top_k: usize) -> Result<Vec<RankedNode>> {
        self.ranked(graph, BackendRequest::Centrality { metric }, top_k)
    }

    fn detect_communities(&self, graph: &Graph, algorithm: CommunityAlgorithm) -> Result<Communities> {
        match self.execute(graph, BackendRequest::Communities { algorithm })? {
            BackendResponse::Communities(groups) => {
                Ok(number_communities(partition_nodes(graph, groups.into_values())))
            }
            other => Err(unexpected("communities", &other)),
        }
    }

    fn find_cycles(&self, graph: &Graph) -> Result<Vec<Cycle>> {
        let request = BackendRequest::Cycles {
            max_cycles: self.max_cycles,
        };
        match self.execute(graph, request)? {
            BackendResponse::Cycles(cycles) => {
                let known = cycles
                    .into_iter()
                    .filter(|cycle| cycle.iter().all(|id| graph.node(id).is_some()));
                let mut cycles = sort_cycles(known);
                cycles.truncate(self.max_cycles);
                Ok(cycles)
            }
            other => Err(unexpected("cycles", &other)),
        }
    }

    fn connected_components(&self, graph: &Graph) -> Result<Vec<Component>> {
        match self.execute(graph, BackendRequest::Components)? {
            BackendResponse::Components(groups) => Ok(sort_components(partition_nodes(graph, groups))),
            other => Err(unexpected("components", &other)),
        }
    }

    /// Computed from the snapshot; the backend holds nothing the snapshot
    /// doesn't.
    fn statistics(&self, graph: &Graph) -> Result<GraphStatistics> {
        Ok(graph_statistics(graph, self.name()))
    }
}
