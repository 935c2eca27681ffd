//! Null engine: every algorithm answers with an empty result. Statistics
//! still come from the snapshot itself.

use super::normalize::graph_statistics;
use super::{
    CentralityMetric, Communities, CommunityAlgorithm, Component, Cycle, GraphQueryEngine,
    GraphStatistics, RankedNode,
};
use crate::error::Result;
use crate::graph::Graph;

/// Engine that computes nothing. Only ever selected explicitly, e.g. to
/// keep the cache exercised when algorithms are switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullQueryEngine;

impl GraphQueryEngine for NullQueryEngine {
    fn name(&self) -> &'static str {
        "null"
    }

    fn page_rank(&self, _graph: &Graph, _top_k: usize, _damping: f64) -> Result<Vec<RankedNode>> {
        Ok(Vec::new())
    }

    fn centrality(&self, _graph: &Graph, _metric: CentralityMetric, _top_k: usize) -> Result<Vec<RankedNode>> {
        Ok(Vec::new())
    }

    fn detect_communities(&self, _graph: &Graph, _algorithm: CommunityAlgorithm) -> Result<Communities> {
        Ok(Communities::new())
    }

    fn find_cycles(&self, _graph: &Graph) -> Result<Vec<Cycle>> {
        Ok(Vec::new())
    }

    fn connected_components(&self, _graph: &Graph) -> Result<Vec<Component>> {
        Ok(Vec::new())
    }

    fn statistics(&self, graph: &Graph) -> Result<GraphStatistics> {
        Ok(graph_statistics(graph, self.name()))
    }
}
