//! The embedded query engine: runs every algorithm in-process over a
//! petgraph view of the snapshot.
//!
//! Node indices in the view follow ascending node id, so iterating indices
//! in order is iterating ids in order. All algorithms rely on that for
//! deterministic output.

mod centrality;
mod community;
mod components;
mod cycles;
mod pagerank;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use tracing::debug;

use super::normalize::{graph_statistics, group_by_label, number_communities, rank_top_k, sort_components, sort_cycles};
use super::{
    CentralityMetric, Communities, CommunityAlgorithm, Component, Cycle, GraphQueryEngine,
    GraphStatistics, RankedNode,
};
use crate::error::Result;
use crate::graph::Graph;

pub use pagerank::{PageRankRun, MAX_ITERATIONS as PAGE_RANK_MAX_ITERATIONS, TOLERANCE as PAGE_RANK_TOLERANCE};

pub const DEFAULT_MAX_CYCLES: usize = 1000;

/// Read-only petgraph view of a [`Graph`] with dense, id-ordered indices.
pub(crate) struct GraphView<'g> {
    ids: Vec<&'g str>,
    graph: DiGraph<&'g str, ()>,
    /// Distinct out-neighbors per node, ascending, self-loops included.
    out: Vec<Vec<usize>>,
    /// Distinct neighbors ignoring direction, ascending, no self-loops.
    undirected: Vec<Vec<usize>>,
}

impl<'g> GraphView<'g> {
    pub(crate) fn new(source: &'g Graph) -> Self {
        let mut graph = DiGraph::with_capacity(source.node_count(), source.edge_count());
        let mut index: HashMap<&str, NodeIndex> = HashMap::with_capacity(source.node_count());
        let mut ids = Vec::with_capacity(source.node_count());

        for id in source.nodes().keys() {
            let idx = graph.add_node(id.as_str());
            index.insert(id.as_str(), idx);
            ids.push(id.as_str());
        }
        for edge in source.edges() {
            // Endpoints are guaranteed by the graph invariant.
            if let (Some(&s), Some(&t)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
                graph.add_edge(s, t, ());
            }
        }

        let n = ids.len();
        let mut out = vec![Vec::new(); n];
        let mut undirected = vec![Vec::new(); n];
        for edge in graph.edge_references() {
            let (s, t) = (edge.source().index(), edge.target().index());
            out[s].push(t);
            if s != t {
                undirected[s].push(t);
                undirected[t].push(s);
            }
        }
        for list in out.iter_mut().chain(undirected.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }

        Self {
            ids,
            graph,
            out,
            undirected,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn id(&self, idx: usize) -> &'g str {
        self.ids[idx]
    }

    pub(crate) fn out_neighbors(&self, idx: usize) -> &[usize] {
        &self.out[idx]
    }

    pub(crate) fn neighbors(&self, idx: usize) -> &[usize] {
        &self.undirected[idx]
    }

    /// In-degree + out-degree counting every edge.
    pub(crate) fn degree(&self, idx: usize) -> usize {
        let node = NodeIndex::new(idx);
        self.graph.edges_directed(node, Direction::Outgoing).count()
            + self.graph.edges_directed(node, Direction::Incoming).count()
    }

    pub(crate) fn petgraph(&self) -> &DiGraph<&'g str, ()> {
        &self.graph
    }

    fn scored(&self, scores: Vec<f64>) -> Vec<(String, f64)> {
        scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| (self.id(i).to_string(), s))
            .collect()
    }
}

/// In-process engine. Stateless apart from the cycle cap.
#[derive(Debug, Clone)]
pub struct EmbeddedQueryEngine {
    max_cycles: usize,
}

impl Default for EmbeddedQueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedQueryEngine {
    pub fn new() -> Self {
        Self {
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Full PageRank run over every node, for callers that need the
    /// iteration count as well as the scores.
    pub fn page_rank_run(&self, graph: &Graph, damping: f64) -> PageRankRun {
        pagerank::page_rank(&GraphView::new(graph), damping)
    }
}

impl GraphQueryEngine for EmbeddedQueryEngine {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn page_rank(&self, graph: &Graph, top_k: usize, damping: f64) -> Result<Vec<RankedNode>> {
        let view = GraphView::new(graph);
        let run = pagerank::page_rank(&view, damping);
        debug!(
            iterations = run.iterations,
            converged = run.converged,
            "pagerank finished"
        );
        Ok(rank_top_k(view.scored(run.scores), top_k))
    }

    fn centrality(&self, graph: &Graph, metric: CentralityMetric, top_k: usize) -> Result<Vec<RankedNode>> {
        let view = GraphView::new(graph);
        let scores = match metric {
            CentralityMetric::Degree => centrality::degree(&view),
            CentralityMetric::Closeness => centrality::closeness(&view),
            CentralityMetric::Betweenness => centrality::betweenness(&view),
        };
        Ok(rank_top_k(view.scored(scores), top_k))
    }

    fn detect_communities(&self, graph: &Graph, algorithm: CommunityAlgorithm) -> Result<Communities> {
        let view = GraphView::new(graph);
        let labels = match algorithm {
            CommunityAlgorithm::Louvain => community::louvain(&view),
            CommunityAlgorithm::LabelPropagation => community::label_propagation(&view),
        };
        let groups = group_by_label(labels.into_iter().enumerate().map(|(i, label)| (view.id(i), label)));
        Ok(number_communities(groups))
    }

    fn find_cycles(&self, graph: &Graph) -> Result<Vec<Cycle>> {
        let view = GraphView::new(graph);
        let cycles = cycles::elementary_cycles(&view, self.max_cycles);
        Ok(sort_cycles(cycles.into_iter().map(|c| {
            c.into_iter().map(|i| view.id(i).to_string()).collect::<Cycle>()
        })))
    }

    fn connected_components(&self, graph: &Graph) -> Result<Vec<Component>> {
        let view = GraphView::new(graph);
        let groups = group_by_label(
            components::weak_labels(&view)
                .into_iter()
                .enumerate()
                .map(|(i, label)| (view.id(i), label)),
        );
        Ok(sort_components(groups))
    }

    fn statistics(&self, graph: &Graph) -> Result<GraphStatistics> {
        Ok(graph_statistics(graph, self.name()))
    }
}
