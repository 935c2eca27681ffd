//! Result shaping shared by every engine.
//!
//! The embedded engine produces raw per-node scores and groupings; the
//! native engine receives whatever its backend returns. Both go through
//! these helpers so rankings, partitions and cycles look the same.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

use super::{Communities, Component, Cycle, GraphStatistics, RankedNode};
use crate::graph::Graph;

/// Sort descending by score, ties by ascending node id, keep `top_k`.
pub fn rank_top_k(scores: impl IntoIterator<Item = (String, f64)>, top_k: usize) -> Vec<RankedNode> {
    let mut ranked: Vec<RankedNode> = scores
        .into_iter()
        .map(|(node_id, score)| RankedNode {
            node_id,
            score: if score.is_finite() { score } else { 0.0 },
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });
    ranked.truncate(top_k);
    ranked
}

/// Number non-empty groups 0.. by their smallest member.
pub fn number_communities(groups: impl IntoIterator<Item = BTreeSet<String>>) -> Communities {
    let mut groups: Vec<BTreeSet<String>> = groups.into_iter().filter(|g| !g.is_empty()).collect();
    groups.sort_by(|a, b| a.iter().next().cmp(&b.iter().next()));
    groups.into_iter().enumerate().collect()
}

/// Force arbitrary groups into a partition of `graph`'s nodes: unknown ids
/// are dropped, an id claimed twice stays with its first group, and nodes
/// no group mentions become singletons.
pub fn partition_nodes(graph: &Graph, groups: impl IntoIterator<Item = Vec<String>>) -> Vec<BTreeSet<String>> {
    let mut claimed: HashSet<String> = HashSet::new();
    let mut partition: Vec<BTreeSet<String>> = Vec::new();
    for group in groups {
        let mut members = BTreeSet::new();
        for id in group {
            if graph.node(&id).is_none() {
                debug!(node = %id, "dropping unknown node from backend result");
                continue;
            }
            if claimed.insert(id.clone()) {
                members.insert(id);
            }
        }
        if !members.is_empty() {
            partition.push(members);
        }
    }
    for id in graph.nodes().keys() {
        if !claimed.contains(id) {
            partition.push(BTreeSet::from([id.clone()]));
        }
    }
    partition
}

/// Largest component first, then by smallest member.
pub fn sort_components(mut components: Vec<Component>) -> Vec<Component> {
    components.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then_with(|| a.iter().next().cmp(&b.iter().next()))
    });
    components
}

/// Rotate a cycle to start at its smallest id. A trailing repeat of the
/// first id (`[A, B, A]`) is dropped.
pub fn canonical_cycle(mut cycle: Cycle) -> Cycle {
    if cycle.len() > 1 && cycle.first() == cycle.last() {
        cycle.pop();
    }
    if let Some(start) = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
    {
        cycle.rotate_left(start);
    }
    cycle
}

/// Canonicalize, dedupe and order a set of cycles.
pub fn sort_cycles(cycles: impl IntoIterator<Item = Cycle>) -> Vec<Cycle> {
    let unique: BTreeSet<Cycle> = cycles
        .into_iter()
        .map(canonical_cycle)
        .filter(|c| !c.is_empty())
        .collect();
    unique.into_iter().collect()
}

/// Structural statistics straight from the snapshot.
pub fn graph_statistics(graph: &Graph, engine_name: &str) -> GraphStatistics {
    let n = graph.node_count();
    let m = graph.edge_count();
    let density = if n > 1 {
        m as f64 / (n as f64 * (n as f64 - 1.0))
    } else {
        0.0
    };
    let average_degree = if n > 0 { 2.0 * m as f64 / n as f64 } else { 0.0 };
    GraphStatistics {
        node_count: n,
        edge_count: m,
        density,
        average_degree,
        is_directed: true,
        engine_name: engine_name.to_string(),
        build_duration_ms: graph.metadata().build_duration_ms,
    }
}

/// Group ids by a per-node label.
pub fn group_by_label<'a>(ids: impl IntoIterator<Item = (&'a str, usize)>) -> Vec<BTreeSet<String>> {
    let mut groups: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
    for (id, label) in ids {
        groups.entry(label).or_default().insert(id.to_string());
    }
    groups.into_values().collect()
}
