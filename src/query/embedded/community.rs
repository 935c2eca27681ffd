use std::collections::BTreeMap;

use super::GraphView;

const MAX_PASSES: usize = 100;
const MAX_LEVELS: usize = 32;
const MAX_ROUNDS: usize = 100;
const MIN_GAIN: f64 = 1e-12;

/// Weighted undirected adjacency. A self-loop entry holds twice the
/// internal weight, so a node's degree is just the sum of its row.
struct Level {
    adj: Vec<Vec<(usize, f64)>>,
}

impl Level {
    fn from_view(view: &GraphView<'_>) -> Self {
        let adj = (0..view.len())
            .map(|v| view.neighbors(v).iter().map(|&u| (u, 1.0)).collect())
            .collect();
        Self { adj }
    }

    fn len(&self) -> usize {
        self.adj.len()
    }

    fn degree(&self, v: usize) -> f64 {
        self.adj[v].iter().map(|&(_, w)| w).sum()
    }

    /// Collapse each community into one node.
    fn aggregate(&self, community: &[usize], count: usize) -> Self {
        let mut rows: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); count];
        for (v, row) in self.adj.iter().enumerate() {
            for &(u, w) in row {
                *rows[community[v]].entry(community[u]).or_insert(0.0) += w;
            }
        }
        Self {
            adj: rows.into_iter().map(|row| row.into_iter().collect()).collect(),
        }
    }
}

/// Louvain modularity optimisation: local moves in ascending node order,
/// then aggregation, until a level moves nothing.
pub(super) fn louvain(view: &GraphView<'_>) -> Vec<usize> {
    let n = view.len();
    let mut membership: Vec<usize> = (0..n).collect();
    let mut level = Level::from_view(view);
    let m2: f64 = (0..level.len()).map(|v| level.degree(v)).sum();
    if m2 == 0.0 {
        return membership;
    }

    for _ in 0..MAX_LEVELS {
        let (community, moved) = local_moves(&level, m2);
        if !moved {
            break;
        }
        let (community, count) = renumber(&community);
        for label in membership.iter_mut() {
            *label = community[*label];
        }
        level = level.aggregate(&community, count);
    }
    membership
}

fn local_moves(level: &Level, m2: f64) -> (Vec<usize>, bool) {
    let n = level.len();
    let degree: Vec<f64> = (0..n).map(|v| level.degree(v)).collect();
    let mut community: Vec<usize> = (0..n).collect();
    let mut total: Vec<f64> = degree.clone();
    let mut moved_any = false;

    for _ in 0..MAX_PASSES {
        let mut moved = false;
        for v in 0..n {
            let current = community[v];
            let k = degree[v];

            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            for &(u, w) in &level.adj[v] {
                if u != v {
                    *links.entry(community[u]).or_insert(0.0) += w;
                }
            }

            total[current] -= k;
            let mut best = current;
            let mut best_gain = links.get(&current).copied().unwrap_or(0.0) - total[current] * k / m2;
            for (&c, &w) in &links {
                let gain = w - total[c] * k / m2;
                if gain > best_gain + MIN_GAIN {
                    best = c;
                    best_gain = gain;
                }
            }
            total[best] += k;

            if best != current {
                community[v] = best;
                moved = true;
                moved_any = true;
            }
        }
        if !moved {
            break;
        }
    }
    (community, moved_any)
}

/// Dense labels 0.. in order of first appearance.
fn renumber(community: &[usize]) -> (Vec<usize>, usize) {
    let mut ids: BTreeMap<usize, usize> = BTreeMap::new();
    let mut dense = Vec::with_capacity(community.len());
    for &c in community {
        let next = ids.len();
        dense.push(*ids.entry(c).or_insert(next));
    }
    (dense, ids.len())
}

/// Asynchronous label propagation in ascending node order. A node keeps
/// its label while it is among the most frequent around it; otherwise it
/// takes the smallest most-frequent label.
pub(super) fn label_propagation(view: &GraphView<'_>) -> Vec<usize> {
    let n = view.len();
    let mut labels: Vec<usize> = (0..n).collect();

    for _ in 0..MAX_ROUNDS {
        let mut changed = false;
        for v in 0..n {
            let neighbors = view.neighbors(v);
            if neighbors.is_empty() {
                continue;
            }
            let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
            for &u in neighbors {
                *counts.entry(labels[u]).or_insert(0) += 1;
            }
            let max = counts.values().copied().max().unwrap_or(0);
            if counts.get(&labels[v]) == Some(&max) {
                continue;
            }
            if let Some((&label, _)) = counts.iter().find(|(_, &c)| c == max) {
                labels[v] = label;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    labels
}
