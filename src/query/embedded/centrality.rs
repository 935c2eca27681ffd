use rayon::prelude::*;
use std::collections::VecDeque;

use super::GraphView;

/// (in + out) / (n - 1). Parallel edges count once each.
pub(super) fn degree(view: &GraphView<'_>) -> Vec<f64> {
    let n = view.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let norm = (n - 1) as f64;
    (0..n).map(|v| view.degree(v) as f64 / norm).collect()
}

/// Harmonic closeness over outgoing shortest paths: sum of 1/d(v, u) over
/// every u reachable from v, divided by n - 1. Unreachable nodes add 0, so
/// disconnected graphs need no special casing.
pub(super) fn closeness(view: &GraphView<'_>) -> Vec<f64> {
    let n = view.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let norm = (n - 1) as f64;
    (0..n)
        .into_par_iter()
        .map(|source| {
            let dist = bfs_distances(view, source);
            let harmonic: f64 = dist
                .iter()
                .enumerate()
                .filter(|&(v, d)| v != source && *d > 0)
                .map(|(_, &d)| 1.0 / d as f64)
                .sum();
            harmonic / norm
        })
        .collect()
}

/// Directed betweenness (Brandes), normalized by 1 / ((n-1)(n-2)).
/// Pairs with no path between them contribute nothing.
pub(super) fn betweenness(view: &GraphView<'_>) -> Vec<f64> {
    let n = view.len();
    if n < 3 {
        return vec![0.0; n];
    }

    let partials: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|source| dependencies_from(view, source))
        .collect();

    // Summed in source order so results don't depend on scheduling.
    let mut scores = vec![0.0; n];
    for partial in &partials {
        for (score, delta) in scores.iter_mut().zip(partial) {
            *score += delta;
        }
    }

    let norm = 1.0 / ((n - 1) as f64 * (n - 2) as f64);
    scores.iter_mut().for_each(|s| *s *= norm);
    scores
}

/// Hop counts from `source`; 0 marks unreachable (and the source itself).
fn bfs_distances(view: &GraphView<'_>, source: usize) -> Vec<usize> {
    let mut dist = vec![0usize; view.len()];
    let mut seen = vec![false; view.len()];
    let mut queue = VecDeque::from([source]);
    seen[source] = true;
    while let Some(v) = queue.pop_front() {
        for &w in view.out_neighbors(v) {
            if !seen[w] {
                seen[w] = true;
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
        }
    }
    dist
}

/// Single-source dependency accumulation.
fn dependencies_from(view: &GraphView<'_>, source: usize) -> Vec<f64> {
    let n = view.len();
    let mut stack = Vec::with_capacity(n);
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![-1i64; n];
    sigma[source] = 1.0;
    dist[source] = 0;

    let mut queue = VecDeque::from([source]);
    while let Some(v) = queue.pop_front() {
        stack.push(v);
        for &w in view.out_neighbors(v) {
            if dist[w] < 0 {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
            if dist[w] == dist[v] + 1 {
                sigma[w] += sigma[v];
                preds[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    while let Some(w) = stack.pop() {
        for &v in &preds[w] {
            delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
        }
    }
    delta[source] = 0.0;
    delta
}
