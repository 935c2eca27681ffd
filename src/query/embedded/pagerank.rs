use super::GraphView;

pub const MAX_ITERATIONS: usize = 100;
pub const TOLERANCE: f64 = 1e-6;

/// Scores indexed like the view, plus how the power iteration ended.
#[derive(Debug, Clone)]
pub struct PageRankRun {
    pub scores: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Power iteration. Mass from nodes without out-edges is spread evenly
/// over all nodes, so scores always sum to 1. Stops once the L1 change
/// drops below [`TOLERANCE`] or after [`MAX_ITERATIONS`].
pub(super) fn page_rank(view: &GraphView<'_>, damping: f64) -> PageRankRun {
    let n = view.len();
    if n == 0 {
        return PageRankRun {
            scores: Vec::new(),
            iterations: 0,
            converged: true,
        };
    }

    let nf = n as f64;
    let mut rank = vec![1.0 / nf; n];
    let mut next = vec![0.0; n];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < MAX_ITERATIONS {
        iterations += 1;

        let dangling: f64 = (0..n)
            .filter(|&v| view.out_neighbors(v).is_empty())
            .map(|v| rank[v])
            .sum();
        let base = (1.0 - damping) / nf + damping * dangling / nf;
        next.iter_mut().for_each(|x| *x = base);

        for v in 0..n {
            let targets = view.out_neighbors(v);
            if targets.is_empty() {
                continue;
            }
            let share = damping * rank[v] / targets.len() as f64;
            for &t in targets {
                next[t] += share;
            }
        }

        let delta: f64 = rank.iter().zip(&next).map(|(a, b)| (a - b).abs()).sum();
        std::mem::swap(&mut rank, &mut next);
        if delta < TOLERANCE {
            converged = true;
            break;
        }
    }

    PageRankRun {
        scores: rank,
        iterations,
        converged,
    }
}
