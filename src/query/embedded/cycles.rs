use petgraph::algo::tarjan_scc;
use tracing::debug;

use super::GraphView;

struct Frame {
    node: usize,
    next: usize,
    closed: bool,
}

/// Elementary directed cycles (Johnson), each listed once starting from
/// its smallest index.
///
/// Cycles come out grouped by that smallest index, ascending, and the
/// search stops after `max_cycles` cycles. A capped result is therefore
/// the cycles through the lowest ids, not the lexicographically first.
pub(super) fn elementary_cycles(view: &GraphView<'_>, max_cycles: usize) -> Vec<Vec<usize>> {
    let n = view.len();
    let mut component = vec![0usize; n];
    let mut component_size = Vec::new();
    for (c, members) in tarjan_scc(view.petgraph()).into_iter().enumerate() {
        component_size.push(members.len());
        for idx in members {
            component[idx.index()] = c;
        }
    }

    let mut cycles = Vec::new();
    let mut search = Search::new(n);
    for start in 0..n {
        if cycles.len() >= max_cycles {
            debug!(max_cycles, "cycle limit reached");
            break;
        }
        let has_self_loop = view.out_neighbors(start).contains(&start);
        if component_size[component[start]] < 2 && !has_self_loop {
            continue;
        }
        let allowed = |w: usize| w >= start && component[w] == component[start];
        search.run(view, start, allowed, max_cycles, &mut cycles);
    }
    cycles
}

/// Blocking state for one start node; reset between starts.
struct Search {
    blocked: Vec<bool>,
    blocked_by: Vec<Vec<usize>>,
}

impl Search {
    fn new(n: usize) -> Self {
        Self {
            blocked: vec![false; n],
            blocked_by: vec![Vec::new(); n],
        }
    }

    fn reset(&mut self) {
        self.blocked.iter_mut().for_each(|b| *b = false);
        self.blocked_by.iter_mut().for_each(Vec::clear);
    }

    fn unblock(&mut self, node: usize) {
        let mut pending = vec![node];
        while let Some(u) = pending.pop() {
            self.blocked[u] = false;
            for w in std::mem::take(&mut self.blocked_by[u]) {
                if self.blocked[w] {
                    pending.push(w);
                }
            }
        }
    }

    fn run(
        &mut self,
        view: &GraphView<'_>,
        start: usize,
        allowed: impl Fn(usize) -> bool,
        max_cycles: usize,
        cycles: &mut Vec<Vec<usize>>,
    ) {
        self.reset();
        let mut path = vec![start];
        self.blocked[start] = true;
        let mut frames = vec![Frame {
            node: start,
            next: 0,
            closed: false,
        }];

        while let Some(frame) = frames.last_mut() {
            let v = frame.node;
            let neighbors = view.out_neighbors(v);

            if frame.next < neighbors.len() {
                let w = neighbors[frame.next];
                frame.next += 1;
                if !allowed(w) {
                    continue;
                }
                if w == start {
                    frame.closed = true;
                    cycles.push(path.clone());
                    if cycles.len() >= max_cycles {
                        return;
                    }
                } else if !self.blocked[w] {
                    path.push(w);
                    self.blocked[w] = true;
                    frames.push(Frame {
                        node: w,
                        next: 0,
                        closed: false,
                    });
                }
                continue;
            }

            let closed = frame.closed;
            frames.pop();
            path.pop();
            if closed {
                self.unblock(v);
            } else {
                for &w in neighbors {
                    if allowed(w) && !self.blocked_by[w].contains(&v) {
                        self.blocked_by[w].push(v);
                    }
                }
            }
            if let Some(parent) = frames.last_mut() {
                parent.closed |= closed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::fixtures::graph_of;

    fn cycles_of(ids: &[&str], edges: &[(&str, &str)]) -> Vec<Vec<usize>> {
        let graph = graph_of(ids, edges);
        let mut cycles = elementary_cycles(&GraphView::new(&graph), usize::MAX);
        cycles.sort();
        cycles
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        assert_eq!(cycles_of(&["A", "B"], &[("A", "A"), ("A", "B")]), vec![vec![0]]);
    }

    #[test]
    fn test_shared_node_cycles() {
        // A→B→A and A→C→A share A; B→C→B links the others.
        let cycles = cycles_of(
            &["A", "B", "C"],
            &[("A", "B"), ("B", "A"), ("A", "C"), ("C", "A"), ("B", "C"), ("C", "B")],
        );
        assert_eq!(
            cycles,
            vec![vec![0, 1], vec![0, 1, 2], vec![0, 2], vec![0, 2, 1], vec![1, 2]]
        );
    }

    #[test]
    fn test_dag_has_none() {
        assert!(cycles_of(&["A", "B", "C"], &[("A", "B"), ("B", "C"), ("A", "C")]).is_empty());
    }

    #[test]
    fn test_limit_stops_search() {
        let graph = graph_of(&["A", "B", "C"], &[("A", "B"), ("B", "A"), ("B", "C"), ("C", "B")]);
        assert_eq!(elementary_cycles(&GraphView::new(&graph), 1).len(), 1);
        assert!(elementary_cycles(&GraphView::new(&graph), 0).is_empty());
    }
}
