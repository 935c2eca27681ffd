use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;

use super::GraphView;

/// Weak component label per node, ignoring edge direction.
pub(super) fn weak_labels(view: &GraphView<'_>) -> Vec<usize> {
    let mut sets = UnionFind::<usize>::new(view.len());
    for edge in view.petgraph().edge_references() {
        sets.union(edge.source().index(), edge.target().index());
    }
    sets.into_labeling()
}
