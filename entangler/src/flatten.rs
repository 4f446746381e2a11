// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::entangler::Error;
use crate::lattice::Lattice;
use crate::tree::{MerkleTree, NodeId};

/// A swap performed while flattening: the leaf found at `from` and the node at `to` (the slot
/// right before `internal`'s post-order position) exchanged places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swap {
    pub internal: NodeId,
    pub from: usize,
    pub to: usize,
}

/// Nodes of a Merkle tree in the order they are fed to the entangler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedSequence {
    nodes: Vec<NodeId>,
    swaps: Vec<Swap>,
}

impl FlattenedSequence {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    /// Swaps in the order they were applied.
    pub fn swaps(&self) -> &[Swap] {
        &self.swaps
    }

    /// Final position of the given node.
    pub fn position_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|&n| n == id)
    }
}

impl IntoIterator for FlattenedSequence {
    type Item = NodeId;
    type IntoIter = std::vec::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

/// Flattens the tree into the order used for entanglement.
///
/// Nodes start at their post-order position. Then, for every internal node in post-order, the
/// positions `W, W + (W + s), W + 2(W + s), ...` (with `W = s * p`) are scanned for a leaf whose
/// post-order index lies outside `(first child - W, last child + W)`. The first such leaf is
/// swapped with the node right before the internal node, which moves it at least a lattice
/// window away from the children. If no position qualifies the node stays where it is.
///
/// Assigns traversal indices to the tree as a side effect.
pub fn flatten(tree: &mut MerkleTree, s: u64, p: u64) -> Result<FlattenedSequence, Error> {
    let lattice = Lattice::new(s, p)?;
    tree.check_sizes()?;

    let (mut nodes, internals) = tree.assign_indices();
    let n = nodes.len();
    // a window that does not fit in usize is larger than any tree
    let window = usize::try_from(lattice.window_size()).unwrap_or(usize::MAX);
    let stride = window.saturating_add(usize::try_from(s).unwrap_or(usize::MAX));
    let mut swaps = Vec::new();

    for internal in internals {
        let node = tree.node(internal)?;
        let (Some(&first), Some(&last)) = (node.children().first(), node.children().last())
        else {
            continue;
        };
        let low = tree.node(first)?.post_order_idx();
        let high = tree.node(last)?.post_order_idx();
        let target = node.post_order_idx() - 1;

        let mut j = window;
        while j < n {
            let occupant = tree.node(nodes[j])?;
            let idx = occupant.post_order_idx();
            // idx in (low - W, high + W)
            let in_window = idx.saturating_add(window) > low && idx < high.saturating_add(window);
            if !in_window && occupant.is_leaf() {
                nodes.swap(j, target);
                swaps.push(Swap {
                    internal,
                    from: j,
                    to: target,
                });
                break;
            }
            j = j.saturating_add(stride);
        }
    }

    log::debug!(
        "flattened {} nodes (s={}, p={}) with {} swaps",
        n,
        s,
        p,
        swaps.len()
    );
    Ok(FlattenedSequence { nodes, swaps })
}
