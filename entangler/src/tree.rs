// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use bytes::Bytes;
use std::collections::VecDeque;
use storage::Storage;

use crate::entangler::Error;

/// Handle of a node inside a [`MerkleTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One chunk of a file's Merkle tree. The chunk bytes stay in the store and are fetched on
/// demand with [`TreeNode::data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub cid: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    depth: usize,
    size: usize,
    post_order_idx: usize,
    pre_order_idx: usize,
}

impl TreeNode {
    fn new(cid: String) -> Self {
        Self {
            cid,
            children: Vec::new(),
            parent: None,
            depth: 0,
            size: 1,
            post_order_idx: 0,
            pre_order_idx: 0,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of nodes in the subtree rooted at this node, itself included.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn post_order_idx(&self) -> usize {
        self.post_order_idx
    }

    pub fn pre_order_idx(&self) -> usize {
        self.pre_order_idx
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Loads the chunk bytes of this node from the store.
    pub async fn data<T: Storage>(&self, storage: &T) -> Result<Bytes, storage::Error> {
        storage.chunk_data(&self.cid).await
    }
}

/// Arena holding the nodes of a Merkle tree. Nodes refer to each other by [`NodeId`]; the
/// parent link is only a back-reference used for depth and ordering bookkeeping.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    nodes: Vec<TreeNode>,
    root: NodeId,
}

impl MerkleTree {
    /// Creates a tree consisting of a single root node.
    pub fn new(root_cid: impl Into<String>) -> Self {
        Self {
            nodes: vec![TreeNode::new(root_cid.into())],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes reachable from the root.
    pub fn size(&self) -> usize {
        self.nodes[self.root.0].size
    }

    pub fn node(&self, id: NodeId) -> Result<&TreeNode, Error> {
        self.nodes.get(id.0).ok_or(Error::UnknownNode(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut TreeNode, Error> {
        self.nodes.get_mut(id.0).ok_or(Error::UnknownNode(id.0))
    }

    /// Adds a node that is not attached to the tree yet.
    pub fn add_node(&mut self, cid: impl Into<String>) -> NodeId {
        self.nodes.push(TreeNode::new(cid.into()));
        NodeId(self.nodes.len() - 1)
    }

    /// Adds a new leaf under `parent` and returns its id.
    pub fn add_child_node(
        &mut self,
        parent: NodeId,
        cid: impl Into<String>,
    ) -> Result<NodeId, Error> {
        self.node(parent)?;
        let child = self.add_node(cid);
        self.add_child(parent, child)?;
        Ok(child)
    }

    /// Attaches the detached subtree rooted at `child` as the last child of `parent`.
    ///
    /// The subtree size of `parent` and of all its ancestors grows by the size of `child`, and
    /// the depths inside the attached subtree are re-based on the depth of `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        self.node(parent)?;
        let child_node = self.node(child)?;
        if child == self.root || child_node.parent.is_some() {
            return Err(Error::MalformedTree(format!(
                "node {} already belongs to the tree",
                child.0
            )));
        }
        let mut ancestor = Some(parent);
        while let Some(id) = ancestor {
            if id == child {
                return Err(Error::MalformedTree(format!(
                    "attaching node {} under {} would create a cycle",
                    child.0, parent.0
                )));
            }
            ancestor = self.nodes[id.0].parent;
        }

        let added = child_node.size;
        let parent_depth = self.nodes[parent.0].depth;

        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);

        let mut ancestor = Some(parent);
        while let Some(id) = ancestor {
            let node = &mut self.nodes[id.0];
            node.size += added;
            ancestor = node.parent;
        }

        let mut pending = vec![(child, parent_depth + 1)];
        while let Some((id, depth)) = pending.pop() {
            let node = &mut self.nodes[id.0];
            node.depth = depth;
            pending.extend(node.children.iter().map(|&c| (c, depth + 1)));
        }
        Ok(())
    }

    /// Checks that every node reachable from the root satisfies
    /// `size == 1 + sum of children's sizes`.
    pub fn check_sizes(&self) -> Result<(), Error> {
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            let node = self.node(id)?;
            let mut expected = 1;
            for &child in &node.children {
                expected += self.node(child)?.size;
            }
            if node.size == 0 || node.size != expected {
                return Err(Error::MalformedTree(format!(
                    "node {} ({}) has subtree size {}, expected {}",
                    id.0, node.cid, node.size, expected
                )));
            }
            pending.extend(node.children.iter().copied());
        }
        Ok(())
    }

    /// Assigns pre-order and post-order indices to every node reachable from the root.
    ///
    /// Returns the nodes in post-order together with the internal nodes in the order the
    /// traversal finished them.
    pub fn assign_indices(&mut self) -> (Vec<NodeId>, Vec<NodeId>) {
        let mut post_order = Vec::with_capacity(self.size());
        let mut internals = Vec::new();
        let mut pre_idx = 0;

        // (node, whether its children were already pushed)
        let mut stack = vec![(self.root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                let node = &mut self.nodes[id.0];
                node.post_order_idx = post_order.len();
                if !node.children.is_empty() {
                    internals.push(id);
                }
                post_order.push(id);
                continue;
            }
            let node = &mut self.nodes[id.0];
            node.pre_order_idx = pre_idx;
            pre_idx += 1;
            stack.push((id, true));
            stack.extend(node.children.iter().rev().map(|&c| (c, false)));
        }

        (post_order, internals)
    }
}

/// Reads the Merkle tree rooted at `root_cid` from the store, following `links` breadth first.
pub async fn fetch_tree<T: Storage>(storage: &T, root_cid: &str) -> Result<MerkleTree, Error> {
    let mut tree = MerkleTree::new(root_cid);
    let mut pending = VecDeque::from([tree.root()]);
    while let Some(id) = pending.pop_front() {
        let cid = tree.node(id)?.cid.clone();
        let links = storage
            .links(&cid)
            .await
            .map_err(|source| Error::TreeFetch { cid, source })?;
        for link in links {
            pending.push_back(tree.add_child_node(id, link)?);
        }
    }
    log::debug!("read merkle tree {} with {} nodes", root_cid, tree.size());
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::dag::DagConfig;
    use storage::memory::MemoryStorage;

    /// Builds a perfect binary tree of the given height. Leaves are named `l<i>`, internal nodes
    /// `n<i>` in creation order.
    fn perfect_binary_tree(height: usize) -> MerkleTree {
        let mut tree = MerkleTree::new("n0");
        let mut level = vec![tree.root()];
        let mut leaves = 0;
        let mut internals = 1;
        for h in 1..height {
            let mut next = Vec::with_capacity(level.len() * 2);
            for &parent in &level {
                for _ in 0..2 {
                    let name = if h + 1 == height {
                        leaves += 1;
                        format!("l{}", leaves - 1)
                    } else {
                        internals += 1;
                        format!("n{}", internals - 1)
                    };
                    next.push(tree.add_child_node(parent, name).unwrap());
                }
            }
            level = next;
        }
        tree
    }

    fn assert_sizes(tree: &MerkleTree) {
        for (i, node) in tree.nodes.iter().enumerate() {
            let sum: usize = node.children.iter().map(|c| tree.nodes[c.0].size).sum();
            assert_eq!(node.size, 1 + sum, "size mismatch at node {}", i);
            for c in &node.children {
                assert_eq!(tree.nodes[c.0].depth, node.depth + 1);
                assert_eq!(tree.nodes[c.0].parent, Some(NodeId(i)));
            }
        }
    }

    #[test]
    fn test_single_node_tree() {
        let tree = MerkleTree::new("root");
        assert_eq!(tree.size(), 1);
        let root = tree.node(tree.root()).unwrap();
        assert!(root.is_leaf());
        assert_eq!(root.parent(), None);
        assert_eq!(root.depth(), 0);
    }

    #[test]
    fn test_sizes_and_depths_of_perfect_tree() {
        let tree = perfect_binary_tree(3);
        assert_eq!(tree.size(), 7);
        assert_sizes(&tree);
        assert!(tree.check_sizes().is_ok());
    }

    #[test]
    fn test_attaching_subtree_updates_ancestors() {
        let mut tree = MerkleTree::new("root");
        let a = tree.add_child_node(tree.root(), "a").unwrap();
        let b = tree.add_child_node(a, "b").unwrap();

        let sub = tree.add_node("sub");
        tree.add_child_node(sub, "sub-1").unwrap();
        let deep = tree.add_child_node(sub, "sub-2").unwrap();
        tree.add_child_node(deep, "sub-2-1").unwrap();
        assert_eq!(tree.node(sub).unwrap().size(), 4);

        tree.add_child(b, sub).unwrap();

        assert_eq!(tree.size(), 7);
        assert_eq!(tree.node(a).unwrap().size(), 6);
        assert_eq!(tree.node(sub).unwrap().depth(), 3);
        assert_eq!(tree.node(deep).unwrap().depth(), 4);
        assert_sizes(&tree);
    }

    #[test]
    fn test_add_child_rejects_bad_links() {
        let mut tree = MerkleTree::new("root");
        let a = tree.add_child_node(tree.root(), "a").unwrap();
        let root = tree.root();

        assert!(matches!(
            tree.add_child(a, root),
            Err(Error::MalformedTree(_))
        ));
        let b = tree.add_child_node(root, "b").unwrap();
        assert!(matches!(tree.add_child(a, b), Err(Error::MalformedTree(_))));

        let detached = tree.add_node("detached");
        let below = tree.add_child_node(detached, "below").unwrap();
        assert!(matches!(
            tree.add_child(below, detached),
            Err(Error::MalformedTree(_))
        ));
        assert!(matches!(
            tree.add_child(NodeId(100), detached),
            Err(Error::UnknownNode(100))
        ));
    }

    #[test]
    fn test_check_sizes_detects_corruption() {
        let mut tree = perfect_binary_tree(3);
        tree.nodes[1].size = 0;
        assert!(matches!(tree.check_sizes(), Err(Error::MalformedTree(_))));
    }

    #[test]
    fn test_traversal_indices() {
        let mut tree = perfect_binary_tree(3);
        let (post_order, internals) = tree.assign_indices();

        let names: Vec<&str> = post_order
            .iter()
            .map(|&id| tree.node(id).unwrap().cid.as_str())
            .collect();
        assert_eq!(names, vec!["l0", "l1", "n1", "l2", "l3", "n2", "n0"]);

        let internal_names: Vec<&str> = internals
            .iter()
            .map(|&id| tree.node(id).unwrap().cid.as_str())
            .collect();
        assert_eq!(internal_names, vec!["n1", "n2", "n0"]);

        for (i, &id) in post_order.iter().enumerate() {
            assert_eq!(tree.node(id).unwrap().post_order_idx(), i);
        }
        let pre = |id: NodeId| tree.node(id).unwrap().pre_order_idx();
        assert_eq!(pre(post_order[6]), 0);
        assert_eq!(pre(post_order[2]), 1);
        assert_eq!(pre(post_order[0]), 2);
        assert_eq!(pre(post_order[1]), 3);
        assert_eq!(pre(post_order[5]), 4);
    }

    #[tokio::test]
    async fn test_fetch_tree_from_storage() -> anyhow::Result<()> {
        let storage = MemoryStorage::with_config(DagConfig::new(2, 3));
        let data = (0..18u8).collect::<Vec<u8>>();
        let root_cid = storage.add_file(data.clone()).await?;

        let tree = fetch_tree(&storage, &root_cid).await?;
        // 9 leaves, 3 nodes above them and the root
        assert_eq!(tree.size(), 13);
        assert!(tree.check_sizes().is_ok());

        let root = tree.node(tree.root())?;
        assert_eq!(root.cid, root_cid);
        assert_eq!(root.children().len(), 3);
        let first_leaf = tree.node(tree.node(root.children()[0])?.children()[0])?;
        assert_eq!(first_leaf.depth(), 2);
        assert_eq!(first_leaf.data(&storage).await?, vec![0u8, 1]);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_tree_reports_missing_node() {
        let storage = MemoryStorage::new();
        let missing = storage::dag::Block::node(vec![]).unwrap().cid;
        let result = fetch_tree(&storage, &missing).await;
        assert!(matches!(result, Err(Error::TreeFetch { .. })));
    }
}
