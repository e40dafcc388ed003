use hcas_types::{ContentHash, Manifest};

use crate::hasher::ContentHasher;

/// Errors from Merkle tree construction.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MerkleError {
    /// Zero logical leaves: an empty manifest or empty content.
    #[error("cannot build a merkle tree without leaves")]
    Empty,

    #[error("leaf size must be greater than zero")]
    ZeroLeafSize,
}

pub type MerkleResult<T> = Result<T, MerkleError>;

/// What a node in the tree stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// A logical leaf: a content block or a manifest entry.
    Leaf,
    /// Padding leaf; never corresponds to real data.
    Sentinel,
    /// Parent of two nodes.
    Internal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MerkleNode {
    pub hash: ContentHash,
    pub kind: NodeKind,
}

/// Padded, balanced binary hash tree.
///
/// Nodes are stored in one array: indices `0..leaf_count` hold the leaves
/// (logical leaves first, then sentinels up to the next power of two),
/// indices `leaf_count..node_count` hold parents bottom-up, and the last
/// element is the root.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    nodes: Vec<MerkleNode>,
    depth: usize,
    leaf_count: usize,
    logical_size: usize,
}

impl MerkleTree {
    /// Build over raw content split into `leaf_size` blocks.
    pub fn from_content(hasher: &ContentHasher, data: &[u8], leaf_size: usize) -> MerkleResult<Self> {
        if leaf_size == 0 {
            return Err(MerkleError::ZeroLeafSize);
        }
        let leaves = data.chunks(leaf_size).map(|block| hasher.hash(block)).collect();
        Self::from_leaves(hasher, leaves)
    }

    /// Build over manifest entries in their given order.
    ///
    /// Leaf `i` is `H(path_i || ":" || blobHash_i)`.
    pub fn from_manifest(hasher: &ContentHasher, manifest: &Manifest) -> MerkleResult<Self> {
        let leaves = manifest
            .entries()
            .iter()
            .map(|entry| hasher.hash_entry(&entry.path, &entry.hash))
            .collect();
        Self::from_leaves(hasher, leaves)
    }

    /// Build from pre-computed logical leaf hashes.
    pub fn from_leaves(hasher: &ContentHasher, leaves: Vec<ContentHash>) -> MerkleResult<Self> {
        let logical_size = leaves.len();
        if logical_size == 0 {
            return Err(MerkleError::Empty);
        }
        let leaf_count = padded_leaf_count(logical_size);
        let node_count = 2 * leaf_count - 1;

        let mut nodes = Vec::with_capacity(node_count);
        nodes.extend(leaves.into_iter().map(|hash| MerkleNode {
            hash,
            kind: NodeKind::Leaf,
        }));
        let sentinel = hasher.sentinel();
        nodes.resize(
            leaf_count,
            MerkleNode {
                hash: sentinel,
                kind: NodeKind::Sentinel,
            },
        );

        // Parents are resolved by offset from the end of the array: the
        // node `d` places before the root has its children at end offsets
        // `2d + 2` (left) and `2d + 1` (right).
        for i in leaf_count..node_count {
            let d = node_count - i - 1;
            let left = node_count - (2 * d + 2) - 1;
            let right = node_count - (2 * d + 1) - 1;
            let hash = hasher.hash_pair(&nodes[left].hash, &nodes[right].hash);
            nodes.push(MerkleNode {
                hash,
                kind: NodeKind::Internal,
            });
        }

        Ok(Self {
            nodes,
            depth: leaf_count.trailing_zeros() as usize + 1,
            leaf_count,
            logical_size,
        })
    }

    /// The root hash: the canonical fingerprint of the input.
    pub fn root(&self) -> ContentHash {
        // Construction guarantees at least one node.
        self.nodes[self.nodes.len() - 1].hash
    }

    /// Logical leaves only; sentinel padding is excluded.
    pub fn leaves(&self) -> &[MerkleNode] {
        &self.nodes[..self.logical_size]
    }

    /// Every node, leaves first and root last.
    pub fn nodes(&self) -> &[MerkleNode] {
        &self.nodes
    }

    /// Number of levels, counting the leaf level and the root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Padded leaf count (a power of two).
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Number of real leaves, before sentinel padding.
    pub fn logical_size(&self) -> usize {
        self.logical_size
    }

    /// Total nodes across all levels, padding included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Leaf count after padding `logical_size` leaves to a power of two.
///
/// Callers must reject `logical_size == 0`; it is mapped to `1` here only so
/// the function is total.
pub fn padded_leaf_count(logical_size: usize) -> usize {
    logical_size.max(1).next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcas_types::ManifestEntry;
    use proptest::prelude::*;

    const H: ContentHasher = ContentHasher::SHA256;

    fn manifest(entries: &[(&str, &str)]) -> Manifest {
        Manifest::new(
            entries
                .iter()
                .map(|(path, content)| ManifestEntry::new(*path, H.hash(content.as_bytes())))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn padding_table() {
        for (logical, leaves) in [(1, 1), (2, 2), (3, 4), (4, 4), (5, 8), (7, 8), (8, 8)] {
            assert_eq!(padded_leaf_count(logical), leaves, "logical size {logical}");
            let hashes = (0..logical).map(|i| H.hash(&[i as u8])).collect();
            let tree = MerkleTree::from_leaves(&H, hashes).unwrap();
            assert_eq!(tree.leaf_count(), leaves);
            assert_eq!(tree.node_count(), 2 * leaves - 1);
            assert_eq!(tree.leaves().len(), logical);
        }
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert_eq!(
            MerkleTree::from_leaves(&H, vec![]).unwrap_err(),
            MerkleError::Empty
        );
        assert_eq!(
            MerkleTree::from_content(&H, b"", 1024).unwrap_err(),
            MerkleError::Empty
        );
        assert_eq!(
            MerkleTree::from_content(&H, b"abc", 0).unwrap_err(),
            MerkleError::ZeroLeafSize
        );
    }

    #[test]
    fn single_entry_root_is_the_leaf() {
        let m = manifest(&[("only.txt", "content")]);
        let tree = MerkleTree::from_manifest(&H, &m).unwrap();
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.depth(), 1);
        assert_eq!(
            tree.root(),
            H.hash_entry("only.txt", &H.hash(b"content"))
        );
    }

    #[test]
    fn content_tree_two_full_blocks() {
        let data = vec![b'.'; 2048];
        let tree = MerkleTree::from_content(&H, &data, 1024).unwrap();
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.depth(), 2);
        let nodes = tree.nodes();
        assert_eq!(nodes[0].hash, H.hash(&data[..1024]));
        assert_eq!(nodes[2].hash, H.hash_pair(&nodes[0].hash, &nodes[1].hash));
    }

    #[test]
    fn content_tree_irregular_length_is_padded() {
        let data = vec![b'.'; 2300];
        let tree = MerkleTree::from_content(&H, &data, 1024).unwrap();
        assert_eq!(tree.logical_size(), 3);
        assert_eq!(tree.node_count(), 7);
        assert_eq!(tree.depth(), 3);
        let n = tree.nodes();
        assert_eq!(n[2].hash, H.hash(&data[2048..]));
        assert_eq!(n[3].kind, NodeKind::Sentinel);
        assert_eq!(n[3].hash, H.sentinel());
        assert_eq!(n[4].hash, H.hash_pair(&n[0].hash, &n[1].hash));
        assert_eq!(n[5].hash, H.hash_pair(&n[2].hash, &n[3].hash));
        assert_eq!(n[6].hash, H.hash_pair(&n[4].hash, &n[5].hash));
        assert!(tree.leaves().iter().all(|l| l.kind == NodeKind::Leaf));
    }

    #[test]
    fn manifest_tree_layout_for_eight_leaves() {
        let hashes: Vec<ContentHash> = (0..8u8).map(|i| H.hash(&[i])).collect();
        let tree = MerkleTree::from_leaves(&H, hashes).unwrap();
        let n = tree.nodes();
        assert_eq!(tree.depth(), 4);
        for (parent, left) in [(8, 0), (9, 2), (10, 4), (11, 6), (12, 8), (13, 10), (14, 12)] {
            assert_eq!(
                n[parent].hash,
                H.hash_pair(&n[left].hash, &n[left + 1].hash),
                "parent {parent}"
            );
            assert_eq!(n[parent].kind, NodeKind::Internal);
        }
        assert_eq!(tree.root(), n[14].hash);
    }

    #[test]
    fn two_file_scenario_root() {
        let h1 = H.hash(b"hello");
        let h2 = H.hash(b"world");
        let m = Manifest::sorted(vec![
            ManifestEntry::new("b/c.txt", h2),
            ManifestEntry::new("a.txt", h1),
        ])
        .unwrap();
        let tree = MerkleTree::from_manifest(&H, &m).unwrap();
        let expected = H.hash_pair(&H.hash_entry("a.txt", &h1), &H.hash_entry("b/c.txt", &h2));
        assert_eq!(tree.root(), expected);
        assert!(tree.nodes().iter().all(|n| n.kind != NodeKind::Sentinel));
    }

    #[test]
    fn entry_order_matters() {
        let a = manifest(&[("a", "1"), ("b", "2")]);
        let b = manifest(&[("b", "2"), ("a", "1")]);
        assert_ne!(
            MerkleTree::from_manifest(&H, &a).unwrap().root(),
            MerkleTree::from_manifest(&H, &b).unwrap().root()
        );
    }

    #[test]
    fn algorithm_changes_root() {
        let m = manifest(&[("a", "1"), ("b", "2"), ("c", "3")]);
        assert_ne!(
            MerkleTree::from_manifest(&ContentHasher::SHA256, &m).unwrap().root(),
            MerkleTree::from_manifest(&ContentHasher::BLAKE3, &m).unwrap().root()
        );
    }

    fn entries_strategy() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
        proptest::collection::btree_map("[a-z]{1,8}(/[a-z]{1,8})?", proptest::collection::vec(any::<u8>(), 0..64), 1..24)
            .prop_map(|m| m.into_iter().collect())
    }

    fn build(entries: &[(String, Vec<u8>)]) -> Manifest {
        Manifest::new(
            entries
                .iter()
                .map(|(p, c)| ManifestEntry::new(p.clone(), H.hash(c)))
                .collect(),
        )
        .unwrap()
    }

    proptest! {
        #[test]
        fn root_is_deterministic(entries in entries_strategy()) {
            let m = build(&entries);
            let r1 = MerkleTree::from_manifest(&H, &m).unwrap().root();
            let r2 = MerkleTree::from_manifest(&H, &m.clone()).unwrap().root();
            prop_assert_eq!(r1, r2);
        }

        #[test]
        fn changing_one_hash_changes_root(entries in entries_strategy(), pick in any::<prop::sample::Index>()) {
            let original = build(&entries);
            let idx = pick.index(entries.len());
            let mut changed = entries.clone();
            changed[idx].1.push(0xFF);
            let changed = build(&changed);
            prop_assert_ne!(
                MerkleTree::from_manifest(&H, &original).unwrap().root(),
                MerkleTree::from_manifest(&H, &changed).unwrap().root()
            );
        }

        #[test]
        fn changing_one_path_changes_root(entries in entries_strategy(), pick in any::<prop::sample::Index>()) {
            let original = build(&entries);
            let idx = pick.index(entries.len());
            let mut changed = entries.clone();
            changed[idx].0.push_str("_renamed");
            prop_assume!(changed.iter().filter(|(p, _)| *p == changed[idx].0).count() == 1);
            let changed = build(&changed);
            prop_assert_ne!(
                MerkleTree::from_manifest(&H, &original).unwrap().root(),
                MerkleTree::from_manifest(&H, &changed).unwrap().root()
            );
        }
    }
}
