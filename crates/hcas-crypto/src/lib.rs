//! Hashing primitives for hcas.
//!
//! Provides the content hasher (SHA-256 by default, BLAKE3 optionally), the
//! bound manifest-leaf digest, and the padded binary Merkle tree whose root
//! names a distribution.
//!
//! All digests come from the `sha2` and `blake3` crates.

pub mod hasher;
pub mod merkle;

pub use hasher::{
    ContentHasher, HashAlgorithm, HasherError, IncrementalHasher, SENTINEL_CONTENT,
    SENTINEL_SHA256,
};
pub use merkle::{padded_leaf_count, MerkleError, MerkleNode, MerkleResult, MerkleTree, NodeKind};
