//! Merkle Assembler
//!
//! Derives a file's root identifier from its ordered segment hashes.
//!
//! Tree convention:
//! - leaves are the segment hashes themselves (not re-hashed)
//! - adjacent nodes are paired and hashed as `H(left || right)`
//! - an odd trailing node is promoted to the next level unchanged
//! - a single-segment file therefore has root == its segment hash

use crate::error::{Result, ShardcastError};
use crate::hash::{ContentHash, RootId};

/// Builds a root digest over an ordered sequence of hashes
pub trait HashTree: Send + Sync {
    /// Fails with `EmptyInput` when `leaves` is empty
    fn build_root(&self, leaves: &[ContentHash]) -> Result<ContentHash>;

    /// Root identifier for a file with the given ordered segment hashes
    fn root_id(&self, leaves: &[ContentHash]) -> Result<RootId> {
        self.build_root(leaves).map(RootId::new)
    }
}

/// Binary Blake3 Merkle tree
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3HashTree;

impl HashTree for Blake3HashTree {
    fn build_root(&self, leaves: &[ContentHash]) -> Result<ContentHash> {
        if leaves.is_empty() {
            return Err(ShardcastError::EmptyInput);
        }

        let mut level = leaves.to_vec();
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => ContentHash::combine(left, right),
                    [odd] => *odd,
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
        }

        Ok(level[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaves(n: usize) -> Vec<ContentHash> {
        (0..n)
            .map(|i| ContentHash::compute(&(i as u64).to_le_bytes()))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let result = Blake3HashTree.build_root(&[]);
        assert!(matches!(result, Err(ShardcastError::EmptyInput)));
    }

    #[test]
    fn test_single_leaf_is_root() {
        let l = leaves(1);
        assert_eq!(Blake3HashTree.build_root(&l).unwrap(), l[0]);
    }

    #[test]
    fn test_two_leaves() {
        let l = leaves(2);
        assert_eq!(
            Blake3HashTree.build_root(&l).unwrap(),
            ContentHash::combine(&l[0], &l[1])
        );
    }

    #[test]
    fn test_odd_leaf_promoted() {
        let l = leaves(3);
        let expected = ContentHash::combine(&ContentHash::combine(&l[0], &l[1]), &l[2]);
        assert_eq!(Blake3HashTree.build_root(&l).unwrap(), expected);
    }

    #[test]
    fn test_five_leaves() {
        let l = leaves(5);
        let ab = ContentHash::combine(&l[0], &l[1]);
        let cd = ContentHash::combine(&l[2], &l[3]);
        let abcd = ContentHash::combine(&ab, &cd);
        let expected = ContentHash::combine(&abcd, &l[4]);
        assert_eq!(Blake3HashTree.build_root(&l).unwrap(), expected);
    }

    #[test]
    fn test_order_matters() {
        let mut l = leaves(4);
        let root = Blake3HashTree.build_root(&l).unwrap();
        l.swap(0, 3);
        assert_ne!(Blake3HashTree.build_root(&l).unwrap(), root);
    }

    #[test]
    fn test_root_id_hex_is_64_chars() {
        let root = Blake3HashTree.root_id(&leaves(3)).unwrap();
        assert_eq!(root.to_hex().len(), 64);
    }

    proptest! {
        #[test]
        fn prop_root_is_deterministic(seeds in proptest::collection::vec(any::<u64>(), 1..40)) {
            let l: Vec<ContentHash> = seeds
                .iter()
                .map(|s| ContentHash::compute(&s.to_le_bytes()))
                .collect();
            let first = Blake3HashTree.build_root(&l).unwrap();
            let second = Blake3HashTree.build_root(&l.clone()).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
