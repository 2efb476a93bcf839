//! Merkle aggregation over entry digests.
//!
//! A batch's root summarizes the ordered digest sequence of its entries.
//! The reduction pairs adjacent digests left to right and hashes each
//! concatenated pair; an odd-length level duplicates its last digest to
//! complete the final pair. The rule applies at every level, including a
//! single-digest input, so `root([d])` is `sha256(d || d)` rather than `d`.
//!
//! The function is order-sensitive: permuting the input changes the root.
//! Batches therefore feed digests in admission order, and verification
//! replays the same order.

use sha2::{Digest as Sha2Digest, Sha256};

use crate::hash::Digest;

/// Compute the Merkle root of an ordered digest sequence.
///
/// Empty input yields the zero digest.
#[must_use]
pub fn merkle_root(digests: &[Digest]) -> Digest {
    if digests.is_empty() {
        return Digest::zero();
    }

    let mut level: Vec<Digest> = digests.to_vec();
    loop {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut i = 0;
        while i < level.len() {
            let left = level[i];
            // Odd level: the last digest pairs with itself.
            let right = if i + 1 < level.len() { level[i + 1] } else { left };
            next.push(combine(&left, &right));
            i += 2;
        }
        if next.len() == 1 {
            return next[0];
        }
        level = next;
    }
}

/// One step of an audit path: the sibling digest and which side the
/// running hash sits on when combining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofStep {
    /// Digest combined with the running hash at this level.
    pub sibling: Digest,
    /// True when the running hash is the left operand.
    pub left_operand: bool,
}

/// Build the audit path for the digest at `index`.
///
/// Returns `None` when `index` is out of bounds. The path is consistent
/// with the duplicate-last padding rule, so a single-digest sequence
/// produces a one-step path whose sibling is the digest itself.
#[must_use]
pub fn merkle_proof(digests: &[Digest], index: usize) -> Option<Vec<ProofStep>> {
    if index >= digests.len() {
        return None;
    }

    let mut level: Vec<Digest> = digests.to_vec();
    let mut idx = index;
    let mut proof = Vec::new();

    loop {
        let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
        let sibling = if sibling_idx < level.len() {
            level[sibling_idx]
        } else {
            level[idx]
        };
        proof.push(ProofStep {
            sibling,
            left_operand: idx % 2 == 0,
        });

        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut i = 0;
        while i < level.len() {
            let left = level[i];
            let right = if i + 1 < level.len() { level[i + 1] } else { left };
            next.push(combine(&left, &right));
            i += 2;
        }
        if next.len() == 1 {
            return Some(proof);
        }
        level = next;
        idx /= 2;
    }
}

/// Replay an audit path from a leaf digest and compare against a root.
#[must_use]
pub fn verify_proof(leaf: Digest, proof: &[ProofStep], root: Digest) -> bool {
    let mut acc = leaf;
    for step in proof {
        acc = if step.left_operand {
            combine(&acc, &step.sibling)
        } else {
            combine(&step.sibling, &acc)
        };
    }
    acc == root
}

fn combine(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Digest::from_bytes(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(byte: u8) -> Digest {
        Digest::from_bytes([byte; 32])
    }

    #[test]
    fn test_empty_root_is_zero() {
        assert!(merkle_root(&[]).is_zero());
    }

    #[test]
    fn test_single_digest_is_self_paired() {
        let leaf = d(7);
        assert_eq!(merkle_root(&[leaf]), combine(&leaf, &leaf));
        assert_ne!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn test_root_reproducible() {
        let digests = vec![d(1), d(2), d(3), d(4), d(5)];
        assert_eq!(merkle_root(&digests), merkle_root(&digests));
    }

    #[test]
    fn test_root_order_sensitive() {
        let forward = vec![d(1), d(2)];
        let reversed = vec![d(2), d(1)];
        assert_ne!(merkle_root(&forward), merkle_root(&reversed));
    }

    #[test]
    fn test_odd_count_duplicates_last() {
        // Three leaves reduce as [h(1,2), h(3,3)] then one final combine.
        let root = merkle_root(&[d(1), d(2), d(3)]);
        let expected = combine(&combine(&d(1), &d(2)), &combine(&d(3), &d(3)));
        assert_eq!(root, expected);
    }

    #[test]
    fn test_power_of_two_reduction() {
        let root = merkle_root(&[d(1), d(2), d(3), d(4)]);
        let expected = combine(&combine(&d(1), &d(2)), &combine(&d(3), &d(4)));
        assert_eq!(root, expected);
    }

    #[test]
    fn test_proof_out_of_bounds() {
        assert!(merkle_proof(&[d(1)], 1).is_none());
        assert!(merkle_proof(&[], 0).is_none());
    }

    #[test]
    fn test_proof_single_leaf() {
        let leaf = d(9);
        let proof = merkle_proof(&[leaf], 0).unwrap();
        assert_eq!(proof.len(), 1);
        assert!(verify_proof(leaf, &proof, merkle_root(&[leaf])));
    }

    #[test]
    fn test_proof_every_index_verifies() {
        let digests: Vec<Digest> = (0u8..7).map(d).collect();
        let root = merkle_root(&digests);
        for (i, leaf) in digests.iter().enumerate() {
            let proof = merkle_proof(&digests, i).unwrap();
            assert!(verify_proof(*leaf, &proof, root), "index {i}");
        }
    }

    #[test]
    fn test_proof_rejects_wrong_leaf() {
        let digests = vec![d(1), d(2), d(3), d(4)];
        let root = merkle_root(&digests);
        let proof = merkle_proof(&digests, 0).unwrap();
        assert!(!verify_proof(d(2), &proof, root));
    }

    proptest! {
        #[test]
        fn prop_root_deterministic(bytes in prop::collection::vec(any::<u8>(), 1..64)) {
            let digests: Vec<Digest> = bytes.iter().map(|b| d(*b)).collect();
            prop_assert_eq!(merkle_root(&digests), merkle_root(&digests));
        }

        #[test]
        fn prop_reverse_changes_root(bytes in prop::collection::vec(any::<u8>(), 2..64)) {
            let digests: Vec<Digest> = bytes.iter().map(|b| d(*b)).collect();
            let mut reversed = digests.clone();
            reversed.reverse();
            // Only meaningful when the sequence is not a palindrome.
            if digests != reversed {
                prop_assert_ne!(merkle_root(&digests), merkle_root(&reversed));
            }
        }

        #[test]
        fn prop_proofs_verify(
            bytes in prop::collection::vec(any::<u8>(), 1..32),
            index in any::<prop::sample::Index>(),
        ) {
            let digests: Vec<Digest> = bytes.iter().map(|b| d(*b)).collect();
            let i = index.index(digests.len());
            let root = merkle_root(&digests);
            let proof = merkle_proof(&digests, i).unwrap();
            prop_assert!(verify_proof(digests[i], &proof, root));
        }
    }
}
