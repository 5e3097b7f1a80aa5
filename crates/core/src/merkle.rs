//! Merkle commitment over transaction hashes.
//!
//! The generator uses it to commit to a mempool range, and every peer runs
//! the same reduction over its own copy of that range to verify the claim.

use crate::hash::{hash_concat, Hash};
use crate::transaction::Transaction;
use thiserror::Error;

/// Errors that can occur when computing a merkle root.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot compute a merkle root over an empty transaction set")]
    EmptyTransactionSet,
}

/// Map each transaction to its hash, preserving order.
pub fn leaf_hashes(transactions: &[Transaction]) -> Vec<Hash> {
    transactions.iter().map(|tx| tx.compute_hash()).collect()
}

/// Hash two nodes together.
///
/// Both inputs are byte-reversed before hashing and the digest is reversed
/// again afterwards, matching the byte order the network has always used.
pub fn combine(left: &Hash, right: &Hash) -> Hash {
    let left = left.reversed();
    let right = right.reversed();
    hash_concat(&[left.as_ref(), right.as_ref()]).reversed()
}

/// Compute the merkle root of a list of hashes.
///
/// Hashes are combined pairwise in order; an odd trailing hash is paired
/// with itself. Reduction stops when a single hash remains.
pub fn merkle_root(hashes: &[Hash]) -> Result<Hash, MerkleError> {
    if hashes.is_empty() {
        return Err(MerkleError::EmptyTransactionSet);
    }
    Ok(reduce(hashes.to_vec()))
}

fn reduce(level: Vec<Hash>) -> Hash {
    if level.len() == 1 {
        return level[0];
    }

    let next = level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => combine(left, right),
            [last] => combine(last, last),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect();

    reduce(next)
}

/// Merkle root of a transaction sequence.
pub fn transactions_root(transactions: &[Transaction]) -> Result<Hash, MerkleError> {
    merkle_root(&leaf_hashes(transactions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;
    use crate::transaction::{Operation, OperationResult};

    fn make_hashes(n: usize) -> Vec<Hash> {
        (0..n).map(|i| hash(&[i as u8])).collect()
    }

    #[test]
    fn test_merkle_root_empty() {
        assert_eq!(merkle_root(&[]), Err(MerkleError::EmptyTransactionSet));
    }

    #[test]
    fn test_merkle_root_single() {
        let hashes = make_hashes(1);
        assert_eq!(merkle_root(&hashes).unwrap(), hashes[0]);
    }

    #[test]
    fn test_merkle_root_two() {
        let hashes = make_hashes(2);
        let expected = combine(&hashes[0], &hashes[1]);
        assert_eq!(merkle_root(&hashes).unwrap(), expected);
    }

    #[test]
    fn test_merkle_root_odd_duplicates_last() {
        let h = make_hashes(3);
        let expected = combine(&combine(&h[0], &h[1]), &combine(&h[2], &h[2]));
        assert_eq!(merkle_root(&h).unwrap(), expected);
    }

    #[test]
    fn test_merkle_root_five() {
        let h = make_hashes(5);
        let l1 = [
            combine(&h[0], &h[1]),
            combine(&h[2], &h[3]),
            combine(&h[4], &h[4]),
        ];
        let l2 = [combine(&l1[0], &l1[1]), combine(&l1[2], &l1[2])];
        assert_eq!(merkle_root(&h).unwrap(), combine(&l2[0], &l2[1]));
    }

    #[test]
    fn test_combine_reverses_bytes() {
        let a = hash(b"a");
        let b = hash(b"b");
        let expected = hash_concat(&[a.reversed().as_ref(), b.reversed().as_ref()]).reversed();
        assert_eq!(combine(&a, &b), expected);
        assert_ne!(combine(&a, &b), hash_concat(&[a.as_ref(), b.as_ref()]));
    }

    #[test]
    fn test_merkle_root_deterministic() {
        let hashes = make_hashes(10);
        assert_eq!(merkle_root(&hashes), merkle_root(&hashes));
    }

    #[test]
    fn test_merkle_root_order_matters() {
        let hashes = make_hashes(4);
        let mut reversed = hashes.clone();
        reversed.reverse();
        assert_ne!(merkle_root(&hashes), merkle_root(&reversed));
    }

    #[test]
    fn test_transactions_root_uses_content_not_identity() {
        let tx = Transaction::new(
            "gen",
            Operation::Query {
                name: "alice".into(),
            },
            OperationResult::failure("Name not found."),
        );
        let copy = tx.clone();
        assert_eq!(
            transactions_root(&[tx.clone(), tx]).unwrap(),
            transactions_root(&[copy.clone(), copy]).unwrap()
        );
    }
}
