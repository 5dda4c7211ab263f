// Copyright 2023. The Iron Fish Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use ironfish_common_types::types::BlockHash;

/// The hash domain of the transaction Merkle tree. Each level appends its one-byte index so that
/// a node at one depth can never be replayed at another.
const TRANSACTION_ROOT_PERSONALIZATION: &[u8] = b"IronFish Transaction Root";

/// The stand-in for a missing sibling. Every level is padded to a full binary pairing with this
/// node.
pub const NULL_NODE: [u8; 32] = [0u8; 32];

/// The Merkle root over a block's ordered transaction hashes.
///
/// The tree is full-binary with depth `ceil(log2(n))`: every level pads a missing right sibling
/// with [`NULL_NODE`], so the root over `n` hashes equals the root over the same hashes padded
/// with NULL leaves to a power of two at each level. An empty list hashes the bare
/// personalization.
pub fn transaction_merkle_root(hashes: &[BlockHash]) -> BlockHash {
    if hashes.is_empty() {
        return BlockHash::from(*blake3::hash(TRANSACTION_ROOT_PERSONALIZATION).as_bytes());
    }

    let mut current: Vec<BlockHash> = hashes.to_vec();
    let mut level = 0u8;
    loop {
        let mut next = Vec::with_capacity(current.len().div_ceil(2));
        for pair in current.chunks(2) {
            let left = pair[0];
            let right = pair.get(1).copied().unwrap_or_else(|| BlockHash::from(NULL_NODE));
            next.push(combine(level, &left, &right));
        }
        level = level.wrapping_add(1);
        current = next;
        if current.len() == 1 {
            return current[0];
        }
    }
}

fn combine(level: u8, left: &BlockHash, right: &BlockHash) -> BlockHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(TRANSACTION_ROOT_PERSONALIZATION);
    hasher.update(&[level]);
    hasher.update(left.as_slice());
    hasher.update(right.as_slice());
    BlockHash::from(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use rand::thread_rng;

    use super::*;

    fn random_hashes(n: usize) -> Vec<BlockHash> {
        let mut rng = thread_rng();
        (0..n).map(|_| BlockHash::random(&mut rng)).collect()
    }

    #[test]
    fn it_hashes_the_personalization_for_an_empty_block() {
        assert_eq!(
            transaction_merkle_root(&[]),
            BlockHash::from(*blake3::hash(TRANSACTION_ROOT_PERSONALIZATION).as_bytes())
        );
    }

    #[test]
    fn it_pads_a_single_leaf_with_the_null_node() {
        let leaf = random_hashes(1)[0];
        assert_eq!(
            transaction_merkle_root(&[leaf]),
            combine(0, &leaf, &BlockHash::from(NULL_NODE))
        );
    }

    #[test]
    fn it_combines_two_leaves_at_level_zero() {
        let hashes = random_hashes(2);
        assert_eq!(transaction_merkle_root(&hashes), combine(0, &hashes[0], &hashes[1]));
    }

    #[test]
    fn it_builds_a_full_binary_tree_over_eleven_leaves() {
        let hashes = random_hashes(11);
        let null = BlockHash::from(NULL_NODE);

        // level 0: six nodes, the twelfth leaf is NULL
        let level0: Vec<BlockHash> = hashes.chunks(2).map(|p| combine(0, &p[0], p.get(1).unwrap_or(&null))).collect();
        assert_eq!(level0.len(), 6);
        // levels 1..3 pad their odd tails the same way
        let level1: Vec<BlockHash> = level0.chunks(2).map(|p| combine(1, &p[0], p.get(1).unwrap_or(&null))).collect();
        let level2: Vec<BlockHash> = level1.chunks(2).map(|p| combine(2, &p[0], p.get(1).unwrap_or(&null))).collect();
        let root = combine(3, &level2[0], &level2[1]);

        assert_eq!(transaction_merkle_root(&hashes), root);
    }

    #[test]
    fn it_equals_the_root_of_the_null_padded_tree() {
        let hashes = random_hashes(11);
        let mut padded = hashes.clone();
        padded.push(BlockHash::from(NULL_NODE));
        assert_eq!(transaction_merkle_root(&hashes), transaction_merkle_root(&padded));
    }

    #[test]
    fn it_is_ordering_sensitive() {
        let mut hashes = random_hashes(4);
        let root = transaction_merkle_root(&hashes);
        hashes.swap(0, 1);
        assert_ne!(transaction_merkle_root(&hashes), root);
    }
}
