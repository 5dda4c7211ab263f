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

use std::fmt::{Display, Formatter};

use ironfish_common_types::types::BlockHash;
use primitive_types::U256;

use crate::blocks::BlockHeader;

/// A header that has been linked to the genesis block, together with the cumulative work of its
/// chain. Only connected headers carry work; island headers have no meaningful work value until
/// their ancestry resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHeader {
    header: BlockHeader,
    work: U256,
}

impl ChainHeader {
    pub fn new(header: BlockHeader, work: U256) -> Self {
        Self { header, work }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn into_header(self) -> BlockHeader {
        self.header
    }

    /// Cumulative difficulty from genesis up to and including this block.
    pub fn work(&self) -> U256 {
        self.work
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence()
    }
}

impl Display for ChainHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (work {})", self.header, self.work)
    }
}

/// The fork-choice total order. `a` is heavier than `b` iff it has strictly more cumulative
/// work, with ties broken by larger sequence, then larger target difficulty, then smaller hash.
/// For any two distinct headers exactly one direction holds.
pub fn is_heavier(a: &ChainHeader, b: &ChainHeader) -> bool {
    if a.work() != b.work() {
        return a.work() > b.work();
    }
    if a.sequence() != b.sequence() {
        return a.sequence() > b.sequence();
    }
    let difficulty_a = a.header().target().to_difficulty();
    let difficulty_b = b.header().target().to_difficulty();
    if difficulty_a != difficulty_b {
        return difficulty_a > difficulty_b;
    }
    a.hash() < b.hash()
}

/// The gossip-recency total order, independent of fork choice: larger sequence wins, ties break
/// on smaller hash.
pub fn is_later(a: &BlockHeader, b: &BlockHeader) -> bool {
    if a.sequence() != b.sequence() {
        return a.sequence() > b.sequence();
    }
    a.hash() < b.hash()
}

#[cfg(test)]
mod tests {
    use rand::thread_rng;

    use super::*;
    use crate::{
        blocks::RawBlockHeader,
        proof_of_work::{FishHashFactory, Target},
        test_helpers::create_test_rules,
    };

    fn header(sequence: u32, randomness: u64, work: u64) -> ChainHeader {
        let mut rng = thread_rng();
        let raw = RawBlockHeader {
            sequence,
            previous_block_hash: BlockHash::random(&mut rng),
            note_commitment: BlockHash::random(&mut rng),
            transaction_commitment: BlockHash::random(&mut rng),
            target: Target::max_target(),
            randomness,
            timestamp_ms: 0,
            graffiti: [0u8; 32],
            state_commitment: None,
        };
        let header = BlockHeader::new(raw, 0, 0, 0, &create_test_rules(), &FishHashFactory::default());
        ChainHeader::new(header, U256::from(work))
    }

    #[test]
    fn it_prefers_more_work() {
        let a = header(5, 0, 100);
        let b = header(50, 0, 99);
        assert!(is_heavier(&a, &b));
        assert!(!is_heavier(&b, &a));
    }

    #[test]
    fn it_breaks_work_ties_on_sequence_then_hash() {
        let a = header(6, 0, 100);
        let b = header(5, 0, 100);
        assert!(is_heavier(&a, &b));

        let c = header(5, 1, 100);
        let d = header(5, 2, 100);
        // same work, sequence and difficulty: smaller hash wins
        assert_eq!(is_heavier(&c, &d), c.hash() < d.hash());
    }

    #[test]
    fn it_is_a_total_order_on_distinct_headers() {
        let headers: Vec<_> = (0..16u64).map(|i| header(3, i, 50)).collect();
        for a in &headers {
            assert!(!is_heavier(a, a));
            for b in &headers {
                if a.hash() != b.hash() {
                    assert!(is_heavier(a, b) ^ is_heavier(b, a));
                }
            }
        }
    }

    #[test]
    fn it_orders_recency_by_sequence_then_hash() {
        let a = header(9, 0, 0);
        let b = header(8, 0, 0);
        assert!(is_later(a.header(), b.header()));
        let c = header(8, 1, 0);
        assert_eq!(is_later(b.header(), c.header()), b.hash() < c.hash());
    }
}
