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

use crate::{
    blocks::{transaction_merkle_root, Block, BlockHeader, RawBlockHeader},
    consensus::{ConsensusFeature, ConsensusManager},
    proof_of_work::{FishHashFactory, Target},
    transactions::Transaction,
};

const GENESIS_NOTE_DOMAIN: &[u8] = b"IronFish Genesis Note";
const GENESIS_NOTES_ROOT_DOMAIN: &[u8] = b"IronFish Genesis Notes Root";

/// Builds the deterministic genesis block for a network. The genesis block is trusted at
/// bootstrap: it is never validated against the proof-of-work or retarget rules, and its work is
/// its own target difficulty.
pub fn create_genesis_block(rules: &ConsensusManager, pow: &FishHashFactory) -> Block {
    let constants = rules.consensus_constants();

    let note = domain_hash(GENESIS_NOTE_DOMAIN, &constants.genesis_graffiti());
    let miners_fee = -(rules.mining_reward(1) as i64);
    let transaction = Transaction::miners_fee(miners_fee, vec![note]);

    let note_commitment = domain_hash(GENESIS_NOTES_ROOT_DOMAIN, note.as_slice());
    let transaction_commitment = transaction_merkle_root(&[transaction.hash()]);

    let state_commitment = if constants.is_active(ConsensusFeature::EvmDescriptions, 1) {
        Some(BlockHash::zero())
    } else {
        None
    };

    let raw = RawBlockHeader {
        sequence: 1,
        previous_block_hash: BlockHash::zero(),
        note_commitment,
        transaction_commitment,
        target: Target::max_target(),
        randomness: 0,
        timestamp_ms: constants.genesis_timestamp_ms(),
        graffiti: constants.genesis_graffiti(),
        state_commitment,
    };
    let header = BlockHeader::new(raw, 1, 0, miners_fee, rules, pow);
    Block::new(header, vec![transaction])
}

fn domain_hash(domain: &[u8], data: &[u8]) -> BlockHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(data);
    BlockHash::from(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_rules;

    #[test]
    fn it_is_deterministic() {
        let rules = create_test_rules();
        let pow = FishHashFactory::default();
        let a = create_genesis_block(&rules, &pow);
        let b = create_genesis_block(&rules, &pow);
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a, b);
    }

    #[test]
    fn it_starts_the_chain_at_sequence_one() {
        let rules = create_test_rules();
        let genesis = create_genesis_block(&rules, &FishHashFactory::default());
        assert_eq!(genesis.sequence(), 1);
        assert_eq!(genesis.header().previous_block_hash(), BlockHash::zero());
        assert!(genesis.miners_fee_transaction().is_miners_fee());
        assert_eq!(
            genesis.miners_fee_transaction().fee(),
            -(rules.mining_reward(1) as i64)
        );
        assert_eq!(genesis.header().note_size(), 1);
        assert_eq!(genesis.header().nullifier_size(), 0);
    }
}
