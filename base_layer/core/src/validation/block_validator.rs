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

use std::{
    collections::HashSet,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use ironfish_common_types::types::Nullifier;
use log::*;

use crate::{
    blocks::{Block, ChainHeader, GRAFFITI_SIZE},
    consensus::{ConsensusFeature, ConsensusManager},
    proof_of_work::{calculate_target, FishHashFactory},
    transactions::TransactionVerifier,
    validation::{NoteTreesService, ValidationError},
};

const LOG_TARGET: &str = "c::val::block_validator";

/// Local-clock slack allowed in both directions: a block may be at most this far in the future,
/// and at most this far before its parent.
pub const TIMESTAMP_SLACK_MS: u64 = 15_000;

/// Validates one candidate block against its parent and the chain state.
///
/// The checks run strictly in order — structural, proof of work, target, miners' fee,
/// transaction proofs, tree continuity, spend uniqueness, state commitment — and stop at the
/// first failure. Every returned reason is fatal for the block.
pub struct BlockValidator {
    rules: ConsensusManager,
    pow: FishHashFactory,
    trees: Arc<dyn NoteTreesService>,
    transaction_verifier: Arc<dyn TransactionVerifier + Send + Sync>,
}

impl BlockValidator {
    pub fn new(
        rules: ConsensusManager,
        pow: FishHashFactory,
        trees: Arc<dyn NoteTreesService>,
        transaction_verifier: Arc<dyn TransactionVerifier + Send + Sync>,
    ) -> Self {
        Self {
            rules,
            pow,
            trees,
            transaction_verifier,
        }
    }

    pub async fn verify_block(&self, block: &Block, parent: &ChainHeader) -> Result<(), ValidationError> {
        self.verify_block_at(block, parent, now_ms()).await
    }

    /// As [`verify_block`](Self::verify_block), with an explicit notion of "now" for the clock
    /// checks.
    pub async fn verify_block_at(
        &self,
        block: &Block,
        parent: &ChainHeader,
        now_ms: u64,
    ) -> Result<(), ValidationError> {
        self.check_structural(block, parent, now_ms)?;
        self.check_proof_of_work(block)?;
        self.check_target(block, parent)?;
        self.check_miners_fee(block)?;
        self.check_transaction_proofs(block).await?;
        self.check_tree_continuity(block, parent)?;
        self.check_spends(block)?;
        self.check_state_commitment(block)?;
        Ok(())
    }

    fn check_structural(&self, block: &Block, parent: &ChainHeader, now_ms: u64) -> Result<(), ValidationError> {
        let header = block.header();
        if header.graffiti().len() != GRAFFITI_SIZE {
            return Err(ValidationError::Graffiti);
        }
        if header.sequence() != parent.sequence() + 1 {
            return Err(ValidationError::SequenceOutOfOrder {
                parent: parent.sequence(),
                got: header.sequence(),
            });
        }
        if header.timestamp_ms() > now_ms + TIMESTAMP_SLACK_MS {
            return Err(ValidationError::TooFarInFuture);
        }
        let oldest_allowed = parent.header().timestamp_ms().saturating_sub(TIMESTAMP_SLACK_MS);
        if header.timestamp_ms() < oldest_allowed {
            return Err(ValidationError::BlockTooOld);
        }
        Ok(())
    }

    fn check_proof_of_work(&self, block: &Block) -> Result<(), ValidationError> {
        let header = block.header();
        let hash = header.raw().compute_hash(&self.rules, &self.pow);
        if !header.target().meets(hash.to_u256()) {
            debug!(
                target: LOG_TARGET,
                "Block {} does not meet its target {}",
                header,
                header.target()
            );
            return Err(ValidationError::HashNotMeetTarget);
        }
        Ok(())
    }

    fn check_target(&self, block: &Block, parent: &ChainHeader) -> Result<(), ValidationError> {
        let constants = self.rules.consensus_constants();
        let expected = calculate_target(
            block.header().timestamp_ms(),
            parent.header().timestamp_ms(),
            parent.header().target().to_difficulty(),
            constants.target_block_time_secs(),
            constants.target_bucket_time_secs(),
        );
        if block.header().target() != expected {
            return Err(ValidationError::InvalidTarget);
        }
        Ok(())
    }

    fn check_miners_fee(&self, block: &Block) -> Result<(), ValidationError> {
        let miners_fee_tx = block.miners_fee_transaction();
        if !miners_fee_tx.is_miners_fee() {
            return Err(ValidationError::InvalidMinersFee(
                "the first transaction is not a miners' fee".to_string(),
            ));
        }
        if !miners_fee_tx.spends().is_empty() {
            return Err(ValidationError::InvalidMinersFee(
                "the miners' fee transaction spends notes".to_string(),
            ));
        }
        if miners_fee_tx.notes().is_empty() {
            return Err(ValidationError::InvalidMinersFee(
                "the miners' fee transaction mints no output".to_string(),
            ));
        }
        if block.transactions()[1..].iter().any(|tx| tx.is_miners_fee()) {
            return Err(ValidationError::InvalidMinersFee(
                "more than one miners' fee transaction".to_string(),
            ));
        }

        let reward = self.rules.mining_reward(block.sequence()) as i128;
        let fees: i128 = block.transactions()[1..].iter().map(|tx| i128::from(tx.fee())).sum();
        let expected = -(reward + fees);
        if i128::from(miners_fee_tx.fee()) != expected {
            return Err(ValidationError::InvalidMinersFee(format!(
                "expected {}, got {}",
                expected,
                miners_fee_tx.fee()
            )));
        }
        if block.header().miners_fee() != miners_fee_tx.fee() {
            return Err(ValidationError::InvalidMinersFee(
                "header fee does not match the miners' fee transaction".to_string(),
            ));
        }
        Ok(())
    }

    async fn check_transaction_proofs(&self, block: &Block) -> Result<(), ValidationError> {
        self.transaction_verifier
            .verify_batch(&block.transactions()[1..])
            .await
            .map_err(|err| {
                // the reported index skips the miners' fee transaction
                match ValidationError::from(err) {
                    ValidationError::InvalidTransactionProof { index } => {
                        ValidationError::InvalidTransactionProof { index: index + 1 }
                    },
                    other => other,
                }
            })
    }

    fn check_tree_continuity(&self, block: &Block, parent: &ChainHeader) -> Result<(), ValidationError> {
        let expected_notes = parent.header().note_size() + block.note_count();
        if block.header().note_size() != expected_notes {
            return Err(ValidationError::NoteCommitmentSize {
                expected: expected_notes,
                got: block.header().note_size(),
            });
        }
        let expected_nullifiers = parent.header().nullifier_size() + block.spend_count();
        if block.header().nullifier_size() != expected_nullifiers {
            return Err(ValidationError::NullifierCommitmentSize {
                expected: expected_nullifiers,
                got: block.header().nullifier_size(),
            });
        }
        Ok(())
    }

    /// Each spend must witness a root the notes tree really had, and reveal a nullifier unseen at
    /// the point just before it in this block. The sliding window
    /// `nullifier_size - spends_in_block + i` makes the block's own earlier spends visible to its
    /// later ones.
    fn check_spends(&self, block: &Block) -> Result<(), ValidationError> {
        let spends_in_block = block.spend_count();
        let nullifier_size = block.header().nullifier_size();
        let mut seen: HashSet<Nullifier> = HashSet::new();

        let mut index: u64 = 0;
        for transaction in block.transactions() {
            for spend in transaction.spends() {
                let past_root = self.trees.past_notes_root(spend.tree_size)?;
                if past_root != spend.commitment {
                    return Err(ValidationError::InvalidSpend { index: index as usize });
                }
                if !seen.insert(spend.nullifier) {
                    return Err(ValidationError::DuplicateNullifier);
                }
                let visible_size = nullifier_size - spends_in_block + index;
                if self.trees.contains_nullifier(&spend.nullifier, visible_size)? {
                    return Err(ValidationError::DuplicateNullifier);
                }
                index += 1;
            }
        }
        Ok(())
    }

    fn check_state_commitment(&self, block: &Block) -> Result<(), ValidationError> {
        if !self
            .rules
            .is_active(ConsensusFeature::EvmDescriptions, block.sequence())
        {
            return Ok(());
        }
        let declared = block
            .header()
            .state_commitment()
            .ok_or(ValidationError::MissingStateCommitment)?;
        let computed = self
            .trees
            .state_root_after(block)?
            .ok_or(ValidationError::MissingStateCommitment)?;
        if declared != computed {
            return Err(ValidationError::MissingStateCommitment);
        }
        Ok(())
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        consensus::ActivationSequence,
        proof_of_work::Target,
        test_helpers::{create_test_chain, rejecting_verifier, rules_with_fish_hash_at, TestChain},
    };
    use ironfish_common_types::types::BlockHash;
    use primitive_types::U256;

    async fn chain_of_three() -> TestChain {
        create_test_chain(3).await
    }

    #[tokio::test]
    async fn it_accepts_every_block_of_a_synthetic_chain() {
        let chain = create_test_chain(5).await;
        for i in 1..chain.blocks.len() {
            let parent = chain.chain_header(i - 1);
            chain
                .validator()
                .verify_block_at(&chain.blocks[i], &parent, chain.blocks[i].header().timestamp_ms())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn it_rejects_a_sequence_gap() {
        let chain = chain_of_three().await;
        let parent = chain.chain_header(0);
        let err = chain
            .validator()
            .verify_block_at(&chain.blocks[2], &parent, u64::MAX / 2)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::SequenceOutOfOrder { .. }));
    }

    #[tokio::test]
    async fn it_rejects_a_timestamp_from_the_future() {
        let chain = chain_of_three().await;
        let parent = chain.chain_header(1);
        let block = &chain.blocks[2];
        let now = block.header().timestamp_ms() - TIMESTAMP_SLACK_MS - 1;
        let err = chain.validator().verify_block_at(block, &parent, now).await.unwrap_err();
        assert_eq!(err, ValidationError::TooFarInFuture);
    }

    #[tokio::test]
    async fn it_rejects_a_timestamp_far_before_the_parent() {
        let chain = chain_of_three().await;
        let parent = chain.chain_header(1);
        let block = chain.block_with_timestamp(&parent, parent.header().timestamp_ms() - TIMESTAMP_SLACK_MS - 1);
        let err = chain
            .validator()
            .verify_block_at(&block, &parent, block.header().timestamp_ms() + 1_000_000)
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::BlockTooOld);
    }

    #[tokio::test]
    async fn it_rejects_a_wrong_target() {
        let chain = chain_of_three().await;
        let parent = chain.chain_header(1);
        let block = chain.block_with_target(&parent, Target::from_u256(U256::MAX));
        let err = chain
            .validator()
            .verify_block_at(&block, &parent, block.header().timestamp_ms())
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidTarget);
    }

    #[tokio::test]
    async fn it_rejects_a_wrong_miners_fee() {
        let chain = chain_of_three().await;
        let parent = chain.chain_header(1);
        let block = chain.block_with_wrong_miners_fee(&parent);
        let err = chain
            .validator()
            .verify_block_at(&block, &parent, block.header().timestamp_ms())
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidMinersFee(_)));
    }

    #[tokio::test]
    async fn it_rejects_an_invalid_transaction_proof() {
        let chain = chain_of_three().await;
        let parent = chain.chain_header(1);
        let (block, _) = chain.valid_block_with_payment(&parent);
        let validator = chain.validator_with_transactions(rejecting_verifier());
        let err = validator
            .verify_block_at(&block, &parent, block.header().timestamp_ms())
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTransactionProof { .. }));
    }

    #[tokio::test]
    async fn it_rejects_a_note_size_discontinuity() {
        let chain = chain_of_three().await;
        let parent = chain.chain_header(1);
        let block = chain.block_with_note_size(&parent, parent.header().note_size() + 100);
        let err = chain
            .validator()
            .verify_block_at(&block, &parent, block.header().timestamp_ms())
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::NoteCommitmentSize { .. }));
    }

    #[tokio::test]
    async fn it_rejects_a_duplicate_nullifier_within_one_block() {
        let chain = chain_of_three().await;
        let parent = chain.chain_header(1);
        let block = chain.block_with_duplicate_nullifier(&parent);
        let err = chain
            .validator()
            .verify_block_at(&block, &parent, block.header().timestamp_ms())
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::DuplicateNullifier);
    }

    #[tokio::test]
    async fn it_sees_spends_from_earlier_blocks() {
        let mut chain = create_test_chain(2).await;
        let parent = chain.head();
        let (payment_block, nullifier) = chain.valid_block_with_payment(&parent);
        chain.apply(payment_block);

        let parent = chain.head();
        let block = chain.block_spending_nullifier(&parent, nullifier);
        let err = chain
            .validator()
            .verify_block_at(&block, &parent, block.header().timestamp_ms())
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::DuplicateNullifier);
    }

    #[tokio::test]
    async fn it_accepts_only_fish_hash_blocks_after_the_activation() {
        // blocks from sequence 2 hash with FishHash and its reordered preimage
        let mut chain = TestChain::new(rules_with_fish_hash_at(ActivationSequence::AtSequence(2)));
        let parent = chain.head();
        let block = chain.next_block(&parent);
        chain.apply(block.clone());
        chain
            .validator()
            .verify_block_at(&block, &chain.chain_header(0), block.header().timestamp_ms())
            .await
            .unwrap();

        // the same chain mined under the BLAKE3 rules does not carry FishHash proof of work
        let blake3_chain = create_test_chain(2).await;
        let stale = &blake3_chain.blocks[1];
        let err = chain
            .validator()
            .verify_block_at(stale, &chain.chain_header(0), stale.header().timestamp_ms())
            .await
            .unwrap_err();
        assert_eq!(err, ValidationError::HashNotMeetTarget);
    }

    #[tokio::test]
    async fn it_rejects_a_spend_with_an_unknown_root() {
        let chain = chain_of_three().await;
        let parent = chain.chain_header(1);
        let block = chain.block_with_bad_spend_root(&parent, BlockHash::from([9u8; 32]));
        let err = chain
            .validator()
            .verify_block_at(&block, &parent, block.header().timestamp_ms())
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidSpend { .. }));
    }
}
