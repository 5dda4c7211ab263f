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

//! Shared builders for chain-core tests: a deterministic mined-block factory, a recording notes
//! tree double and canned transaction verifiers.

use std::{
    collections::HashMap,
    sync::{atomic::AtomicBool, Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use ironfish_common_types::types::{BlockHash, Nullifier};
use primitive_types::U256;

use crate::{
    base_node::{BlockNetwork, BlockRequest, BlocksResponse, PeerId, SyncError},
    blocks::{create_genesis_block, transaction_merkle_root, Block, BlockHeader, ChainHeader, RawBlockHeader},
    chain_storage::{BlockchainDatabase, MemoryDatabase},
    consensus::{ActivationSequence, ConsensusConstants, ConsensusFeature, ConsensusManager},
    proof_of_work::{calculate_target, mine_header_batch, FishHashFactory, Target},
    transactions::{Spend, Transaction, TransactionVerifier, WorkerPoolVerifier},
    validation::{BlockValidator, NoteTreesService, TreesError},
};

pub fn create_test_rules() -> ConsensusManager {
    ConsensusManager::new(ConsensusConstants::mainnet())
}

pub fn rules_with_fish_hash_at(activation: ActivationSequence) -> ConsensusManager {
    ConsensusManager::new(ConsensusConstants::mainnet().with_activation(ConsensusFeature::FishHash, activation))
}

pub fn accepting_verifier() -> Arc<dyn TransactionVerifier + Send + Sync> {
    Arc::new(WorkerPoolVerifier::new(|_: &Transaction| true))
}

pub fn rejecting_verifier() -> Arc<dyn TransactionVerifier + Send + Sync> {
    Arc::new(WorkerPoolVerifier::new(|_: &Transaction| false))
}

pub fn test_note(sequence: u32, index: u32) -> BlockHash {
    domain_hash(b"test note", &[sequence.to_le_bytes(), index.to_le_bytes()].concat())
}

pub fn test_nullifier(sequence: u32, index: u32) -> Nullifier {
    domain_hash(b"test nullifier", &[sequence.to_le_bytes(), index.to_le_bytes()].concat())
}

pub fn test_notes_root(size: u64) -> BlockHash {
    domain_hash(b"test notes root", &size.to_le_bytes())
}

fn domain_hash(domain: &[u8], data: &[u8]) -> BlockHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(data);
    BlockHash::from(*hasher.finalize().as_bytes())
}

/// A recording double for the external notes/nullifiers tree service.
#[derive(Default)]
pub struct RecordedNoteTrees {
    inner: Mutex<TreesInner>,
}

#[derive(Default)]
struct TreesInner {
    roots: HashMap<u64, BlockHash>,
    nullifiers: Vec<Nullifier>,
}

impl RecordedNoteTrees {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_root(&self, size: u64, root: BlockHash) {
        self.inner.lock().unwrap().roots.insert(size, root);
    }

    pub fn record_nullifier(&self, nullifier: Nullifier) {
        self.inner.lock().unwrap().nullifiers.push(nullifier);
    }

    pub fn root_at(&self, size: u64) -> Option<BlockHash> {
        self.inner.lock().unwrap().roots.get(&size).copied()
    }
}

impl NoteTreesService for RecordedNoteTrees {
    fn past_notes_root(&self, tree_size: u64) -> Result<BlockHash, TreesError> {
        self.root_at(tree_size).ok_or(TreesError::UnknownTreeSize(tree_size))
    }

    fn contains_nullifier(&self, nullifier: &Nullifier, tree_size: u64) -> Result<bool, TreesError> {
        let inner = self.inner.lock().unwrap();
        let visible = (tree_size as usize).min(inner.nullifiers.len());
        Ok(inner.nullifiers[..visible].contains(nullifier))
    }

    fn state_root_after(&self, _block: &Block) -> Result<Option<BlockHash>, TreesError> {
        Ok(None)
    }
}

/// Options for one synthetic block.
#[derive(Default)]
pub struct BlockSpec {
    timestamp_ms: Option<u64>,
    transactions: Vec<Transaction>,
    target: Option<Target>,
    note_size: Option<u64>,
    miners_fee: Option<i64>,
}

impl BlockSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timestamp_ms(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    pub fn with_transactions(mut self, transactions: Vec<Transaction>) -> Self {
        self.transactions = transactions;
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_note_size(mut self, note_size: u64) -> Self {
        self.note_size = Some(note_size);
        self
    }

    pub fn with_miners_fee(mut self, miners_fee: i64) -> Self {
        self.miners_fee = Some(miners_fee);
        self
    }
}

/// A deterministic chain of mined blocks plus the tree state the validator needs to accept them.
pub struct TestChain {
    pub rules: ConsensusManager,
    pub pow: FishHashFactory,
    pub trees: Arc<RecordedNoteTrees>,
    pub blocks: Vec<Block>,
    works: Vec<U256>,
}

/// Builds a chain of `length` blocks (including genesis), mining each one for real.
pub async fn create_test_chain(length: usize) -> TestChain {
    let mut chain = TestChain::new(create_test_rules());
    while chain.blocks.len() < length {
        let parent = chain.head();
        let block = chain.next_block(&parent);
        chain.apply(block);
    }
    chain
}

impl TestChain {
    pub fn new(rules: ConsensusManager) -> Self {
        let pow = FishHashFactory::default();
        let genesis = create_genesis_block(&rules, &pow);
        let trees = Arc::new(RecordedNoteTrees::new());
        trees.record_root(genesis.header().note_size(), genesis.header().note_commitment());
        let genesis_work = genesis.header().target().to_difficulty().as_u256();
        Self {
            rules,
            pow,
            trees,
            works: vec![genesis_work],
            blocks: vec![genesis],
        }
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn head(&self) -> ChainHeader {
        self.chain_header(self.blocks.len() - 1)
    }

    pub fn chain_header(&self, index: usize) -> ChainHeader {
        ChainHeader::new(self.blocks[index].header().clone(), self.works[index])
    }

    pub fn validator(&self) -> BlockValidator {
        self.validator_with_transactions(accepting_verifier())
    }

    pub fn validator_with_transactions(
        &self,
        transaction_verifier: Arc<dyn TransactionVerifier + Send + Sync>,
    ) -> BlockValidator {
        BlockValidator::new(
            self.rules.clone(),
            self.pow.clone(),
            self.trees.clone(),
            transaction_verifier,
        )
    }

    /// Appends a block previously produced by one of the builders, recording its tree state.
    pub fn apply(&mut self, block: Block) {
        self.trees
            .record_root(block.header().note_size(), block.header().note_commitment());
        for transaction in block.transactions() {
            for spend in transaction.spends() {
                self.trees.record_nullifier(spend.nullifier);
            }
        }
        let work = *self.works.last().expect("chain always has genesis")
            + block.header().target().to_difficulty().as_u256();
        self.works.push(work);
        self.blocks.push(block);
    }

    /// Builds and mines one block on the given parent.
    pub fn build_block(&self, parent: &ChainHeader, spec: BlockSpec) -> Block {
        let constants = self.rules.consensus_constants();
        let sequence = parent.sequence() + 1;
        let timestamp_ms = spec
            .timestamp_ms
            .unwrap_or(parent.header().timestamp_ms() + constants.target_block_time_secs() * 1000);
        let target = spec.target.unwrap_or_else(|| {
            calculate_target(
                timestamp_ms,
                parent.header().timestamp_ms(),
                parent.header().target().to_difficulty(),
                constants.target_block_time_secs(),
                constants.target_bucket_time_secs(),
            )
        });

        let fees: i64 = spec.transactions.iter().map(|tx| tx.fee()).sum();
        let miners_fee = spec
            .miners_fee
            .unwrap_or(-(self.rules.mining_reward(sequence) as i64 + fees));
        let miner_transaction = Transaction::miners_fee(miners_fee, vec![test_note(sequence, 0)]);

        let mut transactions = vec![miner_transaction];
        transactions.extend(spec.transactions);

        let note_count: u64 = transactions.iter().map(|tx| tx.notes().len() as u64).sum();
        let spend_count: u64 = transactions.iter().map(|tx| tx.spends().len() as u64).sum();
        let note_size = spec.note_size.unwrap_or(parent.header().note_size() + note_count);
        let nullifier_size = parent.header().nullifier_size() + spend_count;

        let transaction_hashes: Vec<BlockHash> = transactions.iter().map(|tx| tx.hash()).collect();
        let mut raw = RawBlockHeader {
            sequence,
            previous_block_hash: parent.hash(),
            note_commitment: test_notes_root(note_size),
            transaction_commitment: transaction_merkle_root(&transaction_hashes),
            target,
            randomness: 0,
            timestamp_ms,
            graffiti: [0u8; 32],
            state_commitment: None,
        };
        let mined = mine_header_batch(&raw, &self.rules, &self.pow, 0, u64::MAX, &AtomicBool::new(false))
            .expect("an unbounded batch always finds a block");
        raw.randomness = mined.randomness;

        let header = BlockHeader::new(raw, note_size, nullifier_size, miners_fee, &self.rules, &self.pow);
        Block::new(header, transactions)
    }

    pub fn next_block(&self, parent: &ChainHeader) -> Block {
        self.build_block(parent, BlockSpec::new())
    }

    pub fn block_with_timestamp(&self, parent: &ChainHeader, timestamp_ms: u64) -> Block {
        self.build_block(parent, BlockSpec::new().with_timestamp_ms(timestamp_ms))
    }

    pub fn block_with_target(&self, parent: &ChainHeader, target: Target) -> Block {
        self.build_block(parent, BlockSpec::new().with_target(target))
    }

    pub fn block_with_note_size(&self, parent: &ChainHeader, note_size: u64) -> Block {
        self.build_block(parent, BlockSpec::new().with_note_size(note_size))
    }

    pub fn block_with_wrong_miners_fee(&self, parent: &ChainHeader) -> Block {
        let sequence = parent.sequence() + 1;
        let wrong_fee = -(self.rules.mining_reward(sequence) as i64) + 1;
        self.build_block(parent, BlockSpec::new().with_miners_fee(wrong_fee))
    }

    /// A fully valid block carrying one payment that spends a note witnessed at the genesis
    /// root. Returns the block and the revealed nullifier.
    pub fn valid_block_with_payment(&self, parent: &ChainHeader) -> (Block, Nullifier) {
        let sequence = parent.sequence() + 1;
        let nullifier = test_nullifier(sequence, 0);
        (self.block_spending_nullifier(parent, nullifier), nullifier)
    }

    pub fn block_spending_nullifier(&self, parent: &ChainHeader, nullifier: Nullifier) -> Block {
        let payment = self.payment_transaction(parent, vec![nullifier]);
        self.build_block(parent, BlockSpec::new().with_transactions(vec![payment]))
    }

    pub fn block_with_duplicate_nullifier(&self, parent: &ChainHeader) -> Block {
        let nullifier = test_nullifier(parent.sequence() + 1, 0);
        let payment = self.payment_transaction(parent, vec![nullifier, nullifier]);
        self.build_block(parent, BlockSpec::new().with_transactions(vec![payment]))
    }

    pub fn block_with_bad_spend_root(&self, parent: &ChainHeader, bad_root: BlockHash) -> Block {
        let sequence = parent.sequence() + 1;
        let spend = Spend {
            nullifier: test_nullifier(sequence, 0),
            commitment: bad_root,
            tree_size: self.genesis().header().note_size(),
        };
        let payment = Transaction::new(5, vec![test_note(sequence, 1)], vec![spend], vec![0xab]);
        self.build_block(parent, BlockSpec::new().with_transactions(vec![payment]))
    }

    fn payment_transaction(&self, parent: &ChainHeader, nullifiers: Vec<Nullifier>) -> Transaction {
        let sequence = parent.sequence() + 1;
        let witness_size = self.genesis().header().note_size();
        let witness_root = self
            .trees
            .root_at(witness_size)
            .expect("the genesis root is always recorded");
        let spends = nullifiers
            .into_iter()
            .map(|nullifier| Spend {
                nullifier,
                commitment: witness_root,
                tree_size: witness_size,
            })
            .collect();
        Transaction::new(5, vec![test_note(sequence, 1)], spends, vec![0xab])
    }
}

type MockHandler = Box<dyn Fn(&BlockRequest) -> Result<BlocksResponse, SyncError> + Send + Sync>;

/// A scriptable [`BlockNetwork`] that records every request it receives.
pub struct MockNetwork {
    requests: Mutex<Vec<BlockRequest>>,
    handler: Mutex<MockHandler>,
    delay: Mutex<Option<Duration>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            handler: Mutex::new(Box::new(|request| {
                Err(SyncError::CannotSatisfyRequest(request.hash.to_hex()))
            })),
            delay: Mutex::new(None),
        }
    }

    /// Replaces the response script.
    pub fn respond_with<F>(&self, handler: F)
    where F: Fn(&BlockRequest) -> Result<BlocksResponse, SyncError> + Send + Sync + 'static {
        *self.handler.lock().unwrap() = Box::new(handler);
    }

    /// Answers every request with the empty tip-heartbeat response.
    pub fn respond_with_empty(&self) {
        self.respond_with(|_| {
            Ok(BlocksResponse {
                blocks: Vec::new(),
                from_peer: PeerId::new("mock"),
            })
        });
    }

    /// Delays every response, for timeout and request-collapsing tests.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn requests(&self) -> Vec<BlockRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl BlockNetwork for MockNetwork {
    async fn request_blocks(&self, request: BlockRequest) -> Result<BlocksResponse, SyncError> {
        self.requests.lock().unwrap().push(request.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let handler = self.handler.lock().unwrap();
        handler(&request)
    }
}

/// A [`BlockchainDatabase`] over the in-memory backend, bootstrapped with the chain's genesis.
pub fn create_test_database(chain: &TestChain) -> BlockchainDatabase<MemoryDatabase> {
    BlockchainDatabase::new(
        MemoryDatabase::new(),
        chain.rules.clone(),
        chain.pow.clone(),
        chain.validator(),
        chain.genesis().clone(),
    )
    .expect("the database bootstraps")
}
